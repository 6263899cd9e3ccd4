//! Process-wide provisioning context.
//!
//! Naming conventions, default tags, and the environment identifier are
//! carried as an explicit value threaded through every unit call. Nothing
//! here is global state; two environments provision against two contexts
//! with no shared mutable data.

use std::collections::BTreeMap;

pub const PROJECT_TAG_KEY: &str = "Project";
pub const ENVIRONMENT_TAG_KEY: &str = "Environment";
pub const MANAGED_BY_TAG_KEY: &str = "ManagedBy";
pub const MANAGED_BY_TAG_VALUE: &str = "docpipe-provisioner";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningContext {
    pub name_prefix: String,
    pub environment: String,
    pub region: String,
    pub default_tags: BTreeMap<String, String>,
}

impl ProvisioningContext {
    pub fn new(
        name_prefix: impl Into<String>,
        environment: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let name_prefix = name_prefix.into();
        let environment = environment.into();
        let default_tags = BTreeMap::from([
            (PROJECT_TAG_KEY.to_string(), name_prefix.clone()),
            (ENVIRONMENT_TAG_KEY.to_string(), environment.clone()),
            (
                MANAGED_BY_TAG_KEY.to_string(),
                MANAGED_BY_TAG_VALUE.to_string(),
            ),
        ]);

        Self {
            name_prefix,
            environment,
            region: region.into(),
            default_tags,
        }
    }

    /// A live resource counts as managed by this system only when it
    /// carries the management marker tag. Anything else with a colliding
    /// name belongs to someone else.
    pub fn is_managed(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.get(MANAGED_BY_TAG_KEY)
            .is_some_and(|value| value == MANAGED_BY_TAG_VALUE)
    }
}
