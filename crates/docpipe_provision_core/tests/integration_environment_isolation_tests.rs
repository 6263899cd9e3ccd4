//! Two environments instantiated from the same unit graph must never
//! share a resource name or a desired-state fingerprint.

use docpipe_provision_core::config::EnvironmentConfig;
use docpipe_provision_core::plan::{build_desired, diff, ObservedEnvironment};

fn config_for(environment: &str) -> EnvironmentConfig {
    EnvironmentConfig::from_json_str(&format!(
        r#"{{
            "environment": "{environment}",
            "name_prefix": "docpipe",
            "region": "eu-central-1",
            "bucket": "docpipe-{environment}-contracts"
        }}"#
    ))
    .expect("config should parse")
}

#[test]
fn environments_plan_disjoint_resource_names() {
    let dev_config = config_for("dev");
    let prod_config = config_for("prod");

    let dev = build_desired(&dev_config).expect("dev desired should build");
    let prod = build_desired(&prod_config).expect("prod desired should build");

    let dev_plan = diff(&dev, &ObservedEnvironment::default(), &dev_config.context());
    let prod_plan = diff(
        &prod,
        &ObservedEnvironment::default(),
        &prod_config.context(),
    );

    for dev_action in &dev_plan.actions {
        for prod_action in &prod_plan.actions {
            // Shared labels like "trigger binding" describe per-environment
            // resources; only concrete names must stay disjoint.
            if dev_action.resource.contains("dev") || prod_action.resource.contains("prod") {
                assert_ne!(
                    dev_action.resource, prod_action.resource,
                    "resource name shared across environments"
                );
            }
        }
    }
}

#[test]
fn environments_have_distinct_fingerprints() {
    let dev = build_desired(&config_for("dev")).expect("dev desired should build");
    let prod = build_desired(&config_for("prod")).expect("prod desired should build");

    assert_ne!(dev.fingerprint(), prod.fingerprint());
}

#[test]
fn desired_state_is_deterministic() {
    let first = build_desired(&config_for("dev")).expect("desired should build");
    let second = build_desired(&config_for("dev")).expect("desired should build");

    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
}
