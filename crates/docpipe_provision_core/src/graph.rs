//! Unit dependency graph and provisioning order.
//!
//! The four provisioning units form a static DAG: Registry and Queue are
//! leaves, Identity consumes the Queue's outputs, and Compute consumes
//! Registry, Identity, and Queue outputs. Apply order is computed by a
//! Kahn topological sort that groups mutually independent units into
//! stages; teardown order is the exact reverse.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Registry,
    Queue,
    Identity,
    Compute,
}

impl UnitKind {
    pub const ALL: [UnitKind; 4] = [
        UnitKind::Registry,
        UnitKind::Queue,
        UnitKind::Identity,
        UnitKind::Compute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Queue => "queue",
            Self::Identity => "identity",
            Self::Compute => "compute",
        }
    }

    /// Units whose outputs this unit consumes.
    pub fn dependencies(self) -> &'static [UnitKind] {
        match self {
            Self::Registry | Self::Queue => &[],
            Self::Identity => &[UnitKind::Queue],
            Self::Compute => &[UnitKind::Registry, UnitKind::Identity, UnitKind::Queue],
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provisioning status of a unit within one apply run. A unit may only
/// enter `Pending` once every declared reference input has resolved to a
/// concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Absent,
    Pending,
    Applied,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphError {
    message: String,
}

impl GraphError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GraphError {}

/// Groups units into dependency-ordered stages. Units within one stage
/// have no edges between them and may provision concurrently.
pub fn topological_stages(
    dependencies_of: impl Fn(UnitKind) -> Vec<UnitKind>,
) -> Result<Vec<Vec<UnitKind>>, GraphError> {
    let mut remaining: Vec<UnitKind> = UnitKind::ALL.to_vec();
    let mut placed: Vec<UnitKind> = Vec::new();
    let mut stages: Vec<Vec<UnitKind>> = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<UnitKind> = remaining
            .iter()
            .copied()
            .filter(|unit| {
                dependencies_of(*unit)
                    .iter()
                    .all(|dependency| placed.contains(dependency))
            })
            .collect();

        if ready.is_empty() {
            return Err(GraphError::new(format!(
                "dependency cycle among units: {}",
                remaining
                    .iter()
                    .map(|unit| unit.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        remaining.retain(|unit| !ready.contains(unit));
        placed.extend(ready.iter().copied());
        stages.push(ready);
    }

    Ok(stages)
}

/// Apply stages for the static unit graph:
/// `[[registry, queue], [identity], [compute]]`.
pub fn apply_stages() -> Vec<Vec<UnitKind>> {
    topological_stages(|unit| unit.dependencies().to_vec())
        .expect("static unit graph should be acyclic")
}

/// Teardown visits units in the exact reverse of creation order so no
/// destroyed resource leaves a dangling reference behind.
pub fn teardown_order() -> Vec<UnitKind> {
    let mut order: Vec<UnitKind> = apply_stages().into_iter().flatten().collect();
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_stages_order_leaves_first() {
        let stages = apply_stages();

        assert_eq!(
            stages,
            vec![
                vec![UnitKind::Registry, UnitKind::Queue],
                vec![UnitKind::Identity],
                vec![UnitKind::Compute],
            ]
        );
    }

    #[test]
    fn teardown_order_is_reverse_of_creation() {
        assert_eq!(
            teardown_order(),
            vec![
                UnitKind::Compute,
                UnitKind::Identity,
                UnitKind::Queue,
                UnitKind::Registry,
            ]
        );
    }

    #[test]
    fn every_dependency_is_placed_in_an_earlier_stage() {
        let stages = apply_stages();

        for (index, stage) in stages.iter().enumerate() {
            let earlier: Vec<UnitKind> = stages[..index].iter().flatten().copied().collect();
            for unit in stage {
                for dependency in unit.dependencies() {
                    assert!(
                        earlier.contains(dependency),
                        "{unit} scheduled before its dependency {dependency}"
                    );
                }
            }
        }
    }

    #[test]
    fn cycle_is_rejected() {
        let error = topological_stages(|unit| match unit {
            UnitKind::Registry => vec![UnitKind::Compute],
            other => other.dependencies().to_vec(),
        })
        .expect_err("cyclic graph should fail");

        assert!(error.message().contains("dependency cycle"));
    }
}
