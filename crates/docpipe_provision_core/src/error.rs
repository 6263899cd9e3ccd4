use thiserror::Error;

use crate::graph::UnitKind;

/// Provisioning failure taxonomy. Every variant that concerns a single
/// resource names the unit it belongs to so plan and apply output can
/// attribute the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("{unit}: input '{input}' is unresolved; upstream units must be applied first")]
    UnresolvedReference { unit: UnitKind, input: &'static str },

    #[error("{unit}: resource '{name}' already exists outside managed state; rename or import it")]
    NamingCollision { unit: UnitKind, name: String },

    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("external precondition failed: {message}")]
    ExternalPrecondition { message: String },

    #[error("{unit}: {message}")]
    Adapter { unit: UnitKind, message: String },

    #[error("{unit}: teardown blocked: {message}")]
    TeardownBlocked { unit: UnitKind, message: String },
}

impl ProvisionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    pub fn adapter(unit: UnitKind, message: impl Into<String>) -> Self {
        Self::Adapter {
            unit,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_names_unit_and_input() {
        let error = ProvisionError::UnresolvedReference {
            unit: UnitKind::Identity,
            input: "queue_arn",
        };

        let rendered = error.to_string();
        assert!(rendered.contains("identity"));
        assert!(rendered.contains("queue_arn"));
    }

    #[test]
    fn naming_collision_names_resource() {
        let error = ProvisionError::NamingCollision {
            unit: UnitKind::Registry,
            name: "docpipe-dev-pdf-processor".to_string(),
        };

        assert!(error.to_string().contains("docpipe-dev-pdf-processor"));
    }
}
