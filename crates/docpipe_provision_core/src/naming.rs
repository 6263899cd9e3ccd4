//! Resource naming conventions.
//!
//! Every provisioned name embeds the naming prefix and the environment,
//! which is what keeps two environments collision-free in one account.

use crate::context::ProvisioningContext;
use crate::identifiers::ParameterPath;

pub const QUEUE_URL_PARAMETER: &str = "queue-url";
pub const DEAD_LETTER_QUEUE_URL_PARAMETER: &str = "dead-letter-queue-url";

pub fn repository_name(context: &ProvisioningContext) -> String {
    format!(
        "{}-{}-pdf-processor",
        context.name_prefix, context.environment
    )
}

pub fn queue_name(context: &ProvisioningContext) -> String {
    format!(
        "{}-{}-pdf-jobs.fifo",
        context.name_prefix, context.environment
    )
}

pub fn dead_letter_queue_name(context: &ProvisioningContext) -> String {
    format!(
        "{}-{}-pdf-jobs-dlq.fifo",
        context.name_prefix, context.environment
    )
}

pub fn role_name(context: &ProvisioningContext) -> String {
    format!(
        "{}-{}-pdf-processor-role",
        context.name_prefix, context.environment
    )
}

pub fn function_name(context: &ProvisioningContext) -> String {
    format!(
        "{}-{}-pdf-processor",
        context.name_prefix, context.environment
    )
}

/// Log group resource scope for the function's own CloudWatch log group.
/// Region and account stay wildcarded; the log group path does not.
pub fn log_group_resource(context: &ProvisioningContext) -> String {
    format!(
        "arn:aws:logs:*:*:log-group:/aws/lambda/{}:*",
        function_name(context)
    )
}

/// Registry resource scope derived from the repository name, so the
/// Identity unit can grant pull access without consuming a Registry
/// output.
pub fn repository_resource(context: &ProvisioningContext) -> String {
    format!("arn:aws:ecr:*:*:repository/{}", repository_name(context))
}

pub fn parameter_path(context: &ProvisioningContext, leaf: &str) -> ParameterPath {
    ParameterPath::new(format!(
        "/{}/{}/{leaf}",
        context.name_prefix, context.environment
    ))
    .expect("prefix, environment, and leaf are validated non-empty path segments")
}

/// Every name this system provisions or publishes for one environment.
pub fn all_names(context: &ProvisioningContext) -> Vec<String> {
    vec![
        repository_name(context),
        queue_name(context),
        dead_letter_queue_name(context),
        role_name(context),
        function_name(context),
        parameter_path(context, QUEUE_URL_PARAMETER).into_string(),
        parameter_path(context, DEAD_LETTER_QUEUE_URL_PARAMETER).into_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_context() -> ProvisioningContext {
        ProvisioningContext::new("docpipe", "dev", "eu-central-1")
    }

    #[test]
    fn names_embed_prefix_and_environment() {
        let context = dev_context();

        assert_eq!(repository_name(&context), "docpipe-dev-pdf-processor");
        assert_eq!(queue_name(&context), "docpipe-dev-pdf-jobs.fifo");
        assert_eq!(
            dead_letter_queue_name(&context),
            "docpipe-dev-pdf-jobs-dlq.fifo"
        );
        assert_eq!(role_name(&context), "docpipe-dev-pdf-processor-role");
        assert_eq!(function_name(&context), "docpipe-dev-pdf-processor");
    }

    #[test]
    fn parameter_paths_are_namespaced() {
        let context = dev_context();

        assert_eq!(
            parameter_path(&context, QUEUE_URL_PARAMETER).as_str(),
            "/docpipe/dev/queue-url"
        );
        assert_eq!(
            parameter_path(&context, DEAD_LETTER_QUEUE_URL_PARAMETER).as_str(),
            "/docpipe/dev/dead-letter-queue-url"
        );
    }

    #[test]
    fn environments_never_share_a_name() {
        let dev = all_names(&dev_context());
        let prod = all_names(&ProvisioningContext::new("docpipe", "prod", "eu-central-1"));

        for name in &dev {
            assert!(!prod.contains(name), "name '{name}' collides across environments");
        }
    }

    #[test]
    fn queue_names_carry_fifo_suffix() {
        let context = dev_context();

        assert!(queue_name(&context).ends_with(".fifo"));
        assert!(dead_letter_queue_name(&context).ends_with(".fifo"));
    }
}
