use std::path::PathBuf;
use std::process::exit;

use anyhow::Context;
use clap::{Parser, Subcommand};

use docpipe_provision_aws::adapters::function::LambdaFunctionStore;
use docpipe_provision_aws::adapters::identity::IamIdentityStore;
use docpipe_provision_aws::adapters::parameters::SsmParameterStore;
use docpipe_provision_aws::adapters::queue::SqsQueueStore;
use docpipe_provision_aws::adapters::repository::EcrRepositoryStore;
use docpipe_provision_aws::adapters::storage::S3StorageProbe;
use docpipe_provision_aws::handlers::apply::{apply_environment, init_environment};
use docpipe_provision_aws::handlers::inspect::inspect_environment;
use docpipe_provision_aws::handlers::observe::plan_environment;
use docpipe_provision_aws::handlers::teardown::teardown_environment;
use docpipe_provision_aws::handlers::ProviderAdapters;
use docpipe_provision_core::config::EnvironmentConfig;
use docpipe_provision_core::plan::{Plan, PlannedChange};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "provisioner",
    about = "Provisions the PDF-pipeline serverless stack",
    long_about = "Plans, applies, inspects, and tears down one environment\n\
                  of the PDF-processing pipeline: image repository, FIFO\n\
                  queues, execution role, and the queue-triggered function."
)]
struct Cli {
    /// Environment configuration file
    #[arg(long, global = true, default_value = "config/dev.json")]
    config: PathBuf,
    /// Credential value injected into the function's runtime
    /// configuration; overrides the config file
    #[arg(long, global = true, env = "DOCPIPE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and external preconditions
    Init,
    /// Compute the delta between declared and live state
    Plan,
    /// Converge live state onto the declared state
    Apply,
    /// Read current output identifiers
    Inspect,
    /// Destroy the environment in reverse dependency order
    Destroy,
}

// ── helpers ────────────────────────────────────────────────────────

fn render_plan(plan: &Plan) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "environment '{}' (fingerprint {})",
        plan.environment,
        if plan.fingerprint.is_empty() {
            "n/a"
        } else {
            &plan.fingerprint[..12]
        }
    ));

    for action in &plan.actions {
        match &action.change {
            PlannedChange::Create => {
                lines.push(format!("  + {} [{}]", action.resource, action.unit));
            }
            PlannedChange::Update(diffs) => {
                lines.push(format!("  ~ {} [{}]", action.resource, action.unit));
                for diff in diffs {
                    lines.push(format!(
                        "      {}: {} -> {}",
                        diff.field, diff.actual, diff.expected
                    ));
                }
            }
            PlannedChange::Noop => {
                lines.push(format!("    {} [{}] unchanged", action.resource, action.unit));
            }
        }
    }

    for plan_error in &plan.errors {
        lines.push(format!("  ! {plan_error}"));
    }

    if plan.is_converged() {
        lines.push("no changes; environment is converged".to_string());
    } else if !plan.has_errors() {
        lines.push(format!("{} change(s) planned", plan.mutation_count()));
    }

    lines.join("\n")
}

// ── main ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = EnvironmentConfig::load(&cli.config)
        .with_context(|| format!("failed to load config '{}'", cli.config.display()))?;
    if let Some(api_key) = cli.api_key {
        config.compute.api_key = api_key;
    }

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let repositories = EcrRepositoryStore::new(aws_sdk_ecr::Client::new(&aws_config));
    let queues = SqsQueueStore::new(aws_sdk_sqs::Client::new(&aws_config));
    let identities = IamIdentityStore::new(aws_sdk_iam::Client::new(&aws_config));
    let functions = LambdaFunctionStore::new(aws_sdk_lambda::Client::new(&aws_config));
    let parameters = SsmParameterStore::new(aws_sdk_ssm::Client::new(&aws_config));
    let storage = S3StorageProbe::new(aws_sdk_s3::Client::new(&aws_config));
    let adapters = ProviderAdapters {
        repositories: &repositories,
        queues: &queues,
        identities: &identities,
        functions: &functions,
        parameters: &parameters,
        storage: &storage,
    };

    match cli.command {
        Commands::Init => {
            init_environment(&adapters, &config)?;
            println!(
                "environment '{}' validated; bucket '{}' exists",
                config.environment, config.bucket
            );
        }
        Commands::Plan => {
            let plan = plan_environment(&adapters, &config)?;
            println!("{}", render_plan(&plan));
            if plan.has_errors() {
                exit(1);
            }
        }
        Commands::Apply => {
            let report = apply_environment(&adapters, &config)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to serialize apply report")?
            );
        }
        Commands::Inspect => {
            let report = inspect_environment(&adapters, &config)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to serialize inspect report")?
            );
        }
        Commands::Destroy => {
            let report = teardown_environment(&adapters, &config)?;
            if report.deleted.is_empty() {
                println!("environment '{}' had nothing to destroy", report.environment);
            } else {
                println!(
                    "destroyed {} resource(s):\n{}",
                    report.deleted.len(),
                    report
                        .deleted
                        .iter()
                        .map(|name| format!("  - {name}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_provision_core::error::ProvisionError;
    use docpipe_provision_core::graph::UnitKind;
    use docpipe_provision_core::plan::{FieldDiff, PlannedAction};

    #[test]
    fn render_plan_marks_creates_updates_and_errors() {
        let plan = Plan {
            environment: "dev".to_string(),
            fingerprint: "abcdef0123456789".to_string(),
            actions: vec![
                PlannedAction {
                    unit: UnitKind::Registry,
                    resource: "docpipe-dev-pdf-processor".to_string(),
                    change: PlannedChange::Create,
                },
                PlannedAction {
                    unit: UnitKind::Queue,
                    resource: "docpipe-dev-pdf-jobs.fifo".to_string(),
                    change: PlannedChange::Update(vec![FieldDiff {
                        field: "visibility_timeout_seconds",
                        expected: "900".to_string(),
                        actual: "300".to_string(),
                    }]),
                },
            ],
            errors: vec![ProvisionError::NamingCollision {
                unit: UnitKind::Compute,
                name: "docpipe-dev-pdf-processor".to_string(),
            }],
        };

        let rendered = render_plan(&plan);
        assert!(rendered.contains("+ docpipe-dev-pdf-processor [registry]"));
        assert!(rendered.contains("~ docpipe-dev-pdf-jobs.fifo [queue]"));
        assert!(rendered.contains("visibility_timeout_seconds: 300 -> 900"));
        assert!(rendered.contains("! compute:"));
    }

    #[test]
    fn render_plan_reports_convergence() {
        let plan = Plan {
            environment: "dev".to_string(),
            fingerprint: "abcdef0123456789".to_string(),
            actions: vec![PlannedAction {
                unit: UnitKind::Registry,
                resource: "docpipe-dev-pdf-processor".to_string(),
                change: PlannedChange::Noop,
            }],
            errors: Vec::new(),
        };

        assert!(render_plan(&plan).contains("no changes"));
    }
}
