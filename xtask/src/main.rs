use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the PDF-pipeline provisioning workspace",
    long_about = "A unified CLI for running CI checks and the environment\n\
                  provisioner in the PDF-pipeline provisioning workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Plan an environment against its config file
    Plan {
        #[arg(value_enum, default_value_t = Environment::Dev)]
        environment: Environment,
    },
    /// Apply an environment
    Apply {
        #[arg(value_enum, default_value_t = Environment::Dev)]
        environment: Environment,
    },
    /// Inspect an environment's output identifiers
    Inspect {
        #[arg(value_enum, default_value_t = Environment::Dev)]
        environment: Environment,
    },
    /// Destroy an environment
    Destroy {
        #[arg(value_enum, default_value_t = Environment::Dev)]
        environment: Environment,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Tests only
    Test,
}

#[derive(Clone, Copy, ValueEnum)]
enum Environment {
    Dev,
    Prod,
}

impl Environment {
    fn config_path(self) -> &'static str {
        match self {
            Self::Dev => "config/dev.json",
            Self::Prod => "config/prod.json",
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_provisioner(subcommand: &str, environment: Environment) {
    run_cargo(&[
        "run",
        "-p",
        "docpipe_provision_aws",
        "--bin",
        "provisioner",
        "--",
        "--config",
        environment.config_path(),
        subcommand,
    ]);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    ci_test();
}

fn ci_test() {
    step("Test docpipe_provision_core");
    run_cargo(&["test", "-p", "docpipe_provision_core"]);

    step("Test docpipe_provision_aws");
    run_cargo(&["test", "-p", "docpipe_provision_aws"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Test => ci_test(),
            }
            eprintln!("\nCI job passed.");
        }
        Commands::Plan { environment } => run_provisioner("plan", environment),
        Commands::Apply { environment } => run_provisioner("apply", environment),
        Commands::Inspect { environment } => run_provisioner("inspect", environment),
        Commands::Destroy { environment } => run_provisioner("destroy", environment),
    }
}
