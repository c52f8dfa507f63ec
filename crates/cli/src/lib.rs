pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use pricelens_core::domain::{Objective, Solver};
use pricelens_core::WorkflowKind;

use crate::commands::ask::{AskArgs, SourceArgs};

#[derive(Debug, Parser)]
#[command(
    name = "pricelens",
    about = "Pricelens operator CLI",
    long_about = "Ask grounded pricing questions against the configured transformation and analysis services, and inspect runtime readiness.",
    after_help = "Examples:\n  pricelens doctor --json\n  pricelens config\n  pricelens ask optimal \"cheapest plan with SSO\" --url https://example.com/pricing --seats 5 --feature sso"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, upstream reachability and the cache backend")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one pricing workflow and print the result with its plan trace")]
    Ask {
        #[arg(help = "Workflow to run: summary | subscriptions | optimal")]
        workflow: WorkflowKind,
        #[arg(help = "The pricing question, recorded with the request")]
        question: String,
        #[command(flatten)]
        sources: SourceFlags,
        #[arg(long, help = "Seat count the subscription must cover")]
        seats: Option<u32>,
        #[arg(long = "feature", help = "Feature the subscription must include (repeatable)")]
        features: Vec<String>,
        #[arg(long, help = "Optimization objective: minimize | maximize")]
        objective: Option<Objective>,
        #[arg(long, help = "Solver override: minizinc | choco")]
        solver: Option<Solver>,
    },
    #[command(about = "Validate pricing sources with the analysis service")]
    Validate {
        #[command(flatten)]
        sources: SourceFlags,
    },
}

#[derive(Debug, Args)]
struct SourceFlags {
    #[arg(long = "url", help = "Pricing page URL (repeatable)")]
    urls: Vec<String>,
    #[arg(long = "document", help = "Path to a Pricing2Yaml document (repeatable)")]
    documents: Vec<PathBuf>,
    #[arg(long, help = "Ignore cached models and transform the sources again")]
    refresh: bool,
}

impl From<SourceFlags> for SourceArgs {
    fn from(flags: SourceFlags) -> Self {
        Self { urls: flags.urls, documents: flags.documents, refresh: flags.refresh }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Ask { workflow, question, sources, seats, features, objective, solver } => {
            commands::ask::run(AskArgs {
                workflow,
                question,
                sources: sources.into(),
                seats,
                features,
                objective,
                solver,
            })
        }
        Command::Validate { sources } => commands::ask::validate(sources.into()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
