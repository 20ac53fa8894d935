pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "leadflow",
    about = "Leadflow operator CLI",
    long_about = "Run reconciliation over transcripts, apply migrations, inspect config, and \
                  query persisted decisions.",
    after_help = "Examples:\n  leadflow process call.txt --phone 65991234567\n  leadflow process --text \"Maria asked for a quote\" --simulate\n  leadflow doctor --json\n  leadflow decision call"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Extract a contact from a transcript and reconcile it against the CRM")]
    Process {
        #[arg(help = "Transcript file to process")]
        input: Option<PathBuf>,
        #[arg(long, help = "Inline text instead of a transcript file")]
        text: Option<String>,
        #[arg(long, help = "Source phone of the conversation")]
        phone: Option<String>,
        #[arg(long, help = "Identifier for the decision record (defaults to the file stem)")]
        input_id: Option<String>,
        #[arg(long, help = "Compute the decision without issuing CRM writes")]
        simulate: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, database connectivity, and collaborator readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with secret redaction"
    )]
    Config,
    #[command(about = "Show the persisted decision record for an input identifier")]
    Decision {
        #[arg(help = "Input identifier the run was keyed by")]
        input_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Process { input, text, phone, input_id, simulate } => {
            commands::process::run(input, text, phone, input_id, simulate)
        }
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Decision { input_id } => commands::decision::run(&input_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
