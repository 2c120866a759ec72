//! # veil CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;
use serde::Serialize;

/// Veil: confidential batch settlement toolchain.
///
/// Simulates batch rounds end to end and audits committee selection and
/// event logs.
#[derive(Parser, Debug)]
#[command(name = "veil", version, about)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run one swap (and optional UEI) round with concurrent operators.
    Simulate(veil_cli::simulate::SimulateArgs),
    /// Recompute a committee from its batch key and entropy.
    SelectCommittee(veil_cli::audit::SelectCommitteeArgs),
    /// Verify the hash chain of an exported event log.
    VerifyLog(veil_cli::audit::VerifyLogArgs),
}

fn print(report: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    veil_cli::init_tracing(cli.log_json);

    match cli.command {
        Commands::Simulate(args) => print(&veil_cli::simulate::run(&args)?),
        Commands::SelectCommittee(args) => print(&veil_cli::audit::select(&args)?),
        Commands::VerifyLog(args) => print(&veil_cli::audit::verify_log(&args)?),
    }
}
