use clap::{ArgAction, Parser, Subcommand};
use color_eyre::Result;
use sqo_core::{to_json_response, CommandStatus, ExecutionOutcome, Settings};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = SqoCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let settings = Settings::from_env();
    let (name, outcome) = match &cli.command {
        Command::Preflight => ("preflight", sqo_core::preflight(&settings)),
        Command::LockStatus => ("lock-status", sqo_core::lock_status(&settings)),
    };
    let code = emit_output(&cli, name, &outcome);

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

#[derive(Parser)]
#[command(
    name = "sqo",
    about = "Startup guard for the service quality oracle worker",
    version
)]
struct SqoCli {
    /// Emit machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,
    /// Suppress human-readable output
    #[arg(long, global = true)]
    quiet: bool,
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Acquire the instance lock, resolve credentials, and release
    Preflight,
    /// Show who currently holds the instance lock, if anyone
    LockStatus,
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("sqo={level},sqo_core={level},sqo_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &SqoCli, command: &str, outcome: &ExecutionOutcome) -> i32 {
    let code = match outcome.status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    };

    if cli.json {
        let payload = to_json_response(command, outcome, code);
        match serde_json::to_string_pretty(&payload) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => eprintln!("failed to render JSON output: {err}"),
        }
    } else if !cli.quiet {
        println!("{}: {}", command, outcome.message);
        if let Some(hint) = outcome
            .details
            .as_object()
            .and_then(|map| map.get("hint"))
            .and_then(serde_json::Value::as_str)
        {
            println!("Hint: {hint}");
        }
    }

    code
}
