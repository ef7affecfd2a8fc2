use clap::Parser;
use env_logger::Env;
use malguard::cli::{Args, Command};
use malguard::commands::{self, Exit};
use malguard::ui;
use std::process::ExitCode;

fn display_banner() {
    println!();
    println!("    \x1b[38;5;46m🛡️  MalGuard\x1b[0m \x1b[38;5;240mv{}\x1b[0m", env!("CARGO_PKG_VERSION"));
    println!("    \x1b[3;38;5;147mSignature-based malware detection\x1b[0m");
    println!();
}

/// Commands whose stdout is meant for other programs
fn machine_output(command: &Command) -> bool {
    match command {
        Command::Scan(args) => args.json,
        Command::List(args) => args.json,
        Command::Hash(_) | Command::Export { .. } => true,
        _ => false,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    log::debug!("MalGuard starting with args: {:?}", args);

    if !args.quiet && !machine_output(&args.command) {
        display_banner();
    }

    match commands::run(args).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            ui::print_error(&e.to_string());
            Exit::Failure.into()
        }
    }
}
