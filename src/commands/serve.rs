//! Serve command

use super::{Context, Exit};
use crate::api::{self, AppState};
use crate::errors::MalguardResult;
use clap::Args;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value = "8000")]
    pub port: u16,
}

pub async fn run(ctx: Context, args: ServeArgs) -> MalguardResult<Exit> {
    let scanner = ctx.scanner(true);
    if !scanner.pattern_matching_available() {
        log::info!("No pattern rules loaded; serving with signature matching only");
    }

    let state = AppState::new(ctx.settings, ctx.stores, ctx.quarantine, scanner);
    if !ctx.quiet {
        println!("🛡️  MalGuard API on http://{}:{}", args.host, args.port);
    }
    api::serve(state, &args.host, args.port).await?;
    Ok(Exit::Success)
}
