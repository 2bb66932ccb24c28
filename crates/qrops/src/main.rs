#![allow(unused)]

use crate::prelude::*;
use clap::Parser;

mod api;
mod client;
mod codes;
mod delete;
mod error;
mod migrate;
mod prelude;
mod shorturl;
mod tokens;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Lifecycle tooling for the QR Code Generator API: create codes, \
bulk-delete with an audit trail, and migrate batches of codes between accounts \
while preserving vanity short URLs and designs."
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// API calls allowed per one-second rate-limit window
    #[clap(long, env = "QRCG_RATE_BUDGET", global = true, default_value = "10")]
    rate_budget: u32,

    /// Whether to display additional information.
    #[clap(long, env = "QROPS_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// QR code operations (list, create)
    #[clap(subcommand)]
    Codes(codes::Commands),

    /// Migrate a folder of codes from a source account to a target account
    Migrate(migrate::MigrateOptions),

    /// Bulk deletion with a confirmation gate and an audit report
    #[clap(subcommand)]
    Delete(delete::Commands),

    /// Vanity short URL operations
    #[clap(subcommand)]
    Shorturl(shorturl::Commands),

    /// List the account's access tokens and rate-limit standing
    Tokens(tokens::TokensOptions),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Codes(cmd) => codes::run(cmd, app.global).await,
        SubCommands::Migrate(options) => migrate::handler(options, app.global).await,
        SubCommands::Delete(cmd) => delete::run(cmd, app.global).await,
        SubCommands::Shorturl(cmd) => shorturl::run(cmd, app.global).await,
        SubCommands::Tokens(options) => tokens::handler(options, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
