use crate::prelude::{println, *};
use colored::Colorize;

use qrops_core::domain::{DomainId, DOMAIN_TABLE};

use crate::api::{HttpQrApi, QrApi};
use crate::client::{ApiConfig, RateLimitedClient};

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Assign a vanity short URL to an existing code
    #[clap(name = "set")]
    Set(SetOptions),
}

#[derive(Debug, clap::Args)]
pub struct SetOptions {
    /// Id of the code to update
    #[arg(value_name = "CODE_ID")]
    pub code_id: u64,

    /// Back-half the short URL should use, e.g. `spring-menu`
    #[arg(value_name = "BACKHALF")]
    pub backhalf: String,

    /// Id of the short domain the back-half lives on
    #[arg(long, default_value = "1")]
    pub domain_id: DomainId,

    /// API key for the account
    #[clap(long, env = "QRCG_API_KEY", hide_env_values = true)]
    pub api_key: String,
}

pub async fn run(command: Commands, global: crate::Global) -> Result<()> {
    match command {
        Commands::Set(options) => set(options, global).await,
    }
}

async fn set(options: SetOptions, global: crate::Global) -> Result<()> {
    if global.verbose {
        println!(
            "Assigning short URL {} (domain {}) to code {}...",
            options.backhalf, options.domain_id, options.code_id
        );
    }

    let config = ApiConfig {
        api_key: options.api_key.clone(),
    };
    let mut api = HttpQrApi::new(RateLimitedClient::new(&config, global.rate_budget)?);

    api.update_short_url(options.code_id, &options.backhalf, options.domain_id)
        .await?;

    match short_url_for(options.domain_id, &options.backhalf) {
        Some(url) => println!(
            "{} {} now resolves via {}",
            "Updated:".bold().green(),
            f!("code {}", options.code_id).bold(),
            url.cyan().underline()
        ),
        None => println!(
            "{} code {} now uses back-half {} on domain {}",
            "Updated:".bold().green(),
            options.code_id,
            options.backhalf.cyan(),
            options.domain_id
        ),
    }

    Ok(())
}

/// Reconstruct the full short URL for a known domain id.
fn short_url_for(domain_id: DomainId, backhalf: &str) -> Option<String> {
    DOMAIN_TABLE
        .iter()
        .find(|&&(_, id)| id == domain_id)
        .map(|(prefix, _)| f!("{prefix}{backhalf}"))
}
