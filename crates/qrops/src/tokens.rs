use crate::prelude::{println, *};
use colored::Colorize;

use qrops_core::codes::AccessToken;

use crate::api::HttpQrApi;
use crate::client::{ApiConfig, RateLimitedClient};

#[derive(Debug, clap::Args)]
pub struct TokensOptions {
    /// API key for the account
    #[clap(long, env = "QRCG_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn handler(options: TokensOptions, global: crate::Global) -> Result<()> {
    if global.verbose {
        println!("Fetching access tokens...");
    }

    let config = ApiConfig {
        api_key: options.api_key.clone(),
    };
    let mut api = HttpQrApi::new(RateLimitedClient::new(&config, global.rate_budget)?);
    let tokens = api.list_access_tokens().await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
    } else {
        output_formatted(&tokens);
    }

    Ok(())
}

fn output_formatted(tokens: &[AccessToken]) {
    if tokens.is_empty() {
        println!("\n{}\n", "No access tokens found.".yellow());
        return;
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "ID".bold().cyan(),
        "Token".bold().cyan(),
        "Enabled".bold().cyan(),
        "Created".bold().cyan(),
        "Monthly usage".bold().cyan()
    ]);

    for token in tokens {
        let enabled = match token.enabled {
            Some(true) => "yes".green().to_string(),
            Some(false) => "no".red().to_string(),
            None => "-".to_string(),
        };
        table.add_row(prettytable::row![
            token.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            token
                .token
                .as_deref()
                .map(mask_token)
                .unwrap_or_else(|| "-".to_string()),
            enabled,
            token.created_at.clone().unwrap_or_else(|| "-".to_string()),
            monthly_usage(token)
        ]);
    }

    table.printstd();
    println!();
}

/// Tokens are credentials; show only enough of one to recognize it.
fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    f!("{head}...{tail}")
}

fn monthly_usage(token: &AccessToken) -> String {
    match (token.rate_number_month, token.rate_limit_month) {
        (Some(used), Some(limit)) => f!("{used} / {limit}"),
        (Some(used), None) => used.to_string(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token_long() {
        assert_eq!(mask_token("abcd1234efgh5678"), "abcd...5678");
    }

    #[test]
    fn test_mask_token_short() {
        assert_eq!(mask_token("abcd"), "****");
    }

    #[test]
    fn test_mask_token_multibyte() {
        // No panic on non-ASCII; masking counts characters, not bytes.
        assert_eq!(mask_token("ключ-секрет-1234"), "ключ...1234");
        assert_eq!(mask_token("café"), "****");
    }

    #[test]
    fn test_monthly_usage() {
        let token = AccessToken {
            id: Some(1),
            token: None,
            created_at: None,
            enabled: None,
            rate_limit: None,
            rate_limit_month: Some(50_000),
            rate_number_month: Some(1_234),
        };
        assert_eq!(monthly_usage(&token), "1234 / 50000");
    }
}
