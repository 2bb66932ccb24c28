use crate::prelude::{println, *};
use colored::Colorize;

use qrops_core::codes::QrCode;

use crate::api::{HttpQrApi, QrApi};
use crate::client::{ApiConfig, RateLimitedClient};

#[derive(Debug, clap::Args)]
pub struct ListOptions {
    /// API key for the account
    #[clap(long, env = "QRCG_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Only list codes in this folder
    #[arg(long)]
    pub folder: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(options: ListOptions, global: crate::Global) -> Result<()> {
    if global.verbose {
        match &options.folder {
            Some(folder) => println!("Fetching codes in folder {folder}..."),
            None => println!("Fetching all codes..."),
        }
    }

    let codes = list_codes_data(
        &options.api_key,
        options.folder.as_deref(),
        global.rate_budget,
    )
    .await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&codes)?);
    } else {
        output_formatted(&codes);
    }

    Ok(())
}

/// Fetches the full code listing, paginating until the API runs dry
pub async fn list_codes_data(
    api_key: &str,
    folder: Option<&str>,
    rate_budget: u32,
) -> Result<Vec<QrCode>> {
    let config = ApiConfig {
        api_key: api_key.to_string(),
    };
    let mut api = HttpQrApi::new(RateLimitedClient::new(&config, rate_budget)?);

    let folder_id = match folder {
        Some(name) => {
            let folder = api
                .find_folder(name)
                .await?
                .ok_or_else(|| eyre!("Folder {:?} not found in the account", name))?;
            Some(folder.id)
        }
        None => None,
    };

    let codes = api.list_codes(folder_id).await?;
    Ok(codes)
}

fn output_formatted(codes: &[QrCode]) {
    if codes.is_empty() {
        println!("\n{}\n", "No codes found.".yellow());
        return;
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "ID".bold().cyan(),
        "Title".bold().cyan(),
        "Type".bold().cyan(),
        "Short URL".bold().cyan(),
        "Target URL".bold().cyan()
    ]);

    for code in codes {
        table.add_row(prettytable::row![
            code.id.to_string(),
            display_or_dash(&code.title),
            display_or_dash(&code.type_name),
            display_or_dash(&code.short_url),
            display_or_dash(&code.target_url)
        ]);
    }

    table.printstd();
    println!("\n{} codes", codes.len().to_string().bold());
}

fn display_or_dash(field: &Option<String>) -> String {
    match field {
        Some(value) if !value.is_empty() => value.clone(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_or_dash_present() {
        assert_eq!(
            display_or_dash(&Some("QR 1".to_string())),
            "QR 1".to_string()
        );
    }

    #[test]
    fn test_display_or_dash_missing() {
        assert_eq!(display_or_dash(&None), "-".to_string());
    }

    #[test]
    fn test_display_or_dash_empty() {
        assert_eq!(display_or_dash(&Some(String::new())), "-".to_string());
    }
}
