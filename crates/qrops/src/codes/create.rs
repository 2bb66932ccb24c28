use std::path::{Path, PathBuf};

use crate::prelude::{eprintln, println, *};
use colored::Colorize;

use qrops_core::codes::QrCode;

use crate::api::{HttpQrApi, QrApi};
use crate::client::{ApiConfig, RateLimitedClient};

/// Dynamic URL codes.
const URL_TYPE_ID: u32 = 1;

#[derive(Debug, clap::Args)]
pub struct CreateOptions {
    /// Destination the new code should resolve to
    #[arg(value_name = "URL")]
    pub url: String,

    /// API key for the account
    #[clap(long, env = "QRCG_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Title shown in the vendor dashboard
    #[arg(long, default_value = "My QR Code - API")]
    pub title: String,

    /// Also download the rendered PNG of the new code
    #[arg(long)]
    pub download: bool,

    /// Directory for downloaded images
    #[arg(long, default_value = "png-exports")]
    pub png_dir: PathBuf,

    /// Output the created code as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(options: CreateOptions, global: crate::Global) -> Result<()> {
    let target_url = normalize_target_url(&options.url);

    if global.verbose {
        println!("Creating code for {target_url}...");
    }

    let config = ApiConfig {
        api_key: options.api_key.clone(),
    };
    let mut api = HttpQrApi::new(RateLimitedClient::new(&config, global.rate_budget)?);

    let code = create_code_data(&mut api, &options.title, &target_url).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&code)?);
    } else {
        output_formatted(&code);
    }

    // The code exists either way; a failed image download is only a warning.
    if options.download {
        match download_image(&mut api, &code, &options.png_dir).await {
            Ok(path) => println!("Image saved to {}", path.display().to_string().cyan()),
            Err(err) => eprintln!("Warning: could not download the image: {err}"),
        }
    }

    Ok(())
}

/// Creates a dynamic URL code and returns the vendor's record for it
pub async fn create_code_data(
    api: &mut HttpQrApi,
    title: &str,
    target_url: &str,
) -> Result<QrCode> {
    let code = api.create_code(title, target_url, URL_TYPE_ID).await?;
    Ok(code)
}

async fn download_image(api: &mut HttpQrApi, code: &QrCode, dir: &Path) -> Result<PathBuf> {
    let bytes = api.download_png(code.id).await?;

    let path = png_path(dir, code.id, code.title.as_deref().unwrap_or(""));
    std::fs::create_dir_all(dir).wrap_err_with(|| f!("Failed to create {}", dir.display()))?;
    std::fs::write(&path, bytes).wrap_err_with(|| f!("Failed to write {}", path.display()))?;

    Ok(path)
}

/// The API rejects bare hosts; assume https when no scheme is given.
fn normalize_target_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// Title as a filename fragment: spaces become underscores, everything
/// outside `[A-Za-z0-9_-]` is dropped.
fn safe_title(title: &str) -> String {
    title
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn png_path(dir: &Path, id: u64, title: &str) -> PathBuf {
    dir.join(f!("{id}_{}.png", safe_title(title)))
}

fn output_formatted(code: &QrCode) {
    println!("\n{}", "Code created".bold().green());
    println!("  {}: {}", "ID".green(), code.id.to_string().bright_white());
    if let Some(short_url) = &code.short_url {
        println!("  {}: {}", "Short URL".green(), short_url.cyan().underline());
    }
    if let Some(target_url) = &code.target_url {
        println!("  {}: {}", "Target".green(), target_url.cyan());
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_target_url_bare_host() {
        assert_eq!(
            normalize_target_url("example.com/menu"),
            "https://example.com/menu"
        );
    }

    #[test]
    fn test_normalize_target_url_keeps_https() {
        assert_eq!(
            normalize_target_url("https://example.com"),
            "https://example.com"
        );
    }

    #[test]
    fn test_normalize_target_url_keeps_http() {
        assert_eq!(
            normalize_target_url("http://example.com"),
            "http://example.com"
        );
    }

    #[test]
    fn test_safe_title_replaces_spaces_and_strips_punctuation() {
        assert_eq!(safe_title("Summer Menu 2026!"), "Summer_Menu_2026");
        assert_eq!(safe_title("My QR Code - API"), "My_QR_Code_-_API");
    }

    #[test]
    fn test_safe_title_drops_non_ascii() {
        assert_eq!(safe_title("Café Menü"), "Caf_Men");
    }

    #[test]
    fn test_png_path_layout() {
        assert_eq!(
            png_path(Path::new("png-exports"), 123, "Summer Menu"),
            PathBuf::from("png-exports/123_Summer_Menu.png")
        );
    }
}
