use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prelude::{println, *};
use colored::Colorize;
use dialoguer::Confirm;

use qrops_core::codes::{encode_deletion_report, encode_id_report, parse_id_csv, QrCode};

use crate::api::{HttpQrApi, QrApi};
use crate::client::{ApiConfig, RateLimitedClient};

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Delete every code in a folder, or in the whole account
    #[clap(name = "folder")]
    Folder(FolderOptions),

    /// Delete the codes whose ids are listed in a CSV file
    #[clap(name = "from-csv")]
    FromCsv(FromCsvOptions),
}

#[derive(Debug, clap::Args)]
pub struct FolderOptions {
    /// API key for the account
    #[clap(long, env = "QRCG_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Folder to empty; omit to delete every code in the account
    #[arg(long)]
    pub folder: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Directory for the audit report
    #[arg(long, default_value = "csv-exports")]
    pub report_dir: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct FromCsvOptions {
    /// CSV file with an `id` column naming the codes to delete
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// API key for the account
    #[clap(long, env = "QRCG_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Directory for the audit report
    #[arg(long, default_value = "csv-exports")]
    pub report_dir: PathBuf,
}

pub async fn run(command: Commands, global: crate::Global) -> Result<()> {
    match command {
        Commands::Folder(options) => delete_folder(options, global).await,
        Commands::FromCsv(options) => delete_from_csv(options, global).await,
    }
}

async fn delete_folder(options: FolderOptions, global: crate::Global) -> Result<()> {
    let config = ApiConfig {
        api_key: options.api_key.clone(),
    };
    let mut api = HttpQrApi::new(RateLimitedClient::new(&config, global.rate_budget)?);

    let folder_id = match &options.folder {
        Some(name) => {
            let folder = api
                .find_folder(name)
                .await?
                .ok_or_else(|| eyre!("Folder {:?} not found in the account", name))?;
            Some(folder.id)
        }
        None => None,
    };

    if global.verbose {
        println!("Fetching codes to delete...");
    }
    let codes = api.list_codes(folder_id).await?;

    if codes.is_empty() {
        println!("{}", "Nothing to delete.".yellow());
        return Ok(());
    }

    let scope = match &options.folder {
        Some(name) => f!("folder {name:?}"),
        None => "the WHOLE account".to_string(),
    };
    if !confirm_deletion(&f!("Delete {} codes from {scope}?", codes.len()), options.yes)? {
        println!("{}", "Aborted.".yellow());
        return Ok(());
    }

    let ids: Vec<u64> = codes.iter().map(|code| code.id).collect();
    let (deleted, failed) = delete_batch(&mut api, &ids).await;

    // The audit report holds exactly what was deleted, nothing more.
    if !deleted.is_empty() {
        let deleted_codes: Vec<QrCode> = codes
            .iter()
            .filter(|code| deleted.contains(&code.id))
            .cloned()
            .collect();
        let report = report_path(&options.report_dir, chrono::Local::now());
        write_report(&report, &encode_deletion_report(&deleted_codes))?;
        println!("Audit report: {}", report.display().to_string().cyan());
    }

    display_outcome(deleted.len(), &failed);
    Ok(())
}

async fn delete_from_csv(options: FromCsvOptions, global: crate::Global) -> Result<()> {
    let text = std::fs::read_to_string(&options.file)
        .wrap_err_with(|| f!("Failed to read {}", options.file.display()))?;
    let ids = parse_id_csv(&text)?;

    if ids.is_empty() {
        println!("{}", "Nothing to delete.".yellow());
        return Ok(());
    }

    if !confirm_deletion(&f!("Delete the {} codes listed in the file?", ids.len()), options.yes)? {
        println!("{}", "Aborted.".yellow());
        return Ok(());
    }

    let config = ApiConfig {
        api_key: options.api_key.clone(),
    };
    let mut api = HttpQrApi::new(RateLimitedClient::new(&config, global.rate_budget)?);

    let (deleted, failed) = delete_batch(&mut api, &ids).await;

    if !deleted.is_empty() {
        let report = report_path(&options.report_dir, chrono::Local::now());
        write_report(&report, &encode_id_report(&deleted))?;
        println!("Audit report: {}", report.display().to_string().cyan());
    }

    display_outcome(deleted.len(), &failed);
    Ok(())
}

fn confirm_deletion(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| eyre!("Confirmation prompt failed: {e}"))
}

/// Delete each id in order; a failed item is recorded and never stops the
/// rest of the batch. Returns (deleted, failed) in input order.
async fn delete_batch<A: QrApi>(api: &mut A, ids: &[u64]) -> (Vec<u64>, Vec<u64>) {
    let mut deleted = Vec::new();
    let mut failed = Vec::new();

    for id in ids {
        match delete_with_retry(api, *id).await {
            Ok(()) => deleted.push(*id),
            Err(err) => {
                log::warn!("Failed to delete code {id}: {err}");
                failed.push(*id);
            }
        }
    }

    (deleted, failed)
}

/// One retry after a second covers the vendor's transient 5xx hiccups.
async fn delete_with_retry<A: QrApi>(api: &mut A, id: u64) -> Result<(), crate::error::Error> {
    match api.delete_code(id).await {
        Ok(()) => Ok(()),
        Err(err) => {
            log::debug!("Delete of code {id} failed once ({err}), retrying");
            tokio::time::sleep(Duration::from_secs(1)).await;
            api.delete_code(id).await
        }
    }
}

fn report_path(dir: &Path, now: chrono::DateTime<chrono::Local>) -> PathBuf {
    dir.join(f!("deleted_qr_codes_{}.csv", now.format("%Y%m%d-%H%M%S")))
}

fn write_report(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| f!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).wrap_err_with(|| f!("Failed to write {}", path.display()))
}

fn display_outcome(deleted: usize, failed: &[u64]) {
    if failed.is_empty() {
        println!(
            "\n{} {} codes\n",
            "Deleted".bold().green(),
            deleted.to_string().bold()
        );
    } else {
        println!(
            "\n{} {} deleted, {} failed\n",
            "Done with failures:".bold().yellow(),
            deleted.to_string().green(),
            failed.len().to_string().red()
        );
        let ids = failed
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("{}: {}", "Failed ids".bold().red(), ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::Value;
    use std::collections::HashMap;

    use qrops_core::codes::{encode_id_report, Folder};
    use qrops_core::design::CodeDesign;
    use qrops_core::domain::DomainId;

    /// Deletion-only fake: each id fails its first `failures` attempts,
    /// then succeeds.
    #[derive(Default)]
    struct FlakyDeleteApi {
        failures: HashMap<u64, usize>,
        attempts: HashMap<u64, usize>,
    }

    #[async_trait]
    impl QrApi for FlakyDeleteApi {
        async fn find_folder(&mut self, _name: &str) -> Result<Option<Folder>, crate::error::Error> {
            Ok(None)
        }

        async fn list_codes(
            &mut self,
            _folder_id: Option<u64>,
        ) -> Result<Vec<QrCode>, crate::error::Error> {
            Ok(Vec::new())
        }

        async fn create_code(
            &mut self,
            _title: &str,
            _target_url: &str,
            _type_id: u32,
        ) -> Result<QrCode, crate::error::Error> {
            Err(crate::error::Error::Generic("not under test".to_string()))
        }

        async fn delete_code(&mut self, id: u64) -> Result<(), crate::error::Error> {
            let attempt = self.attempts.entry(id).or_insert(0);
            *attempt += 1;
            if *attempt <= self.failures.get(&id).copied().unwrap_or(0) {
                return Err(crate::error::Error::Api {
                    status: 500,
                    body: "internal server error".to_string(),
                });
            }
            Ok(())
        }

        async fn update_short_url(
            &mut self,
            _id: u64,
            _short_code: &str,
            _domain_id: DomainId,
        ) -> Result<(), crate::error::Error> {
            Err(crate::error::Error::Generic("not under test".to_string()))
        }

        async fn get_design(&mut self, _id: u64) -> Result<CodeDesign, crate::error::Error> {
            Err(crate::error::Error::Generic("not under test".to_string()))
        }

        async fn apply_design(
            &mut self,
            _id: u64,
            _payload: &Value,
        ) -> Result<(), crate::error::Error> {
            Err(crate::error::Error::Generic("not under test".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_retries_once_after_transient_failure() {
        let mut api = FlakyDeleteApi::default();
        api.failures.insert(7, 1);

        delete_with_retry(&mut api, 7).await.unwrap();

        assert_eq!(api.attempts[&7], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_gives_up_after_second_failure() {
        let mut api = FlakyDeleteApi::default();
        api.failures.insert(7, 2);

        let err = delete_with_retry(&mut api, 7).await.unwrap_err();

        assert!(matches!(err, crate::error::Error::Api { status: 500, .. }));
        assert_eq!(api.attempts[&7], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_batch_excludes_failures_from_audit() {
        let mut api = FlakyDeleteApi::default();
        // Id 2 never recovers; id 1 recovers on the retry.
        api.failures.insert(1, 1);
        api.failures.insert(2, usize::MAX);

        let (deleted, failed) = delete_batch(&mut api, &[1, 2, 3]).await;

        assert_eq!(deleted, vec![1, 3]);
        assert_eq!(failed, vec![2]);

        // The audit rows are built from the successes only.
        let report = encode_id_report(&deleted);
        assert_eq!(report, "id\n1\n3\n");
    }

    #[test]
    fn test_report_path_format() {
        let now = chrono::Local
            .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .unwrap();
        let path = report_path(Path::new("csv-exports"), now);
        assert_eq!(
            path,
            PathBuf::from("csv-exports/deleted_qr_codes_20260314-092653.csv")
        );
    }

    #[test]
    fn test_confirm_deletion_yes_flag_skips_prompt() {
        assert!(confirm_deletion("Delete?", true).unwrap());
    }
}
