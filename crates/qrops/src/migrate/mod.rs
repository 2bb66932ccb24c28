pub mod pipeline;

use std::path::PathBuf;

use colored::Colorize;

use qrops_core::domain::UnmatchedDomainPolicy;
use qrops_core::ledger::{LedgerLock, MappingLedger};

use crate::api::HttpQrApi;
use crate::client::{ApiConfig, RateLimitedClient};
use crate::prelude::{println, *};
use pipeline::{MigrationPipeline, PipelineOptions, RunSummary};

/// Options for migrating a folder of codes between accounts
#[derive(Debug, clap::Args)]
#[command(after_help = "EXAMPLES:
  # Migrate the REBUILDS folder, preserving designs:
  qrops migrate --with-designs

  # Migrate a differently named folder into a fresh ledger:
  qrops migrate --folder \"SUMMER MENUS\" --ledger ledgers/summer.csv

  # Re-run after a crash; already-mapped codes are not recreated:
  qrops migrate

NOTES:
  - Keys are read from QRCG_SOURCE_API_KEY and QRCG_TARGET_API_KEY.
  - A source code is deleted only after its replacement's id has been
    written to the ledger, so an interrupted run never loses records.
  - The ledger file is locked for the duration of a run; one batch must
    never be migrated from two processes at once.
  - Item-level failures do not stop the batch; the run exits zero and
    prints the failed ids.")]
pub struct MigrateOptions {
    /// API key for the source account (codes are moved out of it)
    #[clap(long, env = "QRCG_SOURCE_API_KEY", hide_env_values = true)]
    pub source_key: String,

    /// API key for the target account (codes are recreated in it)
    #[clap(long, env = "QRCG_TARGET_API_KEY", hide_env_values = true)]
    pub target_key: String,

    /// Name of the source folder holding the codes to migrate
    #[arg(long, default_value = "REBUILDS")]
    pub folder: String,

    /// Mapping ledger file; re-running with the same ledger resumes the batch
    #[arg(long, default_value = "csv-exports/qr_code_mapping.csv")]
    pub ledger: PathBuf,

    /// Also migrate design customizations via the secondary endpoint
    #[arg(long)]
    pub with_designs: bool,

    /// Fail codes whose short-URL host is not in the domain table, instead
    /// of defaulting them to qrco.de
    #[arg(long)]
    pub strict_domains: bool,

    /// Directory for the extract and design artifacts
    #[arg(long, default_value = "csv-exports")]
    pub export_dir: PathBuf,

    /// Output the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Handle the migrate command
pub async fn handler(options: MigrateOptions, global: crate::Global) -> Result<()> {
    if global.verbose {
        println!("Running migration...");
    }

    // Single-writer guard: held for the whole run, released on drop.
    let _lock = LedgerLock::acquire(&options.ledger)?;
    let mut ledger = MappingLedger::load(&options.ledger)?;

    let source_config = ApiConfig {
        api_key: options.source_key.clone(),
    };
    let target_config = ApiConfig {
        api_key: options.target_key.clone(),
    };
    let mut source = HttpQrApi::new(RateLimitedClient::new(&source_config, global.rate_budget)?);
    let mut target = HttpQrApi::new(RateLimitedClient::new(&target_config, global.rate_budget)?);

    let policy = if options.strict_domains {
        UnmatchedDomainPolicy::Reject
    } else {
        UnmatchedDomainPolicy::DefaultTo(4)
    };

    let pipeline_options = PipelineOptions {
        folder_name: options.folder.clone(),
        with_designs: options.with_designs,
        policy,
        export_dir: Some(options.export_dir.clone()),
    };

    let mut pipeline =
        MigrationPipeline::new(&mut source, &mut target, &mut ledger, pipeline_options);
    let summary = pipeline.run().await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        display_summary(&summary);
    }

    Ok(())
}

/// Render the run summary as a CLI table.
fn display_summary(summary: &RunSummary) {
    if summary.failed_ids.is_empty() {
        println!("\n{}\n", "Migration complete".bold().green());
    } else {
        println!(
            "\n{}\n",
            "Migration complete (with item failures)".bold().yellow()
        );
    }

    let mut table = new_table();
    table.add_row(prettytable::row![
        "Fetched".bold().cyan(),
        summary.fetched.to_string()
    ]);
    table.add_row(prettytable::row![
        "Already mapped".bold().cyan(),
        summary.already_mapped.to_string()
    ]);
    table.add_row(prettytable::row![
        "Created".bold().cyan(),
        summary.created.to_string().green()
    ]);
    table.add_row(prettytable::row![
        "Deleted".bold().cyan(),
        summary.deleted.to_string()
    ]);
    table.add_row(prettytable::row![
        "Short URLs updated".bold().cyan(),
        summary.short_urls_updated.to_string()
    ]);
    table.add_row(prettytable::row![
        "Designs applied".bold().cyan(),
        summary.designs_applied.to_string()
    ]);
    table.add_row(prettytable::row![
        "Skipped".bold().cyan(),
        summary.skipped.len().to_string()
    ]);
    table.add_row(prettytable::row![
        "Failed".bold().cyan(),
        summary.failed_ids.len().to_string().red()
    ]);
    table.printstd();

    if !summary.skipped.is_empty() {
        println!("\n{}:", "Skipped".bold().yellow());
        for skip in &summary.skipped {
            println!("  {} {}", skip.id.to_string().bright_black(), skip.reason);
        }
    }

    if !summary.failed_ids.is_empty() {
        let ids = summary
            .failed_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("\n{}: {}", "Failed ids".bold().red(), ids);
    }

    println!();
}
