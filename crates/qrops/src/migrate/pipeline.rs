//! The migration state machine
//!
//! Stages run strictly in order, each applied batch-wide before the next
//! begins. The safety rule the whole design hangs on: a source code is
//! eligible for deletion if and only if the mapping ledger holds its entry,
//! which is only written after the replacement was created and the entry
//! flushed. Batch-level precondition failures abort before any mutating
//! call; per-item failures are contained, logged, and reported in the run
//! summary.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use qrops_core::codes::{build_extract, encode_extract, ExtractRecord, SkippedCode};
use qrops_core::design::{design_patch_payload, DesignDocument};
use qrops_core::domain::UnmatchedDomainPolicy;
use qrops_core::ledger::MappingLedger;

use crate::api::QrApi;
use crate::error::Error;
use crate::prelude::{eprintln, println};

/// Phases of a migration run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Discover,
    FetchSource,
    FetchDesigns,
    CreateTarget,
    DeleteSource,
    ApplyShortUrl,
    ApplyDesigns,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Discover => "DISCOVER",
            Stage::FetchSource => "FETCH_SOURCE",
            Stage::FetchDesigns => "FETCH_DESIGN",
            Stage::CreateTarget => "CREATE_TARGET",
            Stage::DeleteSource => "DELETE_SOURCE",
            Stage::ApplyShortUrl => "APPLY_SHORT_URL",
            Stage::ApplyDesigns => "APPLY_DESIGN",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

/// Machine-readable outcome of one pipeline run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub stage_reached: Stage,
    pub fetched: usize,
    pub already_mapped: usize,
    pub created: usize,
    pub deleted: usize,
    pub short_urls_updated: usize,
    pub designs_applied: usize,
    pub skipped: Vec<SkippedCode>,
    pub failed_ids: Vec<u64>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            stage_reached: Stage::Discover,
            fetched: 0,
            already_mapped: 0,
            created: 0,
            deleted: 0,
            short_urls_updated: 0,
            designs_applied: 0,
            skipped: Vec::new(),
            failed_ids: Vec::new(),
        }
    }
}

/// Configuration for one pipeline run.
pub struct PipelineOptions {
    /// Name of the source folder holding the batch.
    pub folder_name: String,
    /// Also fetch and re-apply design customizations.
    pub with_designs: bool,
    /// What to do with short-URL hosts outside the domain table.
    pub policy: UnmatchedDomainPolicy,
    /// Where to write the extract and design artifacts; `None` skips them.
    pub export_dir: Option<PathBuf>,
}

/// The migration pipeline, generic over the API seam so the state machine
/// can be tested without HTTP.
pub struct MigrationPipeline<'a, S: QrApi, T: QrApi> {
    source: &'a mut S,
    target: &'a mut T,
    ledger: &'a mut MappingLedger,
    options: PipelineOptions,
}

impl<'a, S: QrApi, T: QrApi> MigrationPipeline<'a, S, T> {
    pub fn new(
        source: &'a mut S,
        target: &'a mut T,
        ledger: &'a mut MappingLedger,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            target,
            ledger,
            options,
        }
    }

    /// Run the pipeline to completion.
    ///
    /// `Err` means a batch-level fatal error before any mutation; per-item
    /// failures are carried in the returned summary instead.
    pub async fn run(&mut self) -> Result<RunSummary, Error> {
        let mut summary = RunSummary::new();
        let mut failed: BTreeSet<u64> = BTreeSet::new();

        // DISCOVER
        println!("Resolving source folder {:?}...", self.options.folder_name);
        let folder = self
            .source
            .find_folder(&self.options.folder_name)
            .await?
            .ok_or_else(|| {
                Error::FatalPrecondition(format!(
                    "source folder {:?} not found",
                    self.options.folder_name
                ))
            })?;

        // FETCH_SOURCE. A fetch error is fatal and propagates; an empty
        // folder means there is nothing to migrate and the run is a no-op
        // success.
        summary.stage_reached = Stage::FetchSource;
        let codes = self.source.list_codes(Some(folder.id)).await?;
        summary.fetched = codes.len();
        if codes.is_empty() {
            println!(
                "Folder {:?} is empty; nothing to migrate.",
                self.options.folder_name
            );
            summary.stage_reached = Stage::Done;
            return Ok(summary);
        }
        println!("Fetched {} code(s).", codes.len());

        let outcome = build_extract(&codes, self.options.policy);
        for skip in &outcome.skipped {
            eprintln!("Skipping code {}: {}", skip.id, skip.reason);
        }
        summary.skipped = outcome.skipped;
        let records = outcome.records;
        self.write_extract(&records);

        // FETCH_DESIGN (optional). A failed fetch only removes that id from
        // design re-application; the code still migrates.
        let designs = if self.options.with_designs {
            summary.stage_reached = Stage::FetchDesigns;
            self.fetch_designs(&records).await
        } else {
            DesignDocument::new()
        };

        // CREATE_TARGET. Each successful create is recorded in the ledger
        // before the next call; a ledger write failure stops the run, since
        // without the entry the source record could never be safely deleted.
        summary.stage_reached = Stage::CreateTarget;
        for record in &records {
            if self.ledger.has(record.id) {
                summary.already_mapped += 1;
                continue;
            }

            match self
                .target
                .create_code(&record.title, &record.target_url, record.type_id.unwrap_or(1))
                .await
            {
                Ok(created) => {
                    self.ledger.put(record.id, created.id)?;
                    summary.created += 1;
                    println!("Created target code {} for source {}", created.id, record.id);
                }
                Err(err) => {
                    eprintln!("Failed to create target for source {}: {}", record.id, err);
                    failed.insert(record.id);
                }
            }
        }

        // DELETE_SOURCE. Eligibility is ledger membership, nothing else.
        summary.stage_reached = Stage::DeleteSource;
        for record in &records {
            if !self.ledger.has(record.id) {
                continue;
            }

            match self.source.delete_code(record.id).await {
                Ok(()) => {
                    summary.deleted += 1;
                    println!("Deleted source code {}", record.id);
                }
                Err(err) => {
                    eprintln!("Failed to delete source code {}: {}", record.id, err);
                    failed.insert(record.id);
                }
            }
        }

        // APPLY_SHORT_URL. A failure leaves the target on its auto-assigned
        // short URL.
        summary.stage_reached = Stage::ApplyShortUrl;
        for record in &records {
            let Some(target_id) = self.ledger.target_of(record.id) else {
                continue;
            };

            if record.short_code.is_empty() {
                log::warn!("source {} has no short code to carry over", record.id);
                continue;
            }

            match self
                .target
                .update_short_url(target_id, &record.short_code, record.domain_id)
                .await
            {
                Ok(()) => {
                    summary.short_urls_updated += 1;
                    println!(
                        "Updated short URL for target {} ({})",
                        target_id, record.short_url
                    );
                }
                Err(err) => {
                    eprintln!("Failed to update short URL for target {}: {}", target_id, err);
                    failed.insert(record.id);
                }
            }
        }

        // APPLY_DESIGN (optional). Codes without a fetched design, or whose
        // design has no customizations, are skipped.
        if self.options.with_designs {
            summary.stage_reached = Stage::ApplyDesigns;
            for record in &records {
                let Some(target_id) = self.ledger.target_of(record.id) else {
                    continue;
                };
                let Some(design) = designs.get(&record.id) else {
                    continue;
                };
                let Some(payload) = design_patch_payload(design) else {
                    continue;
                };

                match self.target.apply_design(target_id, &payload).await {
                    Ok(()) => {
                        summary.designs_applied += 1;
                        println!("Applied design to target {}", target_id);
                    }
                    Err(err) => {
                        eprintln!("Failed to apply design to target {}: {}", target_id, err);
                        failed.insert(record.id);
                    }
                }
            }
        }

        summary.stage_reached = Stage::Done;
        summary.failed_ids = failed.into_iter().collect();
        Ok(summary)
    }

    async fn fetch_designs(&mut self, records: &[ExtractRecord]) -> DesignDocument {
        let mut designs = DesignDocument::new();

        for record in records {
            match self.source.get_design(record.id).await {
                Ok(design) => {
                    designs.insert(record.id, design);
                }
                Err(err) => {
                    eprintln!(
                        "Could not fetch design for {}; it will migrate without one ({})",
                        record.id, err
                    );
                }
            }
        }

        self.write_designs(&designs);
        designs
    }

    fn write_extract(&self, records: &[ExtractRecord]) {
        let Some(dir) = &self.options.export_dir else {
            return;
        };

        let path = dir.join("qr_codes.csv");
        let result = fs::create_dir_all(dir).and_then(|()| fs::write(&path, encode_extract(records)));
        match result {
            Ok(()) => println!("Extract saved to {}", path.display()),
            Err(err) => eprintln!("Warning: could not write extract {}: {}", path.display(), err),
        }
    }

    fn write_designs(&self, designs: &DesignDocument) {
        let Some(dir) = &self.options.export_dir else {
            return;
        };

        let path = dir.join("qr_code_designs.json");
        let text = match serde_json::to_string_pretty(designs) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("Warning: could not encode design document: {err}");
                return;
            }
        };
        let result = fs::create_dir_all(dir).and_then(|()| fs::write(&path, text));
        match result {
            Ok(()) => println!("Designs saved to {}", path.display()),
            Err(err) => eprintln!("Warning: could not write designs {}: {}", path.display(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;

    use qrops_core::codes::{Folder, QrCode};
    use qrops_core::design::CodeDesign;
    use qrops_core::domain::DomainId;

    /// In-memory [`QrApi`] used as either side of a migration.
    #[derive(Default)]
    struct FakeApi {
        folders: Vec<Folder>,
        codes: Vec<QrCode>,
        designs: HashMap<u64, CodeDesign>,
        fail_list: bool,
        fail_create_titles: HashSet<String>,
        fail_design_ids: HashSet<u64>,
        next_id: u64,
        create_calls: usize,
        created: Vec<QrCode>,
        deleted: Vec<u64>,
        short_urls: Vec<(u64, String, DomainId)>,
        designs_applied: Vec<u64>,
    }

    #[async_trait]
    impl QrApi for FakeApi {
        async fn find_folder(&mut self, name: &str) -> Result<Option<Folder>, Error> {
            Ok(self.folders.iter().find(|f| f.name == name).cloned())
        }

        async fn list_codes(&mut self, _folder_id: Option<u64>) -> Result<Vec<QrCode>, Error> {
            if self.fail_list {
                return Err(Error::Transport("connection reset".to_string()));
            }
            Ok(self.codes.clone())
        }

        async fn create_code(
            &mut self,
            title: &str,
            target_url: &str,
            type_id: u32,
        ) -> Result<QrCode, Error> {
            self.create_calls += 1;
            if self.fail_create_titles.contains(title) {
                return Err(Error::Api {
                    status: 500,
                    body: "internal server error".to_string(),
                });
            }

            self.next_id += 1;
            let code = QrCode {
                id: self.next_id,
                type_id: Some(type_id),
                type_name: Some("Dynamic Website".to_string()),
                title: Some(title.to_string()),
                short_code: Some(format!("auto{}", self.next_id)),
                short_url: Some(format!("https://qrco.de/auto{}", self.next_id)),
                target_url: Some(target_url.to_string()),
                status: Some("active".to_string()),
            };
            self.created.push(code.clone());
            Ok(code)
        }

        async fn delete_code(&mut self, id: u64) -> Result<(), Error> {
            self.deleted.push(id);
            Ok(())
        }

        async fn update_short_url(
            &mut self,
            id: u64,
            short_code: &str,
            domain_id: DomainId,
        ) -> Result<(), Error> {
            self.short_urls.push((id, short_code.to_string(), domain_id));
            Ok(())
        }

        async fn get_design(&mut self, id: u64) -> Result<CodeDesign, Error> {
            if self.fail_design_ids.contains(&id) {
                return Err(Error::Api {
                    status: 500,
                    body: "internal server error".to_string(),
                });
            }
            self.designs.get(&id).cloned().ok_or(Error::Api {
                status: 404,
                body: "not found".to_string(),
            })
        }

        async fn apply_design(&mut self, id: u64, _payload: &Value) -> Result<(), Error> {
            self.designs_applied.push(id);
            Ok(())
        }
    }

    fn source_codes(count: u64) -> Vec<QrCode> {
        (1..=count)
            .map(|id| QrCode {
                id,
                type_id: Some(1),
                type_name: Some("Dynamic Website".to_string()),
                title: Some(format!("QR {id}")),
                short_code: Some(format!("c{id}")),
                short_url: Some(format!("https://qrco.de/c{id}")),
                target_url: Some(format!("https://example.com/{id}")),
                status: Some("active".to_string()),
            })
            .collect()
    }

    fn fake_source(count: u64) -> FakeApi {
        FakeApi {
            folders: vec![Folder {
                id: 77,
                name: "REBUILDS".to_string(),
            }],
            codes: source_codes(count),
            ..Default::default()
        }
    }

    fn fake_target() -> FakeApi {
        FakeApi {
            next_id: 1000,
            ..Default::default()
        }
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            folder_name: "REBUILDS".to_string(),
            with_designs: false,
            policy: UnmatchedDomainPolicy::DefaultTo(4),
            export_dir: None,
        }
    }

    #[tokio::test]
    async fn test_missing_folder_is_fatal() {
        let mut source = FakeApi::default();
        let mut target = fake_target();
        let dir = TempDir::new().unwrap();
        let mut ledger = MappingLedger::load(&dir.path().join("mapping.csv")).unwrap();

        let mut pipeline =
            MigrationPipeline::new(&mut source, &mut target, &mut ledger, options());
        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::FatalPrecondition(_)));
        assert_eq!(target.create_calls, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal_before_any_mutation() {
        let mut source = fake_source(10);
        source.fail_list = true;
        let mut target = fake_target();
        let dir = TempDir::new().unwrap();
        let mut ledger = MappingLedger::load(&dir.path().join("mapping.csv")).unwrap();

        let mut pipeline =
            MigrationPipeline::new(&mut source, &mut target, &mut ledger, options());
        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(target.create_calls, 0);
        assert!(source.deleted.is_empty());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_empty_folder_is_noop_success() {
        let mut source = fake_source(0);
        let mut target = fake_target();
        let dir = TempDir::new().unwrap();
        let mut ledger = MappingLedger::load(&dir.path().join("mapping.csv")).unwrap();

        let mut pipeline =
            MigrationPipeline::new(&mut source, &mut target, &mut ledger, options());
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.stage_reached, Stage::Done);
        assert_eq!(summary.fetched, 0);
        assert_eq!(target.create_calls, 0);
        assert!(source.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_full_migration_happy_path() {
        let mut source = fake_source(150);
        let mut target = fake_target();
        let dir = TempDir::new().unwrap();
        let mut ledger = MappingLedger::load(&dir.path().join("mapping.csv")).unwrap();

        let mut pipeline =
            MigrationPipeline::new(&mut source, &mut target, &mut ledger, options());
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.stage_reached, Stage::Done);
        assert_eq!(summary.created, 150);
        assert_eq!(summary.deleted, 150);
        assert_eq!(summary.short_urls_updated, 150);
        assert!(summary.failed_ids.is_empty());

        assert_eq!(ledger.len(), 150);
        assert_eq!(ledger.target_of(1), Some(1001));
        // The vanity short URL is re-asserted on the mapped target.
        assert_eq!(target.short_urls[0], (1001, "c1".to_string(), 4));
    }

    #[tokio::test]
    async fn test_create_failure_excludes_item_and_spares_source() {
        let mut source = fake_source(150);
        let mut target = fake_target();
        target
            .fail_create_titles
            .insert("QR 37".to_string());
        let dir = TempDir::new().unwrap();
        let mut ledger = MappingLedger::load(&dir.path().join("mapping.csv")).unwrap();

        let mut pipeline =
            MigrationPipeline::new(&mut source, &mut target, &mut ledger, options());
        let summary = pipeline.run().await.unwrap();

        // One create failed, so one source record survives untouched.
        assert_eq!(summary.created, 149);
        assert_eq!(summary.failed_ids, vec![37]);
        assert_eq!(ledger.len(), 149);
        assert!(!ledger.has(37));
        assert_eq!(source.deleted.len(), 149);
        assert!(!source.deleted.contains(&37));
        assert_eq!(target.short_urls.len(), 149);

        // Deletion never outruns the ledger.
        assert!(source.deleted.iter().all(|id| ledger.has(*id)));
    }

    #[tokio::test]
    async fn test_resume_processes_only_unmapped_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.csv");

        {
            let mut ledger = MappingLedger::load(&path).unwrap();
            for id in 1..=50u64 {
                ledger.put(id, 5000 + id).unwrap();
            }
        }

        let mut source = fake_source(150);
        let mut target = fake_target();
        let mut ledger = MappingLedger::load(&path).unwrap();

        let mut pipeline =
            MigrationPipeline::new(&mut source, &mut target, &mut ledger, options());
        let summary = pipeline.run().await.unwrap();

        // Only the 100 unmapped ids were created; everything mapped was
        // deleted and short-URL-updated, including the resumed half.
        assert_eq!(target.create_calls, 100);
        assert_eq!(summary.created, 100);
        assert_eq!(summary.already_mapped, 50);
        assert_eq!(source.deleted.len(), 150);
        assert_eq!(summary.short_urls_updated, 150);
        assert!(target
            .short_urls
            .iter()
            .any(|(id, code, _)| *id == 5001 && code == "c1"));
    }

    #[tokio::test]
    async fn test_designs_applied_only_where_fetched() {
        let mut source = fake_source(3);
        source.designs.insert(
            1,
            CodeDesign {
                customizations: Some(json!({"logo": {"name": "account-1/logo.png"}})),
                title: Some("QR 1".to_string()),
                url: Some("https://example.com/1".to_string()),
                status: Some("active".to_string()),
            },
        );
        // Code 2 has a design with no customizations; code 3's fetch fails.
        source.designs.insert(2, CodeDesign::default());
        source.fail_design_ids.insert(3);

        let mut target = fake_target();
        let dir = TempDir::new().unwrap();
        let mut ledger = MappingLedger::load(&dir.path().join("mapping.csv")).unwrap();

        let mut pipeline_options = options();
        pipeline_options.with_designs = true;
        let mut pipeline =
            MigrationPipeline::new(&mut source, &mut target, &mut ledger, pipeline_options);
        let summary = pipeline.run().await.unwrap();

        // All three codes migrate regardless of design trouble.
        assert_eq!(summary.created, 3);
        assert_eq!(summary.deleted, 3);
        assert_eq!(summary.designs_applied, 1);

        let target_of_1 = ledger.target_of(1).unwrap();
        assert_eq!(target.designs_applied, vec![target_of_1]);
    }
}
