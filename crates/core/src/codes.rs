//! Vendor API response models and extract/report transformations
//!
//! Responses from the QR-code API are decoded once at the boundary into the
//! structs here; every field the vendor may omit is an `Option`, so absence
//! is a typed condition rather than a silently-defaulted string. The module
//! also builds the at-rest artifacts the batch tools write: the migration
//! extract, deletion reports, and id lists read back from caller-supplied
//! CSV files.

use serde::{Deserialize, Serialize};

use crate::csv;
use crate::domain::{DomainId, UnmatchedDomainPolicy};

/// One QR code as returned by the vendor's list/create endpoints.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QrCode {
    pub id: u64,
    #[serde(default)]
    pub type_id: Option<u32>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub short_code: Option<String>,
    #[serde(default)]
    pub short_url: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Account response carrying the folder list (`expand=folders`).
#[derive(Debug, Deserialize, Clone)]
pub struct Account {
    #[serde(default)]
    pub folders: Vec<Folder>,
}

/// A named grouping of codes within an account.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Folder {
    pub id: u64,
    pub name: String,
}

impl Account {
    /// Find a folder by exact name.
    pub fn find_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }
}

/// An access token as returned by the `access-tokens` endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AccessToken {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub rate_limit: Option<u64>,
    #[serde(default)]
    pub rate_limit_month: Option<u64>,
    #[serde(default)]
    pub rate_number_month: Option<u64>,
}

/// One row of the migration extract: a source code with its domain id
/// resolved, ready to be recreated on the target account.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ExtractRecord {
    pub id: u64,
    pub type_id: Option<u32>,
    pub type_name: String,
    pub title: String,
    pub domain_id: DomainId,
    pub short_code: String,
    pub short_url: String,
    pub target_url: String,
}

/// A source code excluded from the extract, with the reason.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SkippedCode {
    pub id: u64,
    pub reason: String,
}

/// Result of [`build_extract`]: usable records plus per-record exclusions.
#[derive(Debug)]
pub struct ExtractOutcome {
    pub records: Vec<ExtractRecord>,
    pub skipped: Vec<SkippedCode>,
}

/// Build the migration extract from fetched source codes.
///
/// Records stay in API order. A code missing the fields the pipeline cannot
/// work without (`target_url`, `short_url`), or whose short-URL host fails
/// the given [`UnmatchedDomainPolicy`], is excluded with a reason; exclusion
/// of one record never affects the rest of the batch.
pub fn build_extract(codes: &[QrCode], policy: UnmatchedDomainPolicy) -> ExtractOutcome {
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for code in codes {
        let Some(target_url) = code.target_url.clone() else {
            skipped.push(SkippedCode {
                id: code.id,
                reason: "missing target_url".to_string(),
            });
            continue;
        };

        let Some(short_url) = code.short_url.clone() else {
            skipped.push(SkippedCode {
                id: code.id,
                reason: "missing short_url".to_string(),
            });
            continue;
        };

        let domain_id = match policy.resolve(&short_url) {
            Ok(id) => id,
            Err(err) => {
                skipped.push(SkippedCode {
                    id: code.id,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        records.push(ExtractRecord {
            id: code.id,
            type_id: code.type_id,
            type_name: code.type_name.clone().unwrap_or_default(),
            title: code.title.clone().unwrap_or_default(),
            domain_id,
            short_code: code.short_code.clone().unwrap_or_default(),
            short_url,
            target_url,
        });
    }

    ExtractOutcome { records, skipped }
}

/// Header of the extract CSV artifact.
pub const EXTRACT_HEADER: [&str; 8] = [
    "id",
    "type_id",
    "type_name",
    "title",
    "domain_id",
    "short_code",
    "short_url",
    "target_url",
];

/// Encode the extract records as a CSV document.
pub fn encode_extract(records: &[ExtractRecord]) -> String {
    let mut out = csv::encode_row(&EXTRACT_HEADER);

    for record in records {
        let id = record.id.to_string();
        let type_id = record
            .type_id
            .map(|t| t.to_string())
            .unwrap_or_default();
        let domain_id = record.domain_id.to_string();
        out.push_str(&csv::encode_row(&[
            &id,
            &type_id,
            &record.type_name,
            &record.title,
            &domain_id,
            &record.short_code,
            &record.short_url,
            &record.target_url,
        ]));
    }

    out
}

/// Encode the deletion audit report: exactly the codes that were deleted.
pub fn encode_deletion_report(codes: &[QrCode]) -> String {
    let mut out = csv::encode_row(&[
        "id",
        "type_id",
        "type_name",
        "title",
        "short_code",
        "short_url",
        "target_url",
    ]);

    for code in codes {
        let id = code.id.to_string();
        let type_id = code.type_id.map(|t| t.to_string()).unwrap_or_default();
        out.push_str(&csv::encode_row(&[
            &id,
            &type_id,
            code.type_name.as_deref().unwrap_or(""),
            code.title.as_deref().unwrap_or(""),
            code.short_code.as_deref().unwrap_or(""),
            code.short_url.as_deref().unwrap_or(""),
            code.target_url.as_deref().unwrap_or(""),
        ]));
    }

    out
}

/// Encode an id-only audit report (used by CSV-driven deletion).
pub fn encode_id_report(ids: &[u64]) -> String {
    let mut out = csv::encode_row(&["id"]);
    for id in ids {
        out.push_str(&csv::encode_row(&[&id.to_string()]));
    }
    out
}

/// Error reading an id list from a caller-supplied CSV file.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IdCsvError {
    #[error("CSV appears empty or missing headers")]
    Empty,
    #[error("CSV missing required column 'id'. Found columns: {0:?}")]
    MissingIdColumn(Vec<String>),
    #[error("row {row}: invalid id {value:?}")]
    InvalidId { row: usize, value: String },
}

/// Parse unique code ids out of a CSV document with an `id` column.
///
/// The header match is case-insensitive and a BOM is tolerated (handled by
/// the CSV parser). Blank values are skipped and duplicates are dropped while
/// preserving first-seen order. A non-numeric value is a per-file error: the
/// caller is about to delete by id, so a malformed id list must not be
/// half-processed.
pub fn parse_id_csv(text: &str) -> Result<Vec<u64>, IdCsvError> {
    let rows = csv::parse_document(text);
    let Some((header, body)) = rows.split_first() else {
        return Err(IdCsvError::Empty);
    };

    let id_col = header
        .iter()
        .position(|name| name.trim().eq_ignore_ascii_case("id"))
        .ok_or_else(|| IdCsvError::MissingIdColumn(header.clone()))?;

    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();

    for (i, row) in body.iter().enumerate() {
        let raw = row.get(id_col).map(|s| s.trim()).unwrap_or("");
        if raw.is_empty() {
            continue;
        }

        let id: u64 = raw.parse().map_err(|_| IdCsvError::InvalidId {
            row: i + 2,
            value: raw.to_string(),
        })?;

        if seen.insert(id) {
            ids.push(id);
        }
    }

    Ok(ids)
}
