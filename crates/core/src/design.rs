//! Design customization documents and cross-account normalization
//!
//! Visual styling lives on a secondary endpoint keyed by code id. During a
//! migration the fetched designs are kept in a JSON document keyed by source
//! id (the at-rest artifact), then re-applied to the mapped target codes.
//! Logo assets are account-scoped on the vendor side, so an account-prefixed
//! logo reference cannot survive the move and is replaced with the "no logo"
//! placeholder before patching.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Design metadata for one code, as fetched from the design endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CodeDesign {
    #[serde(default)]
    pub customizations: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// The design artifact: fetched designs keyed by source code id.
pub type DesignDocument = BTreeMap<u64, CodeDesign>;

/// Replace account-scoped logo references with the portable placeholder.
pub fn normalize_customizations(mut customizations: Value) -> Value {
    let logo_name = customizations
        .get("logo")
        .and_then(|logo| logo.get("name"))
        .and_then(|name| name.as_str());

    if logo_name.is_some_and(|name| name.starts_with("account")) {
        if let Some(map) = customizations.as_object_mut() {
            map.insert("logo".to_string(), json!({"name": "no-logo"}));
        }
    }

    customizations
}

/// Build the PATCH payload that re-applies a design to a target code.
///
/// Returns `None` when the design carries no customizations: a code without
/// styling is skipped, not an error.
pub fn design_patch_payload(design: &CodeDesign) -> Option<Value> {
    let customizations = design.customizations.clone()?;

    Some(json!({
        "status": design.status.as_deref().unwrap_or("active"),
        "url": design.url,
        "title": design.title,
        "customizations": normalize_customizations(customizations),
    }))
}
