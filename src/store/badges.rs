use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::merge::RankedListDocument;

use super::{write_atomic, StoreError};

pub const SHIELDS_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_LABEL: &str = "Curated";

/// Shields.io endpoint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub schema_version: u32,
    pub label: String,
    pub message: String,
    pub color: String,
}

pub fn color_for_score(score: f64) -> &'static str {
    if score >= 500.0 {
        "brightgreen"
    } else if score >= 200.0 {
        "green"
    } else if score >= 100.0 {
        "yellowgreen"
    } else if score >= 50.0 {
        "yellow"
    } else if score >= 10.0 {
        "orange"
    } else {
        "lightgrey"
    }
}

/// Count of listed repositories.
pub fn global_badge(listed: usize, label: &str) -> Badge {
    Badge {
        schema_version: SHIELDS_SCHEMA_VERSION,
        label: label.to_string(),
        message: format!("{listed} projects"),
        color: "blue".to_string(),
    }
}

pub fn score_badge(score: f64, label: &str) -> Badge {
    Badge {
        schema_version: SHIELDS_SCHEMA_VERSION,
        label: format!("{label} Score"),
        message: format!("{score:.2}"),
        color: color_for_score(score).to_string(),
    }
}

/// `(slug, badge)` for every listed repository, in document order.
pub fn project_badges(document: &RankedListDocument, label: &str) -> Vec<(String, Badge)> {
    document
        .entries()
        .map(|e| (e.id().slug(), score_badge(e.score(), label)))
        .collect()
}

/// Write `badge.json`, `badges/<owner>__<name>.json` and `.nojekyll` under
/// `out_dir`. Returns the number of project badges.
pub fn write_badges(
    document: &RankedListDocument,
    out_dir: &Path,
    label: &str,
) -> Result<usize, StoreError> {
    let projects = project_badges(document, label);

    write_atomic(
        &out_dir.join("badge.json"),
        &serde_json::to_vec(&global_badge(projects.len(), label))?,
    )?;
    let badge_dir = out_dir.join("badges");
    for (slug, badge) in &projects {
        write_atomic(
            &badge_dir.join(format!("{slug}.json")),
            &serde_json::to_vec(badge)?,
        )?;
    }
    write_atomic(&out_dir.join(".nojekyll"), b"")?;

    Ok(projects.len())
}
