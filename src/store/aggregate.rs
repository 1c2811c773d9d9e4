use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;
use tracing::info;

use crate::merge::RankedListDocument;

use super::markdown::render_markdown;
use super::{io_error, write_atomic, StoreError};

/// Newest `<prefix>-YYYY-MM-DD.<extension>` in `dir`. Names with impossible
/// dates are ignored.
pub fn latest_dated(
    dir: &Path,
    prefix: &str,
    extension: &str,
) -> Result<Option<PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let pattern = Regex::new(&format!(
        r"^{}-(\d{{4}}-\d{{2}}-\d{{2}})\.{}$",
        regex::escape(prefix),
        regex::escape(extension)
    ))
    .map_err(|e| StoreError::InvalidPath {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut newest: Option<(NaiveDate, PathBuf)> = None;
    for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        let name = entry.file_name();
        let Some(captures) = name.to_str().and_then(|n| pattern.captures(n)) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d") else {
            continue;
        };
        if newest.as_ref().map_or(true, |(best, _)| date > *best) {
            newest = Some((date, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Sources copied by [`aggregate`]; `None` means a stub was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateReport {
    pub json_source: Option<PathBuf>,
    pub markdown_source: Option<PathBuf>,
}

/// Copy the newest dated JSON and Markdown results over `<prefix>.json` and
/// `<prefix>.md` in `dir`. Without dated files an empty list is written.
pub fn aggregate(dir: &Path, prefix: &str, title: &str) -> Result<AggregateReport, StoreError> {
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    let empty = RankedListDocument::empty();

    let json_source = latest_dated(dir, prefix, "json")?;
    let json = match &json_source {
        Some(path) => fs::read(path).map_err(|e| io_error(path, e))?,
        None => serde_json::to_vec_pretty(&empty)?,
    };
    write_atomic(&dir.join(format!("{prefix}.json")), &json)?;

    let markdown_source = latest_dated(dir, prefix, "md")?;
    let markdown = match &markdown_source {
        Some(path) => fs::read(path).map_err(|e| io_error(path, e))?,
        None => render_markdown(&empty, title).into_bytes(),
    };
    write_atomic(&dir.join(format!("{prefix}.md")), &markdown)?;

    info!(
        dir = %dir.display(),
        json = ?json_source,
        markdown = ?markdown_source,
        "aggregated latest results"
    );
    Ok(AggregateReport {
        json_source,
        markdown_source,
    })
}
