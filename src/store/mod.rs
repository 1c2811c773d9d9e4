pub mod aggregate;
pub mod badges;
pub mod markdown;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::OutputConfig;
use crate::merge::{ChangeSummary, RankedListDocument, DOCUMENT_SCHEMA_VERSION};

pub use aggregate::{aggregate, latest_dated, AggregateReport};
pub use badges::{color_for_score, global_badge, project_badges, score_badge, write_badges, Badge};
pub use markdown::render_markdown;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The persisted list cannot be read back; nothing is overwritten.
    #[error("cannot merge with {path}: {reason}")]
    MergeConflict { path: PathBuf, reason: String },
    #[error("invalid output path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `bytes` to a sibling temp file, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let Some(name) = path.file_name() else {
        return Err(StoreError::InvalidPath {
            path: path.to_path_buf(),
            reason: "no file name".to_string(),
        });
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let mut temp_name = name.to_os_string();
    temp_name.push(".tmp");
    let temp = path.with_file_name(temp_name);
    fs::write(&temp, bytes).map_err(|e| io_error(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| io_error(path, e))
}

/// Read a persisted ranked list. Unreadable content is a
/// [`StoreError::MergeConflict`].
pub fn read_document(path: &Path) -> Result<RankedListDocument, StoreError> {
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let document: RankedListDocument =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::MergeConflict {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if document.schema_version > DOCUMENT_SCHEMA_VERSION {
        return Err(StoreError::MergeConflict {
            path: path.to_path_buf(),
            reason: format!(
                "schema version {} is newer than supported {}",
                document.schema_version, DOCUMENT_SCHEMA_VERSION
            ),
        });
    }
    Ok(document)
}

/// Every file one cycle reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPaths {
    pub dated_json: PathBuf,
    pub dated_markdown: PathBuf,
    pub latest_json: PathBuf,
    pub latest_markdown: PathBuf,
    pub changes: PathBuf,
}

impl ListPaths {
    /// Expand `{date}` in `template`. Without an explicit `latest`, the latest
    /// pointer is the template with the date placeholder removed.
    pub fn resolve(
        template: &str,
        latest: Option<&str>,
        date: NaiveDate,
    ) -> Result<Self, StoreError> {
        let dated = PathBuf::from(template.replace("{date}", &date.format("%Y-%m-%d").to_string()));
        let latest = match latest {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(
                template
                    .replace("-{date}", "")
                    .replace("_{date}", "")
                    .replace("{date}", ""),
            ),
        };

        let stem = latest
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StoreError::InvalidPath {
                path: latest.clone(),
                reason: "latest path has no file name".to_string(),
            })?
            .to_string();

        Ok(ListPaths {
            dated_json: dated.with_extension("json"),
            dated_markdown: dated.with_extension("md"),
            latest_json: latest.with_extension("json"),
            latest_markdown: latest.with_extension("md"),
            changes: latest.with_file_name(format!("{stem}.changes.json")),
        })
    }
}

/// Filesystem home of the ranked list.
#[derive(Debug, Clone)]
pub struct ListStore {
    paths: ListPaths,
    title: String,
}

impl ListStore {
    pub fn new(paths: ListPaths, title: impl Into<String>) -> Self {
        ListStore {
            paths,
            title: title.into(),
        }
    }

    pub fn from_config(output: &OutputConfig, date: NaiveDate) -> Result<Self, StoreError> {
        let paths = ListPaths::resolve(&output.file, output.latest.as_deref(), date)?;
        Ok(Self::new(paths, output.title.clone()))
    }

    pub fn paths(&self) -> &ListPaths {
        &self.paths
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The list the next cycle merges into. A missing file is an empty list.
    /// A corrupt file is a merge conflict unless `recover` is set, in which
    /// case the cycle starts from an empty list.
    pub fn load_previous(&self, recover: bool) -> Result<RankedListDocument, StoreError> {
        let path = &self.paths.latest_json;
        if !path.exists() {
            return Ok(RankedListDocument::empty());
        }
        match read_document(path) {
            Ok(document) => Ok(document),
            Err(StoreError::MergeConflict { path, reason }) if recover => {
                warn!(path = %path.display(), %reason, "previous list unreadable, starting empty");
                Ok(RankedListDocument::empty())
            }
            Err(e) => Err(e),
        }
    }

    /// Write JSON and Markdown to the dated and latest paths.
    pub fn write_document(&self, document: &RankedListDocument) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(document)?;
        let markdown = render_markdown(document, &self.title);

        write_atomic(&self.paths.dated_json, &json)?;
        write_atomic(&self.paths.dated_markdown, markdown.as_bytes())?;
        if self.paths.latest_json != self.paths.dated_json {
            write_atomic(&self.paths.latest_json, &json)?;
        }
        if self.paths.latest_markdown != self.paths.dated_markdown {
            write_atomic(&self.paths.latest_markdown, markdown.as_bytes())?;
        }
        info!(
            dated = %self.paths.dated_json.display(),
            latest = %self.paths.latest_json.display(),
            "wrote ranked list"
        );
        Ok(())
    }

    pub fn write_summary(&self, summary: &ChangeSummary) -> Result<(), StoreError> {
        write_atomic(&self.paths.changes, &serde_json::to_vec_pretty(summary)?)?;
        info!(path = %self.paths.changes.display(), noop = summary.is_noop(), "wrote change summary");
        Ok(())
    }

    /// Write the summary, and the document unless nothing changed.
    pub fn persist(
        &self,
        document: &RankedListDocument,
        summary: &ChangeSummary,
    ) -> Result<bool, StoreError> {
        self.write_summary(summary)?;
        if summary.is_noop() && self.paths.latest_json.exists() {
            info!("no changes, documents left untouched");
            return Ok(false);
        }
        self.write_document(document)?;
        Ok(true)
    }
}
