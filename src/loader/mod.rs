// Document loader module
// Walks the data folder and turns each file into one text record


use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{PortfolioError, Result};

/// Semantic category of an ingested document.
///
/// Files with recognizable portfolio names (GitHub profile exports,
/// resumes, READMEs) get a semantic label; everything else falls back to
/// its format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Profile,
    Repository,
    Readme,
    Resume,
    Pdf,
    Json,
    Markdown,
}

impl DocumentCategory {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Repository => "repository",
            Self::Readme => "readme",
            Self::Resume => "resume",
            Self::Pdf => "pdf",
            Self::Json => "json",
            Self::Markdown => "markdown",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "profile" => Some(Self::Profile),
            "repository" => Some(Self::Repository),
            "readme" => Some(Self::Readme),
            "resume" => Some(Self::Resume),
            "pdf" => Some(Self::Pdf),
            "json" => Some(Self::Json),
            "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentCategory {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingested document. Immutable once created; a reload replaces the
/// whole set rather than mutating records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub text: String,
    pub source_label: String,
    pub category: DocumentCategory,
}

/// Load every supported file under `data_dir` into document records.
///
/// Errors on individual files (malformed PDF, unreadable file, invalid
/// JSON) are logged and the file skipped; ingestion continues. Only a
/// missing or unreadable root folder is an error.
#[inline]
pub fn load_documents(data_dir: &Path) -> Result<Vec<DocumentRecord>> {
    if !data_dir.is_dir() {
        return Err(PortfolioError::Ingest(format!(
            "Data folder not found: {}",
            data_dir.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(data_dir, &mut files)?;
    files.sort();

    let mut records = Vec::new();
    for path in files {
        match load_file(&path) {
            Ok(Some(record)) => {
                debug!(
                    "Loaded {} ({} chars, category: {})",
                    path.display(),
                    record.text.len(),
                    record.category
                );
                records.push(record);
            }
            Ok(None) => {} // unsupported extension
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
            }
        }
    }

    info!(
        "Loaded {} documents from {}",
        records.len(),
        data_dir.display()
    );
    Ok(records)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .map_err(|e| PortfolioError::Ingest(format!("Failed to read {}: {}", dir.display(), e)))?
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if path.is_dir() {
            // Subfolder failures are per-file failures from the caller's
            // point of view: log and keep going
            if let Err(e) = collect_files(&path, files) {
                warn!("Skipping folder {}: {}", path.display(), e);
            }
        } else {
            files.push(path);
        }
    }

    Ok(())
}

fn load_file(path: &Path) -> Result<Option<DocumentRecord>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let text = match extension.as_deref() {
        Some("pdf") => extract_pdf(path)?,
        Some("json") => extract_json(path)?,
        Some("md" | "txt") => fs::read_to_string(path)
            .map_err(|e| PortfolioError::Ingest(format!("Failed to read file: {e}")))?,
        _ => return Ok(None),
    };

    if text.trim().is_empty() {
        return Err(PortfolioError::Ingest(
            "File produced no extractable text".to_string(),
        ));
    }

    Ok(Some(DocumentRecord {
        id: Uuid::new_v4().to_string(),
        text,
        source_label: source_label(path),
        category: categorize(path),
    }))
}

/// Extract text from a PDF, pages concatenated in page order
fn extract_pdf(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .map_err(|e| PortfolioError::Ingest(format!("Failed to read PDF: {e}")))?;

    pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| PortfolioError::Ingest(format!("PDF extraction failed: {e}")))
}

/// Parse JSON and re-serialize it pretty-printed so nested fields remain
/// searchable as text
fn extract_json(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .map_err(|e| PortfolioError::Ingest(format!("Failed to read JSON: {e}")))?;

    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| PortfolioError::Ingest(format!("Invalid JSON: {e}")))?;

    serde_json::to_string_pretty(&value)
        .map_err(|e| PortfolioError::Ingest(format!("Failed to serialize JSON: {e}")))
}

fn categorize(path: &Path) -> DocumentCategory {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    if stem.contains("readme") {
        return DocumentCategory::Readme;
    }

    match extension.as_deref() {
        Some("pdf") => {
            if stem.contains("resume") || stem.contains("cv") {
                DocumentCategory::Resume
            } else {
                DocumentCategory::Pdf
            }
        }
        Some("json") => {
            if stem.contains("profile") {
                DocumentCategory::Profile
            } else if stem.contains("repo") {
                DocumentCategory::Repository
            } else {
                DocumentCategory::Json
            }
        }
        _ => DocumentCategory::Markdown,
    }
}

/// Human-readable label for where a snippet came from, e.g.
/// "github_profile (profile)"
fn source_label(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    format!("{} ({})", stem, categorize(path))
}
