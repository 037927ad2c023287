use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::{concat_pages, PdfExtractor};
use crate::{DocumentFingerprint, ExtractionError, TextChunk};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct IngestedDocument {
    pub fingerprint: DocumentFingerprint,
    pub chunks: Vec<TextChunk>,
}

pub fn digest_file(path: &Path) -> Result<String, ExtractionError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Keeps only the final component of an uploaded file name so an upload can
/// never escape its directory.
pub fn sanitize_file_name(file_name: &str) -> Result<String, ExtractionError> {
    Path::new(file_name.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::MissingFileName(file_name.to_string()))
}

/// Writes uploaded bytes to `<dir>/<file name>` and returns the stored path.
pub async fn persist_upload(
    dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, ExtractionError> {
    let name = sanitize_file_name(file_name)?;
    tokio::fs::create_dir_all(dir).await?;
    let target = dir.join(name);
    tokio::fs::write(&target, bytes).await?;
    info!(path = %target.display(), bytes = bytes.len(), "upload stored");
    Ok(target)
}

/// Extracts and chunks one PDF.
pub fn ingest_pdf<X>(
    extractor: &X,
    path: &Path,
    config: ChunkingConfig,
) -> Result<IngestedDocument, ExtractionError>
where
    X: PdfExtractor + ?Sized,
{
    config.validate()?;

    let pages = extractor.extract_pages(path)?;
    let text = concat_pages(&pages);
    if text.trim().is_empty() {
        return Err(ExtractionError::EmptyDocument(path.display().to_string()));
    }

    let fingerprint = build_document_fingerprint(path, pages.len(), text.chars().count())?;
    let chunks = build_chunks(&fingerprint, &text, config)?;

    info!(
        document = %fingerprint.document_title,
        pages = fingerprint.page_count,
        chars = fingerprint.char_count,
        chunks = chunks.len(),
        "document ingested"
    );

    Ok(IngestedDocument {
        fingerprint,
        chunks,
    })
}

fn build_document_fingerprint(
    path: &Path,
    page_count: usize,
    char_count: usize,
) -> Result<DocumentFingerprint, ExtractionError> {
    let checksum = digest_file(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ExtractionError::MissingFileName(path.display().to_string()))?;

    Ok(DocumentFingerprint {
        document_id: generate_document_id(path),
        document_title: name.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum,
        page_count,
        char_count,
        ingested_at: Utc::now(),
    })
}

fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}
