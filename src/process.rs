// src/process.rs

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::ai_extract::{self, AiFieldExtractor};
use crate::config::{AiBackend, Config};
use crate::fields::ExtractedFields;
use crate::pattern_extract::PatternExtractor;
use crate::pdf_text;
use crate::pipeline::{ExtractionPipeline, FieldExtraction};
use crate::receipt_db::{ReceiptFileRow, ReceiptStore};

pub fn open_store(cfg: &Config) -> Result<ReceiptStore, Box<dyn std::error::Error>> {
    let db_path = Path::new(&cfg.storage.db_path);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(ReceiptStore::new(db_path)?)
}

/// AI-first pipeline with the deterministic fallback, per the configured
/// endpoint. `None` means the patterns backend was selected and the AI path
/// is bypassed entirely.
fn build_pipeline(cfg: &Config) -> Result<Option<ExtractionPipeline>, Box<dyn std::error::Error>> {
    if cfg.ai.backend == AiBackend::Patterns {
        info!("Backend set to patterns, skipping the AI path");
        return Ok(None);
    }
    let endpoint = ai_extract::resolve_endpoint(&cfg.ai)?;
    let ai = AiFieldExtractor::new(endpoint, Duration::from_secs(cfg.ai.timeout_secs));
    Ok(Some(ExtractionPipeline::new(
        Box::new(ai),
        Box::new(PatternExtractor::new()),
    )))
}

async fn run_extraction(pipeline: Option<&ExtractionPipeline>, text: &str) -> ExtractedFields {
    match pipeline {
        Some(pipeline) => pipeline.run(text).await,
        None => PatternExtractor::new().extract(text).await.into_fields(),
    }
}

/// Copy a receipt PDF into the media dir and register it for processing.
pub fn ingest_file(
    store: &ReceiptStore,
    cfg: &Config,
    source: &Path,
) -> Result<i64, Box<dyn std::error::Error>> {
    let bytes = fs::read(source)?;
    if !bytes.starts_with(b"%PDF") {
        return Err(format!("{} is not a PDF file", source.display()).into());
    }

    let uid = ReceiptStore::generate_uid(&bytes);
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or("source path has no file name")?;

    fs::create_dir_all(&cfg.storage.media_dir)?;
    let dest = Path::new(&cfg.storage.media_dir).join(format!("{uid}_{file_name}"));
    fs::copy(source, &dest)?;

    let id = store.insert_file(&uid, &file_name, &dest.to_string_lossy())?;
    info!(id, file = %file_name, "Receipt file ingested");
    Ok(id)
}

/// Re-check a registered file on disk and persist the verdict.
pub fn validate_file(store: &ReceiptStore, id: i64) -> Result<bool, Box<dyn std::error::Error>> {
    let row = store
        .get_file(id)?
        .ok_or_else(|| format!("no receipt file with id {id}"))?;

    let path = Path::new(&row.file_path);
    if !path.exists() {
        warn!(id, path = %row.file_path, "Receipt file missing from disk");
        store.set_validity(id, false, Some("file not found on disk"))?;
        return Ok(false);
    }

    let bytes = fs::read(path)?;
    if !bytes.starts_with(b"%PDF") {
        store.set_validity(id, false, Some("not a PDF file"))?;
        return Ok(false);
    }

    store.set_validity(id, true, None)?;
    info!(id, "Receipt file validated");
    Ok(true)
}

/// Extract one registered file and persist the resulting receipt.
pub async fn process_file(
    store: &ReceiptStore,
    cfg: &Config,
    id: i64,
) -> Result<i64, Box<dyn std::error::Error>> {
    let row = store
        .get_file(id)?
        .ok_or_else(|| format!("no receipt file with id {id}"))?;
    let pipeline = build_pipeline(cfg)?;
    process_row(store, pipeline.as_ref(), &row).await
}

/// Extract every pending file. Per-file failures are logged and skipped so
/// one bad document never stalls the batch.
pub async fn process_pending(
    store: &ReceiptStore,
    cfg: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let pending = store.get_unprocessed()?;
    info!(count = pending.len(), "Receipt files awaiting processing");

    let pipeline = build_pipeline(cfg)?;
    for row in &pending {
        let span = tracing::info_span!("receipt", id = row.id, file = %row.file_name);
        let _guard = span.enter();

        if let Err(e) = process_row(store, pipeline.as_ref(), row).await {
            tracing::error!(error = %e, "Failed to process receipt file");
        }
    }

    Ok(())
}

async fn process_row(
    store: &ReceiptStore,
    pipeline: Option<&ExtractionPipeline>,
    row: &ReceiptFileRow,
) -> Result<i64, Box<dyn std::error::Error>> {
    if row.is_processed {
        return Err(format!("receipt file {} has already been processed", row.id).into());
    }
    if !row.is_valid {
        let reason = row.invalid_reason.as_deref().unwrap_or("unknown reason");
        return Err(format!("receipt file {} is invalid: {reason}", row.id).into());
    }

    let bytes = match fs::read(&row.file_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            store.set_validity(row.id, false, Some("file not found on disk"))?;
            return Err(e.into());
        }
    };

    let text = pdf_text::extract_document_text(&bytes)?;
    let fields = run_extraction(pipeline, &text).await;

    let receipt_id = store.insert_receipt(row.id, &fields)?;
    store.mark_processed(row.id)?;
    info!(
        receipt_id,
        merchant = %fields.merchant_name,
        total = %fields.total_amount,
        currency = %fields.currency,
        "Receipt processed"
    );
    Ok(receipt_id)
}

/// One-shot extraction of a PDF on disk, printed as JSON, nothing stored.
pub async fn extract_once(cfg: &Config, source: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(source)?;
    let text = pdf_text::extract_document_text(&bytes)?;

    let pipeline = build_pipeline(cfg)?;
    let fields = run_extraction(pipeline.as_ref(), &text).await;

    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}

pub fn list_receipts(store: &ReceiptStore) -> Result<(), Box<dyn std::error::Error>> {
    let receipts = store.list_receipts()?;
    for receipt in &receipts {
        println!(
            "{:>4}  {}  {:>10} {}  {}  ({})",
            receipt.id,
            receipt.fields.purchased_at.format("%Y-%m-%d"),
            receipt.fields.total_amount,
            receipt.fields.currency,
            receipt.fields.merchant_name,
            receipt.file_name,
        );
    }
    info!(count = receipts.len(), "Processed receipts");
    Ok(())
}

pub fn show_receipt(store: &ReceiptStore, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let receipt = store
        .get_receipt(id)?
        .ok_or_else(|| format!("no receipt with id {id}"))?;

    println!("{}", serde_json::to_string_pretty(&receipt.fields)?);
    println!(
        "file: {} (receipt_file_id {}, stored {})",
        receipt.file_name, receipt.receipt_file_id, receipt.created_at
    );
    Ok(())
}
