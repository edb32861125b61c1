use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::cli::ExtractArgs;
use crate::extraction::{Extractor, extract_document_rows};
use crate::model::{ExtractionCounts, ExtractionRunManifest, OutputRow, SourceEntry};
use crate::pdf;
use crate::table;
use crate::util::{ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("extract-{}", utc_compact_string(started_ts));

    if !args.pdf_dir.is_dir() {
        bail!("PDF folder not found: {}", args.pdf_dir.display());
    }

    let api = ApiClient::from_env(&args.api_base_url)?;
    let extractor = Extractor::new(&api, &args.generation_model);

    let pdf_paths = discover_pdfs(&args.pdf_dir)?;
    if pdf_paths.is_empty() {
        bail!("no PDFs found in {}", args.pdf_dir.display());
    }

    info!(
        run_id = %run_id,
        pdf_count = pdf_paths.len(),
        extra_items = args.extra_items.len(),
        "starting extraction"
    );

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    let mut source_hashes = Vec::new();
    let mut counts = ExtractionCounts {
        pdf_count: pdf_paths.len(),
        ..Default::default()
    };

    for path in &pdf_paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;

        info!(file = %filename, "processing document");

        let paper_text = match pdf::extract_text(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(file = %filename, error = %err, "text extraction failed; skipping document");
                warnings.push(format!("{filename}: text extraction failed: {err}"));
                counts.skipped_document_count += 1;
                continue;
            }
        };

        if paper_text.is_empty() {
            warn!(file = %filename, "no text layer; skipping document");
            warnings.push(format!("{filename}: no text extracted"));
            counts.skipped_document_count += 1;
            continue;
        }

        match sha256_file(path) {
            Ok(sha256) => source_hashes.push(SourceEntry {
                filename: filename.clone(),
                sha256,
            }),
            Err(err) => warnings.push(format!("{filename}: hashing failed: {err}")),
        }

        let document = extract_document_rows(&extractor, &filename, &paper_text, &args.extra_items);

        counts.processed_document_count += 1;
        if document.stats.degraded_meta {
            counts.degraded_meta_count += 1;
        }
        if document.stats.degraded_user_fields {
            counts.degraded_user_field_count += 1;
        }
        counts.degraded_detail_count += document.stats.degraded_detail_count;
        if document.stats.count_mismatch {
            counts.count_mismatch_count += 1;
        }
        if document.stats.zero_results {
            counts.zero_result_document_count += 1;
        }

        info!(file = %filename, rows = document.rows.len(), "document complete");
        rows.extend(document.rows);
    }

    counts.row_count = rows.len();

    let header = OutputRow::header(args.extra_items.len());
    let records: Vec<Vec<String>> = rows.into_iter().map(OutputRow::into_record).collect();

    if let Some(parent) = args.output_csv.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_directory(parent)?;
    }
    table::write_csv(&args.output_csv, &header, &records)?;
    info!(path = %args.output_csv.display(), rows = records.len(), "wrote extraction table");

    let manifest = ExtractionRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        pdf_dir: args.pdf_dir.display().to_string(),
        output_csv: args.output_csv.display().to_string(),
        generation_model: args.generation_model.clone(),
        extra_item_count: args.extra_items.len(),
        counts,
        source_hashes,
        warnings,
    };

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        let stem = format!("extraction_run_{}.json", utc_compact_string(started_ts));
        match args.output_csv.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(stem),
            _ => PathBuf::from(stem),
        }
    });
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), run_id = %run_id, "wrote run manifest");

    Ok(())
}

fn discover_pdfs(pdf_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();

    let entries = fs::read_dir(pdf_dir)
        .with_context(|| format!("failed to read {}", pdf_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", pdf_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if is_pdf {
            pdfs.push(path);
        }
    }

    pdfs.sort();
    Ok(pdfs)
}
