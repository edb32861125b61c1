use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::cli::SearchArgs;
use crate::model::Reference;
use crate::openalex::OpenAlexClient;
use crate::relevance::filter_references;
use crate::table;
use crate::util::ensure_directory;

pub fn run(args: SearchArgs) -> Result<()> {
    info!(query = %args.query, min_cites = %args.min_cites, "starting literature search");

    let openalex = OpenAlexClient::new(&args.email)?;
    let references = openalex.fetch_works(&args.query, &args.min_cites, args.max_works)?;
    info!(fetched = references.len(), "fetched candidate references");

    let references = match &args.criterion {
        Some(criterion) => {
            let api = ApiClient::from_env(&args.api_base_url)?;
            let kept = filter_references(&api, &args.generation_model, references, criterion);
            info!(kept = kept.len(), "relevance screening complete");
            kept
        }
        None => references,
    };

    ensure_directory(&args.output_root)?;
    let references_csv = args.output_root.join("filtered_references.csv");
    write_references_csv(&references_csv, &references)?;
    info!(
        path = %references_csv.display(),
        count = references.len(),
        "wrote references table"
    );

    if args.skip_downloads {
        return Ok(());
    }

    let pdf_dir = args.output_root.join("pdfs");
    ensure_directory(&pdf_dir)?;

    let mut downloaded = 0_usize;
    for (position, reference) in references.iter().enumerate() {
        let Some(url) = reference
            .pdf_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        else {
            continue;
        };

        let target = pdf_dir.join(format!("study_{}.pdf", position + 1));
        match openalex.download_pdf(url, &target) {
            Ok(()) => {
                downloaded += 1;
                info!(path = %target.display(), "downloaded PDF");
            }
            Err(err) => {
                warn!(url = %url, error = %err, "PDF download failed");
            }
        }
    }

    info!(downloaded, "download pass complete");

    Ok(())
}

fn write_references_csv(path: &Path, references: &[Reference]) -> Result<()> {
    let header: Vec<String> = [
        "unique_id",
        "title",
        "doi",
        "publication_year",
        "abstract",
        "landing_page_url",
        "pdf_url",
        "is_oa",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect();

    let rows: Vec<Vec<String>> = references
        .iter()
        .enumerate()
        .map(|(position, reference)| {
            vec![
                format!("study_{}", position + 1),
                reference.title.clone(),
                reference.doi.clone().unwrap_or_default(),
                reference
                    .publication_year
                    .map(|year| year.to_string())
                    .unwrap_or_default(),
                reference.abstract_text.clone(),
                reference.landing_page_url.clone().unwrap_or_default(),
                reference.pdf_url.clone().unwrap_or_default(),
                reference.is_oa.to_string(),
            ]
        })
        .collect();

    table::write_csv(path, &header, &rows)
}
