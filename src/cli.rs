use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::api::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
#[command(
    name = "litextract",
    version,
    about = "Literature search, extraction, and ontology mapping tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Search(SearchArgs),
    Extract(ExtractArgs),
    Map(MapArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Search term or question passed to OpenAlex.
    #[arg(long)]
    pub query: String,

    /// Email forwarded to OpenAlex for polite-pool routing.
    #[arg(long)]
    pub email: String,

    /// Free-text description of the studies to keep; enables relevance
    /// screening of fetched references.
    #[arg(long)]
    pub criterion: Option<String>,

    #[arg(long, default_value = ">4")]
    pub min_cites: String,

    #[arg(long, default_value_t = 200)]
    pub max_works: usize,

    #[arg(long, default_value = "results/search")]
    pub output_root: PathBuf,

    #[arg(long, default_value = "gpt-4o")]
    pub generation_model: String,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    #[arg(long, default_value_t = false)]
    pub skip_downloads: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Folder of source PDFs, one study per file.
    #[arg(long)]
    pub pdf_dir: PathBuf,

    #[arg(long, default_value = "extraction_results.csv")]
    pub output_csv: PathBuf,

    /// Additional item to extract once per study; repeatable. Answers land
    /// in the extra_0..extra_{k-1} columns.
    #[arg(long = "extra-item")]
    pub extra_items: Vec<String>,

    #[arg(long, default_value = "gpt-4o")]
    pub generation_model: String,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    #[arg(long)]
    pub extraction_csv: PathBuf,

    /// Intervention ontology file (CSV with a 'term' column, or JSON).
    #[arg(long)]
    pub intervention_ontology: PathBuf,

    /// Outcome ontology file (CSV with a 'term' column, or JSON).
    #[arg(long)]
    pub outcome_ontology: PathBuf,

    #[arg(long, default_value = "extraction_mapped.csv")]
    pub output_csv: PathBuf,

    #[arg(long, default_value = "text-embedding-ada-002")]
    pub embedding_model: String,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,
}
