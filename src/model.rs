use serde::Serialize;

/// Canonical "value unavailable" marker. Every cell in the extraction table
/// carries this instead of an empty string or null when a field could not be
/// extracted, so downstream consumers treat absence uniformly.
pub const NA: &str = "NA";

/// Study-level fields produced by the meta pass, once per source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyMeta {
    pub study_title: String,
    pub population_outcome_measured_in: String,
    pub population_intervention_affected_or_predictor: String,
    pub secondary_characteristics: String,
    pub country: String,
    pub study_type_letter: String,
    pub reported_result_count: u32,
    pub raw_results_text: String,
}

impl StudyMeta {
    /// Degraded record standing in for a study whose meta pass failed.
    pub fn unavailable() -> Self {
        Self {
            study_title: NA.to_string(),
            population_outcome_measured_in: NA.to_string(),
            population_intervention_affected_or_predictor: NA.to_string(),
            secondary_characteristics: NA.to_string(),
            country: NA.to_string(),
            study_type_letter: NA.to_string(),
            reported_result_count: 0,
            raw_results_text: NA.to_string(),
        }
    }
}

/// One main result of a study, in the order it appeared in the
/// semicolon-separated meta answer. Indices are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub index: usize,
    pub text: String,
}

/// Effect statistics for a single main result, from the detail pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDetail {
    pub effect_size_type: String,
    pub effect_size: String,
    pub effect_size_uncertainty: String,
    pub p_value: String,
    pub total_sample_size: String,
    pub intervention_or_predictor_variable: String,
    pub outcome_variable: String,
}

impl ResultDetail {
    pub fn unavailable() -> Self {
        Self {
            effect_size_type: NA.to_string(),
            effect_size: NA.to_string(),
            effect_size_uncertainty: NA.to_string(),
            p_value: NA.to_string(),
            total_sample_size: NA.to_string(),
            intervention_or_predictor_variable: NA.to_string(),
            outcome_variable: NA.to_string(),
        }
    }
}

/// One row of the extraction table: study metadata, one main result, and the
/// study-constant extra answers flattened together.
#[derive(Debug, Clone)]
pub struct OutputRow {
    pub filename: String,
    pub meta: StudyMeta,
    pub main_result_index: usize,
    pub main_result_text: String,
    pub detail: ResultDetail,
    pub extras: Vec<String>,
}

const FIXED_COLUMNS: [&str; 17] = [
    "filename",
    "study_title",
    "population_outcome_measured_in",
    "population_intervention_affected_or_predictor",
    "secondary_characteristics",
    "country",
    "study_type_letter",
    "num_main_results",
    "main_result_index",
    "main_result_text",
    "effect_size_type",
    "effect_size",
    "effect_size_uncertainty",
    "p_value",
    "total_sample_size",
    "intervention_or_predictor_variable",
    "outcome_variable",
];

impl OutputRow {
    /// Column order of the extraction table; `extra_0..extra_{k-1}` follow the
    /// fixed columns.
    pub fn header(extra_count: usize) -> Vec<String> {
        let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|name| name.to_string()).collect();
        for index in 0..extra_count {
            columns.push(format!("extra_{index}"));
        }
        columns
    }

    pub fn into_record(self) -> Vec<String> {
        let mut cells = vec![
            self.filename,
            self.meta.study_title,
            self.meta.population_outcome_measured_in,
            self.meta.population_intervention_affected_or_predictor,
            self.meta.secondary_characteristics,
            self.meta.country,
            self.meta.study_type_letter,
            self.meta.reported_result_count.to_string(),
            self.main_result_index.to_string(),
            self.main_result_text,
            self.detail.effect_size_type,
            self.detail.effect_size,
            self.detail.effect_size_uncertainty,
            self.detail.p_value,
            self.detail.total_sample_size,
            self.detail.intervention_or_predictor_variable,
            self.detail.outcome_variable,
        ];
        cells.extend(self.extras);
        cells
    }
}

/// Candidate reference fetched from OpenAlex.
#[derive(Debug, Clone)]
pub struct Reference {
    pub title: String,
    pub doi: Option<String>,
    pub publication_year: Option<i64>,
    pub abstract_text: String,
    pub landing_page_url: Option<String>,
    pub pdf_url: Option<String>,
    pub is_oa: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceEntry {
    pub filename: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionCounts {
    pub pdf_count: usize,
    pub processed_document_count: usize,
    pub skipped_document_count: usize,
    pub degraded_meta_count: usize,
    pub degraded_user_field_count: usize,
    pub degraded_detail_count: usize,
    pub count_mismatch_count: usize,
    pub zero_result_document_count: usize,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub pdf_dir: String,
    pub output_csv: String,
    pub generation_model: String,
    pub extra_item_count: usize,
    pub counts: ExtractionCounts,
    pub source_hashes: Vec<SourceEntry>,
    pub warnings: Vec<String>,
}
