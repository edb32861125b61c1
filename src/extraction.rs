//! Multi-pass field extraction and result reconciliation.
//!
//! Three prompt/response passes per document: study metadata (once), extra
//! user items (once), and effect statistics (once per main result). Every
//! pass degrades to a well-formed all-"NA" record instead of failing, so a
//! single bad call or malformed answer never costs more than its own fields.

use tracing::{info, warn};

use crate::api::TextGeneration;
use crate::enumerated::parse_enumerated;
use crate::model::{NA, OutputRow, ResultDetail, ResultItem, StudyMeta};

const META_ITEM_COUNT: usize = 8;
const DETAIL_ITEM_COUNT: usize = 7;

const META_PROMPT: &str = "Extract the following information from the scientific paper:

1: The study title.
2: The population the outcome was measured in (e.g., if the intervention educated parents of children aged 2-4, the children).
3: The population any intervention directly affected or the predictors were measured in (if not available, return 'NA').
4: Secondary characteristics of the population context (e.g. families of low socioeconomic status).
5: Country the study was carried out in.
6: Identify the type of study. Provide only the letter:
   a) purely cross-sectional study without control variables
   b) study measures outcome pre and post intervention, no control group
   c) purely cross-sectional study, uses control variables
   d) study measures outcome pre and post intervention, with a control group
   e) comparison of outcomes in a treated group against an untreated group
   f) quasi-experimental study
   g) randomised controlled trial
   h) meta-analysis.
7: How many main results does this study report? Focus only on main results. Return only an integer.
8: List each of the main results of the study (e.g. parenting education decreased child mental health problems), separated by semi-colons.

If any item is not available, return 'NA'. Number your answers exactly: '1: ...', '2: ...', etc.

Example output:
1: Study on Parenting Strategies
2: Children aged 2-4
3: Parents of children aged 2-4
4: Families from urban areas
5: USA
6: g
7: 3
8: Parenting education improved child mental health; Parenting education increased school readiness; Parenting education reduced parental stress.";

const USER_ITEMS_PROMPT: &str = "The user has additional items they want extracted from this paper.
Please respond with the answers to each item, enumerated exactly as '1: ...', '2: ...', etc.
If the information is not available, return 'NA'.

Example output:
1: This is the first answer
2: This is the second answer
3: NA";

/// Outcome of one extraction round-trip. A degraded extraction still carries
/// a fully-formed record of the right shape, which is what keeps the batch
/// alive across upstream failures.
#[derive(Debug, Clone)]
pub enum Extraction<T> {
    Complete(T),
    Degraded { value: T, reason: String },
}

impl<T> Extraction<T> {
    pub fn into_value(self) -> T {
        match self {
            Self::Complete(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Issues the three extraction passes against a text-generation collaborator.
pub struct Extractor<'a, G: TextGeneration> {
    client: &'a G,
    model: &'a str,
}

impl<'a, G: TextGeneration> Extractor<'a, G> {
    pub fn new(client: &'a G, model: &'a str) -> Self {
        Self { client, model }
    }

    /// Meta pass: eight enumerated answers covering study fields, the
    /// reported result count, and the semicolon-separated result list.
    pub fn extract_meta(&self, paper_text: &str) -> Extraction<StudyMeta> {
        let prompt = format!("{META_PROMPT}\n\nPaper text:\n{paper_text}\n");

        match self.client.generate(self.model, None, &prompt) {
            Ok(answer) => Extraction::Complete(meta_from_answer(&answer)),
            Err(err) => {
                warn!(error = %err, "meta extraction call failed");
                Extraction::Degraded {
                    value: StudyMeta::unavailable(),
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Detail pass for one main result. The prompt carries the full paper
    /// text alongside the specific result so the statistics stay grounded.
    pub fn extract_detail(&self, paper_text: &str, result_text: &str) -> Extraction<ResultDetail> {
        let prompt = format!(
            "We have a specific main result from the study:\n'{result_text}'\n\n\
             Extract the following information:\n\
             1: The effect size type for this main result (e.g. odds ratio, difference of means).\n\
             2: The effect size for this main result.\n\
             3: The estimate of uncertainty in the effect size (e.g. s.e., 95% CI).\n\
             4: The P-value for this main result.\n\
             5: The total sample size for the study.\n\
             6: The intervention or predictor variable (i.e., what was manipulated or used as a predictor).\n\
             7: The outcome variable.\n\n\
             If any of the information is not available, return 'NA'. \
             Number your answers exactly as '1: ...', '2: ...', etc.\n\n\
             Example output:\n\
             1: Odds ratio\n\
             2: 1.8\n\
             3: 95% CI [1.2, 2.4]\n\
             4: 0.03\n\
             5: 250\n\
             6: Parenting education\n\
             7: Child mental health problems\n\n\
             Full paper text:\n{paper_text}\n"
        );

        match self.client.generate(self.model, None, &prompt) {
            Ok(answer) => Extraction::Complete(detail_from_answer(&answer)),
            Err(err) => {
                warn!(error = %err, "detail extraction call failed");
                Extraction::Degraded {
                    value: ResultDetail::unavailable(),
                    reason: err.to_string(),
                }
            }
        }
    }

    /// User-items pass: one answer per caller-supplied label. Skipped
    /// entirely (no call) when there are no labels.
    pub fn extract_user_fields(
        &self,
        paper_text: &str,
        labels: &[String],
    ) -> Extraction<Vec<String>> {
        if labels.is_empty() {
            return Extraction::Complete(Vec::new());
        }

        let mut items = String::new();
        for (position, label) in labels.iter().enumerate() {
            items.push_str(&format!("{}: {label}\n", position + 1));
        }

        let prompt = format!("{USER_ITEMS_PROMPT}\n\nItems:\n{items}\nPaper text:\n{paper_text}\n");

        match self.client.generate(self.model, None, &prompt) {
            Ok(answer) => Extraction::Complete(parse_enumerated(&answer, labels.len())),
            Err(err) => {
                warn!(error = %err, "user items extraction call failed");
                Extraction::Degraded {
                    value: vec![NA.to_string(); labels.len()],
                    reason: err.to_string(),
                }
            }
        }
    }
}

fn meta_from_answer(answer: &str) -> StudyMeta {
    let mut fields = parse_enumerated(answer, META_ITEM_COUNT).into_iter();
    let mut next = || fields.next().unwrap_or_else(|| NA.to_string());

    StudyMeta {
        study_title: next(),
        population_outcome_measured_in: next(),
        population_intervention_affected_or_predictor: next(),
        secondary_characteristics: next(),
        country: next(),
        study_type_letter: next(),
        reported_result_count: next().trim().parse().unwrap_or(0),
        raw_results_text: next(),
    }
}

fn detail_from_answer(answer: &str) -> ResultDetail {
    let mut fields = parse_enumerated(answer, DETAIL_ITEM_COUNT).into_iter();
    let mut next = || fields.next().unwrap_or_else(|| NA.to_string());

    ResultDetail {
        effect_size_type: next(),
        effect_size: next(),
        effect_size_uncertainty: next(),
        p_value: next(),
        total_sample_size: next(),
        intervention_or_predictor_variable: next(),
        outcome_variable: next(),
    }
}

/// Main-result list derived from the semicolon-separated answer, kept next to
/// the separately reported count for mismatch reporting.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub items: Vec<ResultItem>,
    pub reported_count: u32,
}

impl Reconciled {
    pub fn count_mismatch(&self) -> bool {
        self.items.len() != self.reported_count as usize
    }
}

/// Splits the raw results answer on ';', trims, and drops empty parts. The
/// derived count always wins over the reported integer: the split is
/// deterministic parsing of text the model produced in the same call, while
/// the reported count is a second independent judgment.
pub fn reconcile_results(meta: &StudyMeta) -> Reconciled {
    let items = if meta.raw_results_text.trim() == NA {
        Vec::new()
    } else {
        meta.raw_results_text
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .enumerate()
            .map(|(position, text)| ResultItem {
                index: position + 1,
                text: text.to_string(),
            })
            .collect()
    };

    Reconciled {
        items,
        reported_count: meta.reported_result_count,
    }
}

/// Flattens one study's metadata, one main result, and the study-constant
/// extra answers into a single output row. Pure; no extraction logic.
pub fn build_row(
    filename: &str,
    meta: &StudyMeta,
    result_index: usize,
    result_text: &str,
    detail: &ResultDetail,
    extras: &[String],
) -> OutputRow {
    OutputRow {
        filename: filename.to_string(),
        meta: meta.clone(),
        main_result_index: result_index,
        main_result_text: result_text.to_string(),
        detail: detail.clone(),
        extras: extras.to_vec(),
    }
}

#[derive(Debug, Default)]
pub struct DocumentStats {
    pub degraded_meta: bool,
    pub degraded_user_fields: bool,
    pub degraded_detail_count: usize,
    pub count_mismatch: bool,
    pub zero_results: bool,
}

pub struct DocumentExtraction {
    pub rows: Vec<OutputRow>,
    pub stats: DocumentStats,
}

/// Full per-document pipeline: meta pass, user-items pass, reconciliation,
/// one detail pass per main result, row materialization. Always yields at
/// least one row; a study with no reconciled results gets a single synthetic
/// row with index 0 and all-"NA" detail fields.
pub fn extract_document_rows<G: TextGeneration>(
    extractor: &Extractor<'_, G>,
    filename: &str,
    paper_text: &str,
    user_labels: &[String],
) -> DocumentExtraction {
    let mut stats = DocumentStats::default();

    let meta_extraction = extractor.extract_meta(paper_text);
    stats.degraded_meta = meta_extraction.is_degraded();
    let meta = meta_extraction.into_value();

    let user_extraction = extractor.extract_user_fields(paper_text, user_labels);
    stats.degraded_user_fields = user_extraction.is_degraded();
    let extras = user_extraction.into_value();

    let reconciled = reconcile_results(&meta);
    if reconciled.count_mismatch() {
        stats.count_mismatch = true;
        info!(
            file = %filename,
            reported = reconciled.reported_count,
            derived = reconciled.items.len(),
            "result count mismatch; using the semicolon-derived count"
        );
    }

    let mut rows = Vec::new();

    if reconciled.items.is_empty() {
        stats.zero_results = true;
        rows.push(build_row(
            filename,
            &meta,
            0,
            NA,
            &ResultDetail::unavailable(),
            &extras,
        ));
    } else {
        for item in &reconciled.items {
            let detail_extraction = extractor.extract_detail(paper_text, &item.text);
            if detail_extraction.is_degraded() {
                stats.degraded_detail_count += 1;
            }
            let detail = detail_extraction.into_value();
            rows.push(build_row(
                filename,
                &meta,
                item.index,
                &item.text,
                &detail,
                &extras,
            ));
        }
    }

    DocumentExtraction { rows, stats }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use anyhow::anyhow;

    use super::*;

    struct ScriptedClient {
        responses: RefCell<VecDeque<Result<String, String>>>,
        calls: Cell<usize>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<String, String>>) -> Self {
            Self {
                responses: RefCell::new(responses.into_iter().collect()),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self::new(Vec::new())
        }
    }

    impl TextGeneration for ScriptedClient {
        fn generate(
            &self,
            _model: &str,
            _system: Option<&str>,
            _prompt: &str,
        ) -> anyhow::Result<String> {
            self.calls.set(self.calls.get() + 1);
            match self.responses.borrow_mut().pop_front() {
                Some(Ok(answer)) => Ok(answer),
                Some(Err(reason)) => Err(anyhow!(reason)),
                None => Err(anyhow!("no scripted response left")),
            }
        }
    }

    const META_ANSWER: &str = "1: Study X\n2: Adults\n3: NA\n4: NA\n5: USA\n6: g\n7: 2\n8: Drug reduced pain; Drug improved sleep";

    #[test]
    fn meta_pass_parses_all_eight_fields() {
        let client = ScriptedClient::new(vec![Ok(META_ANSWER.to_string())]);
        let extractor = Extractor::new(&client, "test-model");

        let meta = extractor.extract_meta("paper text").into_value();
        assert_eq!(meta.study_title, "Study X");
        assert_eq!(meta.population_outcome_measured_in, "Adults");
        assert_eq!(meta.population_intervention_affected_or_predictor, NA);
        assert_eq!(meta.country, "USA");
        assert_eq!(meta.study_type_letter, "g");
        assert_eq!(meta.reported_result_count, 2);
        assert_eq!(meta.raw_results_text, "Drug reduced pain; Drug improved sleep");
    }

    #[test]
    fn unparseable_result_count_falls_back_to_zero() {
        let answer = "1: T\n2: P\n3: NA\n4: NA\n5: UK\n6: a\n7: several\n8: NA";
        let client = ScriptedClient::new(vec![Ok(answer.to_string())]);
        let extractor = Extractor::new(&client, "test-model");

        let meta = extractor.extract_meta("paper").into_value();
        assert_eq!(meta.reported_result_count, 0);
    }

    #[test]
    fn failed_meta_call_degrades_to_all_na() {
        let client = ScriptedClient::failing();
        let extractor = Extractor::new(&client, "test-model");

        let extraction = extractor.extract_meta("paper");
        assert!(extraction.is_degraded());
        let meta = extraction.into_value();
        assert_eq!(meta.study_title, NA);
        assert_eq!(meta.reported_result_count, 0);
        assert_eq!(meta.raw_results_text, NA);
    }

    #[test]
    fn user_fields_pass_is_skipped_without_labels() {
        let client = ScriptedClient::failing();
        let extractor = Extractor::new(&client, "test-model");

        let extraction = extractor.extract_user_fields("paper", &[]);
        assert!(!extraction.is_degraded());
        assert!(extraction.into_value().is_empty());
        assert_eq!(client.calls.get(), 0);
    }

    #[test]
    fn failed_user_fields_call_degrades_to_na_per_label() {
        let client = ScriptedClient::failing();
        let extractor = Extractor::new(&client, "test-model");

        let labels = vec!["Funding source".to_string(), "Follow-up period".to_string()];
        let values = extractor.extract_user_fields("paper", &labels).into_value();
        assert_eq!(values, vec![NA, NA]);
    }

    #[test]
    fn derived_count_wins_over_reported_count() {
        let mut meta = StudyMeta::unavailable();
        meta.raw_results_text = "A; B; C".to_string();
        meta.reported_result_count = 5;

        let reconciled = reconcile_results(&meta);
        assert!(reconciled.count_mismatch());
        assert_eq!(reconciled.items.len(), 3);
        assert_eq!(reconciled.items[0].index, 1);
        assert_eq!(reconciled.items[0].text, "A");
        assert_eq!(reconciled.items[2].index, 3);
        assert_eq!(reconciled.items[2].text, "C");
    }

    #[test]
    fn empty_parts_are_dropped_from_the_split() {
        let mut meta = StudyMeta::unavailable();
        meta.raw_results_text = "A;; B ;".to_string();
        meta.reported_result_count = 2;

        let reconciled = reconcile_results(&meta);
        assert!(!reconciled.count_mismatch());
        assert_eq!(reconciled.items.len(), 2);
        assert_eq!(reconciled.items[1].text, "B");
    }

    #[test]
    fn na_results_text_yields_no_items() {
        let meta = StudyMeta::unavailable();
        let reconciled = reconcile_results(&meta);
        assert!(reconciled.items.is_empty());
    }

    #[test]
    fn zero_result_study_produces_one_synthetic_row() {
        let answer = "1: T\n2: P\n3: NA\n4: NA\n5: UK\n6: a\n7: 0\n8: NA";
        let client = ScriptedClient::new(vec![Ok(answer.to_string())]);
        let extractor = Extractor::new(&client, "test-model");

        let document = extract_document_rows(&extractor, "empty.pdf", "paper", &[]);
        assert!(document.stats.zero_results);
        assert_eq!(document.rows.len(), 1);

        let record = document.rows[0].clone().into_record();
        assert_eq!(record[8], "0");
        assert_eq!(record[9], NA);
        for cell in &record[10..17] {
            assert_eq!(cell, NA);
        }
        // Exactly one call: meta only, no detail pass.
        assert_eq!(client.calls.get(), 1);
    }

    #[test]
    fn two_result_study_produces_two_rows_differing_only_in_result_fields() {
        let detail_one = "1: Odds ratio\n2: 1.8\n3: 95% CI [1.2, 2.4]\n4: 0.03\n5: 250\n6: Drug\n7: Pain";
        let detail_two = "1: Odds ratio\n2: 1.2\n3: 95% CI [1.0, 1.5]\n4: 0.04\n5: 250\n6: Drug\n7: Sleep";
        let client = ScriptedClient::new(vec![
            Ok(META_ANSWER.to_string()),
            Ok(detail_one.to_string()),
            Ok(detail_two.to_string()),
        ]);
        let extractor = Extractor::new(&client, "test-model");

        let document = extract_document_rows(&extractor, "study_1.pdf", "paper", &[]);
        assert_eq!(document.rows.len(), 2);
        assert!(!document.stats.count_mismatch);

        let first = document.rows[0].clone().into_record();
        let second = document.rows[1].clone().into_record();
        assert_eq!(first[..8], second[..8]);
        assert_eq!(first[8], "1");
        assert_eq!(second[8], "2");
        assert_eq!(first[9], "Drug reduced pain");
        assert_eq!(second[9], "Drug improved sleep");
        assert_eq!(first[16], "Pain");
        assert_eq!(second[16], "Sleep");
    }

    #[test]
    fn failed_detail_call_degrades_that_result_only() {
        let detail_two = "1: Odds ratio\n2: 1.2\n3: NA\n4: 0.04\n5: 250\n6: Drug\n7: Sleep";
        let client = ScriptedClient::new(vec![
            Ok(META_ANSWER.to_string()),
            Err("timeout".to_string()),
            Ok(detail_two.to_string()),
        ]);
        let extractor = Extractor::new(&client, "test-model");

        let document = extract_document_rows(&extractor, "study_1.pdf", "paper", &[]);
        assert_eq!(document.rows.len(), 2);
        assert_eq!(document.stats.degraded_detail_count, 1);
        assert_eq!(document.rows[0].detail, ResultDetail::unavailable());
        assert_eq!(document.rows[1].detail.outcome_variable, "Sleep");
    }

    #[test]
    fn rows_never_contain_empty_cells() {
        let client = ScriptedClient::failing();
        let extractor = Extractor::new(&client, "test-model");

        let labels = vec!["Funding source".to_string()];
        let document = extract_document_rows(&extractor, "study_1.pdf", "paper", &labels);
        for row in document.rows {
            for cell in row.into_record() {
                assert!(!cell.is_empty());
            }
        }
    }

    #[test]
    fn extras_are_replicated_across_all_rows_of_a_study() {
        let user_answer = "1: Wellcome Trust";
        let detail = "1: NA\n2: NA\n3: NA\n4: NA\n5: NA\n6: NA\n7: NA";
        let client = ScriptedClient::new(vec![
            Ok(META_ANSWER.to_string()),
            Ok(user_answer.to_string()),
            Ok(detail.to_string()),
            Ok(detail.to_string()),
        ]);
        let extractor = Extractor::new(&client, "test-model");

        let labels = vec!["Funding source".to_string()];
        let document = extract_document_rows(&extractor, "study_1.pdf", "paper", &labels);
        assert_eq!(document.rows.len(), 2);
        for row in &document.rows {
            assert_eq!(row.extras, vec!["Wellcome Trust".to_string()]);
        }
        // Meta, user items, and two detail calls.
        assert_eq!(client.calls.get(), 4);
    }
}
