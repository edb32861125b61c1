use anyhow::{Context, Result};
use tracing::info;

use crate::api::ApiClient;
use crate::cli::MapArgs;
use crate::model::NA;
use crate::ontology::{OntologyMatcher, load_ontology_terms};
use crate::table;

pub fn run(args: MapArgs) -> Result<()> {
    let loaded = table::read_csv(&args.extraction_csv)?;
    info!(
        path = %args.extraction_csv.display(),
        rows = loaded.rows.len(),
        "loaded extraction table"
    );

    let intervention_column = loaded
        .column_index("intervention_or_predictor_variable")
        .context("extraction table has no intervention_or_predictor_variable column")?;
    let outcome_column = loaded
        .column_index("outcome_variable")
        .context("extraction table has no outcome_variable column")?;

    let api = ApiClient::from_env(&args.api_base_url)?;

    let intervention_terms = load_ontology_terms(&args.intervention_ontology);
    let outcome_terms = load_ontology_terms(&args.outcome_ontology);
    info!(
        intervention_terms = intervention_terms.len(),
        outcome_terms = outcome_terms.len(),
        "loaded ontologies"
    );

    let intervention_matcher =
        OntologyMatcher::build(&api, &args.embedding_model, intervention_terms);
    let outcome_matcher = OntologyMatcher::build(&api, &args.embedding_model, outcome_terms);
    info!(
        intervention_terms = intervention_matcher.term_count(),
        outcome_terms = outcome_matcher.term_count(),
        "embedded ontology terms"
    );

    let mut header = loaded.header.clone();
    header.push("mapped_intervention".to_string());
    header.push("mapped_outcome".to_string());

    let mut rows = Vec::with_capacity(loaded.rows.len());
    for mut row in loaded.rows {
        let intervention = row
            .get(intervention_column)
            .map(String::as_str)
            .unwrap_or(NA);
        let outcome = row.get(outcome_column).map(String::as_str).unwrap_or(NA);

        let mapped_intervention = intervention_matcher.closest(intervention);
        let mapped_outcome = outcome_matcher.closest(outcome);

        row.push(mapped_intervention);
        row.push(mapped_outcome);
        rows.push(row);
    }

    table::write_csv(&args.output_csv, &header, &rows)?;
    info!(path = %args.output_csv.display(), rows = rows.len(), "wrote mapped table");

    Ok(())
}
