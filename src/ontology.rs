//! Controlled-vocabulary loading and embedding-based nearest-term matching.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use crate::api::Embedding;
use crate::model::NA;
use crate::table;

/// One vocabulary entry with its cached embedding, computed once at build
/// time. A term whose embedding call failed keeps an empty vector; its
/// similarity is always 0.0 so it can never win a contest it shouldn't.
#[derive(Debug, Clone)]
struct OntologyTerm {
    term: String,
    embedding: Vec<f32>,
}

/// Nearest-term lookup over a fixed vocabulary. The term embeddings are the
/// only shared state in a mapping run; they are read-only after `build`.
pub struct OntologyMatcher<'a, E: Embedding> {
    client: &'a E,
    model: &'a str,
    terms: Vec<OntologyTerm>,
}

impl<'a, E: Embedding> OntologyMatcher<'a, E> {
    /// Embeds every distinct term once up front; lookups reuse the cached
    /// vectors. Duplicate vocabulary entries keep their first position.
    pub fn build(client: &'a E, model: &'a str, terms: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let terms = terms
            .into_iter()
            .filter(|term| seen.insert(term.clone()))
            .map(|term| {
                let embedding = match client.embed(model, &term) {
                    Ok(vector) => vector,
                    Err(err) => {
                        warn!(term = %term, error = %err, "term embedding failed");
                        Vec::new()
                    }
                };
                OntologyTerm { term, embedding }
            })
            .collect();

        Self {
            client,
            model,
            terms,
        }
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Label of the closest term by cosine similarity, or "NA" when the value
    /// carries no information, the vocabulary is empty, or the query
    /// embedding call fails. Ties keep the first-encountered term.
    pub fn closest(&self, text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NA) || self.terms.is_empty() {
            return NA.to_string();
        }

        let query = match self.client.embed(self.model, trimmed) {
            Ok(vector) => vector,
            Err(err) => {
                warn!(error = %err, "query embedding failed; mapping degrades to NA");
                return NA.to_string();
            }
        };

        let mut best: Option<(&OntologyTerm, f64)> = None;
        for entry in &self.terms {
            let similarity = cosine_similarity(&query, &entry.embedding);
            if best.is_none_or(|(_, current)| similarity > current) {
                best = Some((entry, similarity));
            }
        }

        best.map(|(entry, _)| entry.term.clone())
            .unwrap_or_else(|| NA.to_string())
    }
}

/// Cosine similarity over raw (unnormalized) vectors. Mismatched lengths and
/// zero-norm vectors score 0.0 instead of dividing by zero.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut left_sq = 0.0_f64;
    let mut right_sq = 0.0_f64;
    for (left_value, right_value) in left.iter().zip(right.iter()) {
        let left_value = f64::from(*left_value);
        let right_value = f64::from(*right_value);
        dot += left_value * right_value;
        left_sq += left_value * left_value;
        right_sq += right_value * right_value;
    }

    if left_sq <= 0.0 || right_sq <= 0.0 {
        return 0.0;
    }

    dot / (left_sq.sqrt() * right_sq.sqrt())
}

/// Loads ontology terms from CSV (a `term` column, first column as fallback)
/// or JSON (a list of strings, or of records with a `term` field). Malformed
/// or unsupported input degrades to an empty vocabulary: every subsequent
/// match is "NA", but the run continues.
pub fn load_ontology_terms(path: &Path) -> Vec<String> {
    match try_load_ontology_terms(path) {
        Ok(terms) => terms,
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to load ontology; all matches will be NA"
            );
            Vec::new()
        }
    }
}

fn try_load_ontology_terms(path: &Path) -> Result<Vec<String>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => load_csv_terms(path),
        "json" => load_json_terms(path),
        _ => {
            warn!(path = %path.display(), "unsupported ontology file format");
            Ok(Vec::new())
        }
    }
}

fn load_csv_terms(path: &Path) -> Result<Vec<String>> {
    let loaded = table::read_csv(path)?;
    let column = loaded.column_index("term").unwrap_or(0);

    Ok(loaded
        .rows
        .iter()
        .filter_map(|row| row.get(column))
        .map(|cell| cell.trim().to_string())
        .filter(|term| !term.is_empty())
        .collect())
}

fn load_json_terms(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let Value::Array(entries) = value else {
        warn!(path = %path.display(), "ontology JSON is not a list");
        return Ok(Vec::new());
    };

    let mut terms = Vec::new();
    for entry in entries {
        match entry {
            Value::String(term) => terms.push(term),
            Value::Object(record) => {
                if let Some(Value::String(term)) = record.get("term") {
                    terms.push(term.clone());
                }
            }
            _ => {}
        }
    }

    Ok(terms)
}
