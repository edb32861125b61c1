//! OpenAlex works retrieval.
//!
//! Thin wrapper around the REST API: cursor-paginated search, abstract
//! reconstruction from the inverted word index, and open-access PDF
//! downloads. The core pipeline only sees the resulting `Reference` values.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::model::Reference;

const WORKS_URL: &str = "https://api.openalex.org/works";
const PER_PAGE: usize = 200;
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct OpenAlexClient {
    http: reqwest::blocking::Client,
    email: String,
}

#[derive(Debug, Deserialize)]
struct WorksPage {
    meta: PageMeta,
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Work {
    title: Option<String>,
    doi: Option<String>,
    publication_year: Option<i64>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    landing_page_url: Option<String>,
    pdf_url: Option<String>,
    is_oa: Option<bool>,
}

impl OpenAlexClient {
    /// The email lands in the `mailto` parameter, which OpenAlex asks for to
    /// route API traffic into its polite pool.
    pub fn new(email: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            email: email.to_string(),
        })
    }

    /// Fetches up to `max_works` works matching the search term and citation
    /// filter, keeping only those with both a title and a reconstructable
    /// abstract.
    pub fn fetch_works(
        &self,
        search_term: &str,
        min_cites: &str,
        max_works: usize,
    ) -> Result<Vec<Reference>> {
        let filter = format!("cited_by_count:{min_cites}");
        let per_page = PER_PAGE.to_string();
        let mut references = Vec::new();
        let mut cursor = String::from("*");

        while references.len() < max_works {
            let page: WorksPage = self
                .http
                .get(WORKS_URL)
                .query(&[
                    ("search", search_term),
                    ("filter", filter.as_str()),
                    ("per-page", per_page.as_str()),
                    ("cursor", cursor.as_str()),
                    ("mailto", self.email.as_str()),
                ])
                .send()
                .context("OpenAlex request failed")?
                .error_for_status()
                .context("OpenAlex returned an error status")?
                .json()
                .context("failed to decode OpenAlex response")?;

            if page.results.is_empty() {
                break;
            }

            debug!(page_size = page.results.len(), "fetched OpenAlex page");

            for work in page.results {
                if references.len() >= max_works {
                    break;
                }
                if let Some(reference) = reference_from_work(work) {
                    references.push(reference);
                }
            }

            match page.meta.next_cursor {
                Some(next) if !next.is_empty() => cursor = next,
                _ => break,
            }
        }

        Ok(references)
    }

    /// Downloads one PDF to `target`. The caller logs failures and moves on;
    /// a missing or broken link must not stop the reference batch.
    pub fn download_pdf(&self, url: &str, target: &Path) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("download request failed: {url}"))?
            .error_for_status()
            .with_context(|| format!("download returned an error status: {url}"))?;

        let body = response
            .bytes()
            .with_context(|| format!("failed to read download body: {url}"))?;

        fs::write(target, &body)
            .with_context(|| format!("failed to write {}", target.display()))?;

        Ok(())
    }
}

/// Works without a usable title or abstract are dropped here, before any
/// screening happens.
fn reference_from_work(work: Work) -> Option<Reference> {
    let title = work.title.map(|value| value.trim().to_string())?;
    if title.is_empty() {
        return None;
    }

    let abstract_text = reconstruct_abstract(&work.abstract_inverted_index?)?;

    let location = work.best_oa_location;
    let (landing_page_url, pdf_url, is_oa) = match location {
        Some(location) => (
            location.landing_page_url,
            location.pdf_url,
            location.is_oa.unwrap_or(false),
        ),
        None => (None, None, false),
    };

    Some(Reference {
        title,
        doi: work.doi,
        publication_year: work.publication_year,
        abstract_text,
        landing_page_url,
        pdf_url,
        is_oa,
    })
}

/// Rebuilds a plain-text abstract from the OpenAlex inverted word index:
/// every word lands at each of its recorded positions.
pub fn reconstruct_abstract(inverted_index: &HashMap<String, Vec<usize>>) -> Option<String> {
    let max_index = inverted_index.values().flatten().copied().max()?;

    let mut words = vec![""; max_index + 1];
    for (word, positions) in inverted_index {
        for &position in positions {
            words[position] = word.as_str();
        }
    }

    Some(words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, &[usize])]) -> HashMap<String, Vec<usize>> {
        entries
            .iter()
            .map(|(word, positions)| (word.to_string(), positions.to_vec()))
            .collect()
    }

    #[test]
    fn abstract_words_land_at_their_recorded_positions() {
        let inverted = index(&[
            ("parenting", &[0]),
            ("improves", &[1]),
            ("child", &[2, 4]),
            ("and", &[3]),
            ("outcomes", &[5]),
        ]);

        assert_eq!(
            reconstruct_abstract(&inverted).as_deref(),
            Some("parenting improves child and child outcomes")
        );
    }

    #[test]
    fn empty_inverted_index_yields_no_abstract() {
        assert_eq!(reconstruct_abstract(&HashMap::new()), None);
    }

    #[test]
    fn works_without_title_or_abstract_are_dropped() {
        let no_title = Work {
            title: None,
            doi: None,
            publication_year: None,
            abstract_inverted_index: Some(index(&[("word", &[0])])),
            best_oa_location: None,
        };
        assert!(reference_from_work(no_title).is_none());

        let no_abstract = Work {
            title: Some("A Study".to_string()),
            doi: None,
            publication_year: None,
            abstract_inverted_index: None,
            best_oa_location: None,
        };
        assert!(reference_from_work(no_abstract).is_none());
    }

    #[test]
    fn open_access_fields_come_from_the_best_location() {
        let work = Work {
            title: Some("A Study".to_string()),
            doi: Some("https://doi.org/10.1/xyz".to_string()),
            publication_year: Some(2021),
            abstract_inverted_index: Some(index(&[("word", &[0])])),
            best_oa_location: Some(OaLocation {
                landing_page_url: Some("https://example.org/landing".to_string()),
                pdf_url: Some("https://example.org/paper.pdf".to_string()),
                is_oa: Some(true),
            }),
        };

        let reference = reference_from_work(work).unwrap();
        assert_eq!(reference.pdf_url.as_deref(), Some("https://example.org/paper.pdf"));
        assert!(reference.is_oa);
        assert_eq!(reference.publication_year, Some(2021));
    }
}
