//! Relevance screening of candidate references against a free-text
//! inclusion criterion.

use tracing::warn;

use crate::api::TextGeneration;
use crate::model::Reference;

const SCREENING_INSTRUCTION: &str = "You are an expert research assistant. \
Your task is to determine if a given study is relevant to the user's \
description. Respond ONLY with 'include' or 'exclude'.";

const INCLUDE_TOKEN: &str = "include";
const EXCLUDE_TOKEN: &str = "exclude";

/// Keeps only references the model unambiguously marks as relevant: the
/// lowercased answer must contain the include token and not the exclude
/// token. References without a title or an abstract are dropped before
/// classification, and a failed call drops the reference (fail-closed)
/// without stopping the batch.
pub fn filter_references<G: TextGeneration>(
    client: &G,
    model: &str,
    references: Vec<Reference>,
    criterion: &str,
) -> Vec<Reference> {
    let mut kept = Vec::new();

    for reference in references {
        if reference.title.is_empty() && reference.abstract_text.is_empty() {
            continue;
        }

        let prompt = format!(
            "User's description of relevant studies:\n{criterion}\n\n\
             Study Title: {}\n\
             Study Abstract: {}\n\n\
             Is this study relevant? Respond ONLY with 'include' or 'exclude'.",
            reference.title, reference.abstract_text
        );

        match client.generate(model, Some(SCREENING_INSTRUCTION), &prompt) {
            Ok(answer) => {
                let answer = answer.to_lowercase();
                if answer.contains(INCLUDE_TOKEN) && !answer.contains(EXCLUDE_TOKEN) {
                    kept.push(reference);
                }
            }
            Err(err) => {
                warn!(
                    title = %reference.title,
                    error = %err,
                    "relevance call failed; excluding reference"
                );
            }
        }
    }

    kept
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

    fn reference(title: &str, abstract_text: &str) -> Reference {
        Reference {
            title: title.to_string(),
            doi: None,
            publication_year: Some(2020),
            abstract_text: abstract_text.to_string(),
            landing_page_url: None,
            pdf_url: None,
            is_oa: false,
        }
    }

    #[test]
    fn include_answer_keeps_the_reference() {
        let client = ScriptedClient::new(vec![Ok("Include".to_string())]);
        let kept = filter_references(
            &client,
            "test-model",
            vec![reference("Study A", "An abstract")],
            "parenting interventions",
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Study A");
    }

    #[test]
    fn exclude_answer_drops_the_reference() {
        let client = ScriptedClient::new(vec![Ok("exclude".to_string())]);
        let kept = filter_references(
            &client,
            "test-model",
            vec![reference("Study A", "An abstract")],
            "parenting interventions",
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn ambiguous_answer_containing_both_tokens_drops_the_reference() {
        let client = ScriptedClient::new(vec![Ok(
            "I would include this, but you could also exclude it".to_string(),
        )]);
        let kept = filter_references(
            &client,
            "test-model",
            vec![reference("Study A", "An abstract")],
            "parenting interventions",
        );
        assert!(kept.is_empty());
    }

    #[test]
    fn references_without_title_and_abstract_skip_classification() {
        let client = ScriptedClient::new(vec![Ok("include".to_string())]);
        let kept = filter_references(
            &client,
            "test-model",
            vec![reference("", ""), reference("Study B", "Abstract B")],
            "parenting interventions",
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Study B");
        assert_eq!(client.calls.get(), 1);
    }

    #[test]
    fn failed_call_excludes_the_reference_and_continues() {
        let client = ScriptedClient::new(vec![
            Err("quota exceeded".to_string()),
            Ok("include".to_string()),
        ]);
        let kept = filter_references(
            &client,
            "test-model",
            vec![
                reference("Study A", "Abstract A"),
                reference("Study B", "Abstract B"),
            ],
            "parenting interventions",
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Study B");
    }
}
