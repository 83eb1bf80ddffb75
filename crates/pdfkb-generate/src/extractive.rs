use anyhow::Result;
use std::collections::HashSet;

use pdfkb_core::traits::{GenerationParams, Generator};

/// Model-free stand-in for the seq2seq generator.
///
/// Answers with the context sentence sharing the most words with the final
/// `Question:` line. Deterministic; meant for tests and for running the
/// pipeline without model weights (`APP_USE_FAKE_GENERATION=1`).
#[derive(Debug, Default, Clone)]
pub struct ExtractiveGenerator;

const CONTEXT_MARKER: &str = "Context:";
const QUESTION_MARKER: &str = "Question:";

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect()
}

impl Generator for ExtractiveGenerator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let (body, question) = match prompt.rfind(QUESTION_MARKER) {
            Some(at) => (&prompt[..at], &prompt[at + QUESTION_MARKER.len()..]),
            None => (prompt, prompt),
        };
        let body = body.rfind(CONTEXT_MARKER).map_or(body, |at| &body[at + CONTEXT_MARKER.len()..]);
        let question = question.lines().next().unwrap_or_default();
        let wanted = words(question);

        let best = body
            .split(['.', '!', '?', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| (words(s).intersection(&wanted).count(), s))
            .filter(|(overlap, _)| *overlap > 0)
            // first sentence wins ties
            .fold(None::<(usize, &str)>, |acc, cur| match acc {
                Some(a) if a.0 >= cur.0 => Some(a),
                _ => Some(cur),
            });

        let answer = best.map(|(_, s)| s).unwrap_or("I couldn't find that in the document");
        Ok(answer.split_whitespace().take(params.max_length).collect::<Vec<_>>().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_sentence_overlapping_question() {
        let prompt = "Context:\nThe pump runs daily. Filters are replaced every March.\n\nQuestion: When are filters replaced?\n\nAnswer:";
        let out = ExtractiveGenerator.generate(prompt, &GenerationParams::default()).unwrap();
        assert_eq!(out, "Filters are replaced every March");
    }

    #[test]
    fn falls_back_when_nothing_overlaps() {
        let prompt = "Context:\nNothing useful here.\n\nQuestion: xyzzy?\n\nAnswer:";
        let out = ExtractiveGenerator.generate(prompt, &GenerationParams::default()).unwrap();
        assert_eq!(out, "I couldn't find that in the document");
    }
}
