//! Keyword intent checks over the normalised (trimmed, lower-cased) question.
//!
//! These are literal substring tests in a fixed order, nothing smarter.

pub const HELP_KEYWORDS: &[&str] = &["what can i ask", "what questions", "how to use", "guide me", "capabilities"];

pub const SUMMARY_KEYWORDS: &[&str] = &[
    "summarize",
    "summary",
    "about",
    "overview",
    "explain",
    "what is this",
    "author",
    "who wrote",
    "who is",
    "message",
    "theme",
    "moral",
];

pub const AUTHOR_KEYWORDS: &[&str] = &["author", "who wrote", "created by"];

pub fn normalize(question: &str) -> String { question.trim().to_lowercase() }

/// Exact match, or substring match once the question is longer than five
/// characters.
pub fn is_help_request(normalized: &str) -> bool {
    HELP_KEYWORDS
        .iter()
        .any(|kw| normalized == *kw || (normalized.chars().count() > 5 && normalized.contains(kw)))
}

pub fn is_summary_request(normalized: &str) -> bool { SUMMARY_KEYWORDS.iter().any(|kw| normalized.contains(kw)) }

/// Instruction slotted into the prompt preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Author,
    Summary,
    Detailed,
}

impl Instruction {
    /// Author beats summary beats the generic instruction.
    pub fn select(normalized: &str) -> Self {
        if AUTHOR_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
            Instruction::Author
        } else if is_summary_request(normalized) {
            Instruction::Summary
        } else {
            Instruction::Detailed
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Instruction::Author => {
                "Identify the author or creator of the document from the context. Look for a name next to words such as 'Author', 'By' or 'Written by'."
            }
            Instruction::Summary => "Summarize the main points of the document using the context below.",
            Instruction::Detailed => "Answer the question in detail using the context below.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_matches_exact_or_contained() {
        assert!(is_help_request("guide me"));
        assert!(is_help_request("what can i ask here?"));
        assert!(is_help_request("tell me your capabilities"));
        assert!(!is_help_request("who wrote this?"));
    }

    #[test]
    fn long_question_with_keyword_is_help() {
        // substring match is deliberately loose
        assert!(is_help_request("does the report list the pump's capabilities"));
    }

    #[test]
    fn author_takes_priority_over_summary() {
        assert_eq!(Instruction::select("who wrote this?"), Instruction::Author);
        assert_eq!(Instruction::select("summarize the author's argument"), Instruction::Author);
        assert_eq!(Instruction::select("give me an overview"), Instruction::Summary);
        assert_eq!(Instruction::select("how do i prime the pump?"), Instruction::Detailed);
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  What Is This?\n"), "what is this?");
    }
}
