use crate::intent::Instruction;

pub const INVALID_QUESTION: &str = "Please provide a valid question.";
pub const EMPTY_GENERATION: &str = "Unable to generate answer.";
pub const NO_CONTEXT: &str = "No specific context available.";

pub const HELP_TEXT: &str = "I can answer questions about the indexed document. Try asking:\n\
1. \"Summarize this document.\"\n\
2. \"Who is the author?\"\n\
3. \"What are the main topics covered?\"\n\
4. \"Explain <a term from the document> in detail.\"";

/// Retrieved chunks separated by a blank line, or the placeholder when there are none.
pub fn build_context(chunks: &[String]) -> String {
    if chunks.is_empty() { NO_CONTEXT.to_string() } else { chunks.join("\n\n") }
}

pub fn build_prompt(instruction: Instruction, context: &str, question: &str) -> String {
    format!(
        "You are a helpful AI assistant. {} If the Question is general conversation (e.g. greetings, general questions), answer politely. If the answer is not in the context and it's not a general question, say 'I couldn't find that in the document'.\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        instruction.text(),
        context,
        question
    )
}
