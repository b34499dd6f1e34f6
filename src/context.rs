//! Context assembly: turns ranked chunks into the finished prompt.
//!
//! Pure string construction. The prompt returned here is exactly what gets
//! sent to the generation endpoint, and it is persisted on the query record
//! so any answer can be reproduced from its inputs.

use crate::models::Chunk;

/// Joins chunk contents in rank order with a blank line between them.
pub fn assemble_context(chunks: &[&Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

const DEFAULT_TEMPLATE: &str = "\
You are an assistant that answers questions strictly from the document \
excerpts provided below. If the excerpts do not contain the answer, say \
that the documents do not cover it. Do not invent information.

Document excerpts:
{context}

Question: {question}

Answer:";

/// Renders the final prompt from the assembled context and the question.
/// The template must contain `{context}` and `{question}` placeholders;
/// `None` selects the built-in default.
pub fn build_prompt(template: Option<&str>, context: &str, question: &str) -> String {
    template
        .unwrap_or(DEFAULT_TEMPLATE)
        .replace("{context}", context)
        .replace("{question}", question)
}
