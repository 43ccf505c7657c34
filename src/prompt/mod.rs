// Prompt composition module
// Pure string assembly; no IO, deterministic for a given input


use crate::config::AssistantConfig;

/// Behavioral rules sent with every question. Tone is conversational
/// with no visible section headers; the assistant must not volunteer
/// exhaustive lists and should reframe negative questions
/// constructively.
const INSTRUCTIONS: &str = "\
You are a portfolio assistant answering questions about one person's \
professional background using only the provided context.

Rules:
1. Only use information from the context below; never invent details.
2. Answer in a warm, conversational tone, as if chatting with a visitor.
3. Do not use visible section headers or rigid formatting in replies.
4. Do not volunteer full lists of projects or skills unless explicitly asked; \
mention a couple of relevant highlights instead.
5. If a question is negative or critical, reframe it constructively and \
focus on strengths and growth.
6. If the context does not cover the question, say so briefly and suggest \
getting in touch directly.";

/// Compose the single prompt string for the completion endpoint.
///
/// Retrieved texts are joined with blank lines, discarding empty or
/// whitespace-only entries. Deterministic given its inputs.
#[inline]
pub fn compose(question: &str, retrieved: &[String]) -> String {
    let context = retrieved
        .iter()
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{INSTRUCTIONS}\n\nCONTEXT:\n{context}\n\nQUESTION:\n{question}")
}

/// Reply used when retrieval finds nothing relevant. Presentation
/// layers return this instead of calling the completion endpoint.
#[inline]
pub fn no_data_reply(assistant: &AssistantConfig) -> String {
    format!(
        "I don't have that information in {name}'s portfolio data.\n\n\
         Here's a quick summary about {name}:\n{summary}\n\n\
         For more detailed information, you can reach {name} directly at \
         {email}.",
        name = assistant.owner_name,
        summary = assistant.summary,
        email = assistant.contact_email,
    )
}
