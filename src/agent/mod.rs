// Agent module
// Ties retrieval, prompting, and completion into one question/answer cycle


use tracing::{debug, info};

use crate::completion::CompletionClient;
use crate::config::AssistantConfig;
use crate::prompt;
use crate::retriever::Retriever;
use crate::Result;

/// Outcome of answering a question.
///
/// `NoData` is distinct from an error: retrieval worked but found
/// nothing relevant, so callers can render the fallback reply instead
/// of an apology for a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    NoData,
}

/// Stateless question-answering pipeline. Each call is one synchronous
/// request/response cycle; there is no conversation memory.
pub struct PortfolioAgent {
    retriever: Retriever,
    completion: CompletionClient,
    assistant: AssistantConfig,
}

impl PortfolioAgent {
    #[inline]
    pub fn new(
        retriever: Retriever,
        completion: CompletionClient,
        assistant: AssistantConfig,
    ) -> Self {
        Self {
            retriever,
            completion,
            assistant,
        }
    }

    /// Answer a question from the ingested portfolio data.
    ///
    /// Retrieval failures degrade to `NoData`; completion failures
    /// propagate as typed errors for the caller to present.
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        info!("Answering question ({} chars)", question.len());

        let snippets = self.retriever.search(question, self.assistant.top_k).await;
        let texts: Vec<String> = snippets
            .into_iter()
            .map(|snippet| snippet.text)
            .filter(|text| !text.trim().is_empty())
            .collect();

        if texts.is_empty() {
            debug!("No relevant context found");
            return Ok(Answer::NoData);
        }

        let prompt = prompt::compose(question, &texts);
        let reply = self.completion.complete(&prompt)?;

        Ok(Answer::Text(reply))
    }

    /// The reply used when no portfolio data matches a question
    #[inline]
    pub fn fallback_reply(&self) -> String {
        prompt::no_data_reply(&self.assistant)
    }

    #[inline]
    pub fn assistant(&self) -> &AssistantConfig {
        &self.assistant
    }
}
