use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use std::sync::Arc;
use tracing::info;

use crate::agent::{Answer, PortfolioAgent};
use crate::completion::CompletionClient;
use crate::config::Config;
use crate::embeddings::EmbeddingClient;
use crate::index::EmbeddingIndex;
use crate::retriever::Retriever;

/// Fully wired question-answering pipeline.
///
/// Every service is constructed once here and injected; nothing in the
/// pipeline reaches for global state.
pub struct Pipeline {
    pub config: Config,
    pub index: Arc<EmbeddingIndex>,
    pub embedder: Arc<EmbeddingClient>,
    pub agent: Arc<PortfolioAgent>,
}

/// Construct all services and populate the index on first run.
///
/// Fails fast on a missing API key or unreachable vector store so
/// problems surface at startup, not on the first question.
#[inline]
pub async fn build_pipeline(config: Config) -> Result<Pipeline> {
    let embedder = Arc::new(
        EmbeddingClient::new(&config.embedding).context("Failed to create embedding client")?,
    );

    let index = Arc::new(
        EmbeddingIndex::new(&config)
            .await
            .context("Failed to open vector store")?,
    );

    let completion = CompletionClient::from_env(&config.completion)
        .context("Failed to create completion client")?;

    let ingested = index
        .ensure_populated(&config.data_dir, &embedder)
        .await
        .context("Failed to populate index")?;
    info!("Pipeline ready with {} indexed documents", ingested);

    let retriever = Retriever::new(Arc::clone(&index), Arc::clone(&embedder));
    let agent = Arc::new(PortfolioAgent::new(
        retriever,
        completion,
        config.assistant.clone(),
    ));

    Ok(Pipeline {
        config,
        index,
        embedder,
        agent,
    })
}

/// Interactive question/answer loop on the terminal
#[inline]
pub async fn chat(config: Config) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let owner = pipeline.agent.assistant().owner_name.clone();

    println!();
    println!("{}", style(format!("{owner}'s Portfolio Assistant")).bold());
    println!("Ask about background, skills, projects, or experience.");
    println!("Type 'quit' to leave, 'reload' to refresh the data.");
    println!();

    loop {
        let question: String = match Input::new().with_prompt("You").interact_text() {
            Ok(question) => question,
            Err(_) => break, // stdin closed
        };

        let question = question.trim().to_string();
        if question.is_empty() {
            continue;
        }

        match question.to_lowercase().as_str() {
            "quit" | "exit" | "bye" => {
                println!("Goodbye!");
                break;
            }
            "reload" => {
                println!("Reloading portfolio data...");
                let count = pipeline
                    .index
                    .reload(&pipeline.config.data_dir, &pipeline.embedder)
                    .await
                    .context("Reload failed")?;
                println!("Reloaded {count} documents.");
                continue;
            }
            _ => {}
        }

        match pipeline.agent.answer(&question).await {
            Ok(Answer::Text(text)) => {
                println!("\n{}\n", text);
            }
            Ok(Answer::NoData) => {
                println!("\n{}\n", pipeline.agent.fallback_reply());
            }
            Err(e) => {
                println!(
                    "\n{}\n",
                    style(format!(
                        "Sorry, I ran into a problem answering that: {e}. \
                         Please try again."
                    ))
                    .red()
                );
            }
        }
    }

    Ok(())
}

/// Run the HTTP API
#[inline]
pub async fn serve(config: Config, port: u16) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    crate::server::serve(pipeline.agent, port)
        .await
        .context("Server failed")?;
    Ok(())
}

/// Drop the index and re-ingest everything from the data folder.
///
/// Does not need the completion API key; only the embedding server.
#[inline]
pub async fn reload(config: Config) -> Result<()> {
    let embedder =
        EmbeddingClient::new(&config.embedding).context("Failed to create embedding client")?;
    let index = EmbeddingIndex::new(&config)
        .await
        .context("Failed to open vector store")?;

    println!("Reloading portfolio data from {}...", config.data_dir.display());
    let count = index
        .reload(&config.data_dir, &embedder)
        .await
        .context("Reload failed")?;
    println!("Reloaded {count} documents.");

    Ok(())
}

/// Show pipeline health: index size, embedding server reachability,
/// and the active configuration
#[inline]
pub async fn status(config: Config) -> Result<()> {
    println!("Data folder:      {}", config.data_dir.display());
    println!("Vector store:     {}", config.vector_db_path().display());
    println!("Embedding model:  {}", config.embedding.model);
    println!("Completion model: {}", config.completion.model);
    println!();

    match EmbeddingIndex::new(&config).await {
        Ok(index) => match index.count().await {
            Ok(count) => println!("Indexed documents: {count}"),
            Err(e) => println!("Indexed documents: unavailable ({e})"),
        },
        Err(e) => println!("Vector store: unavailable ({e})"),
    }

    let embedder =
        EmbeddingClient::new(&config.embedding).context("Failed to create embedding client")?;
    match embedder.ping() {
        Ok(()) => println!("Embedding server: reachable"),
        Err(e) => println!("Embedding server: unreachable ({e})"),
    }

    let key_present = std::env::var(&config.completion.api_key_env).is_ok();
    println!(
        "Completion key:   {} ({})",
        if key_present { "set" } else { "missing" },
        config.completion.api_key_env
    );

    Ok(())
}

/// Print the active configuration as TOML
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("Configuration file: {}", config.config_file_path().display());
    println!();
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{content}");
    Ok(())
}

/// Write the active configuration to disk so it can be edited
#[inline]
pub fn init_config(config: &Config) -> Result<()> {
    let path = config.config_file_path();
    if path.exists() {
        println!("Configuration file already exists: {}", path.display());
        return Ok(());
    }

    config.save().context("Failed to write config file")?;
    println!("Wrote configuration file: {}", path.display());
    Ok(())
}
