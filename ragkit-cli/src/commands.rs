//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use ragkit_core::rag::RagPipeline;
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { path } => handle_ingest(&path, workspace).await,
        Commands::Ask { question, sources } => handle_ask(&question, sources, workspace).await,
        Commands::Search { query, top_k } => handle_search(&query, top_k, workspace).await,
        Commands::Embed { text } => handle_embed(&text, workspace).await,
        Commands::Stats => handle_stats(workspace).await,
        Commands::Config { action } => handle_config(action, workspace).await,
    }
}

fn load_pipeline(workspace: &Path) -> anyhow::Result<RagPipeline> {
    let config = ragkit_core::config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    RagPipeline::from_config(&config).map_err(|e| anyhow::anyhow!("Failed to build pipeline: {}", e))
}

async fn handle_ingest(path: &Path, workspace: &Path) -> anyhow::Result<()> {
    let pipeline = load_pipeline(workspace)?;
    let documents = pipeline.ingest_path(path).await?;
    if documents.is_empty() {
        println!("No ingestible documents found at: {}", path.display());
        return Ok(());
    }

    let total_chunks: usize = documents.iter().map(|d| d.chunk_count).sum();
    println!(
        "Ingested {} document(s), {} chunk(s):",
        documents.len(),
        total_chunks
    );
    for doc in &documents {
        println!(
            "  {} ({} chunks, {} chars)",
            doc.title, doc.chunk_count, doc.total_chars
        );
    }
    Ok(())
}

async fn handle_ask(question: &str, show_sources: bool, workspace: &Path) -> anyhow::Result<()> {
    let pipeline = load_pipeline(workspace)?;
    let result = pipeline.answer(question).await?;

    println!("{}", result.answer);

    if show_sources {
        println!("\nSources ({}):", result.sources.len());
        for source in &result.sources {
            println!("  [{:.3}] {} — {}", source.score, source.chunk_id, source.excerpt);
        }
        println!(
            "\nRetrieved {} chunk(s), used {}, avg score {:.3}, {} ms",
            result.stats.chunks_retrieved,
            result.stats.chunks_used,
            result.stats.avg_score,
            result.stats.elapsed_ms
        );
    }
    Ok(())
}

async fn handle_search(query: &str, top_k: Option<usize>, workspace: &Path) -> anyhow::Result<()> {
    let mut config = ragkit_core::config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    if let Some(k) = top_k {
        config.pipeline.top_k = k;
    }
    // Search is retrieval only; skip the LLM re-rank round-trip.
    config.pipeline.rerank = false;

    let pipeline = RagPipeline::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to build pipeline: {}", e))?;
    let chunks = pipeline.retrieve(query).await?;

    if chunks.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for chunk in &chunks {
        println!("[{:.3}] {}", chunk.score, chunk.id);
        println!("  {}", chunk.text.lines().collect::<Vec<_>>().join(" "));
    }
    Ok(())
}

async fn handle_embed(text: &str, workspace: &Path) -> anyhow::Result<()> {
    let config = ragkit_core::config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let embedder = ragkit_core::embedding::create_embedder(&config.embedding, &config.retry)?;

    let vector = embedder.embed_query(text).await?;
    let head: Vec<f32> = vector.iter().take(8).copied().collect();
    println!(
        "{} dimensions, head: {}",
        vector.len(),
        serde_json::to_string(&head)?
    );
    Ok(())
}

async fn handle_stats(workspace: &Path) -> anyhow::Result<()> {
    let pipeline = load_pipeline(workspace)?;
    let stats = pipeline.stats().await?;
    println!("Vectors:   {}", stats.total_vectors);
    println!("Dimension: {}", stats.dimension);
    Ok(())
}

async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".ragkit");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            std::fs::write(&config_path, ragkit_core::config::default_config_toml())?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            if !ragkit_core::config::config_exists(Some(workspace)) {
                println!("# No configuration file found; showing built-in defaults.");
            }
            let config = ragkit_core::config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
