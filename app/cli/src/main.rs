use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use mise_rag::answer::extract_followup_options;
use mise_rag::providers::OpenAiClient;
use mise_rag::storage::ManualStore;
use mise_rag::{
    AssistantConfig, AssistantEngine, ConversationContext, ManualIndexer, ManualRegistry,
};

#[derive(Parser)]
#[command(name = "mise", about = "Store equipment manual assistant", version)]
struct Cli {
    /// Path to a JSON config file; defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing the manual PDFs.
    #[arg(long, global = true, default_value = "manuals")]
    manuals_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index all available manuals into the vector store.
    Setup {
        /// Drop the existing index before re-indexing.
        #[arg(long)]
        reset: bool,
    },
    /// Show all registered manuals and whether their PDFs are present.
    Inventory,
    /// Show index statistics.
    Stats,
    /// Ask a single question.
    Query {
        question: Vec<String>,
    },
    /// Interactive chat with conversational context.
    Chat,
    /// Delete the entire index.
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AssistantConfig::from_file(path).map_err(anyhow::Error::msg)?,
        None => AssistantConfig::default(),
    };
    let registry = ManualRegistry::builtin(&cli.manuals_dir);

    match cli.command {
        Command::Setup { reset } => setup(&config, &registry, reset).await,
        Command::Inventory => inventory(&registry),
        Command::Stats => stats(&config).await,
        Command::Query { question } => query(&config, &question.join(" ")).await,
        Command::Chat => chat(&config).await,
        Command::Reset => reset_index(&config).await,
    }
}

async fn open_store(config: &AssistantConfig) -> Result<Arc<ManualStore>> {
    let path = config.data_dir.join("lance_data");
    Ok(Arc::new(
        ManualStore::new(
            path.to_str().unwrap_or("./lance_data"),
            config.api.embedding_dimension,
        )
        .await?,
    ))
}

async fn setup(config: &AssistantConfig, registry: &ManualRegistry, reset: bool) -> Result<()> {
    config.validate().map_err(anyhow::Error::msg)?;

    let available = registry.available();
    let missing = registry.missing();

    println!("Registered manuals: {}", registry.all().len());
    println!("  available: {}", available.len());
    println!("  missing:   {}", missing.len());
    for manual in &missing {
        println!("  (missing) {} - expected at {}", manual.title, manual.pdf_path.display());
    }

    if available.is_empty() {
        println!("\nNo manuals available to index. Add PDF files under the manuals directory.");
        return Ok(());
    }

    let store = open_store(config).await?;
    let embeddings = Arc::new(OpenAiClient::new(&config.api)?);
    let indexer = ManualIndexer::new(store.clone(), embeddings, &config.chunking);

    if reset {
        println!("\nResetting existing index...");
        store.clear().await?;
    }

    let bar = ProgressBar::new(available.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .context("progress template")?,
    );

    let indexable = ManualRegistry::from_manuals(available.into_iter().cloned().collect());
    let mut reports = Vec::new();
    for manual in indexable.all() {
        bar.set_message(manual.title.clone());
        match indexer.index_manual(manual).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                // One broken manual should not abort the rest of the batch.
                tracing::error!(title = %manual.title, error = %e, "indexing failed");
                reports.push(mise_rag::IndexReport {
                    title: manual.title.clone(),
                    chunks_indexed: 0,
                    skipped: false,
                    error: Some(format!("{:#}", e)),
                });
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    println!();
    for report in &reports {
        if let Some(error) = &report.error {
            println!("  FAILED  {}: {}", report.title, error);
        } else if report.skipped {
            println!("  skipped {}", report.title);
        } else {
            println!("  indexed {} ({} chunks)", report.title, report.chunks_indexed);
        }
    }
    println!("\nSetup complete.");
    Ok(())
}

fn inventory(registry: &ManualRegistry) -> Result<()> {
    println!("{:-<70}", "");
    for manual in registry.all() {
        let status = if manual.exists() { "ok     " } else { "missing" };
        println!("[{}] {}", status, manual.title);
        println!(
            "          {} / {} / {} (tier {})",
            manual.equipment_type, manual.equipment_brand, manual.equipment_model, manual.tier
        );
        println!("          {}", manual.pdf_path.display());
    }
    println!("{:-<70}", "");
    Ok(())
}

async fn stats(config: &AssistantConfig) -> Result<()> {
    let store = open_store(config).await?;
    let total = store.count().await?;
    let entries = store.inventory().await?;

    println!("Indexed chunks: {}", total);
    println!("Indexed manuals: {}", entries.len());
    for entry in entries {
        println!(
            "  {}: {} chunks ({} / {})",
            entry.title, entry.chunks, entry.equipment_type, entry.equipment_brand
        );
    }
    Ok(())
}

async fn query(config: &AssistantConfig, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("empty question");
    }

    let engine = AssistantEngine::open(config).await?;
    let outcome = engine
        .query(question, &ConversationContext::default(), None)
        .await?;

    println!("{}", outcome.answer);
    println!(
        "\n[{} passages, equipment: {}]",
        outcome.passages.len(),
        outcome
            .resolved_lock
            .equipment_type
            .as_deref()
            .unwrap_or("unresolved"),
    );
    Ok(())
}

async fn chat(config: &AssistantConfig) -> Result<()> {
    let engine = AssistantEngine::open(config).await?;

    println!("Store Manual Assistant. Ask about any restaurant equipment.");
    println!("Commands: 'clear' resets the conversation, 'exit' quits.\n");

    let mut context = ConversationContext::default();
    let mut last_options: Vec<String> = Vec::new();

    let stdin = io::stdin();
    loop {
        print!("you> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                context.clear();
                last_options.clear();
                println!("(conversation cleared)\n");
                continue;
            }
            _ => {}
        }

        // A bare number picks one of the previous answer's follow-up
        // options; expand it back into the full option text.
        let question = match input.parse::<usize>() {
            Ok(n) if n >= 1 && n <= last_options.len() => last_options[n - 1].clone(),
            _ => input.to_string(),
        };

        match engine.query(&question, &context, None).await {
            Ok(outcome) => {
                println!("\n{}\n", outcome.answer);
                last_options = extract_followup_options(&outcome.answer);
                context.advance(&question, &outcome.answer, &outcome.resolved_lock);
            }
            Err(e) => {
                eprintln!("error: {:#}\n", e);
            }
        }
    }

    Ok(())
}

async fn reset_index(config: &AssistantConfig) -> Result<()> {
    let store = open_store(config).await?;
    store.clear().await?;
    println!("Index cleared.");
    Ok(())
}
