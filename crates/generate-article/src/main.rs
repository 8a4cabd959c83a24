use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use shared::article::{save_article, GeneratedArticle};
use shared::eventregistry::{EventInfo, EventRegistryClient};
use shared::{state, Config, GeminiClient};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "generate-article")]
#[command(about = "Generate articles for queued news events and mark them processed")]
struct Args {
    /// Queue file holding pending events
    #[arg(long, default_value = "events.json")]
    queue: PathBuf,

    /// File tracking already-processed events
    #[arg(long, default_value = "processed_events.json")]
    processed_file: PathBuf,

    /// File recording events that failed to generate
    #[arg(long, default_value = "failed_events.json")]
    failed_file: PathBuf,

    /// Directory receiving generated article files
    #[arg(long, default_value = "articles")]
    articles_dir: PathBuf,

    /// Process at most this many queue entries (default: all)
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;

    let queue = state::load_queue(&args.queue)?;
    if queue.is_empty() {
        println!("No events to process.");
        return Ok(());
    }

    let take = args.limit.unwrap_or(queue.len()).min(queue.len());
    let (to_process, deferred) = queue.split_at(take);
    println!("Found {} events to process", to_process.len());

    let registry = EventRegistryClient::new(config.event_registry_api_key)?;
    let gemini = GeminiClient::new(config.gemini_api_key)?;

    // Event details can be fetched concurrently; generation stays sequential
    // so articles land in queue order.
    println!("\n🌐 Fetching event details...");
    let registry_ref = &registry;
    let infos: Vec<(String, Result<EventInfo>)> = stream::iter(to_process.to_vec())
        .map(|uri| async move {
            let info = registry_ref.event_info(&uri).await;
            (uri, info)
        })
        .buffered(4)
        .collect()
        .await;

    let mut processed_count = 0;
    let mut failed_count = 0;

    for (uri, info_result) in infos {
        println!("\nProcessing event: {}", uri);

        let outcome = match info_result {
            Ok(info) => generate_one(&gemini, &args.articles_dir, &uri, &info).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(filepath) => {
                println!("✓ Generated and saved article: {}", filepath.display());
                state::mark_processed(&args.processed_file, &uri)?;
                processed_count += 1;
            }
            Err(e) => {
                eprintln!("✗ Failed to process event {}: {:#}", uri, e);
                state::record_failure(&args.failed_file, &uri, &format!("{:#}", e))?;
                failed_count += 1;
            }
        }
    }

    // Handled entries leave the queue either way; deferred entries stay.
    state::save_queue(&args.queue, deferred)?;

    println!("\nArticle generation finished.");
    println!("Successfully processed: {} events", processed_count);
    println!("Failed to process: {} events", failed_count);
    if !deferred.is_empty() {
        println!("Remaining in queue: {} events", deferred.len());
    }

    if processed_count == 0 && failed_count > 0 {
        anyhow::bail!("All {} attempted events failed to generate", failed_count);
    }

    Ok(())
}

async fn generate_one(
    gemini: &GeminiClient,
    articles_dir: &std::path::Path,
    uri: &str,
    info: &EventInfo,
) -> Result<PathBuf> {
    let article = gemini
        .generate_article(info)
        .await
        .context("Article generation failed")?;

    let generated = GeneratedArticle::new(uri, article);
    save_article(articles_dir, &generated)
}
