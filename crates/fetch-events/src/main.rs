use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use shared::eventregistry::{EventRegistryClient, QueryStyle, SearchQuery};
use shared::{state, Config};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fetch-events")]
#[command(about = "Fetch recent Bitcoin mining news events with deduplication")]
struct Args {
    /// Maximum number of new events to add to the queue
    #[arg(long, default_value = "5")]
    max_events: usize,

    /// How far back to look for events, in minutes
    #[arg(long, default_value = "90")]
    recency_minutes: u32,

    /// Search window in days (overrides --recency-minutes)
    #[arg(long)]
    days_back: Option<u32>,

    /// Queue file receiving pending events
    #[arg(long, default_value = "events.json")]
    queue: PathBuf,

    /// File tracking already-processed events
    #[arg(long, default_value = "processed_events.json")]
    processed_file: PathBuf,

    /// Run summary format: json, or uris (one per line)
    #[arg(long, default_value = "json")]
    output_format: String,

    /// Replace the built-in mining query with a single keyword
    #[arg(long)]
    keyword: Option<String>,

    /// Skip the processed-set filter and fetch anyway
    #[arg(long)]
    force: bool,

    /// Test mode: no API calls, synthesized event URIs
    #[arg(long)]
    dry_run: bool,

    /// Clamp the window and count for faster, more reliable queries
    #[arg(long)]
    fast_mode: bool,
}

#[derive(Serialize)]
struct RunSummary {
    new_events_added: usize,
    total_events_in_queue: usize,
    fetch_time: String,
    new_event_uris: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.output_format != "json" && args.output_format != "uris" {
        anyhow::bail!(
            "Invalid output format: {}. Use 'json' or 'uris'",
            args.output_format
        );
    }

    let mut recency_minutes = match args.days_back {
        Some(days) => days * 24 * 60,
        None => args.recency_minutes,
    };
    let mut max_events = args.max_events;

    if args.fast_mode {
        eprintln!("🚀 Fast mode: clamping window to 2 hours and count to 10");
        recency_minutes = recency_minutes.min(120);
        max_events = max_events.min(10);
    }

    let processed = if args.force {
        eprintln!("⚠ --force: skipping the processed-set filter");
        HashSet::new()
    } else {
        state::load_processed(&args.processed_file)?
    };
    eprintln!("Loaded {} previously processed events", processed.len());

    let existing_queue = state::load_queue(&args.queue)?;
    eprintln!("Found {} events already in queue", existing_queue.len());

    let candidates: Vec<String> = if args.dry_run {
        eprintln!("🧪 Dry run: no API calls will be made");
        (1..=max_events.min(3))
            .map(|i| format!("dry-run-event-{}", i))
            .collect()
    } else {
        let api_key = Config::event_registry_only()?;
        let client = EventRegistryClient::new(api_key)?;

        let style = match &args.keyword {
            Some(keyword) => QueryStyle::Simple(keyword.clone()),
            None => QueryStyle::Mining,
        };
        let query = SearchQuery {
            recency_minutes,
            max_events,
            style,
        };

        let events = client
            .search_with_fallback(&query)
            .await
            .context("Event search failed")?;

        for event in &events {
            eprintln!("  - {}: {}", event.uri, event.title.text());
        }

        events.into_iter().map(|e| e.uri).collect()
    };

    let new_uris = state::dedup_candidates(&candidates, &processed, &existing_queue, max_events);
    let skipped = candidates.len() - new_uris.len();
    if skipped > 0 {
        eprintln!("Skipped {} already processed or queued events", skipped);
    }

    let mut updated_queue = existing_queue;
    updated_queue.extend(new_uris.iter().cloned());
    state::save_queue(&args.queue, &updated_queue)?;

    eprintln!(
        "✓ Added {} new events to queue ({} total)",
        new_uris.len(),
        updated_queue.len()
    );

    if args.output_format == "uris" {
        for uri in &updated_queue {
            println!("{}", uri);
        }
    } else {
        let summary = RunSummary {
            new_events_added: new_uris.len(),
            total_events_in_queue: updated_queue.len(),
            fetch_time: Utc::now().to_rfc3339(),
            new_event_uris: new_uris,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}
