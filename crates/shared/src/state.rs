use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// On-disk shape of the pending queue (events.json)
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EventQueue {
    #[serde(default)]
    pub event_uris: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub total_events: usize,
}

/// On-disk shape of the processed set (processed_events.json)
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProcessedEvents {
    #[serde(default)]
    pub processed_uris: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub total_processed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEvent {
    pub uri: String,
    pub error: String,
    pub failed_at: String,
}

/// On-disk shape of the failure log (failed_events.json)
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FailedEvents {
    #[serde(default)]
    pub failed: Vec<FailedEvent>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub total_failed: usize,
}

fn read_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;

    // A file that exists but does not parse is a hard error. Treating it as
    // empty would let already-processed events back into the queue.
    serde_json::from_str(&content).with_context(|| {
        format!(
            "Failed to parse state file {}. The file may be corrupted; fix or remove it before rerunning.",
            path.display()
        )
    })
}

fn write_pretty<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize state")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;
    Ok(())
}

/// Load the pending queue. A missing file is an empty queue.
pub fn load_queue(path: &Path) -> Result<Vec<String>> {
    let queue: EventQueue = read_or_default(path)?;
    Ok(queue.event_uris)
}

pub fn save_queue(path: &Path, event_uris: &[String]) -> Result<()> {
    let queue = EventQueue {
        event_uris: event_uris.to_vec(),
        updated_at: Some(Utc::now().to_rfc3339()),
        total_events: event_uris.len(),
    };
    write_pretty(path, &queue)
}

/// Load the processed set. A missing file is an empty set.
pub fn load_processed(path: &Path) -> Result<HashSet<String>> {
    let processed: ProcessedEvents = read_or_default(path)?;
    Ok(processed.processed_uris.into_iter().collect())
}

/// Append one URI to the processed set. Idempotent: re-marking an already
/// processed URI leaves the file unchanged apart from the timestamp.
pub fn mark_processed(path: &Path, uri: &str) -> Result<()> {
    let mut uris = load_processed(path)?;
    uris.insert(uri.to_string());

    let mut processed_uris: Vec<String> = uris.into_iter().collect();
    processed_uris.sort();

    let data = ProcessedEvents {
        total_processed: processed_uris.len(),
        processed_uris,
        updated_at: Some(Utc::now().to_rfc3339()),
    };
    write_pretty(path, &data)
}

pub fn load_failed(path: &Path) -> Result<Vec<FailedEvent>> {
    let failed: FailedEvents = read_or_default(path)?;
    Ok(failed.failed)
}

/// Append one failure record so the URI is not retried forever and the
/// error stays inspectable.
pub fn record_failure(path: &Path, uri: &str, error: &str) -> Result<()> {
    let mut failed = load_failed(path)?;
    failed.push(FailedEvent {
        uri: uri.to_string(),
        error: error.to_string(),
        failed_at: Utc::now().to_rfc3339(),
    });

    let data = FailedEvents {
        total_failed: failed.len(),
        failed,
        updated_at: Some(Utc::now().to_rfc3339()),
    };
    write_pretty(path, &data)
}

/// Filter freshly fetched candidates against the processed set and the
/// current queue, preserving fetch order (most recent first), dropping
/// in-batch duplicates, and keeping at most `max` survivors.
pub fn dedup_candidates(
    candidates: &[String],
    processed: &HashSet<String>,
    queued: &[String],
    max: usize,
) -> Vec<String> {
    let queued_set: HashSet<&str> = queued.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut survivors = Vec::new();

    for uri in candidates {
        if survivors.len() >= max {
            break;
        }
        if processed.contains(uri.as_str()) || queued_set.contains(uri.as_str()) {
            continue;
        }
        if !seen.insert(uri.as_str()) {
            continue;
        }
        survivors.push(uri.clone());
    }

    survivors
}
