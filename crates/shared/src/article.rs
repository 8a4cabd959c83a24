use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The structured article the generation model is asked to produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reflection_questions: Vec<String>,
    #[serde(default)]
    pub calls_to_action: Vec<String>,
}

/// An article as written to disk: provenance first, then the article fields
/// flattened alongside so the files stay flat and uploadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArticle {
    pub source_event_uri: String,
    pub generated_at: String,
    #[serde(flatten)]
    pub article: Article,
}

impl GeneratedArticle {
    pub fn new(source_event_uri: impl Into<String>, article: Article) -> Self {
        Self {
            source_event_uri: source_event_uri.into(),
            generated_at: Utc::now().to_rfc3339(),
            article,
        }
    }
}

/// Turn a headline into a safe article filename: lowercase, whitespace runs
/// become single dashes, anything outside [a-z0-9-_] is dropped, capped at
/// 100 chars before the extension.
pub fn sanitize_filename(headline: &str) -> String {
    let lowered = headline.to_lowercase();
    let mut slug = String::new();
    let mut last_was_space = false;

    for c in lowered.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                slug.push('-');
                last_was_space = true;
            }
        } else {
            last_was_space = false;
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
                slug.push(c);
            }
        }
    }

    slug.truncate(100);
    format!("{}.json", slug)
}

/// Write one generated article into `articles_dir`, creating the directory
/// if needed. Returns the path written.
pub fn save_article(articles_dir: &Path, generated: &GeneratedArticle) -> Result<PathBuf> {
    fs::create_dir_all(articles_dir).with_context(|| {
        format!(
            "Failed to create articles directory: {}",
            articles_dir.display()
        )
    })?;

    let filename = sanitize_filename(&generated.article.headline);
    let filepath = articles_dir.join(filename);

    let json = serde_json::to_string_pretty(generated).context("Failed to serialize article")?;
    fs::write(&filepath, json)
        .with_context(|| format!("Failed to write article file: {}", filepath.display()))?;

    Ok(filepath)
}

pub fn load_article(filepath: &Path) -> Result<GeneratedArticle> {
    if !filepath.exists() {
        anyhow::bail!("Article file not found: {}", filepath.display());
    }

    let content = fs::read_to_string(filepath)
        .with_context(|| format!("Failed to read article file: {}", filepath.display()))?;

    serde_json::from_str(&content).with_context(|| {
        format!(
            "Failed to parse article JSON from {}. The file may not be a generated article.",
            filepath.display()
        )
    })
}
