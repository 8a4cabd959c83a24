use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::article::GeneratedArticle;

pub const TWEET_MAX_CHARS: usize = 280;

/// Space reserved for the "12/99 " style numbering prefix
const NUMBERING_RESERVE: usize = 10;

/// Paragraphs shorter than this are treated as filler, not thread material
const MIN_PARAGRAPH_CHARS: usize = 100;

const TOPIC_TERMS: &[&str] = &["mining", "bitcoin", "hashrate", "blockchain", "cryptocurrency"];

const DEFAULT_TAGS: &[&str] = &["bitcoin", "mining", "cryptocurrency"];

/// The JSON shape emitted for a finished thread
#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread: Vec<String>,
    pub total_tweets: usize,
    pub created_at: String,
    pub source_article: SourceArticle,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourceArticle {
    pub headline: String,
    pub generated_at: String,
    pub source_event_uri: String,
}

impl ThreadSummary {
    pub fn new(thread: Vec<String>, article: &GeneratedArticle) -> Self {
        Self {
            total_tweets: thread.len(),
            thread,
            created_at: Utc::now().to_rfc3339(),
            source_article: SourceArticle {
                headline: article.article.headline.clone(),
                generated_at: article.generated_at.clone(),
                source_event_uri: article.source_event_uri.clone(),
            },
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn clamp_chars(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Split on sentence boundaries: a `.`, `!`, or `?` followed by whitespace
/// (or end of input) ends a sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map(|n| n.is_whitespace()).unwrap_or(true)
        {
            while chars.peek().map(|n| n.is_whitespace()).unwrap_or(false) {
                chars.next();
            }
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Split text into chunks that fit a tweet once the numbering prefix is
/// added. Sentences are kept whole where possible, then split on words, and
/// a single over-long word is hard-truncated.
pub fn split_text(text: &str, max_length: usize) -> Vec<String> {
    let effective = max_length.saturating_sub(NUMBERING_RESERVE);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, chunks: &mut Vec<String>| {
        let chunk = current.trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        current.clear();
    };

    for sentence in split_sentences(text) {
        if char_len(&current) + char_len(&sentence) + 1 <= effective {
            if current.is_empty() {
                current = sentence;
            } else {
                current.push(' ');
                current.push_str(&sentence);
            }
            continue;
        }

        flush(&mut current, &mut chunks);

        if char_len(&sentence) <= effective {
            current = sentence;
            continue;
        }

        // Sentence alone overflows a tweet: fall back to word packing
        for word in sentence.split_whitespace() {
            if char_len(&current) + char_len(word) + 1 > effective {
                flush(&mut current, &mut chunks);
                if char_len(word) > effective {
                    chunks.push(clamp_chars(word, effective));
                    continue;
                }
            }
            if current.is_empty() {
                current = word.to_string();
            } else {
                current.push(' ');
                current.push_str(word);
            }
        }
    }

    flush(&mut current, &mut chunks);
    chunks
}

fn hashtags(tags: &[String]) -> String {
    let tags: Vec<String> = if tags.is_empty() {
        DEFAULT_TAGS.iter().map(|t| t.to_string()).collect()
    } else {
        tags.to_vec()
    };

    tags.iter()
        .take(3)
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Paragraphs worth quoting: long enough to carry a fact and actually about
/// the topic. The opening and closing paragraphs are skipped as intro/outro.
fn informative_paragraphs(body: &str) -> Vec<&str> {
    let paragraphs: Vec<&str> = body
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.len() <= 2 {
        return Vec::new();
    }

    paragraphs[1..paragraphs.len() - 1]
        .iter()
        .copied()
        .filter(|p| {
            let lowered = p.to_lowercase();
            char_len(p) > MIN_PARAGRAPH_CHARS
                && TOPIC_TERMS.iter().any(|term| lowered.contains(term))
        })
        .collect()
}

/// Assemble the thread: headline hook, key takeaways, the meatiest body
/// paragraphs, and a closing tweet with hashtags, numbered `i/N`.
pub fn build_thread(article: &GeneratedArticle, max_tweets: usize) -> Vec<String> {
    let max_tweets = max_tweets.max(2);
    let mut tweets: Vec<String> = Vec::new();

    // Tweet 1: headline hook
    let mut first = format!("🧵 THREAD: {}", article.article.headline);
    let summary = article.article.summary.trim();
    if !summary.is_empty() && char_len(&first) + char_len(summary) + 3 < 270 {
        first.push_str("\n\n");
        first.push_str(summary);
    }
    tweets.push(clamp_chars(&first, TWEET_MAX_CHARS - NUMBERING_RESERVE));

    // Key takeaways, at most two tweets' worth
    if !article.article.key_points.is_empty() {
        let key_points_text = format!(
            "Key takeaways:\n\n{}",
            article
                .article
                .key_points
                .iter()
                .take(4)
                .map(|point| format!("• {}", point))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let budget = max_tweets.saturating_sub(tweets.len() + 1).min(2);
        tweets.extend(
            split_text(&key_points_text, TWEET_MAX_CHARS)
                .into_iter()
                .take(budget),
        );
    }

    // Body excerpts, leaving room for the closing tweet
    let remaining = max_tweets.saturating_sub(tweets.len() + 1);
    let mut used = 0;
    for paragraph in informative_paragraphs(&article.article.body) {
        if used >= remaining {
            break;
        }
        let chunks = split_text(paragraph, TWEET_MAX_CHARS);
        let take = chunks.len().min(remaining - used);
        used += take;
        tweets.extend(chunks.into_iter().take(take));
    }

    // Closing tweet
    let closing = format!(
        "That's a wrap! 🎯\n\nWhat are your thoughts on these developments in Bitcoin mining?\n\n{}",
        hashtags(&article.article.tags)
    );
    tweets.push(clamp_chars(&closing, TWEET_MAX_CHARS - NUMBERING_RESERVE));

    // Number the tweets
    let total = tweets.len();
    if total > 1 {
        tweets
            .into_iter()
            .enumerate()
            .map(|(i, tweet)| format!("{}/{} {}", i + 1, total, tweet))
            .collect()
    } else {
        tweets
    }
}
