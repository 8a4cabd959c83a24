use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::article::Article;
use crate::eventregistry::EventInfo;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Prompt asking for the structured article. The JSON keys here must stay in
/// sync with the `Article` struct.
pub fn build_prompt(info: &EventInfo) -> String {
    let title = match info.title.text() {
        "" => "No Title Provided",
        t => t,
    };
    let summary = match info.summary.text() {
        "" => "No Summary Provided",
        s => s,
    };
    let concepts: Vec<&str> = info
        .concepts
        .iter()
        .map(|c| c.label.text())
        .filter(|label| !label.is_empty())
        .collect();

    format!(
        r#"Act as a senior financial journalist with a writing style that blends the analytical depth of The Wall Street Journal with the global perspective of The Financial Times.

Your task is to generate a comprehensive news article based on the following event data:
- Event Title: {title}
- Event Summary: {summary}
- Key Concepts: {concepts}

Generate the article in a structured JSON format. The JSON object must contain the following keys: "headline", "summary", "key_points", "body", "tags", "reflection_questions", "calls_to_action".

Follow these specific instructions:
1. Headline: a compelling, professional headline.
2. Summary: a concise, one-paragraph summary of the most critical information.
3. Key points: a list of 3-5 bullet points highlighting the main takeaways.
4. Body: a detailed, multi-paragraph article. Provide context and perspective, avoid speculation, and ground all claims in the provided data.
5. Tags: a list of relevant keywords for categorization (e.g., "bitcoin-mining", "hashrate", "market-analysis").
6. Reflection questions: 2-3 questions that encourage the reader to think critically about the implications.
7. Calls to action: 1-2 prompts for reader engagement.

Ensure the entire output is a single, valid JSON object. Do not include any text or formatting outside of the JSON structure."#,
        concepts = concepts.join(", "),
    )
}

fn build_request(prompt: &str) -> GeminiRequest {
    GeminiRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: 0.4,
            max_output_tokens: 4096,
        },
    }
}

/// Parse the model's reply into an article. Models often wrap JSON in
/// markdown code fences even when told not to, so those are tolerated.
pub fn parse_article_response(text: &str) -> Result<Article> {
    let cleaned = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned)
        .context("Gemini response was not the requested JSON article structure")
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// One generation call per event, no retries. If the service fails, the
    /// caller records the failure instead of substituting synthetic content.
    pub async fn generate_article(&self, info: &EventInfo) -> Result<Article> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key,
        );

        let request = build_request(&build_prompt(info));

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("Gemini API error: {} - {}", status, error_text);
        }

        let gemini_response = response
            .json::<GeminiResponse>()
            .await
            .context("Failed to parse Gemini API response")?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| anyhow::anyhow!("Gemini response contained no candidates"))?;

        parse_article_response(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventregistry::{Concept, LangText};

    fn info(title: &str, summary: &str, concepts: &[&str]) -> EventInfo {
        EventInfo {
            title: LangText {
                eng: Some(title.to_string()),
            },
            summary: LangText {
                eng: Some(summary.to_string()),
            },
            concepts: concepts
                .iter()
                .map(|label| Concept {
                    label: LangText {
                        eng: Some(label.to_string()),
                    },
                })
                .collect(),
        }
    }

    const ARTICLE_JSON: &str = r#"{
        "headline": "Miners Weather the Halving",
        "summary": "A summary.",
        "key_points": ["One", "Two", "Three"],
        "body": "Paragraph one.\n\nParagraph two.",
        "tags": ["bitcoin-mining"],
        "reflection_questions": ["What next?"],
        "calls_to_action": ["Share your view"]
    }"#;

    // ==================== Prompt Tests ====================

    #[test]
    fn test_prompt_includes_event_data() {
        let prompt = build_prompt(&info(
            "Hashrate record",
            "Network hashrate peaked",
            &["Bitcoin", "Mining"],
        ));

        assert!(prompt.contains("Event Title: Hashrate record"));
        assert!(prompt.contains("Event Summary: Network hashrate peaked"));
        assert!(prompt.contains("Key Concepts: Bitcoin, Mining"));
        // The keys the parser expects must be requested
        for key in ["headline", "key_points", "body", "tags"] {
            assert!(prompt.contains(key), "prompt missing key {key}");
        }
    }

    #[test]
    fn test_prompt_defaults_for_empty_fields() {
        let prompt = build_prompt(&info("", "", &[]));

        assert!(prompt.contains("Event Title: No Title Provided"));
        assert!(prompt.contains("Event Summary: No Summary Provided"));
    }

    // ==================== Request Body Tests ====================

    #[test]
    fn test_request_body_structure() {
        let request = build_request("write something");
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["contents"][0]["parts"][0]["text"], "write something");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.4).abs() < 1e-6);
    }

    // ==================== Response Parsing Tests ====================

    #[test]
    fn test_parse_bare_json() {
        let article = parse_article_response(ARTICLE_JSON).unwrap();
        assert_eq!(article.headline, "Miners Weather the Halving");
        assert_eq!(article.key_points.len(), 3);
    }

    #[test]
    fn test_parse_fenced_json() {
        let fenced = format!("```json\n{}\n```", ARTICLE_JSON);
        let article = parse_article_response(&fenced).unwrap();
        assert_eq!(article.headline, "Miners Weather the Halving");
    }

    #[test]
    fn test_parse_fenced_without_language_tag() {
        let fenced = format!("```\n{}\n```", ARTICLE_JSON);
        let article = parse_article_response(&fenced).unwrap();
        assert_eq!(article.tags, vec!["bitcoin-mining"]);
    }

    #[test]
    fn test_parse_prose_is_an_error() {
        let result = parse_article_response("Sorry, I cannot write that article.");
        assert!(result.is_err());
    }

    #[test]
    fn test_response_text_extraction_shape() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "hello"}]}}
            ]
        }"#;

        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.candidates[0].content.parts[0].text, "hello");
    }
}
