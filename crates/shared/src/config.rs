use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub event_registry_api_key: String,
    pub gemini_api_key: String,
}

impl Config {
    /// Load both API keys. Use this for stages that talk to both services.
    pub fn from_env() -> Result<Self> {
        Self::try_load_dotenv();

        let event_registry_api_key = env::var("EVENT_REGISTRY_API_KEY").context(
            "EVENT_REGISTRY_API_KEY not found.\n\n\
            To fix this, create ~/.config/mining-news/.env with:\n  \
            EVENT_REGISTRY_API_KEY=your_key_here\n  \
            GEMINI_API_KEY=your_key_here\n\n\
            Get your EventRegistry API key from: https://eventregistry.org/me",
        )?;

        let gemini_api_key = env::var("GEMINI_API_KEY").context(
            "GEMINI_API_KEY not found.\n\n\
            To fix this, create ~/.config/mining-news/.env with:\n  \
            EVENT_REGISTRY_API_KEY=your_key_here\n  \
            GEMINI_API_KEY=your_key_here\n\n\
            Get your Gemini API key from: https://aistudio.google.com/apikey",
        )?;

        Ok(Self {
            event_registry_api_key,
            gemini_api_key,
        })
    }

    /// Load only the EventRegistry key. The fetch stage never calls Gemini,
    /// so a missing Gemini key must not block it.
    pub fn event_registry_only() -> Result<String> {
        Self::try_load_dotenv();

        env::var("EVENT_REGISTRY_API_KEY").context(
            "EVENT_REGISTRY_API_KEY not found.\n\n\
            To fix this, create ~/.config/mining-news/.env with:\n  \
            EVENT_REGISTRY_API_KEY=your_key_here\n\n\
            Get your EventRegistry API key from: https://eventregistry.org/me",
        )
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/mining-news/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("mining-news").join(".env");
            if config_path.exists() {
                if dotenvy::from_path(&config_path).is_ok() {
                    return;
                }
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                if dotenvy::from_path(&home_path).is_ok() {
                    return;
                }
            }
        }

        // If none found, that's okay - environment variables might be set system-wide
    }
}
