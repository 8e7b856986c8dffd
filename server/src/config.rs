// Configuration loaded from the environment at startup

use std::time::Duration;

use llm_core::LlmConfig;
use tracing::warn;
use tts_core::{PlayerCommand, SpeechConfig, VoiceSettings};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
pub const DEFAULT_SPEECH_MODEL_ID: &str = "eleven_turbo_v2_5";
pub const DEFAULT_SPEECH_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_PLAYER: &str = "ffplay -nodisp -autoexit -loglevel quiet -i pipe:0";

const DEFAULT_STABILITY: f32 = 0.5;
const DEFAULT_SIMILARITY_BOOST: f32 = 0.75;

/// Speech settings, present only when speech is enabled and usable.
#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub client: SpeechConfig,
    pub player: PlayerCommand,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub llm: LlmConfig,
    pub speech: Option<SpeechSettings>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            llm: LlmConfig {
                base_url: DEFAULT_LLM_BASE_URL.to_string(),
                api_key: None,
                model: DEFAULT_LLM_MODEL.to_string(),
                system_prompt: None,
                max_tokens: None,
            },
            speech: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = var("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let rate_limit_per_minute = var("RATE_LIMIT_PER_MINUTE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_minute);

        let request_timeout_secs = var("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let llm = LlmConfig {
            base_url: var("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
            api_key: var("OPENAI_API_KEY"),
            model: var("LLM_MODEL").unwrap_or(defaults.llm.model),
            system_prompt: var("LLM_SYSTEM_PROMPT"),
            max_tokens: var("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()),
        };

        Self {
            port,
            rate_limit_per_minute,
            request_timeout_secs,
            cors_allowed_origins,
            llm,
            speech: speech_from_lookup(&var),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn speech_from_lookup<F>(var: &F) -> Option<SpeechSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let enabled = var("TTS_ENABLED")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
    if !enabled {
        return None;
    }

    let Some(api_key) = var("ELEVENLABS_API_KEY") else {
        warn!("TTS_ENABLED is set but ELEVENLABS_API_KEY is missing, speech disabled");
        return None;
    };

    let player = var("TTS_PLAYER")
        .and_then(|line| PlayerCommand::parse(&line))
        .or_else(|| PlayerCommand::parse(DEFAULT_PLAYER))?;

    Some(SpeechSettings {
        client: SpeechConfig {
            base_url: var("ELEVENLABS_BASE_URL").unwrap_or_else(|| DEFAULT_SPEECH_BASE_URL.to_string()),
            api_key,
            voice_id: var("ELEVENLABS_VOICE_ID").unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            model_id: var("ELEVENLABS_MODEL_ID")
                .unwrap_or_else(|| DEFAULT_SPEECH_MODEL_ID.to_string()),
            voice_settings: VoiceSettings {
                stability: DEFAULT_STABILITY,
                similarity_boost: DEFAULT_SIMILARITY_BOOST,
            },
            timeout: var("TTS_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs),
        },
        player,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8085);
        assert_eq!(config.rate_limit_per_minute, 60);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert!(config.llm.api_key.is_none());
        assert!(config.cors_allowed_origins.is_none());
        assert!(config.speech.is_none());
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("REQUEST_TIMEOUT_SECS", "-1")]);
        assert_eq!(config.port, 8085);
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn test_max_tokens_from_env() {
        let config = config_from(&[("LLM_MAX_TOKENS", "256")]);
        assert_eq!(config.llm.max_tokens, Some(256));
        assert_eq!(config_from(&[]).llm.max_tokens, None);
        assert_eq!(config_from(&[("LLM_MAX_TOKENS", "lots")]).llm.max_tokens, None);
    }

    #[test]
    fn test_speech_enabled_with_defaults() {
        let config = config_from(&[("TTS_ENABLED", "true"), ("ELEVENLABS_API_KEY", "sk-1")]);
        let speech = config.speech.unwrap();
        assert_eq!(speech.client.api_key, "sk-1");
        assert_eq!(speech.client.voice_id, DEFAULT_VOICE_ID);
        assert_eq!(speech.client.model_id, DEFAULT_SPEECH_MODEL_ID);
        assert_eq!(speech.client.base_url, DEFAULT_SPEECH_BASE_URL);
        assert!(speech.client.timeout.is_none());
        assert_eq!(speech.player.program, "ffplay");
        assert_eq!(speech.player.args.last().map(String::as_str), Some("pipe:0"));
    }

    #[test]
    fn test_speech_without_key_is_disabled() {
        let config = config_from(&[("TTS_ENABLED", "1"), ("ELEVENLABS_API_KEY", "  ")]);
        assert!(config.speech.is_none());
    }

    #[test]
    fn test_speech_overrides() {
        let config = config_from(&[
            ("TTS_ENABLED", "yes"),
            ("ELEVENLABS_API_KEY", "sk-1"),
            ("ELEVENLABS_VOICE_ID", "voice-x"),
            ("TTS_TIMEOUT_SECS", "15"),
            ("TTS_PLAYER", "mpv --no-video -"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
        ]);
        let speech = config.speech.unwrap();
        assert_eq!(speech.client.voice_id, "voice-x");
        assert_eq!(speech.client.timeout, Some(Duration::from_secs(15)));
        assert_eq!(speech.player, PlayerCommand::new("mpv", &["--no-video", "-"]));
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
    }
}
