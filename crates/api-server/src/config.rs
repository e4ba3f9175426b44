use anyhow::Context;
use llm_client::LlmConfig;
use std::str::FromStr;
use std::time::Duration;

/// Twilio account used for the WhatsApp channel.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub whatsapp_from: String,
    /// Public URL Twilio posts the webhook to; signatures are computed over
    /// it. Rebuilt from the `Host` header when unset.
    pub webhook_url: Option<String>,
}

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub polygon_api_key: String,
    pub polygon_rate_limit: usize,
    pub llm: LlmConfig,
    /// `None` when either credential is missing; media messages then get an error reply.
    pub twilio: Option<TwilioConfig>,
    pub lookback_days: i64,
    pub overview_poll: Duration,
    pub overview_backoff: Duration,
    pub request_timeout: Duration,
    /// Sessions untouched for this long are dropped.
    pub session_idle: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let polygon_api_key = get("POLYGON_API_KEY").context("POLYGON_API_KEY must be set")?;

        let llm_defaults = LlmConfig {
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            chat_model: "llama3-70b-8192".to_string(),
            narrative_model: "deepseek-r1-distill-llama-70b".to_string(),
            timeout: Duration::from_secs(120),
        };
        let llm = LlmConfig {
            api_key: get("GROQ_API_KEY"),
            base_url: get("LLM_BASE_URL").unwrap_or(llm_defaults.base_url),
            chat_model: get("LLM_CHAT_MODEL").unwrap_or(llm_defaults.chat_model),
            narrative_model: get("LLM_NARRATIVE_MODEL").unwrap_or(llm_defaults.narrative_model),
            timeout: Duration::from_secs(parse_or(get("LLM_TIMEOUT_SECS"), "LLM_TIMEOUT_SECS", 120)?),
        };

        let twilio = match (get("TWILIO_ACCOUNT_SID"), get("TWILIO_AUTH_TOKEN")) {
            (Some(account_sid), Some(auth_token)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                whatsapp_from: get("TWILIO_WHATSAPP_FROM")
                    .unwrap_or_else(|| "whatsapp:+14155238886".to_string()),
                webhook_url: get("TWILIO_WEBHOOK_URL"),
            }),
            _ => None,
        };

        let cors_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let lookback_days: i64 = parse_or(get("ANALYSIS_LOOKBACK_DAYS"), "ANALYSIS_LOOKBACK_DAYS", 365)?;
        if lookback_days <= 0 {
            anyhow::bail!("ANALYSIS_LOOKBACK_DAYS must be positive, got {}", lookback_days);
        }

        Ok(Self {
            port: parse_or(get("PORT"), "PORT", 5000)?,
            cors_origins,
            polygon_api_key,
            polygon_rate_limit: parse_or(get("POLYGON_RATE_LIMIT"), "POLYGON_RATE_LIMIT", 500)?,
            llm,
            twilio,
            lookback_days,
            overview_poll: Duration::from_secs(parse_or(get("OVERVIEW_POLL_SECS"), "OVERVIEW_POLL_SECS", 1)?),
            overview_backoff: Duration::from_secs(parse_or(get("OVERVIEW_BACKOFF_SECS"), "OVERVIEW_BACKOFF_SECS", 5)?),
            request_timeout: Duration::from_secs(parse_or(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", 300)?),
            session_idle: Duration::from_secs(parse_or(get("SESSION_IDLE_SECS"), "SESSION_IDLE_SECS", 86_400)?),
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}
