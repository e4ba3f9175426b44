use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha1::Sha1;
use std::time::Duration;

use crate::config::TwilioConfig;

type HmacSha1 = Hmac<Sha1>;

const TWILIO_API_BASE: &str = "https://api.twilio.com";
const TWILIO_MEDIA_HOST: &str = "api.twilio.com";

/// Header carrying Twilio's webhook signature.
pub const SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Largest attachment the bot will download.
pub const MAX_MEDIA_BYTES: usize = 5 * 1024 * 1024;

/// Longest body Twilio accepts for a single WhatsApp message.
pub const MAX_MESSAGE_CHARS: usize = 1600;

/// Media download and outbound messages for the WhatsApp channel.
#[derive(Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    config: TwilioConfig,
    api_base: Url,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> anyhow::Result<Self> {
        Self::with_base(config, TWILIO_API_BASE)
    }

    pub fn with_base(config: TwilioConfig, api_base: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Twilio HTTP client")?;
        let api_base = Url::parse(api_base.trim_end_matches('/')).context("Invalid Twilio API base URL")?;
        Ok(Self {
            client,
            config,
            api_base,
        })
    }

    pub fn config(&self) -> &TwilioConfig {
        &self.config
    }

    /// Whether `signature` is Twilio's signature of a webhook POST to `url`
    /// carrying `params`.
    pub fn signature_is_valid(&self, url: &str, params: &[(String, String)], signature: &str) -> bool {
        let Ok(expected) = BASE64.decode(signature.trim()) else {
            return false;
        };
        webhook_mac(&self.config.auth_token, url, params).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
    }

    /// Media is only fetched over https from Twilio, or from the configured
    /// API base, since the request carries the account credentials.
    fn trusted_media_url(&self, raw: &str) -> anyhow::Result<Url> {
        let url = Url::parse(raw.trim()).context("Invalid media URL")?;
        let from_twilio = url.scheme() == "https" && url.host_str() == Some(TWILIO_MEDIA_HOST);
        if from_twilio || url.origin() == self.api_base.origin() {
            Ok(url)
        } else {
            anyhow::bail!(
                "Refusing to fetch media from untrusted host {}",
                url.host_str().unwrap_or("<none>")
            )
        }
    }

    /// Fetch a media attachment; Twilio media URLs require account basic auth.
    pub async fn download_media(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.trusted_media_url(url)?;
        let mut response = self
            .client
            .get(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await
            .context("Media download failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Media download returned {}", response.status());
        }
        if response.content_length().is_some_and(|len| len > MAX_MEDIA_BYTES as u64) {
            anyhow::bail!("Media is larger than {} bytes", MAX_MEDIA_BYTES);
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.context("Media download interrupted")? {
            if body.len() + chunk.len() > MAX_MEDIA_BYTES {
                anyhow::bail!("Media is larger than {} bytes", MAX_MEDIA_BYTES);
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Send a message through the Messages API, split into as many
    /// messages as the body needs.
    pub async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.as_str().trim_end_matches('/'),
            self.config.account_sid
        );

        for chunk in split_message(body, MAX_MESSAGE_CHARS) {
            let params = [
                ("To", to),
                ("From", self.config.whatsapp_from.as_str()),
                ("Body", chunk.as_str()),
            ];
            let response = self
                .client
                .post(&url)
                .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
                .form(&params)
                .send()
                .await
                .context("Twilio message request failed")?;

            if !response.status().is_success() {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                anyhow::bail!("Twilio rejected message with {}: {}", status, detail);
            }
        }
        tracing::debug!("Sent WhatsApp message to {}", to);
        Ok(())
    }
}

/// HMAC-SHA1 over the webhook URL followed by every parameter name and
/// value, sorted by name.
pub(crate) fn webhook_mac(auth_token: &str, url: &str, params: &[(String, String)]) -> Option<HmacSha1> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Some(mac)
}

/// Split text into pieces of at most `max` chars, preferring to break after
/// a newline in the second half of a piece.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max || max == 0 {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + max).min(chars.len());
        if end < chars.len() {
            if let Some(nl) = chars[start + max / 2..end].iter().rposition(|&c| c == '\n') {
                end = start + max / 2 + nl + 1;
            }
        }
        parts.push(chars[start..end].iter().collect::<String>());
        start = end;
    }
    parts
}
