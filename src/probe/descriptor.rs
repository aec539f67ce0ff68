//! Advertised routing descriptor
//!
//! The agent tab page embeds its routing parameters as
//! `window.chatParams = '<base64 JSON>'`. The backend URL inside that JSON
//! carries the port the page will talk to.

use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use crate::core::error::{DescriptorError, ProbeError};
use crate::core::types::AdvertisedRoute;

/// Decodes the descriptor embedded in the agent tab page
#[derive(Debug, Clone)]
pub struct DescriptorParser {
    assignment: Regex,
    url_field: String,
}

impl DescriptorParser {
    pub fn new(variable: &str, url_field: impl Into<String>) -> Result<Self, regex::Error> {
        let assignment = Regex::new(&format!(
            r"{}\s*=\s*'([A-Za-z0-9+/=]+)'",
            regex::escape(variable)
        ))?;
        Ok(Self {
            assignment,
            url_field: url_field.into(),
        })
    }

    /// Locate, decode and interpret the descriptor in a page body
    pub fn parse(&self, body: &str) -> Result<AdvertisedRoute, DescriptorError> {
        let encoded = self
            .assignment
            .captures(body)
            .and_then(|caps| caps.get(1))
            .ok_or(DescriptorError::AssignmentNotFound)?
            .as_str();

        let bytes = STANDARD.decode(encoded)?;
        let text = String::from_utf8(bytes)?;
        let raw: serde_json::Value = serde_json::from_str(&text)?;

        let url = raw
            .get(&self.url_field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| DescriptorError::MissingField {
                field: self.url_field.clone(),
            })?
            .to_string();

        let port = port_from_url(&url).ok_or_else(|| DescriptorError::NoPortInUrl { url: url.clone() })?;

        Ok(AdvertisedRoute { port, url, raw })
    }
}

fn colon_port() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r":(\d+)/").expect("colon port pattern is valid"))
}

/// First `:<digits>/` in the URL, e.g. `https://127.0.0.1:42101/`.
///
/// Default ports written out (`:443/`) and scheme-less values
/// (`127.0.0.1:42101/ls`) both count.
fn port_from_url(url: &str) -> Option<u16> {
    let digits = colon_port().captures(url)?.get(1)?.as_str();
    digits.parse::<u16>().ok().filter(|port| *port != 0)
}

/// Fetch the agent tab page, bypassing any cache, and decode its descriptor
pub async fn fetch_advertised(
    client: &reqwest::Client,
    parser: &DescriptorParser,
    port: u16,
    timeout: Duration,
) -> Result<AdvertisedRoute, ProbeError> {
    let cache_buster = chrono::Utc::now().timestamp_millis();
    let url = format!("http://127.0.0.1:{}/?_={}", port, cache_buster);

    let body = client
        .get(&url)
        .header(CACHE_CONTROL, "no-cache")
        .header(PRAGMA, "no-cache")
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    Ok(parser.parse(&body)?)
}
