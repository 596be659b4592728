use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::audio::domain::translation_service::TranslationService;
use crate::shared::error::ServiceError;
use crate::shared::language::LanguageCode;

/// Translator speaking the LibreTranslate `POST /translate` protocol.
pub struct HttpTranslator {
    client: Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpTranslator {
    /// `timeout` bounds each HTTP request; the pipeline applies its own stage
    /// timeout on top.
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
        })
    }
}

impl TranslationService for HttpTranslator {
    fn translate(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<String, ServiceError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let request = TranslateRequest {
            q: text,
            source: source.primary(),
            target: target.primary(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        let response = self.client.post(&self.url).json(&request).send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(error_message(status.as_u16(), &body).into());
        }
        parse_translation(&body)
    }
}

fn parse_translation(body: &str) -> Result<String, ServiceError> {
    let parsed: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| format!("unexpected translation response: {e}"))?;
    Ok(parsed.translated_text)
}

fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => format!("translation service returned {status}: {}", err.error),
        Err(_) => format!("translation service returned {status}"),
    }
}
