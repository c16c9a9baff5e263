//! Weather lookup tool (weatherapi.com `current.json`).
//!
//! Environment (see `config`):
//! * `WEATHER_API_KEY`: without it every lookup fails with
//!   `LookupError::MissingApiKey` before any network traffic.
//! * `WEATHER_API_BASE`: overrides the service base URL.
//!
//! A 200 response is returned verbatim as parsed JSON; the remote schema is
//! not validated. Any other status becomes `LookupError::Status` carrying the
//! status code and body.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::WeatherConfig;
use crate::error::{LookupError, StartupError, ToolError};
use crate::tools::{ToolDefinition, ToolParametersBuilder};

pub const WEATHER_TOOL_NAME: &str = "get_weather";

#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, StartupError> {
        let http = Client::builder()
            .user_agent(concat!("agro_relay_weather/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| StartupError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: config.timeout,
        })
    }

    /// Current conditions for `location` (a Nigerian state name in practice).
    #[instrument(name = "weather_lookup", skip(self), target = "tools")]
    pub async fn current(&self, location: &str) -> Result<Value, LookupError> {
        let api_key = self.api_key.as_deref().ok_or(LookupError::MissingApiKey)?;
        let url = format!("{}/current.json", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[("key", api_key), ("q", location)])
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_transport(e))?;
        debug!(target: "tools", status = %status, len = body.len(), "weather_response_raw");

        if status != StatusCode::OK {
            warn!(target: "tools", status = status.as_u16(), "weather_lookup_failed");
            return Err(LookupError::Status { status: status.as_u16(), body });
        }

        serde_json::from_str(&body).map_err(|e| LookupError::Malformed(e.to_string()))
    }

    fn map_transport(&self, e: reqwest::Error) -> LookupError {
        if e.is_timeout() {
            LookupError::Timeout(self.timeout)
        } else {
            // URL にはクエリの API キーが含まれる
            LookupError::Transport(e.without_url().to_string())
        }
    }
}

/// Tool declaration + handler backed by `client`.
pub fn build_weather_tool(client: WeatherClient) -> ToolDefinition {
    let parameters = ToolParametersBuilder::new_object()
        .add_string(
            "location",
            Some("A state in Nigeria (for example \"Lagos\" or \"Kano\") to get current weather for"),
        )
        .required("location")
        .additional_properties(false)
        .build();

    let client = Arc::new(client);
    ToolDefinition::new(
        WEATHER_TOOL_NAME,
        "Gets the current weather conditions of a Nigerian state and returns the weather service's JSON payload.",
        parameters,
        Arc::new(move |args: Value| {
            let client = Arc::clone(&client);
            async move {
                let location = args
                    .get("location")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ToolError::Failed("location must be a non-empty string".into()))?;
                Ok::<_, ToolError>(client.current(location).await?)
            }
            .boxed()
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_without_key() -> WeatherClient {
        WeatherClient::new(&WeatherConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn schema_contains_location() {
        let tool = build_weather_tool(client_without_key());
        assert_eq!(tool.name, WEATHER_TOOL_NAME);
        let v = tool.parameters.as_value();
        assert!(v["properties"].get("location").is_some());
        assert_eq!(tool.parameters.required(), vec!["location"]);
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let err = client_without_key().current("Lagos").await.unwrap_err();
        assert_eq!(err, LookupError::MissingApiKey);
    }

    #[tokio::test]
    async fn transport_error_omits_api_key() {
        let client = WeatherClient::new(&WeatherConfig {
            api_key: Some("SUPERSECRET123".into()),
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        let err = client.current("Lagos").await.unwrap_err();
        assert!(matches!(err, LookupError::Transport(_) | LookupError::Timeout(_)), "{err:?}");
        assert!(!err.to_string().contains("SUPERSECRET123"), "{err}");
        assert!(!format!("{err:?}").contains("SUPERSECRET123"));
    }

    #[tokio::test]
    async fn blank_location_is_a_tool_failure() {
        let tool = build_weather_tool(client_without_key());
        let err = tool.execute(json!({"location": "  "})).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[tokio::test]
    async fn handler_surfaces_lookup_error() {
        let tool = build_weather_tool(client_without_key());
        let err = tool.execute(json!({"location": "Lagos"})).await.unwrap_err();
        assert_eq!(err, ToolError::Lookup(LookupError::MissingApiKey));
    }
}
