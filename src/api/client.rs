//! Federation/sister control client (§12 supplement), grounded 1:1 on
//! the original's `SisterController`. Every method maps onto one row
//! of the Control API surface (§6.2).

use crate::config::PeerConfig;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

/// Outcome of one remote call: `ok` mirrors the Control API's envelope,
/// `data` carries the parsed payload on success.
#[derive(Debug, Clone)]
pub struct ControlResult<T> {
    pub ok: bool,
    pub error: Option<String>,
    pub data: Option<T>,
}

impl<T> ControlResult<T> {
    fn failure(error: impl Into<String>) -> Self {
        ControlResult { ok: false, error: Some(error.into()), data: None }
    }

    fn success(data: T) -> Self {
        ControlResult { ok: true, error: None, data: Some(data) }
    }
}

/// A thin HTTP client over one peer's Control API.
pub struct SisterClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SisterClient {
    pub fn new(peer: &PeerConfig, timeout: Duration) -> Self {
        SisterClient {
            base_url: peer.url.trim_end_matches('/').to_string(),
            api_key: peer.api_key.clone(),
            client: reqwest::Client::builder().timeout(timeout).build().unwrap_or_default(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }
        req
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ControlResult<T> {
        match self.request(reqwest::Method::GET, path).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<T>().await {
                Ok(data) => ControlResult::success(data),
                Err(e) => ControlResult::failure(format!("decode error: {e}")),
            },
            Ok(resp) => ControlResult::failure(format!("http {}", resp.status())),
            Err(e) => ControlResult::failure(format!("connection error: {e}")),
        }
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: Value) -> ControlResult<Value> {
        match self.request(method, path).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(data) => ControlResult::success(data),
                Err(_) => ControlResult::success(Value::Null),
            },
            Ok(resp) => ControlResult::failure(format!("http {}", resp.status())),
            Err(e) => ControlResult::failure(format!("connection error: {e}")),
        }
    }

    /// `GET /api/status` — used by the Federation Poller.
    pub async fn status(&self) -> ControlResult<Value> {
        self.get_json("/api/status").await
    }

    /// `GET /api/timeline/raw?hours=H`.
    pub async fn timeline_raw(&self, hours: u32) -> ControlResult<Value> {
        self.get_json(&format!("/api/timeline/raw?hours={hours}")).await
    }

    pub async fn launch(&self, directory: &str, name: &str, prompt: Option<&str>) -> ControlResult<Value> {
        self.send_json(reqwest::Method::POST, "/api/agents/launch", json!({ "directory": directory, "name": name, "prompt": prompt })).await
    }

    pub async fn send(&self, name: &str, text: &str, enter: bool) -> ControlResult<Value> {
        self.send_json(reqwest::Method::POST, &format!("/api/agents/{name}/send"), json!({ "text": text, "enter": enter })).await
    }

    pub async fn keys(&self, name: &str, key: &str) -> ControlResult<Value> {
        self.send_json(reqwest::Method::POST, &format!("/api/agents/{name}/keys"), json!({ "key": key })).await
    }

    pub async fn kill(&self, name: &str, cascade: bool) -> ControlResult<Value> {
        self.send_json(reqwest::Method::POST, &format!("/api/agents/{name}/kill"), json!({ "cascade": cascade })).await
    }

    pub async fn restart(&self, name: &str) -> ControlResult<Value> {
        self.send_json(reqwest::Method::POST, &format!("/api/agents/{name}/restart"), json!({})).await
    }

    pub async fn set_standing_orders(&self, name: &str, text: Option<&str>, preset: Option<&str>) -> ControlResult<Value> {
        self.send_json(reqwest::Method::PUT, &format!("/api/agents/{name}/standing-orders"), json!({ "text": text, "preset": preset })).await
    }

    pub async fn set_budget(&self, name: &str, usd: f64) -> ControlResult<Value> {
        self.send_json(reqwest::Method::PUT, &format!("/api/agents/{name}/budget"), json!({ "usd": usd })).await
    }

    pub async fn set_value(&self, name: &str, value: i64) -> ControlResult<Value> {
        self.send_json(reqwest::Method::PUT, &format!("/api/agents/{name}/value"), json!({ "value": value })).await
    }

    pub async fn annotate(&self, name: &str, text: &str) -> ControlResult<Value> {
        self.send_json(reqwest::Method::PUT, &format!("/api/agents/{name}/annotation"), json!({ "text": text })).await
    }

    pub async fn set_sleep(&self, name: &str, asleep: bool) -> ControlResult<Value> {
        self.send_json(reqwest::Method::POST, &format!("/api/agents/{name}/sleep"), json!({ "asleep": asleep })).await
    }

    pub async fn cleanup(&self, include_done: bool) -> ControlResult<Value> {
        self.send_json(reqwest::Method::POST, "/api/agents/cleanup", json!({ "include_done": include_done })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_result_has_no_data() {
        let r: ControlResult<Value> = ControlResult::failure("boom");
        assert!(!r.ok);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.data.is_none());
    }
}
