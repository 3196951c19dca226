//! HTTP wire types and the network boundary.
//!
//! The engine never talks to `reqwest` directly; everything goes through the
//! [`NetworkClient`] trait so tests can substitute a scripted client.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Header map with case-preserved names; lookups are case-insensitive.
pub type HeaderMap = BTreeMap<String, String>;

/// An outgoing HTTP request as the engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  pub method: String,
  pub url: String,
  #[serde(default)]
  pub headers: HeaderMap,
  #[serde(default)]
  pub body: Vec<u8>,
}

impl Request {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: url.to_string(),
      headers: HeaderMap::new(),
      body: Vec::new(),
    }
  }

  pub fn get(url: &str) -> Self {
    Self::new("GET", url)
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_string(), value.to_string());
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Path component of the URL, without query or fragment.
  pub fn path(&self) -> String {
    match Url::parse(&self.url) {
      Ok(parsed) => parsed.path().to_string(),
      // Not an absolute URL - treat it as a bare path
      Err(_) => self
        .url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string(),
    }
  }

  /// Whether the client accepts an HTML document in response.
  pub fn accepts_markup(&self) -> bool {
    self
      .header("accept")
      .map(|accept| accept.contains("text/html"))
      .unwrap_or(false)
  }

  /// Cache key for this request: SHA-256 over the method and the
  /// normalized URL (fragment stripped, scheme/host lowercased).
  pub fn cache_key(&self) -> String {
    let normalized = normalize_url(&self.url);
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Normalize a URL for cache keying.
fn normalize_url(raw: &str) -> String {
  match Url::parse(raw) {
    Ok(mut parsed) => {
      parsed.set_fragment(None);
      parsed.to_string()
    }
    Err(_) => raw.split('#').next().unwrap_or_default().to_string(),
  }
}

/// A captured HTTP response: status, headers and body bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  #[serde(default)]
  pub headers: HeaderMap,
  #[serde(default)]
  pub body: Vec<u8>,
}

impl Response {
  /// Whether the status is in the 2xx range.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Build a JSON response with the given status.
  pub fn json(status: u16, payload: &serde_json::Value) -> Self {
    let mut headers = HeaderMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    Self {
      status,
      headers,
      body: payload.to_string().into_bytes(),
    }
  }

  /// Build a plain-text response with the given status.
  pub fn text(status: u16, body: &str) -> Self {
    let mut headers = HeaderMap::new();
    headers.insert("content-type".to_string(), "text/plain".to_string());
    Self {
      status,
      headers,
      body: body.as_bytes().to_vec(),
    }
  }

  /// Body interpreted as UTF-8 (lossy).
  pub fn body_string(&self) -> String {
    String::from_utf8_lossy(&self.body).to_string()
  }
}

/// The network boundary.
///
/// An `Err` from `fetch` is a transport failure (connection refused, DNS,
/// timeout); HTTP error statuses come back as `Ok` responses.
#[async_trait]
pub trait NetworkClient: Send + Sync {
  async fn fetch(&self, request: Request) -> Result<Response>;
}

/// `reqwest`-backed network client.
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl NetworkClient for HttpClient {
  async fn fetch(&self, request: Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid HTTP method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let mut headers = HeaderMap::new();
    for (name, value) in response.headers() {
      if let Ok(v) = value.to_str() {
        headers.insert(name.as_str().to_string(), v.to_string());
      }
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", request.url, e))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
