//! Caching strategies and fetch routing.
//!
//! Reads route through Cache-First (static assets, media) or Network-First
//! (API and everything else); mutating requests go straight to the network
//! and are queued on failure. A fetch always produces a response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::classify::{classify, Axis, Classification};
use crate::config::Config;
use crate::fallback;
use crate::net::{NetworkClient, Request, Response};
use crate::queue::WriteQueue;

pub struct FetchRouter {
  config: Arc<Config>,
  cache: CacheStore,
  queue: WriteQueue,
  net: Arc<dyn NetworkClient>,
  offline: Arc<AtomicBool>,
}

impl FetchRouter {
  pub fn new(
    config: Arc<Config>,
    cache: CacheStore,
    queue: WriteQueue,
    net: Arc<dyn NetworkClient>,
    offline: Arc<AtomicBool>,
  ) -> Self {
    Self {
      config,
      cache,
      queue,
      net,
      offline,
    }
  }

  /// Route one request through the matching strategy.
  pub async fn handle(&self, request: Request) -> Response {
    let classified = classify(&request, &self.config);

    match classified.axis {
      Axis::Write => self.handle_write(request).await,
      Axis::Read => match classified.class {
        Classification::Static | Classification::Media => {
          self.cache_first(request, classified.class).await
        }
        Classification::Api | Classification::Other => {
          self.network_first(request, classified.class).await
        }
      },
    }
  }

  fn namespace_for(&self, class: Classification) -> String {
    match class {
      Classification::Static => self.config.static_cache_name(),
      _ => self.config.runtime_cache_name(),
    }
  }

  /// Cache-First: serve a hit immediately and refresh it in the background;
  /// on a miss fetch synchronously and populate the cache.
  async fn cache_first(&self, request: Request, class: Classification) -> Response {
    let namespace = self.namespace_for(class);

    let cached = match self.cache.get(&namespace, &request) {
      Ok(cached) => cached,
      Err(e) => {
        // Storage failure degrades to a miss
        warn!(url = %request.url, "cache lookup failed: {}", e);
        None
      }
    };

    if let Some(response) = cached {
      self.spawn_refresh(request, namespace);
      return response;
    }

    match self.net.fetch(request.clone()).await {
      Ok(response) => {
        self.note_network(true);
        if let Err(e) = self.cache.put(&namespace, &request, &response) {
          warn!(url = %request.url, "failed to cache response: {}", e);
        }
        response
      }
      Err(e) => {
        self.note_network(false);
        debug!(url = %request.url, "cache-first fetch failed: {}", e);
        self.offline_fallback(&request, class)
      }
    }
  }

  /// Network-First: try the network, cache successful responses, fall back
  /// to the runtime cache and then to a synthesized response.
  async fn network_first(&self, request: Request, class: Classification) -> Response {
    let namespace = self.namespace_for(class);

    match self.net.fetch(request.clone()).await {
      Ok(response) => {
        self.note_network(true);
        if response.is_success() {
          if let Err(e) = self.cache.put(&namespace, &request, &response) {
            warn!(url = %request.url, "failed to cache response: {}", e);
          }
        }
        response
      }
      Err(e) => {
        self.note_network(false);
        debug!(url = %request.url, "network-first fetch failed, trying cache: {}", e);

        match self.cache.get(&namespace, &request) {
          Ok(Some(cached)) => cached,
          Ok(None) => self.offline_fallback(&request, class),
          Err(storage_err) => {
            warn!(url = %request.url, "cache lookup failed: {}", storage_err);
            self.offline_fallback(&request, class)
          }
        }
      }
    }
  }

  /// Writes go network-only; a transport failure queues the request and
  /// synthesizes a 202 acceptance so the caller can treat it as provisional.
  async fn handle_write(&self, request: Request) -> Response {
    match self.net.fetch(request.clone()).await {
      Ok(response) => {
        self.note_network(true);
        response
      }
      Err(e) => {
        self.note_network(false);
        debug!(url = %request.url, "write failed, queueing: {}", e);

        match self.queue.enqueue(&request) {
          Ok(id) => {
            info!(id, url = %request.url, "queued request for replay");
            fallback::queued()
          }
          Err(storage_err) => {
            error!(url = %request.url, "failed to queue request: {}", storage_err);
            fallback::unavailable()
          }
        }
      }
    }
  }

  /// Synthesize a response when neither cache nor network can help.
  fn offline_fallback(&self, request: &Request, class: Classification) -> Response {
    // Navigation requests get the cached app shell regardless of path
    if request.accepts_markup() {
      let shell = Request::get(&self.config.shell_url());
      if let Ok(Some(response)) = self.cache.get(&self.config.static_cache_name(), &shell) {
        return response;
      }
    }

    if class == Classification::Api {
      return fallback::api_fallback(&request.path());
    }

    fallback::unavailable()
  }

  /// Stale-while-revalidate: refresh a served cache entry in the
  /// background. Failures are logged and never surface to the caller.
  fn spawn_refresh(&self, request: Request, namespace: String) {
    let cache = self.cache.clone();
    let net = self.net.clone();

    tokio::spawn(async move {
      match net.fetch(request.clone()).await {
        Ok(response) if response.is_success() => {
          if let Err(e) = cache.put(&namespace, &request, &response) {
            debug!(url = %request.url, "background refresh store failed: {}", e);
          }
        }
        Ok(response) => {
          debug!(url = %request.url, status = response.status, "background refresh rejected");
        }
        Err(e) => {
          debug!(url = %request.url, "background refresh failed: {}", e);
        }
      }
    });
  }

  fn note_network(&self, reachable: bool) {
    self.offline.store(!reachable, Ordering::SeqCst);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::testing::FakeNetwork;
  use crate::store::Database;
  use serde_json::json;
  use std::time::Duration;

  struct Fixture {
    router: FetchRouter,
    cache: CacheStore,
    queue: WriteQueue,
    net: Arc<FakeNetwork>,
    config: Arc<Config>,
  }

  fn setup() -> Fixture {
    let config = Arc::new(Config {
      base_url: "http://kiosk.local".to_string(),
      ..Config::default()
    });
    let db = Arc::new(Database::open_in_memory().unwrap());
    let cache = CacheStore::new(db.clone());
    let queue = WriteQueue::new(db);
    let net = Arc::new(FakeNetwork::new());
    let router = FetchRouter::new(
      config.clone(),
      cache.clone(),
      queue.clone(),
      net.clone(),
      Arc::new(AtomicBool::new(false)),
    );

    Fixture {
      router,
      cache,
      queue,
      net,
      config,
    }
  }

  #[tokio::test]
  async fn test_cache_first_serves_hit_when_offline() {
    let f = setup();
    let request = Request::get("http://kiosk.local/src/index.css");
    f.cache
      .put(
        &f.config.static_cache_name(),
        &request,
        &Response::text(200, "body { }"),
      )
      .unwrap();
    f.net.set_offline(true);

    let response = f.router.handle(request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_string(), "body { }");
  }

  #[tokio::test]
  async fn test_cache_first_miss_populates_cache() {
    let f = setup();
    let url = "http://kiosk.local/src/main.js";
    f.net.route("GET", url, Response::text(200, "console.log(1)"));

    let response = f.router.handle(Request::get(url)).await;
    assert_eq!(response.body_string(), "console.log(1)");

    // Now reachable only from cache
    f.net.set_offline(true);
    let response = f.router.handle(Request::get(url)).await;
    assert_eq!(response.body_string(), "console.log(1)");
  }

  #[tokio::test]
  async fn test_cache_first_hit_refreshes_in_background() {
    let f = setup();
    let url = "http://kiosk.local/photos/chart.png";
    let request = Request::get(url);
    f.cache
      .put(
        &f.config.runtime_cache_name(),
        &request,
        &Response::text(200, "old"),
      )
      .unwrap();
    f.net.route("GET", url, Response::text(200, "new"));

    // The caller sees the stale entry immediately
    let response = f.router.handle(request.clone()).await;
    assert_eq!(response.body_string(), "old");

    // The background refresh overwrites it for next time
    tokio::time::sleep(Duration::from_millis(50)).await;
    let refreshed = f
      .cache
      .get(&f.config.runtime_cache_name(), &request)
      .unwrap()
      .unwrap();
    assert_eq!(refreshed.body_string(), "new");
  }

  #[tokio::test]
  async fn test_background_refresh_failure_is_swallowed() {
    let f = setup();
    let request = Request::get("http://kiosk.local/photos/chart.png");
    f.cache
      .put(
        &f.config.runtime_cache_name(),
        &request,
        &Response::text(200, "old"),
      )
      .unwrap();
    f.net.set_offline(true);

    let response = f.router.handle(request.clone()).await;
    assert_eq!(response.body_string(), "old");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let kept = f
      .cache
      .get(&f.config.runtime_cache_name(), &request)
      .unwrap()
      .unwrap();
    assert_eq!(kept.body_string(), "old");
  }

  #[tokio::test]
  async fn test_network_first_caches_success_and_serves_it_offline() {
    let f = setup();
    let url = "http://kiosk.local/api/medicines";
    f.net
      .route("GET", url, Response::json(200, &json!({"success": true})));

    let response = f.router.handle(Request::get(url)).await;
    assert_eq!(response.status, 200);

    f.net.set_offline(true);
    let response = f.router.handle(Request::get(url)).await;
    assert_eq!(response.body_string(), r#"{"success":true}"#);
  }

  #[tokio::test]
  async fn test_network_first_does_not_cache_error_statuses() {
    let f = setup();
    let url = "http://kiosk.local/api/medicines";
    f.net.route("GET", url, Response::text(500, "boom"));

    let response = f.router.handle(Request::get(url)).await;
    assert_eq!(response.status, 500);

    // Nothing cached, so offline falls through to the canned dataset
    f.net.set_offline(true);
    let response = f.router.handle(Request::get(url)).await;
    assert_eq!(response.status, 200);
    let payload: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(payload["success"], true);
  }

  #[tokio::test]
  async fn test_offline_api_without_cache_gets_canned_payload() {
    let f = setup();
    f.net.set_offline(true);

    let response = f
      .router
      .handle(Request::get("http://kiosk.local/api/patients"))
      .await;
    assert_eq!(response.status, 200);
    let payload: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(payload["data"]["age"], 45);

    let response = f
      .router
      .handle(Request::get("http://kiosk.local/api/unknown"))
      .await;
    let payload: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(payload["error"], "Resource not available offline");
  }

  #[tokio::test]
  async fn test_offline_navigation_gets_cached_shell() {
    let f = setup();
    let shell = Request::get("http://kiosk.local/");
    f.cache
      .put(
        &f.config.static_cache_name(),
        &shell,
        &Response::text(200, "<html>shell</html>"),
      )
      .unwrap();
    f.net.set_offline(true);

    let request =
      Request::get("http://kiosk.local/consultations/42").with_header("accept", "text/html");
    let response = f.router.handle(request).await;
    assert_eq!(response.body_string(), "<html>shell</html>");
  }

  #[tokio::test]
  async fn test_offline_other_without_cache_is_503() {
    let f = setup();
    f.net.set_offline(true);

    let response = f
      .router
      .handle(Request::get("http://kiosk.local/whatever"))
      .await;
    assert_eq!(response.status, 503);
  }

  #[tokio::test]
  async fn test_write_success_passes_through_unqueued() {
    let f = setup();
    let url = "http://kiosk.local/api/consultation";
    f.net
      .route("POST", url, Response::json(201, &json!({"id": "con007"})));

    let response = f.router.handle(Request::new("POST", url)).await;
    assert_eq!(response.status, 201);
    assert_eq!(f.queue.len().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_write_failure_queues_exactly_one_entry() {
    let f = setup();
    f.net.set_offline(true);

    let request = Request::new("POST", "http://kiosk.local/api/consultation")
      .with_body(r#"{"symptom":"fever"}"#);
    let response = f.router.handle(request).await;

    assert_eq!(response.status, 202);
    let payload: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(payload["queued"], true);
    assert_eq!(f.queue.len().unwrap(), 1);
  }
}
