//! Sync coordinator: drains the write queue once connectivity returns.
//!
//! Exactly one sweep runs at a time; a sweep requested while another is in
//! flight is a no-op. Entries are removed only after the network
//! acknowledges the replay, so a crash mid-sweep loses nothing. Delivery is
//! therefore at-least-once and assumes idempotent server handling.

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::net::NetworkClient;
use crate::queue::WriteQueue;

/// Reserved tag that triggers a replay sweep.
pub const SYNC_TAG: &str = "offline-requests-sync";

/// Outcome of one replay sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
  /// Entries read from the queue
  pub attempted: usize,
  /// Entries confirmed and removed
  pub replayed: usize,
  /// Entries that failed again and were retained
  pub failed: usize,
  /// True when another sweep was already in flight
  pub skipped: bool,
}

impl SweepReport {
  fn skipped() -> Self {
    Self {
      skipped: true,
      ..Self::default()
    }
  }
}

pub struct SyncCoordinator {
  queue: WriteQueue,
  net: Arc<dyn NetworkClient>,
  sweeping: AtomicBool,
  offline: Arc<AtomicBool>,
}

impl SyncCoordinator {
  pub fn new(queue: WriteQueue, net: Arc<dyn NetworkClient>, offline: Arc<AtomicBool>) -> Self {
    Self {
      queue,
      net,
      sweeping: AtomicBool::new(false),
      offline,
    }
  }

  /// Run one replay sweep over the pending queue.
  ///
  /// Mutual exclusion: two overlapping sweeps could send the same entry
  /// twice, so a sweep that finds another in flight returns immediately.
  pub async fn sweep(&self) -> Result<SweepReport> {
    if self
      .sweeping
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!("replay sweep already in flight, skipping");
      return Ok(SweepReport::skipped());
    }

    let result = self.run_sweep().await;
    self.sweeping.store(false, Ordering::SeqCst);
    result
  }

  async fn run_sweep(&self) -> Result<SweepReport> {
    let entries = self.queue.pending()?;
    let mut report = SweepReport {
      attempted: entries.len(),
      ..SweepReport::default()
    };

    for entry in entries {
      match self.net.fetch(entry.to_request()).await {
        Ok(response) if response.is_success() => {
          self.offline.store(false, Ordering::SeqCst);
          // Remove only after the acknowledgment; a failed delete just
          // means the entry is replayed again on a later sweep.
          match self.queue.delete(entry.id) {
            Ok(()) => {
              debug!(
                id = entry.id,
                url = %entry.url,
                created_at = %entry.created_at,
                "replayed queued request"
              );
              report.replayed += 1;
            }
            Err(e) => {
              warn!(id = entry.id, "failed to remove replayed entry: {}", e);
              report.failed += 1;
            }
          }
        }
        Ok(response) => {
          self.offline.store(false, Ordering::SeqCst);
          debug!(
            id = entry.id,
            status = response.status,
            "replay rejected, entry retained"
          );
          report.failed += 1;
        }
        Err(e) => {
          self.offline.store(true, Ordering::SeqCst);
          debug!(id = entry.id, "replay failed, entry retained: {}", e);
          report.failed += 1;
        }
      }
    }

    info!(
      attempted = report.attempted,
      replayed = report.replayed,
      failed = report.failed,
      "replay sweep finished"
    );

    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::testing::FakeNetwork;
  use crate::net::{Request, Response};
  use crate::store::Database;
  use std::time::Duration;
  use tokio::sync::Notify;

  fn setup() -> (Arc<SyncCoordinator>, WriteQueue, Arc<FakeNetwork>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let queue = WriteQueue::new(db);
    let net = Arc::new(FakeNetwork::new());
    let coordinator = Arc::new(SyncCoordinator::new(
      queue.clone(),
      net.clone(),
      Arc::new(AtomicBool::new(true)),
    ));
    (coordinator, queue, net)
  }

  #[tokio::test]
  async fn test_sweep_replays_in_fifo_order_and_drains_queue() {
    let (coordinator, queue, net) = setup();
    for path in ["a", "b", "c"] {
      let url = format!("http://kiosk.local/api/{}", path);
      net.route("POST", &url, Response::json(200, &serde_json::json!({"ok": true})));
      queue.enqueue(&Request::new("POST", &url)).unwrap();
    }

    let report = coordinator.sweep().await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.replayed, 3);
    assert_eq!(queue.len().unwrap(), 0);

    let urls: Vec<String> = net.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
      urls,
      vec![
        "http://kiosk.local/api/a",
        "http://kiosk.local/api/b",
        "http://kiosk.local/api/c"
      ]
    );
  }

  #[tokio::test]
  async fn test_failed_entry_is_retained_and_sweep_continues() {
    let (coordinator, queue, net) = setup();
    let ok_url = "http://kiosk.local/api/ok";
    let bad_url = "http://kiosk.local/api/bad";
    net.route("POST", ok_url, Response::json(200, &serde_json::json!({"ok": true})));
    net.route("POST", bad_url, Response::text(500, "server error"));

    queue.enqueue(&Request::new("POST", bad_url)).unwrap();
    queue.enqueue(&Request::new("POST", ok_url)).unwrap();

    let report = coordinator.sweep().await.unwrap();

    assert_eq!(report.replayed, 1);
    assert_eq!(report.failed, 1);

    let remaining = queue.pending().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].url, bad_url);
  }

  #[tokio::test]
  async fn test_transport_failure_retains_everything() {
    let (coordinator, queue, net) = setup();
    net.set_offline(true);
    queue
      .enqueue(&Request::new("POST", "http://kiosk.local/api/a"))
      .unwrap();

    let report = coordinator.sweep().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(queue.len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_concurrent_sweep_is_noop() {
    let (coordinator, queue, net) = setup();
    let url = "http://kiosk.local/api/slow";
    net.route("POST", url, Response::json(200, &serde_json::json!({"ok": true})));
    queue.enqueue(&Request::new("POST", url)).unwrap();

    let gate = Arc::new(Notify::new());
    net.hold_with(gate.clone());

    let first = {
      let coordinator = coordinator.clone();
      tokio::spawn(async move { coordinator.sweep().await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // First sweep is parked inside fetch; a second request must bail out.
    let second = coordinator.sweep().await.unwrap();
    assert!(second.skipped);

    gate.notify_one();
    let first = first.await.unwrap();
    assert!(!first.skipped);
    assert_eq!(first.replayed, 1);
    assert_eq!(queue.len().unwrap(), 0);
  }
}
