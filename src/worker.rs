//! Worker lifecycle and event dispatch.
//!
//! The worker moves Installing → Active once per lifecycle: install
//! pre-populates the static cache with the shell manifest, activation
//! garbage-collects namespaces from older versions and takes over
//! immediately. Every external signal arrives as one [`Event`].

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::net::{NetworkClient, Request, Response};
use crate::queue::WriteQueue;
use crate::store::Database;
use crate::strategy::FetchRouter;
use crate::sync::{SweepReport, SyncCoordinator, SYNC_TAG};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Installing,
  Installed,
  Active,
}

/// Offline status reply payload.
#[derive(Debug, Clone, Copy)]
pub struct OfflineStatus {
  pub is_offline: bool,
}

/// Control messages from the application.
#[derive(Debug)]
pub enum Message {
  /// Force immediate activation of an installed-but-waiting worker
  SkipWaiting,
  /// Reply with the current offline status over the provided channel
  GetOfflineStatus {
    reply: oneshot::Sender<OfflineStatus>,
  },
}

/// The closed set of events the worker handles.
#[derive(Debug)]
pub enum Event {
  Install,
  Activate,
  Fetch(Request),
  Sync(String),
  Message(Message),
}

pub struct Worker {
  config: Arc<Config>,
  cache: CacheStore,
  net: Arc<dyn NetworkClient>,
  router: FetchRouter,
  coordinator: SyncCoordinator,
  state: Mutex<Lifecycle>,
  offline: Arc<AtomicBool>,
}

impl Worker {
  /// Build a worker over the given store and network client, seeding the
  /// domain tables on first run.
  pub fn new(config: Config, db: Arc<Database>, net: Arc<dyn NetworkClient>) -> Result<Self> {
    if db.seed()? {
      info!("seeded initial domain records");
    }

    let config = Arc::new(config);
    let offline = Arc::new(AtomicBool::new(false));
    let cache = CacheStore::new(db.clone());
    let queue = WriteQueue::new(db);

    let router = FetchRouter::new(
      config.clone(),
      cache.clone(),
      queue.clone(),
      net.clone(),
      offline.clone(),
    );
    let coordinator = SyncCoordinator::new(queue, net.clone(), offline.clone());

    Ok(Self {
      config,
      cache,
      net,
      router,
      coordinator,
      state: Mutex::new(Lifecycle::Installing),
      offline,
    })
  }

  /// Handle one event. `Fetch` always produces a response; lifecycle and
  /// sync events may fail, which the caller logs without terminating.
  pub async fn handle(&self, event: Event) -> Result<Option<Response>> {
    match event {
      Event::Install => {
        self.install().await?;
        Ok(None)
      }
      Event::Activate => {
        self.activate()?;
        Ok(None)
      }
      Event::Fetch(request) => Ok(Some(self.router.handle(request).await)),
      Event::Sync(tag) => {
        if tag == SYNC_TAG {
          self.sweep().await?;
        } else {
          debug!(tag, "ignoring unknown sync tag");
        }
        Ok(None)
      }
      Event::Message(message) => {
        self.handle_message(message)?;
        Ok(None)
      }
    }
  }

  /// Pre-populate the static namespace with the shell manifest and create
  /// the runtime namespace. Safe to run twice; entries are overwritten in
  /// place, never duplicated.
  async fn install(&self) -> Result<()> {
    let static_ns = self.config.static_cache_name();
    self.cache.open_namespace(&static_ns)?;
    self.cache.open_namespace(&self.config.runtime_cache_name())?;

    let mut failed = 0usize;
    for path in &self.config.shell_manifest {
      let request = Request::get(&self.config.resource_url(path));
      match self.net.fetch(request.clone()).await {
        Ok(response) if response.is_success() => {
          self.cache.put(&static_ns, &request, &response)?;
        }
        Ok(response) => {
          warn!(url = %request.url, status = response.status, "shell resource fetch rejected");
          failed += 1;
        }
        Err(e) => {
          warn!(url = %request.url, "shell resource fetch failed: {}", e);
          failed += 1;
        }
      }
    }

    if failed > 0 {
      return Err(eyre!(
        "Failed to cache {} of {} shell resources",
        failed,
        self.config.shell_manifest.len()
      ));
    }

    *self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))? = Lifecycle::Installed;
    info!(namespace = %static_ns, "installed shell cache");
    Ok(())
  }

  /// Garbage-collect namespaces from other versions and take control
  /// immediately.
  fn activate(&self) -> Result<()> {
    let keep = vec![
      self.config.static_cache_name(),
      self.config.runtime_cache_name(),
    ];

    let deleted = self.cache.collect_garbage(&keep)?;
    for name in &deleted {
      info!(namespace = %name, "deleted stale cache namespace");
    }

    *self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))? = Lifecycle::Active;
    info!("worker active, claimed all clients");
    Ok(())
  }

  /// Run one replay sweep.
  pub async fn sweep(&self) -> Result<SweepReport> {
    self.coordinator.sweep().await
  }

  fn handle_message(&self, message: Message) -> Result<()> {
    match message {
      Message::SkipWaiting => {
        if self.lifecycle()? == Lifecycle::Active {
          debug!("skip waiting requested but worker is already active");
        } else {
          info!("skip waiting requested, activating now");
          self.activate()?;
        }
      }
      Message::GetOfflineStatus { reply } => {
        let status = OfflineStatus {
          is_offline: self.offline.load(Ordering::SeqCst),
        };
        if reply.send(status).is_err() {
          debug!("offline status requester went away");
        }
      }
    }

    Ok(())
  }

  pub fn lifecycle(&self) -> Result<Lifecycle> {
    Ok(*self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?)
  }

  pub fn is_offline(&self) -> bool {
    self.offline.load(Ordering::SeqCst)
  }
}
