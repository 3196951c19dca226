mod cache;
mod classify;
mod config;
mod fallback;
mod net;
mod queue;
mod store;
mod strategy;
mod sync;
mod worker;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use net::{HttpClient, Request};
use store::records::{ConsultationRecord, ConsultationStatus};
use store::Database;
use worker::{Event, Message, Worker};

#[derive(Parser, Debug)]
#[command(name = "sehat")]
#[command(about = "Offline-first cache and sync engine for a low-connectivity health kiosk")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sehat/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the database (default: $XDG_DATA_HOME/sehat/sehat.db)
  #[arg(long)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the shell manifest into the static cache and activate this version
  Install,
  /// Replay queued writes against the network
  Sync,
  /// Show offline status, cache sizes, queue length and record counts
  Status,
  /// Route one request through the engine and print the response
  Fetch {
    /// Absolute URL, or a path resolved against the configured base URL
    url: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
    #[arg(short, long)]
    body: Option<String>,
    /// Value for the Accept header
    #[arg(long)]
    accept: Option<String>,
  },
  /// Search patient records by name or phone, or look one up by id
  Patients {
    query: Option<String>,
    #[arg(long)]
    id: Option<String>,
  },
  /// Search medicines by name or category
  Medicines {
    query: Option<String>,
    /// Exact category filter instead of a substring search
    #[arg(long)]
    category: Option<String>,
  },
  /// List consultations recorded for a patient
  Consultations { patient_id: String },
  /// Record a consultation locally
  Consult {
    patient_id: String,
    /// Symptoms, comma separated
    symptoms: String,
  },
  /// Update a medicine's stock flag
  Stock {
    id: String,
    #[arg(long)]
    in_stock: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let db = Arc::new(match args.db {
    Some(path) => Database::open_at(&path)?,
    None => Database::open()?,
  });
  let net = Arc::new(HttpClient::new(Duration::from_secs(
    config.request_timeout_secs,
  ))?);
  let worker = Worker::new(config.clone(), db.clone(), net)?;

  match args.command {
    Command::Install => {
      worker.handle(Event::Install).await?;
      worker.handle(Event::Activate).await?;
      println!("Installed cache version {}", config.cache_version);
    }
    Command::Sync => {
      let report = worker.sweep().await?;
      println!(
        "Replayed {} of {} queued requests ({} failed)",
        report.replayed, report.attempted, report.failed
      );
    }
    Command::Status => {
      let (tx, rx) = tokio::sync::oneshot::channel();
      worker
        .handle(Event::Message(Message::GetOfflineStatus { reply: tx }))
        .await?;
      let status = rx.await?;

      let caches = cache::CacheStore::new(db.clone());
      let write_queue = queue::WriteQueue::new(db.clone());
      let (patients, medicines, consultations) = db.record_counts()?;

      println!("offline: {}", status.is_offline);
      println!(
        "static cache:  {} entries ({})",
        caches.entry_count(&config.static_cache_name())?,
        config.static_cache_name()
      );
      println!(
        "runtime cache: {} entries ({})",
        caches.entry_count(&config.runtime_cache_name())?,
        config.runtime_cache_name()
      );
      println!("queued writes: {}", write_queue.len()?);
      println!(
        "patients: {}  medicines: {}  consultations: {}",
        patients, medicines, consultations
      );
    }
    Command::Fetch {
      url,
      method,
      body,
      accept,
    } => {
      let url = if url.starts_with('/') {
        config.resource_url(&url)
      } else {
        url
      };

      let mut request = Request::new(&method, &url);
      if let Some(accept) = accept {
        request = request.with_header("accept", &accept);
      }
      if let Some(body) = body {
        request = request.with_body(body);
      }

      if let Some(response) = worker.handle(Event::Fetch(request)).await? {
        eprintln!("status: {} (offline: {})", response.status, worker.is_offline());
        println!("{}", response.body_string());
      }
    }
    Command::Patients { query, id } => {
      if let Some(id) = id {
        match db.get_patient(&id)? {
          Some(patient) => println!("{}", serde_json::to_string_pretty(&patient)?),
          None => println!("No patient with id {}", id),
        }
      } else {
        let results = db.search_patients(query.as_deref().unwrap_or(""))?;
        for patient in results {
          println!("{}", serde_json::to_string(&patient)?);
        }
      }
    }
    Command::Medicines { query, category } => {
      let results = match category {
        Some(category) => db.medicines_by_category(&category)?,
        None => db.search_medicines(query.as_deref().unwrap_or(""))?,
      };
      for medicine in results {
        println!("{}", serde_json::to_string(&medicine)?);
      }
    }
    Command::Consultations { patient_id } => {
      for consultation in db.consultations_by_patient(&patient_id)? {
        println!("{}", serde_json::to_string(&consultation)?);
      }
    }
    Command::Consult {
      patient_id,
      symptoms,
    } => {
      let now = Utc::now();
      let consultation = ConsultationRecord {
        id: format!("con-{}", now.timestamp_millis()),
        patient_id,
        symptoms: symptoms.split(',').map(|s| s.trim().to_string()).collect(),
        diagnosis: None,
        prescription: None,
        follow_up: None,
        status: ConsultationStatus::Queued,
        timestamp: now.to_rfc3339(),
      };
      db.add_consultation(&consultation)?;
      println!("Recorded consultation {}", consultation.id);
    }
    Command::Stock { id, in_stock } => {
      db.update_medicine_stock(&id, in_stock)?;
      println!("Updated stock for {}", id);
    }
  }

  Ok(())
}
