//! Durable queue of mutating requests that failed to reach the network.
//!
//! Entries are immutable once written; only the sync coordinator removes
//! them, and only after a confirmed successful replay.

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::sync::Arc;

use crate::net::{HeaderMap, Request};
use crate::store::Database;

/// A queued mutating request awaiting replay.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
  pub id: i64,
  pub url: String,
  pub method: String,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
  pub created_at: DateTime<Utc>,
}

impl QueuedRequest {
  /// Rebuild the original request verbatim for replay.
  pub fn to_request(&self) -> Request {
    Request {
      method: self.method.clone(),
      url: self.url.clone(),
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }
}

/// Write-queue table operations.
#[derive(Clone)]
pub struct WriteQueue {
  db: Arc<Database>,
}

impl WriteQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Append a failed mutating request to the queue. Returns the assigned id.
  pub fn enqueue(&self, request: &Request) -> Result<i64> {
    let headers = serde_json::to_string(&request.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT INTO write_queue (url, method, headers, body, created_at, synced)
         VALUES (?, ?, ?, ?, ?, 0)",
        params![request.url, request.method, headers, request.body, created_at],
      )
      .map_err(|e| eyre!("Failed to queue request for {}: {}", request.url, e))?;

    Ok(conn.last_insert_rowid())
  }

  /// All unsynced entries in FIFO order (creation time, then id).
  pub fn pending(&self) -> Result<Vec<QueuedRequest>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare(
        "SELECT id, url, method, headers, body, created_at FROM write_queue
         WHERE synced = 0 ORDER BY created_at ASC, id ASC",
      )
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
          row.get::<_, Vec<u8>>(4)?,
          row.get::<_, String>(5)?,
        ))
      })
      .map_err(|e| eyre!("Failed to read queue: {}", e))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read queue row: {}", e))?;

    let mut entries = Vec::with_capacity(rows.len());
    for (id, url, method, headers_json, body, created_at) in rows {
      let headers: HeaderMap = serde_json::from_str(&headers_json)
        .map_err(|e| eyre!("Failed to parse queued headers for entry {}: {}", id, e))?;
      let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| eyre!("Failed to parse timestamp of entry {}: {}", id, e))?
        .with_timezone(&Utc);

      entries.push(QueuedRequest {
        id,
        url,
        method,
        headers,
        body,
        created_at,
      });
    }

    Ok(entries)
  }

  /// Remove an entry after its replay has been acknowledged.
  pub fn delete(&self, id: i64) -> Result<()> {
    self
      .db
      .conn()?
      .execute("DELETE FROM write_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete queue entry {}: {}", id, e))?;

    Ok(())
  }

  /// Number of entries awaiting replay.
  pub fn len(&self) -> Result<u64> {
    let count: i64 = self
      .db
      .conn()?
      .query_row(
        "SELECT COUNT(*) FROM write_queue WHERE synced = 0",
        [],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count queue entries: {}", e))?;

    Ok(count as u64)
  }
}
