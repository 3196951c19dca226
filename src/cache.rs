//! Versioned cache namespaces over the structured store.
//!
//! Two namespaces exist per engine version: the static (shell) cache and the
//! runtime cache. Namespace names embed the version tag, so a version bump
//! makes every older namespace eligible for deletion at activation.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::net::{HeaderMap, Request, Response};
use crate::store::Database;

/// Cache entry storage keyed by normalized (method, URL).
#[derive(Clone)]
pub struct CacheStore {
  db: Arc<Database>,
}

impl CacheStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Register a namespace so it is enumerable even while empty.
  pub fn open_namespace(&self, name: &str) -> Result<()> {
    self
      .db
      .conn()?
      .execute(
        "INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?, ?)",
        params![name, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to register cache namespace {}: {}", name, e))?;

    Ok(())
  }

  /// Store a captured response under the given namespace.
  ///
  /// The key's primary-key constraint means a key lives in at most one
  /// namespace; classification picks the namespace deterministically per
  /// request, so a key never migrates in practice.
  pub fn put(&self, namespace: &str, request: &Request, response: &Response) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?, ?)",
        params![namespace, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to register cache namespace {}: {}", namespace, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (key_hash, namespace, method, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          request.cache_key(),
          namespace,
          request.method,
          request.url,
          response.status,
          headers,
          response.body,
          Utc::now().to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry for {}: {}", request.url, e))?;

    Ok(())
  }

  /// Look up a cached response in the given namespace.
  pub fn get(&self, namespace: &str, request: &Request) -> Result<Option<Response>> {
    let conn = self.db.conn()?;

    let row: Option<(u16, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, headers, body FROM cache_entries
         WHERE key_hash = ? AND namespace = ?",
        params![request.cache_key(), namespace],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry for {}: {}", request.url, e))?;

    match row {
      Some((status, headers_json, body)) => {
        let headers: HeaderMap = serde_json::from_str(&headers_json)
          .map_err(|e| eyre!("Failed to parse cached headers: {}", e))?;
        Ok(Some(Response {
          status,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  /// All known namespace names.
  pub fn namespaces(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_namespaces ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare namespace query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to enumerate namespaces: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  /// Delete a namespace and every entry inside it.
  pub fn delete_namespace(&self, name: &str) -> Result<()> {
    let conn = self.db.conn()?;

    conn
      .execute(
        "DELETE FROM cache_entries WHERE namespace = ?",
        params![name],
      )
      .map_err(|e| eyre!("Failed to delete entries of namespace {}: {}", name, e))?;
    conn
      .execute("DELETE FROM cache_namespaces WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", name, e))?;

    Ok(())
  }

  /// Delete every namespace whose name is not in `keep`. Returns the
  /// deleted names.
  pub fn collect_garbage(&self, keep: &[String]) -> Result<Vec<String>> {
    let stale: Vec<String> = self
      .namespaces()?
      .into_iter()
      .filter(|name| !keep.contains(name))
      .collect();

    for name in &stale {
      self.delete_namespace(name)?;
    }

    Ok(stale)
  }

  /// Number of entries in a namespace.
  pub fn entry_count(&self, namespace: &str) -> Result<i64> {
    self
      .db
      .conn()?
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?",
        params![namespace],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", namespace, e))
  }
}
