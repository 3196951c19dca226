//! Request classification: maps a request to a routing class and a
//! read/write axis. Pure; no I/O.

use crate::config::Config;
use crate::net::Request;

/// Extensions served from the static (shell) cache.
const STATIC_EXTENSIONS: &[&str] = &["js", "css", "html", "svg", "woff", "woff2", "ttf", "eot"];

/// Image extensions served cache-first from the runtime cache.
const MEDIA_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  Static,
  Api,
  Media,
  Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
  Read,
  Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
  pub class: Classification,
  pub axis: Axis,
}

/// Classify a request.
///
/// Rules in priority order: mutating methods are writes regardless of path;
/// GET requests for static-asset extensions are `Static`; API-prefixed paths
/// are `Api`; image extensions are `Media`; everything else is `Other`.
pub fn classify(request: &Request, config: &Config) -> Classified {
  let path = request.path();

  let axis = match request.method.as_str() {
    "POST" | "PUT" | "PATCH" => Axis::Write,
    _ => Axis::Read,
  };

  let class = if request.method == "GET" && has_extension(&path, STATIC_EXTENSIONS) {
    Classification::Static
  } else if config.api_prefixes.iter().any(|p| path.starts_with(p)) {
    Classification::Api
  } else if has_extension(&path, MEDIA_EXTENSIONS) {
    Classification::Media
  } else {
    Classification::Other
  };

  Classified { class, axis }
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
  let last_segment = path.rsplit('/').next().unwrap_or_default();
  match last_segment.rsplit_once('.') {
    Some((_, ext)) => extensions
      .iter()
      .any(|candidate| candidate.eq_ignore_ascii_case(ext)),
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classify_url(method: &str, url: &str) -> Classified {
    classify(&Request::new(method, url), &Config::default())
  }

  #[test]
  fn test_static_assets() {
    for url in [
      "http://kiosk.local/src/index.css",
      "http://kiosk.local/src/main.js",
      "http://kiosk.local/index.html",
      "http://kiosk.local/fonts/main.woff2",
    ] {
      let classified = classify_url("GET", url);
      assert_eq!(classified.class, Classification::Static, "{}", url);
      assert_eq!(classified.axis, Axis::Read);
    }
  }

  #[test]
  fn test_api_paths() {
    assert_eq!(
      classify_url("GET", "http://kiosk.local/api/patients").class,
      Classification::Api
    );
    assert_eq!(
      classify_url("GET", "http://kiosk.local/functions/report").class,
      Classification::Api
    );
  }

  #[test]
  fn test_static_extension_wins_over_api_prefix() {
    let classified = classify_url("GET", "http://kiosk.local/api/bundle.js");
    assert_eq!(classified.class, Classification::Static);
  }

  #[test]
  fn test_media_extensions_case_insensitive() {
    assert_eq!(
      classify_url("GET", "http://kiosk.local/photos/xray.PNG").class,
      Classification::Media
    );
    assert_eq!(
      classify_url("GET", "http://kiosk.local/photos/scan.webp").class,
      Classification::Media
    );
  }

  #[test]
  fn test_svg_resolves_to_static_by_priority() {
    assert_eq!(
      classify_url("GET", "http://kiosk.local/icons/logo.svg").class,
      Classification::Static
    );
  }

  #[test]
  fn test_navigation_is_other() {
    let classified = classify_url("GET", "http://kiosk.local/");
    assert_eq!(classified.class, Classification::Other);
    assert_eq!(classified.axis, Axis::Read);
  }

  #[test]
  fn test_mutating_methods_are_writes_regardless_of_path() {
    for method in ["POST", "PUT", "PATCH"] {
      let classified = classify_url(method, "http://kiosk.local/app.js");
      assert_eq!(classified.axis, Axis::Write, "{}", method);
    }

    let classified = classify_url("POST", "http://kiosk.local/api/consultation");
    assert_eq!(classified.axis, Axis::Write);
    assert_eq!(classified.class, Classification::Api);
  }

  #[test]
  fn test_delete_is_read_axis() {
    // Only POST/PUT/PATCH are queued; anything else routes as a read.
    let classified = classify_url("DELETE", "http://kiosk.local/api/consultation/1");
    assert_eq!(classified.axis, Axis::Read);
  }

  #[test]
  fn test_query_string_does_not_hide_extension() {
    let classified = classify_url("GET", "http://kiosk.local/app.js?v=2");
    assert_eq!(classified.class, Classification::Static);
  }
}
