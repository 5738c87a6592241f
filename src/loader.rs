//! Document loading from various sources.
//!
//! Handles loading JSON or YAML documents from files, strings and HTTP URLs,
//! splitting `$ref` pointers into locator and fragment, and computing the
//! locator of a document referenced from another one.

use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::LoadError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of external documents.
///
/// The resolver calls this once per distinct locator; caching happens on the
/// resolver side.
pub trait Fetch {
    fn fetch(&self, locator: &str) -> Result<Value, LoadError>;
}

/// Reads files from disk and, with the `remote` feature, HTTP(S) URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFetcher;

impl Fetch for DefaultFetcher {
    fn fetch(&self, locator: &str) -> Result<Value, LoadError> {
        load_document(locator)
    }
}

/// Load a document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidDocument` if it is neither JSON nor YAML.
pub fn load_document_file(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_document_str(&content, &path.display().to_string())
}

/// Load a document from a JSON or YAML string.
///
/// Content starting with `{` is parsed as JSON, anything else as YAML.
/// `locator` is only used in error messages.
pub fn load_document_str(content: &str, locator: &str) -> Result<Value, LoadError> {
    let trimmed = content.trim_start();
    let value: Value = if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).map_err(|e| LoadError::InvalidDocument {
            locator: locator.to_string(),
            message: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(content).map_err(|e| LoadError::InvalidDocument {
            locator: locator.to_string(),
            message: e.to_string(),
        })?
    };

    if !value.is_object() {
        return Err(LoadError::NotAnObject {
            locator: locator.to_string(),
        });
    }
    Ok(value)
}

/// Load a document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Value, LoadError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    // Check for HTTP errors before parsing
    let response = response
        .error_for_status()
        .map_err(|source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let body = response.text().map_err(|source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    })?;

    load_document_str(&body, url)
}

/// Load a document from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
pub fn load_document(source: &str) -> Result<Value, LoadError> {
    debug!(source, "loading document");
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::RemoteDisabled {
                url: source.to_string(),
            })
        }
    } else {
        load_document_file(Path::new(source))
    }
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Split a pointer into its locator part and its fragment (including `#`).
///
/// `"other.yaml#/components/schemas/Color"` gives
/// `("other.yaml", Some("#/components/schemas/Color"))`.
pub fn split_pointer(pointer: &str) -> (&str, Option<&str>) {
    match pointer.find('#') {
        Some(idx) => (&pointer[..idx], Some(&pointer[idx..])),
        None => (pointer, None),
    }
}

/// A pointer is external when it names a document before its fragment, or
/// has no fragment at all.
pub fn is_external(pointer: &str) -> bool {
    let (locator, fragment) = split_pointer(pointer);
    !locator.is_empty() || fragment.is_none()
}

/// Path segments of a fragment, JSON Pointer unescaped (`~1` = `/`, `~0` = `~`).
pub fn fragment_segments(fragment: &str) -> Vec<String> {
    let path = fragment.trim_start_matches('#').trim_start_matches('/');
    if path.is_empty() {
        return Vec::new();
    }
    path.split('/')
        .map(|part| part.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Navigate a fragment (e.g. `"#/components/schemas/Pet"`) within a document.
///
/// Returns `None` as soon as a segment is missing. An empty fragment (`"#"`)
/// yields the document itself.
pub fn navigate_fragment<'a>(document: &'a Value, fragment: &str) -> Option<&'a Value> {
    let mut current = document;
    for key in fragment_segments(fragment) {
        current = match current {
            Value::Object(map) => map.get(&key)?,
            Value::Array(arr) => arr.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Escape a name for use as a single JSON Pointer segment.
pub fn escape_segment(name: &str) -> String {
    name.replace('~', "~0").replace('/', "~1")
}

/// Last `/`-separated segment of a pointer, ignoring any trailing `/`.
pub fn last_segment(pointer: &str) -> &str {
    pointer
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(pointer)
}

/// Compute the locator of `relative`, referenced from the document at `base`.
///
/// Absolute URLs and absolute paths are returned unchanged. Relative
/// references are joined against the base URL, or against the directory of
/// the base file with `.` and `..` folded so the result is a stable cache key.
pub fn relative_locator(base: &str, relative: &str) -> String {
    if is_url(relative) {
        return relative.to_string();
    }

    if is_url(base) {
        return match url::Url::parse(base).and_then(|b| b.join(relative)) {
            Ok(joined) => joined.to_string(),
            Err(_) => relative.to_string(),
        };
    }

    let rel_path = Path::new(relative);
    if rel_path.is_absolute() {
        return normalize_path(rel_path).display().to_string();
    }

    let base_dir = Path::new(base).parent().unwrap_or(Path::new(""));
    normalize_path(&base_dir.join(rel_path))
        .display()
        .to_string()
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
