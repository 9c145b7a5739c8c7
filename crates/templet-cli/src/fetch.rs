//! Loads remote locations from a directory on disk.
//!
//! A location such as `/people.json` or `/subtemplate/Row` resolves against
//! the fetcher's root. Sub-template locations without an extension fall back
//! to a `.tpl` file of the same name. Network locations are refused.

use std::fs::read_to_string;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use templet::{FetchError, Fetcher};
use tracing::debug;

/// Extension tried for locations that name no file directly.
const TEMPLATE_EXTENSION: &str = "tpl";

/// A [`Fetcher`] that reads files under a root directory.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The file a location maps to, or `None` if it would leave the root.
    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let relative = Path::new(url.trim_start_matches('/'));
        relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
            .then(|| self.root.join(relative))
    }
}

impl Fetcher for FsFetcher {
    fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        if url.starts_with("http") {
            return Err(FetchError::Failed {
                url: url.to_string(),
                message: "network locations are not supported".to_string(),
            });
        }
        let Some(path) = self.resolve(url) else {
            return Err(FetchError::Failed {
                url: url.to_string(),
                message: "location is outside the root directory".to_string(),
            });
        };

        let candidates = if path.extension().is_none() {
            vec![path.with_extension(TEMPLATE_EXTENSION), path]
        } else {
            vec![path]
        };
        for candidate in candidates {
            match read_to_string(&candidate) {
                Ok(text) => {
                    debug!(url, path = %candidate.display(), "loaded location");
                    return Ok(text);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(FetchError::Failed {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Err(FetchError::NotFound {
            url: url.to_string(),
        })
    }
}
