//! Caches owned by an interpretation session.
//!
//! Parsed templates are memoized by their raw text; fetched contexts and
//! sub-templates by their location. Both live as long as the session.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::parser::{LineIndex, ParseError, Template, parse_subtemplate_body, parse_template};

/// A parsed template with its parse errors and a line index of its text.
#[derive(Debug)]
pub struct CachedTemplate {
    pub tree: Template,
    pub errors: Vec<ParseError>,
    pub index: LineIndex,
}

/// The state of a remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    /// Requested; the host has not answered yet.
    Pending,
    Ready(String),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct TemplateCache {
    documents: RefCell<HashMap<String, Rc<CachedTemplate>>>,
    bodies: RefCell<HashMap<String, Rc<CachedTemplate>>>,
    fetched: RefCell<HashMap<String, FetchState>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The parsed form of a document, parsing it on first use.
    pub fn document(&self, text: &str) -> Rc<CachedTemplate> {
        Self::memoize(&self.documents, text, || {
            let parsed = parse_template(text);
            (parsed.tree, parsed.errors)
        })
    }

    /// The parsed form of a sub-template body, parsing it on first use.
    pub fn body(&self, raw: &str) -> Rc<CachedTemplate> {
        Self::memoize(&self.bodies, raw, || {
            let parsed = parse_subtemplate_body(raw);
            (parsed.tree, parsed.errors)
        })
    }

    fn memoize(
        map: &RefCell<HashMap<String, Rc<CachedTemplate>>>,
        text: &str,
        parse: impl FnOnce() -> (Template, Vec<ParseError>),
    ) -> Rc<CachedTemplate> {
        if let Some(cached) = map.borrow().get(text) {
            return Rc::clone(cached);
        }
        trace!(len = text.len(), "parsing template");
        let (tree, errors) = parse();
        let cached = Rc::new(CachedTemplate {
            tree,
            errors,
            index: LineIndex::new(text),
        });
        map.borrow_mut().insert(text.to_string(), Rc::clone(&cached));
        cached
    }

    /// The fetch state of `url`, if it was ever requested.
    pub fn fetch_state(&self, url: &str) -> Option<FetchState> {
        self.fetched.borrow().get(url).cloned()
    }

    /// Mark `url` as requested. Returns false if it was already known.
    pub fn request(&self, url: &str) -> bool {
        let mut fetched = self.fetched.borrow_mut();
        if fetched.contains_key(url) {
            return false;
        }
        fetched.insert(url.to_string(), FetchState::Pending);
        true
    }

    /// Store the host's answer for `url`.
    pub fn fulfill(&self, url: &str, result: Result<String, String>) {
        let state = match result {
            Ok(text) => FetchState::Ready(text),
            Err(message) => FetchState::Failed(message),
        };
        self.fetched.borrow_mut().insert(url.to_string(), state);
    }

    pub fn clear(&self) {
        self.documents.borrow_mut().clear();
        self.bodies.borrow_mut().clear();
        self.fetched.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_once_per_text() {
        let cache = TemplateCache::new();
        let first = cache.document("Hello {name}");
        let second = cache.document("Hello {name}");
        assert!(Rc::ptr_eq(&first, &second));
        assert!(!Rc::ptr_eq(&first, &cache.document("Bye")));
    }

    #[test]
    fn fetch_lifecycle() {
        let cache = TemplateCache::new();
        assert_eq!(cache.fetch_state("/a"), None);
        assert!(cache.request("/a"));
        assert!(!cache.request("/a"));
        assert_eq!(cache.fetch_state("/a"), Some(FetchState::Pending));
        cache.fulfill("/a", Err("gone".to_string()));
        assert_eq!(
            cache.fetch_state("/a"),
            Some(FetchState::Failed("gone".to_string()))
        );
    }
}
