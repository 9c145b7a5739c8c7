//! The interpretation protocol.
//!
//! A [`Session`] accepts render requests and answers with a stream of
//! [`Event`]s. Remote content is never fetched by the session itself: when a
//! pass needs a location that is not cached yet, the session emits
//! [`Event::Fetch`] and waits for [`Session::fulfill`], then re-walks the
//! whole template with the new content cached.

use std::collections::{BTreeSet, VecDeque};

use bon::Builder;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::compose::render;
use crate::data::TemplateData;
use crate::interpreter::annotations::Annotations;
use crate::interpreter::cache::TemplateCache;
use crate::interpreter::error::{DebugEntry, FetchError, TemplateError};
use crate::interpreter::evaluator::{DEFAULT_MAX_DEPTH, Evaluator};
use crate::interpreter::registry::HostRegistry;
use crate::parser::{Position, extract};

/// A message from the session to its host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    /// Progress text.
    Status(String),
    /// The host should load `url` and call [`Session::fulfill`].
    Fetch { url: String },
    /// The finished output of a request.
    Result(RenderResult),
}

/// One error in the result payload. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub message: String,
}

impl From<&TemplateError> for ErrorRecord {
    fn from(error: &TemplateError) -> Self {
        Self {
            start_line: error.start.line,
            end_line: error.end.line,
            start_col: error.start.column,
            end_col: error.end.column,
            message: error.message.clone(),
        }
    }
}

/// The terminal payload of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub result: String,
    pub errors: Vec<ErrorRecord>,
    pub debug_log: Vec<DebugEntry>,
}

/// Loads remote contexts and sub-templates for [`Session::render`].
pub trait Fetcher {
    fn fetch(&mut self, url: &str) -> Result<String, FetchError>;
}

impl<F> Fetcher for F
where
    F: FnMut(&str) -> Result<String, FetchError>,
{
    fn fetch(&mut self, url: &str) -> Result<String, FetchError> {
        self(url)
    }
}

#[derive(Debug, Clone)]
struct Request {
    template: String,
    data: String,
}

/// An interpretation session.
///
/// Holds the parse and fetch caches, one in-flight request and at most one
/// pending request. Submitting while a request is in flight replaces the
/// pending one.
///
/// # Example
///
/// ```
/// use templet::{Event, Session};
///
/// let mut session = Session::builder().build();
/// session.submit("Hello {name}!", r#"{"name": "Ann"}"#);
/// let result = session.drain_events().into_iter().find_map(|event| match event {
///     Event::Result(result) => Some(result),
///     _ => None,
/// });
/// assert_eq!(result.unwrap().result, "Hello Ann!");
/// ```
#[derive(Builder)]
pub struct Session {
    /// Limit on nested sub-template invocations.
    #[builder(default = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// The annotation set every request starts from.
    #[builder(default)]
    annotations: Annotations,

    /// Host methods and value functions.
    #[builder(default)]
    host: HostRegistry,

    #[builder(skip)]
    cache: TemplateCache,

    #[builder(skip)]
    in_flight: Option<Request>,

    #[builder(skip)]
    pending: Option<Request>,

    /// Locations the in-flight pass is waiting for.
    #[builder(skip)]
    awaiting: BTreeSet<String>,

    #[builder(skip)]
    events: VecDeque<Event>,
}

impl Default for Session {
    fn default() -> Self {
        Session::builder().build()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(&self) -> &HostRegistry {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut HostRegistry {
        &mut self.host
    }

    // =========================================================================
    // Protocol
    // =========================================================================

    /// Queue a request. `data` is JSON text; empty text means an empty
    /// dictionary.
    pub fn submit(&mut self, template: impl Into<String>, data: impl Into<String>) {
        let request = Request {
            template: template.into(),
            data: data.into(),
        };
        if self.in_flight.is_some() {
            debug!("request in flight, replacing the pending request");
            self.pending = Some(request);
            return;
        }
        self.in_flight = Some(request);
        self.run();
    }

    /// Answer an [`Event::Fetch`]. Once nothing else is awaited the pass is
    /// re-run, or the pending request takes over.
    pub fn fulfill(&mut self, url: &str, result: Result<String, String>) {
        debug!(url, ok = result.is_ok(), "fetch fulfilled");
        self.cache.fulfill(url, result);
        self.awaiting.remove(url);
        if !self.awaiting.is_empty() {
            return;
        }
        if let Some(next) = self.pending.take() {
            self.in_flight = Some(next);
        }
        self.run();
    }

    pub fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// True while a request waits for fetches.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Forget parsed templates and fetched content.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Render synchronously, answering fetches with `fetcher`.
    pub fn render(
        &mut self,
        template: &str,
        data: &str,
        fetcher: &mut impl Fetcher,
    ) -> RenderResult {
        self.submit(template, data);
        let mut last = None;
        while let Some(event) = self.next_event() {
            match event {
                Event::Status(text) => trace!(%text, "status"),
                Event::Fetch { url } => {
                    let result = fetcher.fetch(&url).map_err(|error| error.to_string());
                    self.fulfill(&url, result);
                }
                Event::Result(result) => last = Some(result),
            }
        }
        last.unwrap_or_else(|| RenderResult {
            errors: vec![ErrorRecord::from(&TemplateError::general(
                Position::START,
                Position::START,
                "interpretation did not finish",
            ))],
            ..RenderResult::default()
        })
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Run passes until one suspends on a fetch or no request is left.
    fn run(&mut self) {
        while let Some(request) = self.in_flight.clone() {
            self.events.push_back(Event::Status("interpreting".to_string()));
            let (result, needed) = self.pass(&request);
            if !needed.is_empty() {
                for url in needed {
                    if self.awaiting.insert(url.clone()) {
                        self.events.push_back(Event::Fetch { url });
                    }
                }
                return;
            }
            info!(
                errors = result.errors.len(),
                bytes = result.result.len(),
                "render finished"
            );
            self.events.push_back(Event::Result(result));
            self.in_flight = self.pending.take();
        }
    }

    /// One full walk of `request`. Returns the result and the locations
    /// that still need fetching.
    fn pass(&self, request: &Request) -> (RenderResult, Vec<String>) {
        let mut errors = Vec::new();
        let data = if request.data.trim().is_empty() {
            TemplateData::dictionary()
        } else {
            TemplateData::parse(&request.data).unwrap_or_else(|error| {
                errors.push(TemplateError::general(
                    Position::START,
                    Position::START,
                    format!("invalid data: {error}"),
                ));
                TemplateData::dictionary()
            })
        };

        let extraction = extract(&request.template, Position::START);
        errors.extend(extraction.errors.into_iter().map(TemplateError::from));
        let evaluation = Evaluator::new(&self.cache, &self.host, self.annotations.clone(), data)
            .with_max_depth(self.max_depth)
            .evaluate(&extraction.residual, extraction.subtemplates);
        errors.extend(evaluation.errors);

        let result = RenderResult {
            result: render(&evaluation.value),
            errors: errors.iter().map(ErrorRecord::from).collect(),
            debug_log: evaluation.debug_log,
        };
        (result, evaluation.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_of(events: Vec<Event>) -> Option<RenderResult> {
        events.into_iter().find_map(|event| match event {
            Event::Result(result) => Some(result),
            Event::Status(_) | Event::Fetch { .. } => None,
        })
    }

    #[test]
    fn plain_text_finishes_immediately() {
        let mut session = Session::new();
        session.submit("hello", "");
        let events = session.drain_events();
        assert_eq!(events[0], Event::Status("interpreting".to_string()));
        let result = result_of(events).unwrap();
        assert_eq!(result.result, "hello");
        assert!(result.errors.is_empty());
        assert!(!session.is_busy());
    }

    #[test]
    fn invalid_data_is_reported() {
        let mut session = Session::new();
        session.submit("x", "{not json");
        let result = result_of(session.drain_events()).unwrap();
        assert_eq!(result.result, "x");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.starts_with("invalid data"));
    }

    #[test]
    fn remote_context_round_trip() {
        let mut session = Session::new();
        session.submit("{'/people.json':[{name}]}", "");
        let events = session.drain_events();
        assert!(events.contains(&Event::Fetch {
            url: "/people.json".to_string()
        }));
        assert!(result_of(events).is_none());
        assert!(session.is_busy());

        session.fulfill("/people.json", Ok(r#"{"name": "Ann"}"#.to_string()));
        let result = result_of(session.drain_events()).unwrap();
        assert_eq!(result.result, "Ann");
    }

    #[test]
    fn latest_pending_request_wins() {
        let mut session = Session::new();
        session.submit("{'/a':[x]}", "");
        session.submit("first", "");
        session.submit("second", "");
        session.drain_events();

        session.fulfill("/a", Ok("{}".to_string()));
        let results: Vec<String> = session
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Result(result) => Some(result.result),
                Event::Status(_) | Event::Fetch { .. } => None,
            })
            .collect();
        assert_eq!(results, vec!["second".to_string()]);
    }

    #[test]
    fn failed_fetch_degrades_to_empty_context() {
        let mut session = Session::new();
        let mut fetcher = |url: &str| -> Result<String, FetchError> {
            Err(FetchError::NotFound {
                url: url.to_string(),
            })
        };
        let result = session.render("{'/missing.json':[ok]}", "", &mut fetcher);
        assert_eq!(result.result, "ok");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("/missing.json"));
    }

    #[test]
    fn result_payload_is_camel_case() {
        let result = RenderResult {
            result: "x".to_string(),
            errors: vec![ErrorRecord {
                start_line: 1,
                end_line: 1,
                start_col: 2,
                end_col: 5,
                message: "bad".to_string(),
            }],
            debug_log: vec![DebugEntry {
                level: 1,
                text: "note".to_string(),
            }],
        };
        insta::assert_snapshot!(serde_json::to_string(&Event::Result(result)).unwrap(), @r#"{"result":{"result":"x","errors":[{"startLine":1,"endLine":1,"startCol":2,"endCol":5,"message":"bad"}],"debugLog":[{"level":1,"text":"note"}]}}"#);
    }
}
