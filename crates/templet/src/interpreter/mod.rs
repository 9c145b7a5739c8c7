//! Template interpreter.
//!
//! This module provides the evaluation engine that walks a parsed template
//! against a data context and produces a [`Value`] tree, the built-in method
//! table, and the [`Session`] that drives the interpretation protocol.

mod annotations;
mod cache;
mod error;
mod evaluator;
mod methods;
mod registry;
mod session;
mod value;

pub use annotations::{Annotations, BulletMode, DateFormatMode, Encoding, MultilineStyle};
pub use cache::{CachedTemplate, FetchState, TemplateCache};
pub use error::{DebugEntry, ErrorKind, FetchError, MethodError, TemplateError, compute_suggestions};
pub use evaluator::{DEFAULT_MAX_DEPTH, Evaluation, Evaluator};
pub use methods::{MethodId, encode, format_date, parse_date};
pub use registry::{HostMethod, HostRegistry, ValueFunction};
pub use session::{ErrorRecord, Event, Fetcher, RenderResult, Session};
pub use value::Value;
