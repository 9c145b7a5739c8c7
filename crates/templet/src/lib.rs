//! A text templating language.
//!
//! A template document plus a JSON payload renders to text. Templates
//! resolve placeholders against the data, call named sub-templates, apply
//! method pipelines, branch on conditions and number bulleted lists from
//! their indentation.
//!
//! # Example
//!
//! ```
//! use templet::Session;
//!
//! let mut session = Session::new();
//! let mut no_fetch = |url: &str| -> Result<String, templet::FetchError> {
//!     Err(templet::FetchError::NotFound { url: url.to_string() })
//! };
//! let result = session.render(
//!     "{people:[{name.ToUpper()}]}",
//!     r#"{"people": [{"name": "ann"}, {"name": "bo"}]}"#,
//!     &mut no_fetch,
//! );
//! assert_eq!(result.result, "ANN\nBO");
//! ```

pub mod compose;
pub mod data;
pub mod interpreter;
pub mod parser;

pub use data::{DataError, Entry, Scalar, TemplateData};
pub use interpreter::{
    Annotations, ErrorKind, ErrorRecord, Event, FetchError, Fetcher, HostRegistry, MethodError,
    MethodId, RenderResult, Session, TemplateError, Value, compute_suggestions,
};
pub use parser::{ParseError, Position, Span};
