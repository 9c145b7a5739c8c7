//! CLI command implementations.

mod check;
mod render;
mod tokens;

pub use check::{run_check, CheckArgs};
pub use render::{run_render, RenderArgs};
pub use tokens::{run_tokens, TokensArgs};
