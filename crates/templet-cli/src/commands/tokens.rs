//! Implementation of the `templet tokens` command.

use std::fs::read_to_string;
use std::path::PathBuf;

use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use templet::parser::tokenize;

use crate::output::table::format_token_table;

/// Arguments for the tokens command.
#[derive(Debug, clap::Args)]
pub struct TokensArgs {
    /// Template file to tokenize
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for a single token.
#[derive(Debug, Serialize)]
struct TokenJson<'a> {
    kind: &'static str,
    text: &'a str,
    line: usize,
    column: usize,
}

/// Run the tokens command.
pub fn run_tokens(args: TokensArgs) -> Result<i32> {
    let content = read_to_string(&args.file)
        .into_diagnostic()
        .map_err(|e| miette!("Cannot read {}: {}", args.file.display(), e))?;
    let tokens = tokenize(&content);

    if args.json {
        let json_data: Vec<TokenJson<'_>> = tokens
            .iter()
            .map(|token| TokenJson {
                kind: token.kind.name(),
                text: token.text,
                line: token.position.line,
                column: token.position.column,
            })
            .collect();
        let json_output = serde_json::to_string_pretty(&json_data).into_diagnostic()?;
        println!("{}", json_output);
    } else {
        println!("{}", format_token_table(&tokens));
    }

    Ok(exitcode::OK)
}
