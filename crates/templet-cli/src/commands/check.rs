//! Implementation of the `templet check` command.

use std::fs::read_to_string;
use std::path::PathBuf;

use miette::{miette, IntoDiagnostic, Report, Result};
use owo_colors::OwoColorize;
use serde::Serialize;
use templet::parser::check_document;

use crate::output::TempletDiagnostic;

/// Arguments for the check command.
#[derive(Debug, clap::Args)]
pub struct CheckArgs {
    /// Template files to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for one checked file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileReport {
    file: String,
    errors: Vec<ErrorJson>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorJson {
    start_line: usize,
    start_col: usize,
    end_line: usize,
    end_col: usize,
    message: String,
}

/// Run the check command.
pub fn run_check(args: CheckArgs) -> Result<i32> {
    let mut reports = Vec::new();
    let mut failed = false;

    for path in &args.files {
        let content = read_to_string(path)
            .into_diagnostic()
            .map_err(|e| miette!("Cannot read {}: {}", path.display(), e))?;
        let errors = check_document(&content);
        failed |= !errors.is_empty();

        if args.json {
            reports.push(FileReport {
                file: path.display().to_string(),
                errors: errors
                    .iter()
                    .map(|error| ErrorJson {
                        start_line: error.start.line,
                        start_col: error.start.column,
                        end_line: error.end.line,
                        end_col: error.end.column,
                        message: error.error.to_string(),
                    })
                    .collect(),
            });
        } else if errors.is_empty() {
            println!("{} {}", "ok".green(), path.display());
        } else {
            for error in &errors {
                let diagnostic = TempletDiagnostic::from_located(path, &content, error);
                eprintln!("{:?}", Report::new(diagnostic));
            }
            let noun = if errors.len() == 1 { "error" } else { "errors" };
            println!("{} {}: {} {noun}", "failed".red(), path.display(), errors.len());
        }
    }

    if args.json {
        let json_output = serde_json::to_string_pretty(&reports).into_diagnostic()?;
        println!("{}", json_output);
    }

    if failed {
        Ok(exitcode::DATAERR)
    } else {
        Ok(exitcode::OK)
    }
}
