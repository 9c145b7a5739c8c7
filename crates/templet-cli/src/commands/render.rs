//! Implementation of the `templet render` command.

use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use miette::{miette, IntoDiagnostic, Report, Result};
use owo_colors::OwoColorize;
use templet::Session;
use tracing::info;

use crate::fetch::FsFetcher;
use crate::output::TempletDiagnostic;

/// Arguments for the render command.
#[derive(Debug, clap::Args)]
pub struct RenderArgs {
    /// Template file to render
    pub template: PathBuf,

    /// JSON file with the data payload
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Directory that remote locations resolve against. Defaults to the
    /// template's directory.
    #[arg(long, env = "TEMPLET_ROOT")]
    pub root: Option<PathBuf>,

    /// Maximum sub-template nesting depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Print the debug log after the output
    #[arg(long)]
    pub show_log: bool,

    /// Output the whole result payload as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the render command.
pub fn run_render(args: RenderArgs) -> Result<i32> {
    let template = read_to_string(&args.template)
        .into_diagnostic()
        .map_err(|e| miette!("Cannot read template {}: {}", args.template.display(), e))?;
    let data = match &args.data {
        Some(path) => read_to_string(path)
            .into_diagnostic()
            .map_err(|e| miette!("Cannot read data file {}: {}", path.display(), e))?,
        None => String::new(),
    };

    let root = args
        .root
        .clone()
        .or_else(|| args.template.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    info!(root = %root.display(), "resolving remote locations");
    let mut fetcher = FsFetcher::new(root);

    let mut session = match args.max_depth {
        Some(depth) => Session::builder().max_depth(depth).build(),
        None => Session::new(),
    };
    let result = session.render(&template, &data, &mut fetcher);

    if args.json {
        let json_output = serde_json::to_string_pretty(&result).into_diagnostic()?;
        println!("{}", json_output);
    } else {
        println!("{}", result.result);
        for record in &result.errors {
            let diagnostic = TempletDiagnostic::from_record(&args.template, &template, record);
            eprintln!("{:?}", Report::new(diagnostic));
        }
        if args.show_log {
            for entry in &result.debug_log {
                eprintln!("{} {}", format!("[{}]", entry.level).dimmed(), entry.text);
            }
        }
    }

    if result.errors.is_empty() {
        Ok(exitcode::OK)
    } else {
        Ok(exitcode::DATAERR)
    }
}
