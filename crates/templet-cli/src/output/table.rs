//! Table formatting utilities for CLI output.

use comfy_table::{presets, ContentArrangement, Table};
use templet::parser::Token;

/// Format a token stream as a table of kinds, texts and positions.
pub fn format_token_table(tokens: &[Token<'_>]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_BORDERS_ONLY);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Kind", "Text", "Line", "Column"]);

    for token in tokens {
        table.add_row(vec![
            token.kind.name().to_string(),
            format!("{:?}", token.text),
            token.position.line.to_string(),
            token.position.column.to_string(),
        ]);
    }

    table
}
