//! Composition: turning a [`Value`] tree into text.
//!
//! Composition runs in two passes. The first concatenates the tree
//! depth-first, laying out lists and multi-line text and leaving a sentinel
//! for every bullet. The second assigns each bullet a level from the
//! indentation of its line and replaces the sentinels with ordinals (see
//! [`bullets`]).

mod bullets;

use std::mem;

use crate::interpreter::{BulletMode, MultilineStyle, Value, format_date};

pub use bullets::{BulletStyle, Ordinal, format_ordinal};

/// Compose a value into text.
///
/// # Example
///
/// ```
/// use templet::Value;
/// use templet::compose::render;
///
/// let list = Value::List(vec![Value::text("a"), Value::text("b")]);
/// assert_eq!(render(&Value::Seq(vec![Value::text("  "), list])), "  a\n  b");
/// ```
pub fn render(value: &Value) -> String {
    let mut writer = Writer::default();
    writer.write(value);
    let text = writer.finish();
    bullets::number(&text, &writer.bullets)
}

/// A bullet seen during the first pass.
#[derive(Debug, Clone)]
struct BulletRecord {
    /// The leading whitespace of the bullet's line.
    marker: String,
    styles: Option<Vec<String>>,
    mode: BulletMode,
}

const SENTINEL_OPEN: char = '\u{E000}';
const SENTINEL_CLOSE: char = '\u{E001}';

fn sentinel(id: usize) -> String {
    format!("{SENTINEL_OPEN}{id}{SENTINEL_CLOSE}")
}

fn leading_whitespace(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(line.len(), |(i, _)| i);
    &line[..end]
}

#[derive(Default)]
struct Writer {
    out: String,
    bullets: Vec<BulletRecord>,
    /// Set by a `Null`: output is dropped up to and including the next
    /// newline.
    suppress: bool,
    /// Inside a bullet's children: the indent a list starts on.
    bullet_indent: Option<String>,
}

impl Writer {
    fn line_start(&self) -> usize {
        self.out.rfind('\n').map_or(0, |i| i + 1)
    }

    fn current_line(&self) -> &str {
        &self.out[self.line_start()..]
    }

    fn push(&mut self, text: &str) {
        if !self.suppress {
            self.out.push_str(text);
            return;
        }
        if let Some(newline) = text.find('\n') {
            self.suppress = false;
            self.out.push_str(&text[newline + 1..]);
        }
    }

    fn finish(&mut self) -> String {
        if self.suppress && self.out.ends_with('\n') {
            self.out.pop();
        }
        mem::take(&mut self.out)
    }

    fn write(&mut self, value: &Value) {
        match value {
            Value::Scalar(scalar) => self.push(&scalar.as_text()),
            Value::Data(node) if node.is_list() => {
                let items: Vec<Value> = node.elements().into_iter().map(Value::from_node).collect();
                self.write_items(&items);
            }
            Value::Data(node) => self.push(&node.to_canonical_text(0)),
            Value::Missing { fallback, .. } => {
                if let Some(fallback) = fallback {
                    self.push(fallback);
                }
            }
            Value::Date {
                instant,
                original,
                format,
                mode,
            } => self.push(&format_date(instant, original, format.as_deref(), *mode)),
            Value::Bullet {
                children,
                default_indent,
                styles,
                mode,
            } => {
                let marker = leading_whitespace(self.current_line()).to_string();
                let list_indent = format!("{marker}{}", " ".repeat(*default_indent));
                self.push(&sentinel(self.bullets.len()));
                self.bullets.push(BulletRecord {
                    marker,
                    styles: styles.clone(),
                    mode: *mode,
                });
                let saved = self.bullet_indent.replace(list_indent);
                for child in children {
                    self.write(child);
                }
                self.bullet_indent = saved;
            }
            Value::Multiline { text, style } => self.write_multiline(text, *style),
            Value::Aggregate(items) | Value::List(items) => self.write_items(items),
            Value::Seq(items) => {
                for item in items {
                    self.write(item);
                }
            }
            Value::Null => {
                let start = self.line_start();
                self.out.truncate(start);
                self.suppress = true;
            }
            Value::Error(message) => self.push(&format!("ERROR: {message}")),
        }
    }

    /// One element per line. Inside a bullet's children the list starts on
    /// a new line; elsewhere the first element continues the current line.
    /// Elements that produce nothing leave no line behind.
    fn write_items(&mut self, items: &[Value]) {
        let (indent, lead) = match self.bullet_indent.take() {
            Some(indent) => (indent, true),
            None => (leading_whitespace(self.current_line()).to_string(), false),
        };
        let separator = format!("\n{indent}");
        let mut written = false;
        for item in items {
            let mark = self.out.len();
            if written || lead {
                self.push(&separator);
            }
            let content = self.out.len();
            self.write(item);
            if self.suppress {
                // The element deleted its own line; the deletion ends with it.
                self.suppress = false;
                self.out.truncate(mark);
            } else if self.out.len() == content {
                self.out.truncate(mark);
            } else {
                written = true;
            }
        }
    }

    fn write_multiline(&mut self, text: &str, style: MultilineStyle) {
        let mut lines: Vec<&str> = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        if style.trimmed {
            lines = lines.into_iter().map(str::trim).collect();
            while lines.first().is_some_and(|line| line.is_empty()) {
                lines.remove(0);
            }
            while lines.last().is_some_and(|line| line.is_empty()) {
                lines.pop();
            }
        }

        let current = self.current_line();
        let indent = if style.indented || style.padded {
            leading_whitespace(current).to_string()
        } else if style.indent_all_but_first {
            " ".repeat(current.chars().count())
        } else {
            String::new()
        };
        let tab = if style.tabbed { "\t" } else { "" };

        if style.padded && !current.trim().is_empty() {
            self.push(&format!("\n{indent}"));
        }
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                self.push(&format!("\n{indent}"));
            }
            self.push(tab);
            self.push(line);
        }
        if style.padded {
            self.push("\n");
        }
    }
}
