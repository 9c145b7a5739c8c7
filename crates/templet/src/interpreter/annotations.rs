//! The annotation set: directives that shape how values are produced and
//! rendered.
//!
//! Annotations are set by `@`-prefixed method calls and are scoped to the
//! invocation that sets them. The evaluator saves the set before applying a
//! call chain's annotations and restores it afterwards.

use std::fmt::{Display, Formatter, Result as FmtResult};

use regex::Regex;

/// How bullet counters behave when a level is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulletMode {
    /// A new counter at a level starts from the beginning.
    #[default]
    Restart,
    /// A new counter at a level resumes where that level last stopped.
    Continue,
}

impl BulletMode {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "restart" => Some(BulletMode::Restart),
            "continue" => Some(BulletMode::Continue),
            _ => None,
        }
    }
}

/// Which time zone dates are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFormatMode {
    /// The offset the date was written with.
    #[default]
    Original,
    Utc,
    Local,
}

impl DateFormatMode {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "original" => Some(DateFormatMode::Original),
            "utc" => Some(DateFormatMode::Utc),
            "local" => Some(DateFormatMode::Local),
            _ => None,
        }
    }
}

/// Output encodings for data strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Html,
    Xml,
    Uri,
}

impl Encoding {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "html" => Some(Encoding::Html),
            "xml" => Some(Encoding::Xml),
            "uri" => Some(Encoding::Uri),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Html => "html",
            Encoding::Xml => "xml",
            Encoding::Uri => "uri",
        }
    }
}

/// Indent style flags for multi-line text.
///
/// `indented`, `indent_all_but_first` and `padded` are mutually exclusive;
/// `tabbed` cannot be combined with either indented flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MultilineStyle {
    /// Continuation lines repeat the leading whitespace of the current line.
    pub indented: bool,
    /// Continuation lines align under the first character of the text.
    pub indent_all_but_first: bool,
    /// The text starts on a fresh line and is followed by a line break.
    pub padded: bool,
    /// Every line is prefixed with a tab.
    pub tabbed: bool,
    /// Lines are trimmed and blank leading and trailing lines dropped.
    pub trimmed: bool,
}

impl MultilineStyle {
    /// Build a style from flag names, validating combinations.
    pub fn from_flags<S: AsRef<str>>(flags: &[S]) -> Result<Self, String> {
        let mut style = MultilineStyle::default();
        for flag in flags {
            match flag.as_ref() {
                "Indented" => style.indented = true,
                "IndentAllButFirst" => style.indent_all_but_first = true,
                "Padded" => style.padded = true,
                "Tabbed" => style.tabbed = true,
                "Trimmed" => style.trimmed = true,
                other => return Err(format!("unknown multiline style '{other}'")),
            }
        }
        let exclusive = [style.indented, style.indent_all_but_first, style.padded];
        if exclusive.iter().filter(|&&set| set).count() > 1 {
            return Err("Indented, IndentAllButFirst and Padded are mutually exclusive".to_string());
        }
        if style.tabbed && (style.indented || style.indent_all_but_first) {
            return Err("Tabbed cannot be combined with an indented style".to_string());
        }
        Ok(style)
    }

    fn flag_names(self) -> Vec<&'static str> {
        [
            (self.indented, "Indented"),
            (self.indent_all_but_first, "IndentAllButFirst"),
            (self.padded, "Padded"),
            (self.tabbed, "Tabbed"),
            (self.trimmed, "Trimmed"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

impl Display for MultilineStyle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.flag_names().join(","))
    }
}

/// The annotation set in effect while evaluating a node.
#[derive(Debug, Clone)]
pub struct Annotations {
    pub bullet_styles: Option<Vec<String>>,
    pub bullet_mode: BulletMode,
    pub missing_value: Option<String>,
    pub date_format: Option<String>,
    pub date_format_mode: DateFormatMode,
    pub encoding: Option<Encoding>,
    /// Overrides the default falsy test of `false`, `0` and `no`.
    pub falsy: Option<Regex>,
    pub debug_level: u8,
    pub value_function: Option<String>,
    pub default_indent: usize,
    pub date_test: Option<Regex>,
    pub multiline_style: Option<MultilineStyle>,
}

impl Default for Annotations {
    fn default() -> Self {
        Self {
            bullet_styles: None,
            bullet_mode: BulletMode::Restart,
            missing_value: None,
            date_format: None,
            date_format_mode: DateFormatMode::Original,
            encoding: None,
            falsy: None,
            debug_level: 1,
            value_function: None,
            default_indent: 3,
            date_test: None,
            multiline_style: None,
        }
    }
}

impl Annotations {
    /// Names accepted by [`Annotations::get`].
    pub const NAMES: [&'static str; 12] = [
        "BulletStyle",
        "BulletMode",
        "MissingValue",
        "DateFormat",
        "DateFormatMode",
        "EncodeDataFor",
        "Falsy",
        "Debug",
        "ValueFunction",
        "DefaultIndent",
        "DateTest",
        "MultilineStyle",
    ];

    /// True when `text` counts as false.
    pub fn is_falsy(&self, text: &str) -> bool {
        match &self.falsy {
            Some(pattern) => pattern.is_match(text),
            None => ["false", "0", "no"]
                .iter()
                .any(|word| text.eq_ignore_ascii_case(word)),
        }
    }

    /// The text form of one annotation, as shown by `{@.Name}`.
    pub fn get(&self, name: &str) -> Option<String> {
        match name {
            "BulletStyle" => self.bullet_styles.as_ref().map(|styles| styles.join(" ")),
            "BulletMode" => Some(
                match self.bullet_mode {
                    BulletMode::Restart => "restart",
                    BulletMode::Continue => "continue",
                }
                .to_string(),
            ),
            "MissingValue" => self.missing_value.clone(),
            "DateFormat" => self.date_format.clone(),
            "DateFormatMode" => Some(
                match self.date_format_mode {
                    DateFormatMode::Original => "original",
                    DateFormatMode::Utc => "utc",
                    DateFormatMode::Local => "local",
                }
                .to_string(),
            ),
            "EncodeDataFor" => self.encoding.map(|e| e.name().to_string()),
            "Falsy" => Some(
                self.falsy
                    .as_ref()
                    .map_or("^(?i:false|0|no)$", Regex::as_str)
                    .to_string(),
            ),
            "Debug" => Some(self.debug_level.to_string()),
            "ValueFunction" => self.value_function.clone(),
            "DefaultIndent" => Some(self.default_indent.to_string()),
            "DateTest" => self.date_test.as_ref().map(|r| r.as_str().to_string()),
            "MultilineStyle" => self.multiline_style.map(|s| s.to_string()),
            _ => None,
        }
    }

    /// Every set annotation as `Name: value` lines.
    pub fn describe(&self) -> String {
        Self::NAMES
            .iter()
            .filter_map(|name| self.get(name).map(|value| format!("{name}: {value}")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
