//! Bullet numbering, the second composition pass.
//!
//! Every bullet left a sentinel in the text. Distinct line indents that still
//! carry a bullet are ordered by length (ties by text) and become levels
//! `0..n`, so a shallower indent always numbers at a lower level. Counters
//! live in an arena of frames linked to their parent frame.

use std::ops::Range;

use super::{BulletRecord, SENTINEL_CLOSE, SENTINEL_OPEN};
use crate::interpreter::BulletMode;

/// Styles used by level when no `@BulletStyle` is in effect.
const DEFAULT_STYLES: [&str; 5] = ["1.", "a.", "i.", "A.", "I."];

const ROMAN: [(usize, &str); 13] = [
    (1000, "m"),
    (900, "cm"),
    (500, "d"),
    (400, "cd"),
    (100, "c"),
    (90, "xc"),
    (50, "l"),
    (40, "xl"),
    (10, "x"),
    (9, "ix"),
    (5, "v"),
    (4, "iv"),
    (1, "i"),
];

/// The counting scheme of a style token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordinal {
    /// Decimal, zero-padded to `width` digits.
    Numeric { width: usize },
    LowerAlpha,
    UpperAlpha,
    LowerRoman,
    UpperRoman,
}

/// A parsed bullet style token: `prefix ordinal[:start] postfix`.
///
/// A token without an ordinal is a literal glyph such as `•`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletStyle {
    pub prefix: String,
    pub ordinal: Option<Ordinal>,
    pub start: usize,
    pub postfix: String,
}

impl BulletStyle {
    pub fn parse(token: &str) -> BulletStyle {
        let chars: Vec<(usize, char)> = token.char_indices().collect();
        let letter_at = |i: usize| chars.get(i).is_some_and(|(_, c)| c.is_alphabetic());
        let end_of = |i: usize| chars.get(i).map_or(token.len(), |(offset, _)| *offset);

        let mut found = None;
        for (i, &(offset, c)) in chars.iter().enumerate() {
            if c.is_ascii_digit() {
                let run = chars[i..].iter().take_while(|(_, c)| c.is_ascii_digit()).count();
                let width = if c == '0' && run > 1 { run } else { 0 };
                found = Some((offset, end_of(i + run), Ordinal::Numeric { width }));
                break;
            }
            let standalone = !letter_at(i + 1) && (i == 0 || !letter_at(i - 1));
            let ordinal = match c {
                'a' => Ordinal::LowerAlpha,
                'A' => Ordinal::UpperAlpha,
                'i' => Ordinal::LowerRoman,
                'I' => Ordinal::UpperRoman,
                _ => continue,
            };
            if standalone {
                found = Some((offset, end_of(i + 1), ordinal));
                break;
            }
        }

        let Some((start, mut end, ordinal)) = found else {
            return BulletStyle {
                prefix: token.to_string(),
                ordinal: None,
                start: 1,
                postfix: String::new(),
            };
        };
        let mut first = 1;
        if let Some(rest) = token[end..].strip_prefix(':') {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            if let Ok(value) = digits.parse() {
                first = value;
                end += 1 + digits.len();
            }
        }
        BulletStyle {
            prefix: token[..start].to_string(),
            ordinal: Some(ordinal),
            start: first,
            postfix: token[end..].to_string(),
        }
    }

    /// The label of the bullet at 0-based `index` within its counter.
    pub fn label(&self, index: usize) -> String {
        match self.ordinal {
            None => self.prefix.clone(),
            Some(ordinal) => format!(
                "{}{}{}",
                self.prefix,
                format_ordinal(ordinal, self.start + index),
                self.postfix
            ),
        }
    }
}

/// Render `n` in the given counting scheme. Letters count bijectively
/// (`z`, `aa`, `ab`); roman numerals fall back to decimal above 3999.
pub fn format_ordinal(ordinal: Ordinal, n: usize) -> String {
    match ordinal {
        Ordinal::Numeric { width } => format!("{n:0width$}"),
        Ordinal::LowerAlpha => alphabetic(n),
        Ordinal::UpperAlpha => alphabetic(n).to_uppercase(),
        Ordinal::LowerRoman => roman(n),
        Ordinal::UpperRoman => roman(n).to_uppercase(),
    }
}

fn alphabetic(n: usize) -> String {
    if n == 0 {
        return n.to_string();
    }
    let mut letters = Vec::new();
    let mut rest = n;
    while rest > 0 {
        let digit = u8::try_from((rest - 1) % 26).unwrap_or_default();
        letters.push(char::from(b'a' + digit));
        rest = (rest - 1).div_euclid(26);
    }
    letters.iter().rev().collect()
}

fn roman(n: usize) -> String {
    if n == 0 || n > 3999 {
        return n.to_string();
    }
    let mut out = String::new();
    let mut rest = n;
    for (value, numeral) in ROMAN {
        while rest >= value {
            out.push_str(numeral);
            rest -= value;
        }
    }
    out
}

/// One counter of the chain.
#[derive(Debug)]
struct Frame {
    level: usize,
    index: usize,
    indent: String,
    parent: Option<usize>,
    styles: Option<Vec<String>>,
    /// The level at which the current explicit styles were introduced.
    reseeded: usize,
}

#[derive(Debug, Default)]
struct BulletChain {
    frames: Vec<Frame>,
    current: Option<usize>,
    /// The last count reached at each level, for `continue` mode.
    last_count: Vec<usize>,
}

impl BulletChain {
    fn label(&mut self, record: &BulletRecord, level: usize) -> String {
        let id = self.frame_for(record, level);
        self.current = Some(id);
        let frame = &mut self.frames[id];
        if record.styles.is_some() && frame.styles != record.styles {
            frame.styles.clone_from(&record.styles);
            frame.reseeded = frame.level;
            frame.index = 0;
        }

        let position = frame.index;
        frame.index += 1;
        if self.last_count.len() <= frame.level {
            self.last_count.resize(frame.level + 1, 0);
        }
        self.last_count[frame.level] = frame.index;

        let token = match &frame.styles {
            Some(styles) if !styles.is_empty() => {
                let slot = frame.level.saturating_sub(frame.reseeded) % styles.len();
                styles[slot].as_str()
            }
            _ => DEFAULT_STYLES[frame.level % DEFAULT_STYLES.len()],
        };
        BulletStyle::parse(token).label(position)
    }

    /// Same indent continues the current counter, a longer one opens a child
    /// counter, a shorter one returns to the nearest ancestor with the same
    /// indent or level, else opens a sibling under the nearest shallower
    /// ancestor.
    fn frame_for(&mut self, record: &BulletRecord, level: usize) -> usize {
        let marker = record.marker.as_str();
        let Some(current) = self.current else {
            return self.open(None, level, record);
        };
        if self.frames[current].indent == marker {
            return current;
        }
        if marker.len() > self.frames[current].indent.len() {
            return self.open(Some(current), level, record);
        }

        let mut cursor = Some(current);
        while let Some(id) = cursor {
            let frame = &self.frames[id];
            if frame.indent == marker || frame.level == level {
                return id;
            }
            cursor = frame.parent;
        }
        let mut parent = self.frames[current].parent;
        while let Some(id) = parent {
            if self.frames[id].indent.len() < marker.len() {
                break;
            }
            parent = self.frames[id].parent;
        }
        self.open(parent, level, record)
    }

    fn open(&mut self, parent: Option<usize>, level: usize, record: &BulletRecord) -> usize {
        let inherited =
            parent.map(|id| (self.frames[id].styles.clone(), self.frames[id].reseeded));
        let (styles, reseeded) = match (&record.styles, inherited) {
            (Some(styles), Some((Some(outer), reseeded))) if *styles == outer => {
                (Some(outer), reseeded)
            }
            (Some(styles), _) => (Some(styles.clone()), level),
            (None, Some(inherited)) => inherited,
            (None, None) => (None, 0),
        };
        let index = match record.mode {
            BulletMode::Continue => self.last_count.get(level).copied().unwrap_or_default(),
            BulletMode::Restart => 0,
        };
        self.frames.push(Frame {
            level,
            index,
            indent: record.marker.clone(),
            parent,
            styles,
            reseeded,
        });
        self.frames.len() - 1
    }
}

/// Sentinels in `text` with the bullet id each one carries.
fn sentinels(text: &str) -> Vec<(Range<usize>, usize)> {
    let mut found = Vec::new();
    for (open, _) in text.match_indices(SENTINEL_OPEN) {
        let body_start = open + SENTINEL_OPEN.len_utf8();
        let Some(length) = text[body_start..].find(SENTINEL_CLOSE) else {
            continue;
        };
        if let Ok(id) = text[body_start..body_start + length].parse() {
            found.push((open..body_start + length + SENTINEL_CLOSE.len_utf8(), id));
        }
    }
    found
}

/// Replace every bullet sentinel in `text` with its label.
pub(super) fn number(text: &str, bullets: &[BulletRecord]) -> String {
    let present: Vec<(Range<usize>, &BulletRecord)> = sentinels(text)
        .into_iter()
        .filter_map(|(range, id)| bullets.get(id).map(|record| (range, record)))
        .collect();
    if present.is_empty() {
        return text.to_string();
    }

    let mut markers: Vec<&str> = present
        .iter()
        .map(|(_, record)| record.marker.as_str())
        .collect();
    markers.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    markers.dedup();

    let mut chain = BulletChain::default();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for (range, record) in present {
        let level = markers
            .iter()
            .position(|marker| *marker == record.marker)
            .unwrap_or_default();
        out.push_str(&text[copied..range.start]);
        out.push_str(&chain.label(record, level));
        copied = range.end;
    }
    out.push_str(&text[copied..]);
    out
}
