use serde::Deserialize;
use std::fmt::Display;
use std::io::IsTerminal;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Rendered in place of any value the backend did not supply.
pub const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Bold,
    BrightRed,
    Green,
    BrightBlue,
    BrightYellow,
    BrightCyan,
}

impl Style {
    fn sgr(self) -> &'static str {
        match self {
            Style::Bold => "1",
            Style::BrightRed => "91",
            Style::Green => "32",
            Style::BrightBlue => "94",
            Style::BrightYellow => "93",
            Style::BrightCyan => "96",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Applies ANSI styles, or passes text through untouched when colour is off.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    #[cfg(test)]
    pub fn plain() -> Self {
        Self::new(false)
    }

    /// Resolve a colour mode against the process's stdout.
    pub fn for_stdout(mode: ColorMode) -> Self {
        let enabled = match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => {
                std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
            }
        };
        Self::new(enabled)
    }

    pub fn paint(&self, text: &str, style: Option<Style>) -> String {
        match style {
            Some(style) if self.enabled && !text.is_empty() => {
                format!("\x1b[{}m{}\x1b[0m", style.sgr(), text)
            }
            _ => text.to_string(),
        }
    }
}

/// A run of text with an optional style. `None` inherits the column style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Option<Style>,
}

/// One table cell, possibly made of differently styled spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub spans: Vec<Span>,
}

impl Span {
    fn new(text: impl Into<String>, style: Option<Style>) -> Self {
        let text: String = text.into();
        Self {
            text: printable(&text),
            style,
        }
    }
}

impl Cell {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            spans: vec![Span::new(text, None)],
        }
    }

    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        Self {
            spans: vec![Span::new(text, Some(style))],
        }
    }

    pub fn push(mut self, text: impl Into<String>, style: Option<Style>) -> Self {
        self.spans.push(Span::new(text, style));
        self
    }

    /// Visible width in terminal cells.
    pub fn width(&self) -> usize {
        self.spans.iter().map(|s| s.text.width()).sum()
    }

    /// Unstyled text content.
    #[cfg(test)]
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    /// Cut the cell to `max` terminal cells, ending with an ellipsis.
    pub fn truncate(&self, max: usize) -> Cell {
        if self.width() <= max || max == 0 {
            return self.clone();
        }
        let mut budget = max - 1;
        let mut spans = Vec::new();
        'spans: for span in &self.spans {
            let mut text = String::new();
            for ch in span.text.chars() {
                let w = ch.width().unwrap_or(0);
                if w > budget {
                    if !text.is_empty() {
                        spans.push(Span { text, style: span.style });
                    }
                    break 'spans;
                }
                budget -= w;
                text.push(ch);
            }
            spans.push(Span { text, style: span.style });
        }
        let style = spans.last().and_then(|s| s.style);
        spans.push(Span {
            text: "…".to_string(),
            style,
        });
        Cell { spans }
    }

    pub fn paint(&self, painter: &Painter, inherited: Option<Style>) -> String {
        self.spans
            .iter()
            .map(|s| painter.paint(&s.text, s.style.or(inherited)))
            .collect()
    }
}

/// Replace control characters so peer-supplied text cannot drive the terminal.
pub fn printable(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { '\u{fffd}' } else { c })
        .collect()
}

/// Format an integer with comma thousands separators.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn thousands_signed(n: i64) -> String {
    if n < 0 {
        format!("-{}", thousands(n.unsigned_abs()))
    } else {
        thousands(n.unsigned_abs())
    }
}

/// Shared rendering of nullable values.
pub fn nullable<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), |v| v.to_string())
}

pub fn nullable_thousands(value: Option<u64>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), thousands)
}

/// `n / d` rounded to the nearest integer, ties to even.
pub fn div_round_half_even(n: u64, d: u64) -> u64 {
    let q = n / d;
    let r = n % d;
    match (2 * r as u128).cmp(&(d as u128)) {
        std::cmp::Ordering::Greater => q + 1,
        std::cmp::Ordering::Equal => q + (q & 1),
        std::cmp::Ordering::Less => q,
    }
}

pub fn msat_to_sat(msat: u64) -> u64 {
    div_round_half_even(msat, 1000)
}
