use crate::core::LogCategory;
use ratatui::style::{Color, Modifier, Style};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static ERROR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(error|err|fatal|fail(ed)?|panic)\b").unwrap());
static WARNING_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bwarn(ing)?\b").unwrap());

#[derive(Clone)]
pub struct HighlightRule {
    pub regex: &'static LazyLock<Regex>,
    pub style: Style,
}

static KEYWORD_RULES: LazyLock<Vec<HighlightRule>> = LazyLock::new(|| {
    vec![
        HighlightRule {
            regex: &ERROR_PATTERN,
            style: Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        },
        HighlightRule {
            regex: &WARNING_PATTERN,
            style: Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        },
    ]
});

pub fn classify_line(line: &str) -> LogCategory {
    if ERROR_PATTERN.is_match(line) {
        LogCategory::Error
    } else if WARNING_PATTERN.is_match(line) {
        LogCategory::Warning
    } else {
        LogCategory::Plain
    }
}

pub fn category_style(category: LogCategory) -> Style {
    match category {
        LogCategory::Plain => Style::default(),
        LogCategory::Warning => Style::default().fg(Color::Yellow),
        LogCategory::Error => Style::default().fg(Color::Red),
        LogCategory::Command => Style::default().fg(Color::Cyan),
        LogCategory::Sent => Style::default().fg(Color::Green),
        LogCategory::Info => Style::default().fg(Color::Blue),
    }
}

/// Make device output safe to put in a terminal cell: carriage returns are
/// dropped, tabs become spaces, other control characters become `·`.
pub fn sanitize_for_display(text: &str) -> Cow<'_, str> {
    if !text.chars().any(char::is_control) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\r' => {}
            '\t' => out.push_str("    "),
            c if c.is_control() => out.push('·'),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

#[derive(Clone)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub style: Style,
    pub priority: u8,
}

pub fn highlight_line(text: &str, search_hits: &[(usize, usize)], keywords_enabled: bool) -> Vec<Span> {
    let mut spans: Vec<Span> = search_hits
        .iter()
        .map(|&(start, end)| Span {
            start,
            end,
            style: Style::default()
                .bg(Color::Yellow)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
            priority: 100,
        })
        .collect();

    if keywords_enabled {
        for rule in KEYWORD_RULES.iter() {
            for m in rule.regex.find_iter(text) {
                spans.push(Span {
                    start: m.start(),
                    end: m.end(),
                    style: rule.style,
                    priority: 10,
                });
            }
        }
    }

    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.priority.cmp(&a.priority)));
    spans
}

pub fn apply_highlights(text: &str, spans: &[Span], base: Style) -> Vec<(String, Style)> {
    if spans.is_empty() {
        return vec![(text.to_string(), base)];
    }

    let mut style_at: Vec<(Style, u8)> = vec![(base, 0); text.len()];
    for span in spans {
        let start = floor_char_boundary(text, span.start);
        let end = floor_char_boundary(text, span.end);
        for slot in &mut style_at[start..end] {
            if span.priority >= slot.1 {
                *slot = (span.style, span.priority);
            }
        }
    }

    let mut result = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let current = style_at[pos].0;
        let mut end = pos + 1;
        while end < text.len() && (style_at[end].0 == current || !text.is_char_boundary(end)) {
            end += 1;
        }
        result.push((text[pos..end].to_string(), current));
        pos = end;
    }
    result
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
