//! Whitespace and house-style conventions outside fenced code. Every kind here
//! is auto-fixable; the predicates are shared with the fixers in `fix.rs`.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::{HeadingAttributeStyle, LintSettings};
use crate::lint::{FileContext, FindingKind, LintFinding, char_column};

static DIV_NO_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s{0,3}:{3,})\{").expect("valid regex"));
static HEADING_ATTRS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6}\s.*?\{)([^{}]*)(\}\s*)$").expect("valid regex"));

pub const LONG_UNNUMBERED: &str = ".unnumbered";
pub const SHORT_UNNUMBERED: &str = "-";

pub fn check(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    let mut findings = Vec::new();

    for (idx, line) in ctx.lines.iter().enumerate() {
        let line_no = idx + 1;
        if ctx.code[idx] {
            continue;
        }

        for (offset, _) in line.match_indices('\t') {
            findings.push(ctx.finding(
                FindingKind::TabCharacter,
                line_no,
                char_column(line, offset),
                "tab character (use spaces)",
            ));
        }

        for (start, end) in interior_space_runs(line) {
            findings.push(ctx.finding(
                FindingKind::MultipleSpaces,
                line_no,
                char_column(line, start),
                format!("{} consecutive spaces", end - start),
            ));
        }

        if let Some(offset) = trailing_whitespace_start(line) {
            findings.push(ctx.finding(
                FindingKind::TrailingWhitespace,
                line_no,
                char_column(line, offset),
                "trailing whitespace",
            ));
        }

        if let Some(caps) = DIV_NO_SPACE_RE.captures(line) {
            let offset = caps.get(1).map_or(0, |m| m.end());
            findings.push(ctx.finding(
                FindingKind::DivMissingSpace,
                line_no,
                char_column(line, offset),
                "missing space between ':::' and '{'",
            ));
        }

        if let Some(offset) = wrong_heading_attribute(line, ctx.settings) {
            let expected = match ctx.settings.heading_attributes {
                HeadingAttributeStyle::Long => LONG_UNNUMBERED,
                HeadingAttributeStyle::Short => SHORT_UNNUMBERED,
            };
            findings.push(ctx.finding(
                FindingKind::HeadingAttributeStyle,
                line_no,
                char_column(line, offset),
                format!("heading attribute should use '{expected}'"),
            ));
        }

        if is_stray_rule(&ctx.lines, &ctx.code, idx, ctx.settings) {
            findings.push(ctx.finding(
                FindingKind::SceneBreakStyle,
                line_no,
                1,
                format!(
                    "scene break should be '{}'",
                    ctx.settings.scene_break.trim()
                ),
            ));
        }
    }

    findings.extend(excess_blank_lines(ctx));

    if !ctx.text.is_empty() && !ctx.text.ends_with('\n') {
        let line = ctx.lines.last().copied().unwrap_or_default();
        findings.push(ctx.finding(
            FindingKind::MissingFinalNewline,
            ctx.lines.len(),
            line.chars().count() + 1,
            "file does not end with a newline",
        ));
    }

    findings
}

fn excess_blank_lines(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    let max = ctx.settings.max_blank_lines;
    blank_runs(&ctx.lines, &ctx.code)
        .into_iter()
        .filter(|(_, len)| *len > max)
        .map(|(start, len)| {
            let mut finding = ctx.finding(
                FindingKind::ExcessBlankLines,
                start + max + 1,
                0,
                format!("{len} consecutive blank lines (max {max})"),
            );
            finding.end_line = Some(start + len);
            finding
        })
        .collect()
}

/// Byte offset where a line's trailing spaces and tabs begin.
pub fn trailing_whitespace_start(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches([' ', '\t']);
    (trimmed.len() < line.len()).then_some(trimmed.len())
}

/// Byte ranges of runs of two or more spaces between text; indentation and
/// trailing whitespace are left to their own checks.
pub fn interior_space_runs(line: &str) -> Vec<(usize, usize)> {
    let body_end = line.trim_end_matches([' ', '\t']).len();
    let bytes = line.as_bytes();
    let mut runs = Vec::new();
    let mut idx = 0;
    while idx < body_end {
        if bytes[idx] != b' ' {
            idx += 1;
            continue;
        }
        let start = idx;
        while idx < body_end && bytes[idx] == b' ' {
            idx += 1;
        }
        if idx - start >= 2 && start > 0 && !bytes[start - 1].is_ascii_whitespace() {
            runs.push((start, idx));
        }
    }
    runs
}

/// Collapse every interior run of spaces to one.
pub fn collapse_interior_spaces(line: &str) -> Option<String> {
    let runs = interior_space_runs(line);
    if runs.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for (start, end) in runs {
        out.push_str(&line[last..start]);
        out.push(' ');
        last = end;
    }
    out.push_str(&line[last..]);
    Some(out)
}

/// Tabs become four spaces.
pub fn expand_tabs(line: &str) -> Option<String> {
    line.contains('\t').then(|| line.replace('\t', "    "))
}

/// `(first index, length)` of each run of blank lines outside code blocks.
pub fn blank_runs(lines: &[&str], code: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, line) in lines.iter().enumerate() {
        let blank = !code[idx] && line.trim().is_empty();
        match (blank, start) {
            (true, None) => start = Some(idx),
            (false, Some(first)) => {
                runs.push((first, idx - first));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(first) = start {
        runs.push((first, lines.len() - first));
    }
    runs
}

/// Byte offset of an unnumbered token written in the other style.
pub fn wrong_heading_attribute(line: &str, settings: &LintSettings) -> Option<usize> {
    let caps = HEADING_ATTRS_RE.captures(line)?;
    let attrs = caps.get(2)?;
    let unwanted = match settings.heading_attributes {
        HeadingAttributeStyle::Long => SHORT_UNNUMBERED,
        HeadingAttributeStyle::Short => LONG_UNNUMBERED,
    };
    let mut offset = attrs.start();
    for token in attrs.as_str().split(' ') {
        if token == unwanted {
            return Some(offset);
        }
        offset += token.len() + 1;
    }
    None
}

/// Rewrite the unnumbered token of a heading line into the configured style.
pub fn normalize_heading_attribute(line: &str, settings: &LintSettings) -> Option<String> {
    wrong_heading_attribute(line, settings)?;
    let caps = HEADING_ATTRS_RE.captures(line)?;
    let (unwanted, wanted) = match settings.heading_attributes {
        HeadingAttributeStyle::Long => (SHORT_UNNUMBERED, LONG_UNNUMBERED),
        HeadingAttributeStyle::Short => (LONG_UNNUMBERED, SHORT_UNNUMBERED),
    };
    let attrs: Vec<&str> = caps[2]
        .split(' ')
        .map(|token| if token == unwanted { wanted } else { token })
        .collect();
    Some(format!("{}{}{}", &caps[1], attrs.join(" "), &caps[3]))
}

/// Insert the missing space in `:::{...}`.
pub fn space_div_attributes(line: &str) -> Option<String> {
    let caps = DIV_NO_SPACE_RE.captures(line)?;
    let split = caps.get(1)?.end();
    Some(format!("{} {}", &line[..split], &line[split..]))
}

/// A bare `---` rule used as a scene break when the house marker differs.
pub fn is_stray_rule(lines: &[&str], code: &[bool], idx: usize, settings: &LintSettings) -> bool {
    idx > 0
        && !code[idx]
        && lines[idx].trim() == "---"
        && settings.scene_break.trim() != "---"
        && lines[idx - 1].trim().is_empty()
}
