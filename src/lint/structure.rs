//! Heading counts, fenced-div balance, scene breaks, heading syntax, raw
//! LaTeX blocks.

use std::sync::LazyLock;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag};
use regex::Regex;

use crate::assemble::Section;
use crate::lint::{FileContext, FindingKind, LintFinding, char_column};

static DIV_OPENER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}:{3,}\s*[^:\s]").expect("valid regex"));
static DIV_CLOSER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}:{3,}\s*$").expect("valid regex"));
static HEADING_NO_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}[^\s#{]").expect("valid regex"));
static HEADING_CLOSING_HASHES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+.*\S\s+(#+)\s*$").expect("valid regex"));
static RAW_LATEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s{0,3}(?:`{3,}|~{3,})\s*\{=(?:la)?tex\}").expect("valid regex")
});

pub fn check(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    let mut findings = Vec::new();
    let h1_lines = level_one_headings(ctx.text);

    match ctx.section {
        Section::Chapters => findings.extend(heading_count(ctx, &h1_lines)),
        Section::Front => findings.extend(front_headings(ctx, &h1_lines)),
        Section::Back => {}
    }
    findings.extend(fenced_divs(ctx));
    findings.extend(scene_breaks(ctx));
    findings.extend(heading_spacing(ctx));
    findings.extend(closing_hashes(ctx));
    findings.extend(raw_latex(ctx));
    findings
}

/// 1-based line numbers of every level-1 heading (ATX or setext).
pub fn level_one_headings(text: &str) -> Vec<usize> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);

    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(text.match_indices('\n').map(|(idx, _)| idx + 1))
        .collect();

    Parser::new_ext(text, options)
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => Some(line_starts.partition_point(|start| *start <= range.start)),
            _ => None,
        })
        .collect()
}

fn heading_count(ctx: &FileContext<'_>, h1_lines: &[usize]) -> Option<LintFinding> {
    match h1_lines {
        [] => Some(ctx.finding(
            FindingKind::MissingHeading,
            1,
            0,
            "chapter file has no level-1 heading",
        )),
        [_] => None,
        [first, .., last] => {
            let listed: Vec<String> = h1_lines.iter().map(ToString::to_string).collect();
            let mut finding = ctx.finding(
                FindingKind::MultipleHeadings,
                *first,
                0,
                format!(
                    "chapter file has {} level-1 headings (lines {})",
                    h1_lines.len(),
                    listed.join(", ")
                ),
            );
            finding.end_line = Some(*last);
            Some(finding)
        }
    }
}

fn front_headings(ctx: &FileContext<'_>, h1_lines: &[usize]) -> Vec<LintFinding> {
    h1_lines
        .iter()
        .filter_map(|&line_no| {
            let line = ctx.lines.get(line_no - 1)?;
            let unnumbered = line.contains(".unnumbered") || line.contains("{-}");
            (line.trim_start().starts_with('#') && !unnumbered).then(|| {
                ctx.finding(
                    FindingKind::FrontHeadingNumbered,
                    line_no,
                    0,
                    "front matter heading missing {.unnumbered .unlisted}",
                )
            })
        })
        .collect()
}

fn fenced_divs(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    let mut findings = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for (idx, line) in ctx.lines.iter().enumerate() {
        if ctx.code[idx] {
            continue;
        }
        if DIV_CLOSER_RE.is_match(line) {
            if open.pop().is_none() {
                findings.push(ctx.finding(
                    FindingKind::UnmatchedDivCloser,
                    idx + 1,
                    1,
                    "fenced div closer ':::' without an opener",
                ));
            }
        } else if DIV_OPENER_RE.is_match(line) {
            open.push(idx + 1);
        }
    }

    for line_no in open {
        findings.push(ctx.finding(
            FindingKind::UnclosedDiv,
            line_no,
            1,
            "fenced div is never closed",
        ));
    }
    findings
}

fn scene_breaks(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    let marker = ctx.settings.scene_break.trim();
    let mut findings = Vec::new();

    for (idx, line) in ctx.lines.iter().enumerate() {
        if ctx.code[idx] {
            continue;
        }
        let trimmed = line.trim();
        if trimmed == marker {
            let blank_before = idx == 0 || ctx.is_blank(idx - 1);
            let blank_after = idx + 1 >= ctx.lines.len() || ctx.is_blank(idx + 1);
            let missing = match (blank_before, blank_after) {
                (true, true) => continue,
                (false, true) => "before",
                (true, false) => "after",
                (false, false) => "before and after",
            };
            findings.push(ctx.finding(
                FindingKind::SceneBreakSpacing,
                idx + 1,
                1,
                format!("scene break '{marker}' missing blank line {missing}"),
            ));
        } else if shares_line_with_text(trimmed, marker) {
            findings.push(ctx.finding(
                FindingKind::SceneBreakNotAlone,
                idx + 1,
                1,
                format!("scene break '{marker}' is not alone on its line"),
            ));
        }
    }
    findings
}

fn shares_line_with_text(trimmed: &str, marker: &str) -> bool {
    let leading = trimmed
        .strip_prefix(marker)
        .is_some_and(|rest| rest.starts_with([' ', '\t']) && !rest.trim().is_empty());
    let trailing = trimmed
        .strip_suffix(marker)
        .is_some_and(|rest| rest.ends_with([' ', '\t']) && !rest.trim().is_empty());
    leading || trailing
}

fn heading_spacing(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    ctx.lines
        .iter()
        .enumerate()
        .filter(|(idx, line)| !ctx.code[*idx] && HEADING_NO_SPACE_RE.is_match(line))
        .map(|(idx, _)| {
            ctx.finding(
                FindingKind::HeadingMissingSpace,
                idx + 1,
                1,
                "missing space after heading '#'",
            )
        })
        .collect()
}

/// `# Title #` closing sequences.
fn closing_hashes(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    ctx.lines
        .iter()
        .enumerate()
        .filter(|(idx, _)| !ctx.code[*idx])
        .filter_map(|(idx, line)| {
            let hashes = HEADING_CLOSING_HASHES_RE.captures(line)?.get(1)?;
            Some(ctx.finding(
                FindingKind::HeadingTrailingHashes,
                idx + 1,
                char_column(line, hashes.start()),
                "trailing '#' on heading",
            ))
        })
        .collect()
}

/// Raw LaTeX fences only render in the PDF build. The fence line itself is
/// code, so every line is checked.
fn raw_latex(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    ctx.lines
        .iter()
        .enumerate()
        .filter(|(_, line)| RAW_LATEX_RE.is_match(line))
        .map(|(idx, _)| {
            ctx.finding(
                FindingKind::RawLatexBlock,
                idx + 1,
                1,
                "raw LaTeX block is dropped from EPUB and DOCX output",
            )
        })
        .collect()
}
