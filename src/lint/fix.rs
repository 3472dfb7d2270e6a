//! Mechanical fixes. Each fixer is a pure `text -> text` rewrite that removes
//! every finding of its kind and never introduces new fixable findings when
//! applied in [`FIX_ORDER`].

use serde::Serialize;

use crate::assemble::ManuscriptFile;
use crate::config::{LintSettings, QuoteStyle};
use crate::error::{Error, Result};
use crate::lint::formatting::{
    blank_runs, collapse_interior_spaces, expand_tabs, is_stray_rule,
    normalize_heading_attribute, space_div_attributes,
};
use crate::lint::{FindingKind, code_mask, scan_text};

pub(crate) type Fixer = fn(&str, &LintSettings) -> String;

/// Encoding fixes run before formatting fixes so that, for example, a
/// non-breaking space turned into a space is then trimmed as trailing
/// whitespace in the same pass. Tabs expand before interior space runs collapse.
const FIX_ORDER: [FindingKind; 19] = [
    FindingKind::ByteOrderMark,
    FindingKind::CarriageReturn,
    FindingKind::NonBreakingSpace,
    FindingKind::ZeroWidth,
    FindingKind::SoftHyphen,
    FindingKind::DirectionalMark,
    FindingKind::CurlyDoubleQuote,
    FindingKind::CurlySingleQuote,
    FindingKind::Ellipsis,
    FindingKind::EnDash,
    FindingKind::EmDash,
    FindingKind::TabCharacter,
    FindingKind::MultipleSpaces,
    FindingKind::DivMissingSpace,
    FindingKind::HeadingAttributeStyle,
    FindingKind::SceneBreakStyle,
    FindingKind::TrailingWhitespace,
    FindingKind::ExcessBlankLines,
    FindingKind::MissingFinalNewline,
];

pub(crate) fn fixer(kind: FindingKind) -> Option<Fixer> {
    use FindingKind::*;
    let fixer: Fixer = match kind {
        ByteOrderMark => strip_bom,
        CarriageReturn => unix_line_endings,
        NonBreakingSpace => |text, _| text.replace('\u{00A0}', " "),
        ZeroWidth => |text, _| text.replace(['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'], ""),
        SoftHyphen => |text, _| text.replace('\u{00AD}', ""),
        DirectionalMark => |text, _| text.replace(['\u{200E}', '\u{200F}'], ""),
        CurlyDoubleQuote => |text, settings| {
            straight_only(text, settings, |t| t.replace(['\u{201C}', '\u{201D}'], "\""))
        },
        CurlySingleQuote => |text, settings| {
            straight_only(text, settings, |t| t.replace(['\u{2018}', '\u{2019}'], "'"))
        },
        Ellipsis => |text, settings| straight_only(text, settings, |t| t.replace('\u{2026}', "...")),
        EnDash => |text, settings| straight_only(text, settings, |t| t.replace('\u{2013}', "--")),
        EmDash => |text, settings| straight_only(text, settings, |t| t.replace('\u{2014}', "---")),
        TabCharacter => |text, _| rewrite_lines(text, |line, _, _| expand_tabs(line)),
        MultipleSpaces => |text, _| {
            rewrite_lines(text, |line, _, _| collapse_interior_spaces(line))
        },
        DivMissingSpace => |text, _| rewrite_lines(text, |line, _, _| space_div_attributes(line)),
        HeadingAttributeStyle => |text, settings| {
            rewrite_lines(text, |line, _, _| normalize_heading_attribute(line, settings))
        },
        SceneBreakStyle => |text, settings| {
            rewrite_lines(text, |_, idx, (lines, code)| {
                is_stray_rule(lines, code, idx, settings)
                    .then(|| settings.scene_break.trim().to_owned())
            })
        },
        TrailingWhitespace => |text, _| {
            rewrite_lines(text, |line, _, _| {
                let trimmed = line.trim_end_matches([' ', '\t']);
                (trimmed.len() < line.len()).then(|| trimmed.to_owned())
            })
        },
        ExcessBlankLines => collapse_blank_lines,
        MissingFinalNewline => |text, _| {
            if text.is_empty() || text.ends_with('\n') {
                text.to_owned()
            } else {
                format!("{text}\n")
            }
        },
        InvalidUtf8 | StraightDoubleQuote | StraightSingleQuote | MissingHeading
        | MultipleHeadings | UnclosedDiv | UnmatchedDivCloser | SceneBreakSpacing
        | SceneBreakNotAlone | HeadingMissingSpace | HeadingTrailingHashes
        | FrontHeadingNumbered | RawLatexBlock => return None,
    };
    Some(fixer)
}

/// Apply every fixer in order.
pub fn apply_fixes(text: &str, settings: &LintSettings) -> String {
    FIX_ORDER
        .iter()
        .filter_map(|kind| fixer(*kind))
        .fold(text.to_owned(), |acc, fix| fix(&acc, settings))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FixSummary {
    pub files_changed: usize,
    /// Fixable findings that no longer appear after the rewrite.
    pub resolved: usize,
}

/// Rewrite each file in place with [`apply_fixes`]; unchanged files are not touched.
///
/// Files that are not valid UTF-8 are skipped; their findings stay manual.
pub fn fix(files: &[ManuscriptFile], settings: &LintSettings) -> Result<FixSummary> {
    let mut summary = FixSummary::default();
    for file in files {
        let bytes = std::fs::read(&file.path).map_err(|err| Error::io(&file.path, err))?;
        let Ok(text) = String::from_utf8(bytes) else {
            tracing::warn!(path = %file.path.display(), "skipping fixes: not valid UTF-8");
            continue;
        };

        let fixed = apply_fixes(&text, settings);
        if fixed == text {
            continue;
        }

        let fixable = |text: &str| {
            scan_text(&file.path, file.section, text, settings)
                .iter()
                .filter(|finding| finding.fixable)
                .count()
        };
        let resolved = fixable(&text).saturating_sub(fixable(&fixed));

        std::fs::write(&file.path, &fixed).map_err(|err| Error::io(&file.path, err))?;
        tracing::info!(path = %file.path.display(), resolved, "applied fixes");
        summary.files_changed += 1;
        summary.resolved += resolved;
    }
    Ok(summary)
}

fn straight_only(text: &str, settings: &LintSettings, rewrite: impl Fn(&str) -> String) -> String {
    match settings.quotes {
        QuoteStyle::Straight => rewrite(text),
        QuoteStyle::Curly => text.to_owned(),
    }
}

fn strip_bom(text: &str, _: &LintSettings) -> String {
    text.strip_prefix('\u{FEFF}').unwrap_or(text).to_owned()
}

fn unix_line_endings(text: &str, _: &LintSettings) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Split into `(body, ending)` pairs; bodies match [`crate::lint::split_lines`].
fn split_with_endings(text: &str) -> Vec<(&str, &str)> {
    text.split_inclusive('\n')
        .map(|raw| {
            if let Some(body) = raw.strip_suffix("\r\n") {
                (body, "\r\n")
            } else if let Some(body) = raw.strip_suffix('\n') {
                (body, "\n")
            } else {
                (raw, "")
            }
        })
        .collect()
}

/// Rewrite non-code lines; `rewrite` returns `None` to keep a line as is.
///
/// Line endings are preserved.
fn rewrite_lines<F>(text: &str, mut rewrite: F) -> String
where
    F: FnMut(&str, usize, (&[&str], &[bool])) -> Option<String>,
{
    let parts = split_with_endings(text);
    let bodies: Vec<&str> = parts.iter().map(|(body, _)| *body).collect();
    let code = code_mask(&bodies);

    let mut out = String::with_capacity(text.len());
    for (idx, &(body, ending)) in parts.iter().enumerate() {
        let replaced = if code[idx] {
            None
        } else {
            rewrite(body, idx, (bodies.as_slice(), code.as_slice()))
        };
        out.push_str(replaced.as_deref().unwrap_or(body));
        out.push_str(ending);
    }
    out
}

fn collapse_blank_lines(text: &str, settings: &LintSettings) -> String {
    let parts = split_with_endings(text);
    let bodies: Vec<&str> = parts.iter().map(|(body, _)| *body).collect();
    let code = code_mask(&bodies);

    let max = settings.max_blank_lines;
    let mut dropped = vec![false; parts.len()];
    for (start, len) in blank_runs(&bodies, &code) {
        if len > max {
            dropped[start + max..start + len].fill(true);
        }
    }

    let mut out = String::with_capacity(text.len());
    for (idx, (body, ending)) in parts.iter().enumerate() {
        if !dropped[idx] {
            out.push_str(body);
            out.push_str(ending);
        }
    }
    out
}
