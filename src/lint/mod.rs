//! Manuscript linter.
//!
//! Every check is pattern or structure based and runs per file. Findings from
//! all files are merged and sorted by (path, line, column). Fixable kinds carry
//! a pure `text -> text` fixer; [`fix`] applies them and leaves manual findings
//! for the next scan.

pub mod encoding;
mod fix;
pub mod formatting;
pub mod structure;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::assemble::{ManuscriptFile, Section};
use crate::config::LintSettings;
use crate::error::{Error, Result};

pub use fix::{FixSummary, apply_fixes, fix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Encoding,
    Structural,
    Formatting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Encoding => "encoding",
            Category::Structural => "structural",
            Category::Formatting => "formatting",
        })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    InvalidUtf8,
    ByteOrderMark,
    CarriageReturn,
    NonBreakingSpace,
    ZeroWidth,
    SoftHyphen,
    DirectionalMark,
    CurlyDoubleQuote,
    CurlySingleQuote,
    Ellipsis,
    EnDash,
    EmDash,
    StraightDoubleQuote,
    StraightSingleQuote,

    MissingHeading,
    MultipleHeadings,
    UnclosedDiv,
    UnmatchedDivCloser,
    SceneBreakSpacing,
    SceneBreakNotAlone,
    HeadingMissingSpace,
    HeadingTrailingHashes,
    FrontHeadingNumbered,
    RawLatexBlock,

    DivMissingSpace,
    HeadingAttributeStyle,
    SceneBreakStyle,
    TabCharacter,
    MultipleSpaces,
    TrailingWhitespace,
    ExcessBlankLines,
    MissingFinalNewline,
}

impl FindingKind {
    pub fn category(self) -> Category {
        use FindingKind::*;
        match self {
            InvalidUtf8 | ByteOrderMark | CarriageReturn | NonBreakingSpace | ZeroWidth
            | SoftHyphen | DirectionalMark | CurlyDoubleQuote | CurlySingleQuote | Ellipsis
            | EnDash | EmDash | StraightDoubleQuote | StraightSingleQuote => Category::Encoding,
            MissingHeading | MultipleHeadings | UnclosedDiv | UnmatchedDivCloser
            | SceneBreakSpacing | SceneBreakNotAlone | HeadingMissingSpace
            | HeadingTrailingHashes | FrontHeadingNumbered | RawLatexBlock => {
                Category::Structural
            }
            DivMissingSpace | HeadingAttributeStyle | SceneBreakStyle | TabCharacter
            | MultipleSpaces | TrailingWhitespace | ExcessBlankLines | MissingFinalNewline => {
                Category::Formatting
            }
        }
    }

    /// Encoding defects and broken block structure can corrupt conversion;
    /// heading-count and whitespace defects cannot.
    pub fn severity(self) -> Severity {
        use FindingKind::*;
        match self.category() {
            Category::Encoding => Severity::Error,
            Category::Formatting => Severity::Warning,
            Category::Structural => match self {
                MissingHeading | MultipleHeadings | HeadingTrailingHashes
                | FrontHeadingNumbered => Severity::Warning,
                _ => Severity::Error,
            },
        }
    }

    pub fn is_fixable(self) -> bool {
        fix::fixer(self).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    pub path: PathBuf,
    pub line: usize,
    /// 1-based character column; 0 when the finding spans whole lines.
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    pub category: Category,
    pub severity: Severity,
    pub kind: FindingKind,
    pub message: String,
    pub fixable: bool,
}

/// One decoded source file plus the per-line views the checks share.
pub struct FileContext<'a> {
    pub path: &'a Path,
    pub section: Section,
    pub text: &'a str,
    /// Lines without `\n` or a trailing `\r`.
    pub lines: Vec<&'a str>,
    /// `true` for lines that open, close or sit inside a fenced code block.
    pub code: Vec<bool>,
    pub settings: &'a LintSettings,
}

impl<'a> FileContext<'a> {
    pub fn new(
        path: &'a Path,
        section: Section,
        text: &'a str,
        settings: &'a LintSettings,
    ) -> Self {
        let lines = split_lines(text);
        let code = code_mask(&lines);
        Self {
            path,
            section,
            text,
            lines,
            code,
            settings,
        }
    }

    pub fn finding(
        &self,
        kind: FindingKind,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> LintFinding {
        LintFinding {
            path: self.path.to_path_buf(),
            line,
            column,
            end_line: None,
            category: kind.category(),
            severity: kind.severity(),
            kind,
            message: message.into(),
            fixable: kind.is_fixable(),
        }
    }

    pub fn is_blank(&self, idx: usize) -> bool {
        self.lines.get(idx).is_some_and(|line| line.trim().is_empty())
    }
}

/// Lint every file and return findings sorted by (path, line, column).
///
/// Fails only on I/O errors; defects are always reported as findings.
pub fn scan(files: &[ManuscriptFile], settings: &LintSettings) -> Result<Vec<LintFinding>> {
    let mut findings = Vec::new();
    for file in files {
        let bytes = std::fs::read(&file.path).map_err(|err| Error::io(&file.path, err))?;
        findings.extend(scan_bytes(&file.path, file.section, &bytes, settings));
    }
    sort_findings(&mut findings);
    Ok(findings)
}

/// Lint one file's raw bytes.
pub fn scan_bytes(
    path: &Path,
    section: Section,
    bytes: &[u8],
    settings: &LintSettings,
) -> Vec<LintFinding> {
    match std::str::from_utf8(bytes) {
        Ok(text) => scan_text(path, section, text, settings),
        Err(_) => {
            let mut findings = encoding::invalid_utf8(path, bytes);
            let lossy = String::from_utf8_lossy(bytes);
            findings.extend(scan_text(path, section, &lossy, settings));
            findings
        }
    }
}

/// Lint already-decoded text.
pub fn scan_text(
    path: &Path,
    section: Section,
    text: &str,
    settings: &LintSettings,
) -> Vec<LintFinding> {
    let ctx = FileContext::new(path, section, text, settings);
    let mut findings = encoding::check(&ctx);
    findings.extend(structure::check(&ctx));
    findings.extend(formatting::check(&ctx));
    sort_findings(&mut findings);
    findings
}

fn sort_findings(findings: &mut [LintFinding]) {
    findings.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then(a.line.cmp(&b.line))
            .then(a.column.cmp(&b.column))
    });
}

pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n')
        .map(|line| {
            let line = line.strip_suffix('\n').unwrap_or(line);
            line.strip_suffix('\r').unwrap_or(line)
        })
        .collect()
}

/// Mark lines belonging to ``` or ~~~ fenced code blocks.
pub fn code_mask(lines: &[&str]) -> Vec<bool> {
    let mut mask = Vec::with_capacity(lines.len());
    let mut open: Option<(char, usize)> = None;
    for line in lines {
        let trimmed = line.trim_start();
        let indented = line.len() - trimmed.len() >= 4;
        let marker = fence_marker(trimmed).filter(|_| !indented);
        match open {
            Some((ch, len)) => {
                mask.push(true);
                if let Some((m_ch, m_len, rest)) = marker
                    && m_ch == ch
                    && m_len >= len
                    && rest.trim().is_empty()
                {
                    open = None;
                }
            }
            None => {
                if let Some((ch, len, _)) = marker {
                    open = Some((ch, len));
                    mask.push(true);
                } else {
                    mask.push(false);
                }
            }
        }
    }
    mask
}

fn fence_marker(trimmed: &str) -> Option<(char, usize, &str)> {
    let ch = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    if len < 3 {
        return None;
    }
    Some((ch, len, &trimmed[len..]))
}

/// 1-based character column of a byte offset within `line`.
pub fn char_column(line: &str, byte_offset: usize) -> usize {
    line[..byte_offset].chars().count() + 1
}
