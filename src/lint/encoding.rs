//! Disallowed or suspicious code points, one finding per occurrence.

use std::path::Path;

use crate::config::QuoteStyle;
use crate::lint::{FileContext, FindingKind, LintFinding};

pub fn check(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    let mut findings = Vec::new();
    let straight = ctx.settings.quotes == QuoteStyle::Straight;

    for (idx, raw_line) in ctx.text.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        for (col_idx, ch) in raw_line.chars().enumerate() {
            let column = col_idx + 1;
            let at_file_start = idx == 0 && col_idx == 0;
            let Some((kind, message)) = classify(ch, at_file_start, straight) else {
                continue;
            };
            findings.push(ctx.finding(kind, line_no, column, message));
        }
    }

    if !straight {
        findings.extend(straight_quotes(ctx));
    }

    findings
}

fn classify(ch: char, at_file_start: bool, straight: bool) -> Option<(FindingKind, String)> {
    let (kind, label) = match ch {
        '\u{FEFF}' if at_file_start => (FindingKind::ByteOrderMark, "UTF-8 byte-order mark"),
        '\r' => (FindingKind::CarriageReturn, "carriage return (Windows line ending)"),
        '\u{00A0}' => (FindingKind::NonBreakingSpace, "non-breaking space"),
        '\u{200B}'..='\u{200D}' | '\u{FEFF}' => (FindingKind::ZeroWidth, "zero-width character"),
        '\u{00AD}' => (FindingKind::SoftHyphen, "soft hyphen"),
        '\u{200E}' | '\u{200F}' => (FindingKind::DirectionalMark, "directional mark"),
        '\u{201C}' | '\u{201D}' if straight => (
            FindingKind::CurlyDoubleQuote,
            "curly double quote (use straight quotes)",
        ),
        '\u{2018}' | '\u{2019}' if straight => (
            FindingKind::CurlySingleQuote,
            "curly single quote (use straight quotes)",
        ),
        '\u{2026}' if straight => (FindingKind::Ellipsis, "ellipsis character (use '...')"),
        '\u{2013}' if straight => (FindingKind::EnDash, "en dash (use '--')"),
        '\u{2014}' if straight => (FindingKind::EmDash, "em dash (use '---')"),
        _ => return None,
    };
    Some((kind, format!("{label} U+{:04X}", u32::from(ch))))
}

/// Straight quotes in prose when the house style is curly. Code blocks, inline
/// code, attribute braces, fenced-div lines and raw HTML lines are skipped.
fn straight_quotes(ctx: &FileContext<'_>) -> Vec<LintFinding> {
    let mut findings = Vec::new();
    for (idx, line) in ctx.lines.iter().enumerate() {
        if ctx.code[idx] {
            continue;
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with(":::") || trimmed.starts_with('<') {
            continue;
        }

        let mut in_code = false;
        let mut in_attrs = false;
        for (col_idx, ch) in line.chars().enumerate() {
            match ch {
                '`' => in_code = !in_code,
                '{' if !in_code => in_attrs = true,
                '}' if !in_code => in_attrs = false,
                '"' | '\'' if !in_code && !in_attrs => {
                    let (kind, label) = if ch == '"' {
                        (FindingKind::StraightDoubleQuote, "straight double quote")
                    } else {
                        (FindingKind::StraightSingleQuote, "straight single quote")
                    };
                    findings.push(ctx.finding(
                        kind,
                        idx + 1,
                        col_idx + 1,
                        format!("{label} (house style is curly quotes)"),
                    ));
                }
                _ => {}
            }
        }
    }
    findings
}

/// One finding per byte sequence that is not valid UTF-8.
pub fn invalid_utf8(path: &Path, bytes: &[u8]) -> Vec<LintFinding> {
    let mut findings = Vec::new();
    let mut line = 1;
    let mut column = 1;

    for chunk in bytes.utf8_chunks() {
        for ch in chunk.valid().chars() {
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }

        let invalid = chunk.invalid();
        if invalid.is_empty() {
            continue;
        }
        let hex: Vec<String> = invalid.iter().map(|b| format!("{b:02X}")).collect();
        let kind = FindingKind::InvalidUtf8;
        findings.push(LintFinding {
            path: path.to_path_buf(),
            line,
            column,
            end_line: None,
            category: kind.category(),
            severity: kind.severity(),
            kind,
            message: format!("invalid UTF-8 byte sequence 0x{}", hex.join(" 0x")),
            fixable: kind.is_fixable(),
        });
        // Lossy decoding replaces the sequence with one U+FFFD.
        column += 1;
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Section;
    use crate::config::LintSettings;
    use crate::lint::Severity;

    fn run(text: &str, settings: &LintSettings) -> Vec<LintFinding> {
        let ctx = FileContext::new(Path::new("a.md"), Section::Chapters, text, settings);
        check(&ctx)
    }

    fn kinds(findings: &[LintFinding]) -> Vec<FindingKind> {
        findings.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn invisible_characters_are_errors() {
        let text = "\u{FEFF}a\u{00A0}b\u{200B}c\u{00AD}d\u{200E}\r\n";
        let findings = run(text, &LintSettings::default());
        assert_eq!(
            kinds(&findings),
            vec![
                FindingKind::ByteOrderMark,
                FindingKind::NonBreakingSpace,
                FindingKind::ZeroWidth,
                FindingKind::SoftHyphen,
                FindingKind::DirectionalMark,
                FindingKind::CarriageReturn,
            ]
        );
        assert!(findings.iter().all(|f| f.severity == Severity::Error));
        assert_eq!(findings[1].column, 3);
    }

    #[test]
    fn typographic_characters_follow_house_style() {
        let text = "Wait\u{2026} \u{2018}no\u{2019} \u{2014} yes \u{2013}\n";
        let findings = run(text, &LintSettings::default());
        assert_eq!(
            kinds(&findings),
            vec![
                FindingKind::Ellipsis,
                FindingKind::CurlySingleQuote,
                FindingKind::CurlySingleQuote,
                FindingKind::EmDash,
                FindingKind::EnDash,
            ]
        );

        let curly = LintSettings {
            quotes: QuoteStyle::Curly,
            ..LintSettings::default()
        };
        assert!(run(text, &curly).is_empty());
    }

    #[test]
    fn curly_style_flags_straight_quotes_outside_code() {
        let curly = LintSettings {
            quotes: QuoteStyle::Curly,
            ..LintSettings::default()
        };
        let text = "He said \"hi\" and `x = \"y\"`.\n\n```\nlet s = \"code\";\n```\n\n# Title {#id key=\"v\"}\n";
        let findings = run(text, &curly);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.line == 1));
        assert_eq!(findings[0].column, 9);
        assert_eq!(findings[1].column, 12);
        assert!(findings.iter().all(|f| !f.fixable));
    }

    #[test]
    fn invalid_bytes_report_line_and_column() {
        let bytes = b"ok\nab\xFFc\xC3\n";
        let findings = invalid_utf8(Path::new("a.md"), bytes);
        assert_eq!(findings.len(), 2);
        assert_eq!((findings[0].line, findings[0].column), (2, 3));
        assert_eq!((findings[1].line, findings[1].column), (2, 5));
        assert!(findings[0].message.contains("0xFF"));
        assert!(!findings[0].fixable);
    }
}
