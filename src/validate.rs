//! EPUB conformance checking via epubcheck.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::workspace::Workspace;

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Messages:\s*(\d+)\s*fatal.*?(\d+)\s*error.*?(\d+)\s*warn")
        .expect("valid regex")
});

pub const EPUBCHECK_JAR_ENV: &str = "EPUBCHECK_JAR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid,
    ValidWithWarnings,
    Invalid,
    /// No validator could be run.
    Unavailable,
}

impl ValidationStatus {
    pub fn passed(self) -> bool {
        matches!(
            self,
            ValidationStatus::Valid | ValidationStatus::ValidWithWarnings
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub fatals: u32,
    pub errors: u32,
    pub warnings: u32,
    /// `FATAL`, `ERROR` and `WARNING` lines from the validator output.
    pub messages: Vec<String>,
    pub json_report: Option<PathBuf>,
}

impl ValidationReport {
    pub fn unavailable() -> Self {
        Self {
            status: ValidationStatus::Unavailable,
            fatals: 0,
            errors: 0,
            warnings: 0,
            messages: Vec::new(),
            json_report: None,
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            ValidationStatus::Valid => f.write_str("valid (no errors, no warnings)"),
            ValidationStatus::ValidWithWarnings => {
                write!(f, "valid with {} warning(s)", self.warnings)
            }
            ValidationStatus::Invalid => write!(
                f,
                "{} fatal, {} error(s), {} warning(s)",
                self.fatals, self.errors, self.warnings
            ),
            ValidationStatus::Unavailable => f.write_str("epubcheck not available"),
        }
    }
}

pub trait Validator: Send + Sync {
    fn validate(&self, epub: &Path, json_report: Option<&Path>) -> Result<ValidationReport>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    Jar(PathBuf),
    Program(PathBuf),
}

/// epubcheck, found via `EPUBCHECK_JAR`, `epubcheck` on PATH, or
/// `tools/epubcheck*/epubcheck.jar` under the project root (newest first).
#[derive(Debug, Clone)]
pub struct EpubCheck {
    invocation: Option<Invocation>,
}

impl EpubCheck {
    pub fn locate(workspace: &Workspace) -> Self {
        let env_jar = std::env::var_os(EPUBCHECK_JAR_ENV).map(PathBuf::from);
        let invocation = locate_with(env_jar, std::env::var_os("PATH"), &workspace.tools_dir());
        match &invocation {
            Some(found) => tracing::debug!(?found, "located epubcheck"),
            None => tracing::debug!("epubcheck not found"),
        }
        Self { invocation }
    }

    pub fn is_available(&self) -> bool {
        self.invocation.is_some()
    }
}

fn locate_with(
    env_jar: Option<PathBuf>,
    path_var: Option<std::ffi::OsString>,
    tools_dir: &Path,
) -> Option<Invocation> {
    if let Some(jar) = env_jar
        && jar.is_file()
    {
        return Some(Invocation::Jar(jar));
    }

    if let Some(path_var) = path_var {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join("epubcheck");
            if candidate.is_file() {
                return Some(Invocation::Program(candidate));
            }
        }
    }

    let mut bundles: Vec<PathBuf> = std::fs::read_dir(tools_dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("epubcheck"))
        .map(|entry| entry.path().join("epubcheck.jar"))
        .filter(|jar| jar.is_file())
        .collect();
    bundles.sort();
    bundles.pop().map(Invocation::Jar)
}

impl Validator for EpubCheck {
    fn validate(&self, epub: &Path, json_report: Option<&Path>) -> Result<ValidationReport> {
        let Some(invocation) = &self.invocation else {
            return Ok(ValidationReport::unavailable());
        };
        if !epub.is_file() {
            return Err(Error::Validation {
                path: epub.to_path_buf(),
                message: "file not found; build with --epub first".to_owned(),
            });
        }

        let mut cmd = match invocation {
            Invocation::Jar(jar) => {
                let mut cmd = Command::new("java");
                cmd.arg("-jar").arg(jar);
                cmd
            }
            Invocation::Program(program) => Command::new(program),
        };
        cmd.arg(epub);
        if let Some(report) = json_report {
            cmd.arg("--json").arg(report);
        }

        tracing::info!(epub = %epub.display(), "validating with epubcheck");
        let output = match cmd.output() {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!("could not run epubcheck (java not found?): {err}");
                return Ok(ValidationReport::unavailable());
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let mut report = parse_output(&text, output.status.success());
        report.json_report = json_report.filter(|path| path.is_file()).map(Path::to_path_buf);
        Ok(report)
    }
}

/// Interpret epubcheck's combined output. Without a `Messages:` summary the
/// exit status decides.
pub fn parse_output(output: &str, exit_ok: bool) -> ValidationReport {
    let messages: Vec<String> = output
        .lines()
        .filter(|line| ["FATAL", "ERROR", "WARNING"].iter().any(|p| line.starts_with(p)))
        .map(str::to_owned)
        .collect();

    let counts = SUMMARY_RE.captures(output).map(|caps| {
        let count = |idx: usize| caps[idx].parse::<u32>().unwrap_or(u32::MAX);
        (count(1), count(2), count(3))
    });

    let (fatals, errors, warnings, status) = match counts {
        Some((0, 0, 0)) => (0, 0, 0, ValidationStatus::Valid),
        Some((0, 0, warnings)) => (0, 0, warnings, ValidationStatus::ValidWithWarnings),
        Some((fatals, errors, warnings)) => (fatals, errors, warnings, ValidationStatus::Invalid),
        None if exit_ok => (0, 0, 0, ValidationStatus::Valid),
        None => (0, 0, 0, ValidationStatus::Invalid),
    };

    ValidationReport {
        status,
        fatals,
        errors,
        warnings,
        messages,
        json_report: None,
    }
}

/// `<dir>/<stem>_epubcheck.json` beside the EPUB.
pub fn default_json_report(epub: &Path) -> PathBuf {
    let stem = epub
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    epub.with_file_name(format!("{stem}_epubcheck.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_sets_counts_and_status() {
        let output = "Validating using EPUB version 3.3 rules.\n\
            WARNING(OPF-085): book.epub/EPUB/content.opf(4,9): uuid\n\
            Messages: 0 fatals / 0 errors / 2 warnings / 0 infos\n\
            EPUBCheck completed\n";
        let report = parse_output(output, true);
        assert_eq!(report.status, ValidationStatus::ValidWithWarnings);
        assert_eq!((report.fatals, report.errors, report.warnings), (0, 0, 2));
        assert_eq!(report.messages.len(), 1);
        assert!(report.status.passed());

        let report = parse_output("Messages: 1 fatal / 3 errors / 0 warnings\n", false);
        assert_eq!(report.status, ValidationStatus::Invalid);
        assert_eq!(report.to_string(), "1 fatal, 3 error(s), 0 warning(s)");
        assert!(!report.status.passed());
    }

    #[test]
    fn exit_status_decides_without_summary() {
        assert_eq!(parse_output("No errors\n", true).status, ValidationStatus::Valid);
        assert_eq!(parse_output("boom\n", false).status, ValidationStatus::Invalid);
    }

    #[test]
    fn newest_tools_bundle_wins() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        for dir in ["epubcheck-4.2.6", "epubcheck-5.1.0", "other"] {
            std::fs::create_dir_all(temp.path().join(dir))?;
            std::fs::write(temp.path().join(dir).join("epubcheck.jar"), b"")?;
        }
        let found = locate_with(None, None, temp.path());
        assert_eq!(
            found,
            Some(Invocation::Jar(
                temp.path().join("epubcheck-5.1.0").join("epubcheck.jar")
            ))
        );
        assert_eq!(locate_with(None, None, &temp.path().join("missing")), None);
        Ok(())
    }

    #[test]
    fn json_report_sits_beside_the_epub() {
        assert_eq!(
            default_json_report(Path::new("/out/trench.epub")),
            PathBuf::from("/out/trench_epubcheck.json")
        );
    }
}
