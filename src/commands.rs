//! Command handlers behind the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;

use crate::assemble::Scope;
use crate::book::Book;
use crate::cli::{BuildArgs, LintArgs, LintOutput, ValidateArgs};
use crate::convert::{Converter, Format, PandocConverter};
use crate::error::Error;
use crate::lint::{self, FixSummary, LintFinding, Severity};
use crate::orchestrate::{self, BuildOptions, BuildOutcome};
use crate::validate::{self, EpubCheck, ValidationReport, Validator};
use crate::workspace::Workspace;

pub async fn build(workspace: &Workspace, args: BuildArgs) -> anyhow::Result<()> {
    let book = Book::open(workspace, &args.book).context("open book")?;
    let options = BuildOptions {
        scope: if args.ms_only {
            Scope::Chapters
        } else {
            Scope::Full
        },
        keep_intermediate: args.keep_intermediate,
    };

    let plan = orchestrate::plan(workspace, &book, &args.formats(), options)
        .context("plan build")?;
    let converter: Arc<dyn Converter> = Arc::new(PandocConverter::new(&args.pandoc));
    let results = orchestrate::run(converter, &plan.requests, args.jobs).await;
    drop(plan);

    println!("{} ({})", book.config.title, book.id);
    for result in &results {
        match &result.outcome {
            BuildOutcome::Built { output } => {
                println!("  {:<5} {}", result.format.name(), output.display());
            }
            BuildOutcome::Failed { message } => {
                println!("  {:<5} FAILED: {message}", result.format.name());
            }
        }
    }

    if !args.no_validate {
        let epub = results.iter().find_map(|result| match &result.outcome {
            BuildOutcome::Built { output } if result.format == Format::Epub => Some(output),
            _ => None,
        });
        if let Some(epub) = epub {
            let validator = EpubCheck::locate(workspace);
            if validator.is_available() {
                let json_report = json_report_path(epub, args.json_report.as_ref());
                let report = tokio::task::block_in_place(|| {
                    validate_built(&validator, epub, json_report.as_deref())
                });
                print_report(&report);
                if !report.status.passed() {
                    tracing::warn!(epub = %epub.display(), "epub has validation errors");
                }
            } else {
                tracing::info!("epubcheck not found; skipping validation");
            }
        }
    }

    let failed: Vec<&str> = results
        .iter()
        .filter(|result| !result.is_success())
        .map(|result| result.format.name())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} format(s) failed: {}",
            failed.len(),
            results.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct LintReport<'a> {
    book: &'a str,
    errors: usize,
    warnings: usize,
    fixable: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixed: Option<&'a FixSummary>,
    findings: &'a [LintFinding],
}

pub fn lint(workspace: &Workspace, args: LintArgs) -> anyhow::Result<()> {
    let book = Book::open(workspace, &args.book).context("open book")?;
    let scope = if args.chapters {
        Scope::Chapters
    } else {
        Scope::Full
    };
    let files = book.sources(scope);
    let settings = &book.config.lint;

    let fixed = if args.fix {
        Some(lint::fix(&files, settings).context("apply fixes")?)
    } else {
        None
    };
    let findings = lint::scan(&files, settings).context("scan manuscript")?;

    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
    let errors = count(Severity::Error);
    let warnings = count(Severity::Warning);
    let fixable = findings.iter().filter(|f| f.fixable).count();

    match args.format {
        LintOutput::Json => {
            let report = LintReport {
                book: &book.id,
                errors,
                warnings,
                fixable,
                fixed: fixed.as_ref(),
                findings: &findings,
            };
            let json = serde_json::to_string_pretty(&report).context("serialize lint report")?;
            println!("{json}");
        }
        LintOutput::Text => {
            for finding in &findings {
                println!("{}", render_finding(finding, &book.dir));
            }
            if let Some(fixed) = &fixed {
                println!(
                    "fixed {} finding(s) in {} file(s)",
                    fixed.resolved, fixed.files_changed
                );
            }
            println!(
                "{} file(s): {errors} error(s), {warnings} warning(s), {fixable} fixable",
                files.len()
            );
        }
    }

    if errors > 0 {
        anyhow::bail!("lint: {errors} error(s) remain in {}", book.id);
    }
    Ok(())
}

pub fn validate(workspace: &Workspace, args: ValidateArgs) -> anyhow::Result<()> {
    let book = Book::open(workspace, &args.book).context("open book")?;
    let epub = workspace
        .output_dir
        .join(Format::Epub.output_file_name(&book.config));

    let validator = EpubCheck::locate(workspace);
    let json_report = json_report_path(&epub, args.json_report.as_ref());
    let report = validator
        .validate(&epub, json_report.as_deref())
        .context("validate epub")?;
    print_report(&report);

    if !report.status.passed() {
        return Err(Error::Validation {
            path: epub,
            message: report.to_string(),
        }
        .into());
    }
    Ok(())
}

/// `path:line[:column]: severity [category] message`, relative to the book.
fn render_finding(finding: &LintFinding, base: &Path) -> String {
    let path = finding.path.strip_prefix(base).unwrap_or(&finding.path);
    let mut location = format!("{}:{}", path.display(), finding.line);
    if finding.column > 0 {
        location.push_str(&format!(":{}", finding.column));
    }
    let fix = if finding.fixable { " (fixable)" } else { "" };
    format!(
        "{location}: {} [{}] {}{fix}",
        finding.severity, finding.category, finding.message
    )
}

fn json_report_path(epub: &Path, requested: Option<&Option<PathBuf>>) -> Option<PathBuf> {
    requested.map(|path| {
        path.clone()
            .unwrap_or_else(|| validate::default_json_report(epub))
    })
}

/// Validation after a build is informational: a validator that cannot run is
/// logged and reported as unavailable.
fn validate_built(
    validator: &dyn Validator,
    epub: &Path,
    json_report: Option<&Path>,
) -> ValidationReport {
    match validator.validate(epub, json_report) {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(epub = %epub.display(), "epub validation failed to run: {err}");
            ValidationReport::unavailable()
        }
    }
}

fn print_report(report: &ValidationReport) {
    println!("epubcheck: {report}");
    for message in &report.messages {
        println!("  {message}");
    }
    if let Some(path) = &report.json_report {
        println!("epubcheck report: {}", path.display());
    }
}
