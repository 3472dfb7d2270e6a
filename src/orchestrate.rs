//! Build planning and execution.
//!
//! [`plan`] resolves everything a build needs (sources, filters, per-format
//! artifacts, the merged document) before any converter runs, so a missing
//! artifact aborts the invocation with no partial output. [`run`] then converts
//! each request in isolation: one failing format never stops the others.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::artifacts::{ArtifactReference, ArtifactResolver, ArtifactTier};
use crate::assemble::{self, Scope};
use crate::book::Book;
use crate::convert::{
    ConversionInput, ConversionRequest, Converter, EpubPatch, Format, FormatOptions,
};
use crate::error::{Error, Result};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub scope: Scope,
    pub keep_intermediate: bool,
}

/// Resolved requests plus the scratch space backing them. Keep it alive until
/// [`run`] has finished.
#[derive(Debug)]
pub struct BuildPlan {
    pub requests: Vec<ConversionRequest>,
    _scratch: Option<tempfile::TempDir>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { output: PathBuf },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub format: Format,
    pub outcome: BuildOutcome,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BuildOutcome::Built { .. })
    }
}

/// Resolve every input for `formats` (declaration order, duplicates dropped;
/// empty means [`Format::DEFAULT`]).
pub fn plan(
    workspace: &Workspace,
    book: &Book,
    formats: &[Format],
    options: BuildOptions,
) -> Result<BuildPlan> {
    let mut formats = if formats.is_empty() {
        Format::DEFAULT.to_vec()
    } else {
        formats.to_vec()
    };
    formats.sort();
    formats.dedup();

    let sources = book.sources(options.scope);
    if sources.is_empty() {
        return Err(Error::assembly(
            &book.dir,
            "no chapter sources selected for a manuscript-only build",
        ));
    }

    let config = &book.config;
    let resolver = ArtifactResolver::for_book(workspace, &book.dir);

    let filters = config
        .filters
        .iter()
        .map(|name| {
            resolver
                .resolve("filter", name, true)
                .map(|reference| reference.path.unwrap_or_default())
        })
        .collect::<Result<Vec<_>>>()?;

    let mut resolved = Vec::with_capacity(formats.len());
    for format in &formats {
        let format_options = match format {
            Format::Epub => FormatOptions::Epub {
                settings: config.epub.clone(),
                stylesheet: optional(&resolver, "stylesheet", &config.epub.css)?,
                cover: optional(&resolver, "cover", &config.epub.cover)?,
                patch: EpubPatch::from_config(config),
            },
            Format::Docx => FormatOptions::Docx {
                settings: config.docx.clone(),
                reference: optional(&resolver, "reference document", &config.docx.reference)?,
            },
            Format::Md => FormatOptions::Md {
                filter: optional(&resolver, "markdown filter", &config.md.filter)?,
            },
            Format::Pdf => FormatOptions::Pdf {
                settings: config.pdf.clone(),
                template: resolver.resolve("template", &config.pdf.template, true)?,
                filter: optional(&resolver, "pdf filter", &config.pdf.filter)?,
                series: config.series.clone(),
            },
        };
        resolved.push((*format, format_options));
    }

    // Everything resolved; from here on the plan may touch the filesystem.
    std::fs::create_dir_all(&workspace.output_dir)
        .map_err(|err| Error::io(&workspace.output_dir, err))?;

    let mut scratch = None;
    let mut merged = None;
    if formats.contains(&Format::Md) {
        let document = assemble::merge(&sources)?;
        let file_name = format!("{}.assembled.md", config.prefix);
        let path = if options.keep_intermediate {
            workspace.output_dir.join(file_name)
        } else {
            let dir = tempfile::Builder::new()
                .prefix("bookpipe-")
                .tempdir()
                .map_err(|err| Error::io(std::env::temp_dir(), err))?;
            let path = dir.path().join(file_name);
            scratch = Some(dir);
            path
        };
        std::fs::write(&path, document).map_err(|err| Error::io(&path, err))?;
        tracing::debug!(path = %path.display(), "wrote merged manuscript");
        merged = Some(path);
    }

    let source_paths: Vec<PathBuf> = sources.iter().map(|file| file.path.clone()).collect();
    let metadata: Vec<(String, String)> = config
        .metadata()
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect();

    let requests = resolved
        .into_iter()
        .map(|(format, format_options)| {
            let input = match (&format, &merged) {
                (Format::Md, Some(path)) => ConversionInput::Merged(path.clone()),
                _ => ConversionInput::Files(source_paths.clone()),
            };
            ConversionRequest {
                format,
                input,
                output: workspace.output_dir.join(format.output_file_name(config)),
                prefix: config.prefix.clone(),
                resource_dir: book.dir.clone(),
                from: config.from_format(),
                metadata: metadata.clone(),
                filters: filters.clone(),
                options: format_options,
                keep_intermediate: options.keep_intermediate,
            }
        })
        .collect();

    tracing::info!(
        book = %book.id,
        formats = ?formats,
        sources = sources.len(),
        "planned build"
    );
    Ok(BuildPlan {
        requests,
        _scratch: scratch,
    })
}

fn optional(resolver: &ArtifactResolver, role: &str, file: &str) -> Result<ArtifactReference> {
    let reference = resolver.resolve(role, file, false)?;
    if reference.tier == ArtifactTier::Absent && !file.trim().is_empty() {
        tracing::warn!(role, file, "artifact not found; converter default applies");
    }
    Ok(reference)
}

/// Convert every request, at most `jobs` at a time, and report results in
/// format-declaration order regardless of completion order.
pub async fn run(
    converter: Arc<dyn Converter>,
    requests: &[ConversionRequest],
    jobs: usize,
) -> Vec<BuildResult> {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));

    let handles: Vec<_> = requests
        .iter()
        .cloned()
        .map(|request| {
            let semaphore = Arc::clone(&semaphore);
            let converter = Arc::clone(&converter);
            let format = request.format;
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|err| {
                    Error::Converter {
                        format: format.name().to_owned(),
                        message: format!("build queue closed: {err}"),
                    }
                })?;
                tokio::task::spawn_blocking(move || converter.convert(&request))
                    .await
                    .map_err(|err| Error::Converter {
                        format: format.name().to_owned(),
                        message: format!("build task failed: {err}"),
                    })?
            });
            (format, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (format, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(output)) => {
                tracing::info!(%format, output = %output.display(), "built");
                BuildOutcome::Built { output }
            }
            Ok(Err(err)) => {
                tracing::error!(%format, "build failed: {err}");
                BuildOutcome::Failed {
                    message: err.to_string(),
                }
            }
            Err(err) => BuildOutcome::Failed {
                message: format!("build task failed: {err}"),
            },
        };
        results.push(BuildResult { format, outcome });
    }
    results.sort_by_key(|result| result.format);
    results
}
