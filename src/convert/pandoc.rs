//! Pandoc-backed [`Converter`]. PDF goes through an intermediate LaTeX file
//! compiled twice by the configured engine.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::LazyLock;

use regex::Regex;

use crate::convert::{ConversionRequest, Converter, Format, FormatOptions, postprocess};
use crate::error::{Error, Result};

static PANDOC_RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\begin\{center\}\s*\\rule\{0\.5\\linewidth\}\{0\.5pt\}\s*\\end\{center\}")
        .expect("valid regex")
});

/// Auxiliary files the LaTeX engine leaves next to the PDF.
const LATEX_AUX_EXTENSIONS: [&str; 4] = ["aux", "log", "toc", "out"];

#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new("pandoc")
    }
}

impl PandocConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Converter for PandocConverter {
    fn convert(&self, request: &ConversionRequest) -> Result<PathBuf> {
        let output_dir = request.output_dir();
        std::fs::create_dir_all(output_dir).map_err(|err| Error::io(output_dir, err))?;

        tracing::info!(
            format = %request.format,
            pandoc = %self.program.display(),
            out = %request.output.display(),
            "convert via pandoc"
        );

        match &request.options {
            FormatOptions::Pdf { .. } => self.convert_pdf(request)?,
            FormatOptions::Epub { patch, .. } => {
                run_tool(request.format, &self.program, &pandoc_args(request, &request.output))?;
                // The package is usable without the fix-ups; report and keep it.
                if let Err(err) = postprocess::patch_epub(&request.output, patch) {
                    tracing::warn!(epub = %request.output.display(), "epub post-processing failed: {err}");
                }
            }
            FormatOptions::Docx { .. } | FormatOptions::Md { .. } => {
                run_tool(request.format, &self.program, &pandoc_args(request, &request.output))?;
            }
        }

        Ok(request.output.clone())
    }
}

impl PandocConverter {
    fn convert_pdf(&self, request: &ConversionRequest) -> Result<()> {
        let FormatOptions::Pdf { settings, .. } = &request.options else {
            return Ok(());
        };
        let output_dir = request.output_dir();
        let tex = intermediate_tex(request);
        let job_name = job_name(request);

        run_tool(Format::Pdf, &self.program, &pandoc_args(request, &tex))?;
        replace_pandoc_rules(&tex, &settings.scene_break_macro)?;

        let mut compile = vec![
            OsString::from("-interaction=nonstopmode"),
            OsString::from(format!("-output-directory={}", output_dir.display())),
            OsString::from(format!("-jobname={job_name}")),
        ];
        compile.push(tex.clone().into_os_string());

        let engine = PathBuf::from(&settings.engine);
        for pass in 1..=2 {
            tracing::debug!(engine = %settings.engine, pass, "latex pass");
            if let Err(err) = run_tool(Format::Pdf, &engine, &compile) {
                let log = output_dir.join(format!("{job_name}.log"));
                let detail = latex_errors(&log);
                return Err(match err {
                    Error::Converter { format, message } if !detail.is_empty() => {
                        Error::Converter {
                            format,
                            message: format!("{message}\n{detail}"),
                        }
                    }
                    other => other,
                });
            }
        }

        if !request.keep_intermediate {
            cleanup_latex(output_dir, &job_name, &tex);
        } else {
            tracing::info!(tex = %tex.display(), "kept intermediate LaTeX");
        }
        Ok(())
    }
}

/// Full pandoc argument list for `request`, writing to `out`.
///
/// For PDF, `out` is the intermediate `.tex` file.
pub fn pandoc_args(request: &ConversionRequest, out: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |arg: &dyn AsRef<OsStr>| args.push(arg.as_ref().to_owned());

    for (key, value) in &request.metadata {
        push(&"--metadata");
        push(&format!("{key}={value}"));
    }
    push(&"--top-level-division=chapter");
    push(&"--from");
    push(&request.from);
    push(&"--resource-path");
    push(&request.resource_dir);

    let mut format_filter: Option<&Path> = None;
    match &request.options {
        FormatOptions::Epub {
            settings,
            stylesheet,
            cover,
            ..
        } => {
            push(&"--epub-title-page=false");
            if settings.toc {
                push(&"--toc");
                push(&"--toc-depth");
                push(&settings.toc_depth.to_string());
            }
            if let Some(css) = stylesheet.path() {
                push(&"--css");
                push(&css);
            }
            if let Some(cover) = cover.path() {
                push(&"--epub-cover-image");
                push(&cover);
            }
        }
        FormatOptions::Docx {
            settings,
            reference,
        } => {
            if settings.toc {
                push(&"--toc");
                push(&"--toc-depth");
                push(&settings.toc_depth.to_string());
            }
            if let Some(reference) = reference.path() {
                let mut arg = OsString::from("--reference-doc=");
                arg.push(reference);
                push(&arg);
            }
        }
        FormatOptions::Md { filter } => {
            push(&"--standalone");
            push(&"--wrap=none");
            push(&"--to");
            push(&"markdown");
            if let Some(filter) = filter.path() {
                push(&"--lua-filter");
                push(&filter);
            }
        }
        FormatOptions::Pdf {
            settings,
            template,
            filter,
            series,
        } => {
            if let Some(template) = template.path() {
                let mut arg = OsString::from("--template=");
                arg.push(template);
                push(&arg);
            }
            push(&format!("--pdf-engine={}", settings.engine));
            if let Some(series) = series {
                push(&"--metadata");
                push(&format!("series={series}"));
            }
            format_filter = filter.path();
        }
    }

    push(&"-o");
    push(&out);

    for filter in &request.filters {
        push(&"--lua-filter");
        push(filter);
    }
    if let Some(filter) = format_filter {
        push(&"--lua-filter");
        push(&filter);
    }

    for input in request.input.paths() {
        push(input);
    }
    args
}

/// `<output dir>/<prefix>_print.tex`
pub fn intermediate_tex(request: &ConversionRequest) -> PathBuf {
    request
        .output_dir()
        .join(format!("{}_print.tex", request.prefix))
}

fn job_name(request: &ConversionRequest) -> String {
    request
        .output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| request.prefix.clone())
}

fn run_tool(format: Format, program: &Path, args: &[OsString]) -> Result<Output> {
    let converter_error = |message: String| Error::Converter {
        format: format.name().to_owned(),
        message,
    };

    let output = match Command::new(program).args(args).output() {
        Ok(output) => output,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(converter_error(format!(
                "{} not found; install it or pass its path",
                program.display()
            )));
        }
        Err(err) => {
            return Err(converter_error(format!("run {}: {err}", program.display())));
        }
    };

    if !output.status.success() {
        return Err(converter_error(format!(
            "{} failed ({}): {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

/// Horizontal rules the PDF filter missed become the scene-break macro.
fn replace_pandoc_rules(tex: &Path, scene_break_macro: &str) -> Result<()> {
    let contents = std::fs::read_to_string(tex).map_err(|err| Error::io(tex, err))?;
    let replaced = PANDOC_RULE_RE.replace_all(&contents, regex::NoExpand(scene_break_macro));
    if replaced != contents {
        std::fs::write(tex, replaced.as_bytes()).map_err(|err| Error::io(tex, err))?;
    }
    Ok(())
}

/// `!`-prefixed and `Error` lines from the engine log, at most ten.
fn latex_errors(log: &Path) -> String {
    let Ok(bytes) = std::fs::read(log) else {
        return String::new();
    };
    let contents = String::from_utf8_lossy(&bytes);
    contents
        .lines()
        .filter(|line| line.starts_with('!') || line.contains("Error"))
        .take(10)
        .collect::<Vec<_>>()
        .join("\n")
}

fn cleanup_latex(output_dir: &Path, job_name: &str, tex: &Path) {
    let aux = LATEX_AUX_EXTENSIONS
        .iter()
        .map(|ext| output_dir.join(format!("{job_name}.{ext}")));
    for path in aux.chain(std::iter::once(tex.to_path_buf())) {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed intermediate"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(path = %path.display(), "remove intermediate: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactReference, ArtifactTier};
    use crate::config::{DocxSettings, EpubSettings, PdfSettings};
    use crate::convert::{ConversionInput, EpubPatch};

    fn reference(role: &str, path: Option<&str>) -> ArtifactReference {
        ArtifactReference {
            role: role.to_owned(),
            file: path.unwrap_or_default().to_owned(),
            path: path.map(PathBuf::from),
            tier: if path.is_some() {
                ArtifactTier::Shared
            } else {
                ArtifactTier::Absent
            },
        }
    }

    fn request(format: Format, options: FormatOptions) -> ConversionRequest {
        ConversionRequest {
            format,
            input: ConversionInput::Files(vec![
                PathBuf::from("/b/front/title.md"),
                PathBuf::from("/b/chapters/1_a.md"),
            ]),
            output: PathBuf::from(format!("/out/trench.{}", format.name())),
            prefix: "trench".to_owned(),
            resource_dir: PathBuf::from("/b"),
            from: "markdown+smart+fenced_divs".to_owned(),
            metadata: vec![("title".to_owned(), "The Trench Mage".to_owned())],
            filters: vec![PathBuf::from("/a/shared.lua")],
            options,
            keep_intermediate: false,
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn epub_args_carry_toc_css_and_cover() {
        let req = request(
            Format::Epub,
            FormatOptions::Epub {
                settings: EpubSettings::default(),
                stylesheet: reference("stylesheet", Some("/a/epub.css")),
                cover: reference("cover", None),
                patch: EpubPatch {
                    accessibility: Default::default(),
                    series: None,
                    series_number: None,
                    cover_alt: String::new(),
                },
            },
        );
        let args = strings(&pandoc_args(&req, &req.output));
        assert_eq!(
            args,
            vec![
                "--metadata",
                "title=The Trench Mage",
                "--top-level-division=chapter",
                "--from",
                "markdown+smart+fenced_divs",
                "--resource-path",
                "/b",
                "--epub-title-page=false",
                "--toc",
                "--toc-depth",
                "1",
                "--css",
                "/a/epub.css",
                "-o",
                "/out/trench.epub",
                "--lua-filter",
                "/a/shared.lua",
                "/b/front/title.md",
                "/b/chapters/1_a.md",
            ]
        );
    }

    #[test]
    fn docx_without_toc_uses_reference_doc() {
        let req = request(
            Format::Docx,
            FormatOptions::Docx {
                settings: DocxSettings {
                    toc: false,
                    ..DocxSettings::default()
                },
                reference: reference("reference", Some("/b/artifacts/reference.docx")),
            },
        );
        let args = strings(&pandoc_args(&req, &req.output));
        assert!(!args.contains(&"--toc".to_owned()));
        assert!(args.contains(&"--reference-doc=/b/artifacts/reference.docx".to_owned()));
    }

    #[test]
    fn pdf_args_target_intermediate_tex_with_format_filter_last() {
        let mut req = request(
            Format::Pdf,
            FormatOptions::Pdf {
                settings: PdfSettings::default(),
                template: reference("template", Some("/a/book.tex")),
                filter: reference("filter", Some("/a/pdf_filter.lua")),
                series: Some("Cycle".to_owned()),
            },
        );
        req.output = PathBuf::from("/out/trench_print_6x9.pdf");
        let tex = intermediate_tex(&req);
        assert_eq!(tex, PathBuf::from("/out/trench_print.tex"));
        assert_eq!(job_name(&req), "trench_print_6x9");

        let args = strings(&pandoc_args(&req, &tex));
        assert!(args.contains(&"--template=/a/book.tex".to_owned()));
        assert!(args.contains(&"--pdf-engine=xelatex".to_owned()));
        assert!(args.contains(&"series=Cycle".to_owned()));
        let filters: Vec<&String> = args
            .iter()
            .zip(args.iter().skip(1))
            .filter(|(flag, _)| flag.as_str() == "--lua-filter")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(filters, vec!["/a/shared.lua", "/a/pdf_filter.lua"]);
    }

    #[test]
    fn leftover_rules_become_scene_break_macro() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let tex = temp.path().join("t_print.tex");
        std::fs::write(
            &tex,
            "a\n\\begin{center}\\rule{0.5\\linewidth}{0.5pt}\\end{center}\nb\n",
        )?;
        replace_pandoc_rules(&tex, r"\scenebreak{}")?;
        assert_eq!(std::fs::read_to_string(&tex)?, "a\n\\scenebreak{}\nb\n");
        Ok(())
    }

    #[test]
    fn missing_program_is_a_converter_error() {
        let err = run_tool(
            Format::Docx,
            Path::new("/nonexistent/bookpipe-pandoc"),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Converter { ref format, .. } if format == "docx"));
        assert!(err.to_string().contains("not found"));
    }
}
