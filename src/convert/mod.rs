//! Converter interface and the per-format request it consumes.
//!
//! A [`ConversionRequest`] is self-contained: it owns its inputs, settings and
//! resolved artifact paths, so requests can be converted on any thread in any
//! order.

pub mod pandoc;
pub mod postprocess;

use std::fmt;
use std::path::{Path, PathBuf};


use crate::artifacts::ArtifactReference;
use crate::config::{Configuration, DocxSettings, EpubSettings, PdfSettings};
use crate::error::Result;

pub use pandoc::PandocConverter;
pub use postprocess::EpubPatch;

/// Output formats in declaration order; results are always reported in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    Epub,
    Docx,
    Md,
    Pdf,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Epub, Format::Docx, Format::Md, Format::Pdf];

    /// Built by `--all` or when no format flag is given. PDF needs a LaTeX
    /// toolchain and is opt-in.
    pub const DEFAULT: [Format; 3] = [Format::Epub, Format::Docx, Format::Md];

    pub fn name(self) -> &'static str {
        match self {
            Format::Epub => "epub",
            Format::Docx => "docx",
            Format::Md => "md",
            Format::Pdf => "pdf",
        }
    }

    /// `<prefix>.epub`, `<prefix>.docx`, `<prefix>.md`, `<prefix><job_suffix>.pdf`.
    pub fn output_file_name(self, config: &Configuration) -> String {
        match self {
            Format::Pdf => format!("{}{}.pdf", config.prefix, config.pdf.job_suffix),
            other => format!("{}.{}", config.prefix, other.name()),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the converter reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionInput {
    /// Ordered source files, passed to the converter as-is.
    Files(Vec<PathBuf>),
    /// One merged document.
    Merged(PathBuf),
}

impl ConversionInput {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            ConversionInput::Files(files) => files,
            ConversionInput::Merged(path) => std::slice::from_ref(path),
        }
    }
}

/// Settings plus resolved artifacts for one format.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatOptions {
    Epub {
        settings: EpubSettings,
        stylesheet: ArtifactReference,
        cover: ArtifactReference,
        patch: EpubPatch,
    },
    Docx {
        settings: DocxSettings,
        reference: ArtifactReference,
    },
    Md {
        filter: ArtifactReference,
    },
    Pdf {
        settings: PdfSettings,
        template: ArtifactReference,
        filter: ArtifactReference,
        series: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub format: Format,
    pub input: ConversionInput,
    pub output: PathBuf,
    /// Output filename stem from the book configuration.
    pub prefix: String,
    /// Book directory; relative image paths in the sources resolve against it.
    pub resource_dir: PathBuf,
    /// Pandoc `--from` value.
    pub from: String,
    pub metadata: Vec<(String, String)>,
    /// Book-level filters applied to every format.
    pub filters: Vec<PathBuf>,
    pub options: FormatOptions,
    pub keep_intermediate: bool,
}

impl ConversionRequest {
    pub fn output_dir(&self) -> &Path {
        self.output.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Turns one request into one output file.
///
/// Failures are reported as [`crate::error::Error::Converter`] carrying the
/// tool's diagnostic verbatim.
pub trait Converter: Send + Sync {
    fn convert(&self, request: &ConversionRequest) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::config;

    #[test]
    fn output_names_follow_prefix_and_job_suffix() -> anyhow::Result<()> {
        let config = config::parse(
            Path::new("book.yaml"),
            "title: T\nauthor: A\nprefix: trench\n",
        )?;
        let names: Vec<String> = Format::ALL
            .iter()
            .map(|format| format.output_file_name(&config))
            .collect();
        assert_eq!(
            names,
            vec![
                "trench.epub",
                "trench.docx",
                "trench.md",
                "trench_print_6x9.pdf"
            ]
        );
        Ok(())
    }

    #[test]
    fn declaration_order_is_sort_order() {
        let mut formats = vec![Format::Pdf, Format::Md, Format::Epub, Format::Docx];
        formats.sort();
        assert_eq!(formats, Format::ALL);
    }
}
