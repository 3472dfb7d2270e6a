use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::convert::Format;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Assemble, lint and build multi-file book manuscripts",
    after_help = "A bare `bookpipe <book> --epub` is shorthand for `bookpipe build <book> --epub`."
)]
pub struct Cli {
    /// Project root containing `manuscript/` and `artifacts/`.
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Output directory (default: `<root>/output`).
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Debug logging (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build output formats (the default command).
    Build(BuildArgs),
    /// Check manuscript sources for encoding, structural and formatting defects.
    Lint(LintArgs),
    /// Run epubcheck on an existing EPUB.
    Validate(ValidateArgs),
}

pub const SUBCOMMANDS: [&str; 4] = ["build", "lint", "validate", "help"];

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Book number, keyword, or path.
    pub book: String,

    #[arg(long)]
    pub epub: bool,

    #[arg(long)]
    pub docx: bool,

    /// Merged Markdown.
    #[arg(long)]
    pub md: bool,

    /// PDF through LaTeX (needs the configured engine, `xelatex` by default).
    #[arg(long)]
    pub pdf: bool,

    /// epub + docx + md.
    #[arg(long)]
    pub all: bool,

    /// Chapters only, no front or back matter.
    #[arg(long)]
    pub ms_only: bool,

    /// Keep the merged Markdown and intermediate LaTeX files.
    #[arg(long, alias = "keep-tex")]
    pub keep_intermediate: bool,

    /// Skip epubcheck after the EPUB build.
    #[arg(long)]
    pub no_validate: bool,

    /// Save the epubcheck JSON report (default: `<prefix>_epubcheck.json`).
    #[arg(long, num_args = 0..=1, value_name = "PATH")]
    pub json_report: Option<Option<PathBuf>>,

    /// Formats converted concurrently.
    #[arg(long, default_value_t = 1)]
    pub jobs: usize,

    /// Pandoc executable.
    #[arg(long, default_value = "pandoc")]
    pub pandoc: PathBuf,
}

impl BuildArgs {
    /// Requested formats in declaration order; none selected means the defaults.
    pub fn formats(&self) -> Vec<Format> {
        if self.all {
            let mut formats = Format::DEFAULT.to_vec();
            if self.pdf {
                formats.push(Format::Pdf);
            }
            return formats;
        }
        [
            (self.epub, Format::Epub),
            (self.docx, Format::Docx),
            (self.md, Format::Md),
            (self.pdf, Format::Pdf),
        ]
        .into_iter()
        .filter_map(|(selected, format)| selected.then_some(format))
        .collect()
    }
}

#[derive(Debug, Args)]
pub struct LintArgs {
    /// Book number, keyword, or path.
    pub book: String,

    /// Lint chapters only.
    #[arg(long)]
    pub chapters: bool,

    /// Apply automatic fixes, then report what remains.
    #[arg(long)]
    pub fix: bool,

    #[arg(long, value_enum, default_value_t = LintOutput::Text)]
    pub format: LintOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LintOutput {
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Book number, keyword, or path.
    pub book: String,

    /// Save the epubcheck JSON report (default: `<prefix>_epubcheck.json`).
    #[arg(long, num_args = 0..=1, value_name = "PATH")]
    pub json_report: Option<Option<PathBuf>>,
}

/// Insert `build` when the first argument is neither a subcommand nor a flag,
/// so `bookpipe 1 --epub` reads as `bookpipe build 1 --epub`.
pub fn with_default_subcommand<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().collect();
    let needs_build = args.get(1).is_some_and(|first| {
        let first = first.to_string_lossy();
        !first.starts_with('-') && !SUBCOMMANDS.contains(&first.as_ref())
    });
    if needs_build {
        args.insert(1, OsString::from("build"));
    }
    args
}
