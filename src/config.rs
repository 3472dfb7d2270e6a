//! Per-book configuration loaded from `book.yaml`.
//!
//! Every block is a fixed-shape record with its own default instance, so a
//! declaration only needs to name the fields it overrides. Unknown keys are
//! rejected rather than ignored.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "book.yaml";

const REQUIRED_FIELDS: [&str; 3] = ["title", "author", "prefix"];

/// Validated configuration for one book. Built once per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub title: String,
    pub author: String,
    /// Output filename stem.
    pub prefix: String,
    pub lang: String,
    pub date: String,
    pub series: Option<String>,
    pub series_number: Option<u32>,
    pub markdown_extensions: Vec<String>,
    /// Logical filter names, resolved through the artifact tiers.
    pub filters: Vec<String>,
    pub epub: EpubSettings,
    pub docx: DocxSettings,
    pub md: MarkdownSettings,
    pub pdf: PdfSettings,
    pub lint: LintSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EpubSettings {
    pub toc: bool,
    pub toc_depth: u8,
    pub css: String,
    pub cover: String,
    /// Alt text for the cover image; defaults to `Cover image for <title>`.
    pub cover_alt: Option<String>,
    pub accessibility: Accessibility,
}

impl Default for EpubSettings {
    fn default() -> Self {
        Self {
            toc: true,
            toc_depth: 1,
            css: "epub.css".to_owned(),
            cover: "cover.jpg".to_owned(),
            cover_alt: None,
            accessibility: Accessibility::default(),
        }
    }
}

/// schema.org accessibility properties injected into the EPUB package document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Accessibility {
    pub access_mode: Option<String>,
    pub access_mode_sufficient: Option<String>,
    pub accessibility_feature: Vec<String>,
    pub accessibility_hazard: Option<String>,
    pub accessibility_summary: Option<String>,
}

impl Accessibility {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocxSettings {
    pub toc: bool,
    pub toc_depth: u8,
    pub reference: String,
}

impl Default for DocxSettings {
    fn default() -> Self {
        Self {
            toc: true,
            toc_depth: 1,
            reference: "reference.docx".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownSettings {
    pub filter: String,
}

impl Default for MarkdownSettings {
    fn default() -> Self {
        Self {
            filter: "strip_formatting.lua".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PdfSettings {
    pub template: String,
    pub filter: String,
    pub engine: String,
    pub scene_break_macro: String,
    pub job_suffix: String,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            template: "book.tex".to_owned(),
            filter: "pdf_filter.lua".to_owned(),
            engine: "xelatex".to_owned(),
            scene_break_macro: r"\scenebreak{}".to_owned(),
            job_suffix: "_print_6x9".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStyle {
    /// ASCII quotes, dashes and dots; typographic characters are defects.
    Straight,
    /// Typographic quotes; straight quotes in prose are defects.
    Curly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingAttributeStyle {
    /// `{.unnumbered}`
    Long,
    /// `{-}`
    Short,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintSettings {
    pub quotes: QuoteStyle,
    pub max_blank_lines: usize,
    pub heading_attributes: HeadingAttributeStyle,
    pub scene_break: String,
}

impl Default for LintSettings {
    fn default() -> Self {
        Self {
            quotes: QuoteStyle::Straight,
            max_blank_lines: 2,
            heading_attributes: HeadingAttributeStyle::Long,
            scene_break: "***".to_owned(),
        }
    }
}

/// Raw `book.yaml` shape before required-field validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Declaration {
    title: Option<String>,
    author: Option<String>,
    prefix: Option<String>,
    lang: Option<String>,
    date: Option<String>,
    series: Option<String>,
    series_number: Option<u32>,
    markdown_extensions: Option<MarkdownExtensions>,
    filters: Vec<String>,
    epub: EpubSettings,
    docx: DocxSettings,
    md: MarkdownSettings,
    pdf: PdfSettings,
    lint: LintSettings,
}

/// Accepts either `fenced_divs+native_divs` or a YAML list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MarkdownExtensions {
    Joined(String),
    List(Vec<String>),
}

impl MarkdownExtensions {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Joined(joined) => joined
                .split('+')
                .map(str::trim)
                .filter(|ext| !ext.is_empty())
                .map(str::to_owned)
                .collect(),
            Self::List(list) => list.into_iter().map(|ext| ext.trim().to_owned()).collect(),
        }
    }
}

fn default_markdown_extensions() -> Vec<String> {
    vec!["fenced_divs".to_owned(), "native_divs".to_owned()]
}

pub fn config_path(book_dir: &Path) -> PathBuf {
    book_dir.join(CONFIG_FILE_NAME)
}

/// Load and validate `book.yaml` from a book directory.
pub fn load(book_dir: &Path) -> Result<Configuration, ConfigError> {
    let path = config_path(book_dir);
    if !path.is_file() {
        return Err(ConfigError::MissingFile {
            dir: book_dir.to_path_buf(),
        });
    }
    let yaml = std::fs::read_to_string(&path).map_err(|err| ConfigError::Parse {
        path: path.clone(),
        message: err.to_string(),
    })?;
    parse(&path, &yaml)
}

/// Parse a declaration; `path` is only used for error messages.
pub fn parse(path: &Path, yaml: &str) -> Result<Configuration, ConfigError> {
    let decl: Declaration = serde_yaml::from_str(yaml).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    decl.validate(path)
}

impl Declaration {
    fn validate(self, path: &Path) -> Result<Configuration, ConfigError> {
        let present = [&self.title, &self.author, &self.prefix];
        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .zip(present)
            .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields {
                path: path.to_path_buf(),
                fields: missing,
            });
        }

        let invalid = |key: &str, message: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            key: key.to_owned(),
            message: message.to_owned(),
        };

        let prefix = self.prefix.unwrap_or_default().trim().to_owned();
        if prefix.contains(['/', '\\']) || prefix == "." || prefix == ".." {
            return Err(invalid("prefix", "must be a plain file name stem"));
        }

        let lang = self.lang.unwrap_or_else(|| "en-US".to_owned());
        if lang.trim().is_empty() {
            return Err(invalid("lang", "must not be empty"));
        }

        let date = self.date.unwrap_or_default().trim().to_owned();
        if !date.is_empty() && chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
            return Err(invalid("date", "expected YYYY-MM-DD"));
        }

        for (key, depth) in [
            ("epub.toc_depth", self.epub.toc_depth),
            ("docx.toc_depth", self.docx.toc_depth),
        ] {
            if !(1..=6).contains(&depth) {
                return Err(invalid(key, "must be between 1 and 6"));
            }
        }

        if self.lint.scene_break.trim().is_empty() {
            return Err(invalid("lint.scene_break", "must not be empty"));
        }

        if self.lint.max_blank_lines == 0 {
            return Err(invalid("lint.max_blank_lines", "must be at least 1"));
        }

        if self.filters.iter().any(|f| f.trim().is_empty()) {
            return Err(invalid("filters", "filter names must not be empty"));
        }

        let markdown_extensions = self
            .markdown_extensions
            .map(MarkdownExtensions::into_vec)
            .unwrap_or_else(default_markdown_extensions);
        if markdown_extensions.iter().any(String::is_empty) {
            return Err(invalid(
                "markdown_extensions",
                "extension names must not be empty",
            ));
        }

        Ok(Configuration {
            title: self.title.unwrap_or_default().trim().to_owned(),
            author: self.author.unwrap_or_default().trim().to_owned(),
            prefix,
            lang,
            date,
            series: self.series.filter(|s| !s.trim().is_empty()),
            series_number: self.series_number,
            markdown_extensions,
            filters: self.filters,
            epub: self.epub,
            docx: self.docx,
            md: self.md,
            pdf: self.pdf,
            lint: self.lint,
        })
    }
}

impl Configuration {
    /// The pandoc `--from` value including extensions.
    pub fn from_format(&self) -> String {
        let mut from = "markdown+smart".to_owned();
        for ext in &self.markdown_extensions {
            from.push('+');
            from.push_str(ext);
        }
        from
    }

    /// Metadata key/value pairs handed to the converter; empty values are skipped.
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        [
            ("title", &self.title),
            ("author", &self.author),
            ("lang", &self.lang),
            ("date", &self.date),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key, value.clone()))
        .collect()
    }

    pub fn cover_alt(&self) -> String {
        self.epub
            .cover_alt
            .clone()
            .unwrap_or_else(|| format!("Cover image for {}", self.title))
    }
}
