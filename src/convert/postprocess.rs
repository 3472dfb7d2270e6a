//! EPUB package fix-ups applied after conversion: accessibility and series
//! metadata in the OPF, cover image alt text, and `alt=""` on other images.

use std::io::{Read as _, Write as _};
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use zip::write::SimpleFileOptions;

use crate::config::{Accessibility, Configuration};
use crate::error::{Error, Result};

static SVG_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<svg\b[^>]*>").expect("valid regex"));
static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<img\b([^>]*?)\s*(/?)>").expect("valid regex"));

const MIMETYPE: &str = "mimetype";

/// Book metadata the patch writes into the package.
#[derive(Debug, Clone, PartialEq)]
pub struct EpubPatch {
    pub accessibility: Accessibility,
    pub series: Option<String>,
    pub series_number: Option<u32>,
    pub cover_alt: String,
}

impl EpubPatch {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            accessibility: config.epub.accessibility.clone(),
            series: config.series.clone(),
            series_number: config.series_number,
            cover_alt: config.cover_alt(),
        }
    }
}

struct Entry {
    name: String,
    is_dir: bool,
    data: Vec<u8>,
}

/// Rewrite `epub` in place. Entries keep their order; `mimetype` is written
/// first and stored uncompressed.
pub fn patch_epub(epub: &Path, patch: &EpubPatch) -> Result<()> {
    let mut entries = read_entries(epub)?;

    let opf = entries
        .iter_mut()
        .find(|entry| entry.name.ends_with(".opf"))
        .ok_or_else(|| Error::Converter {
            format: "epub".to_owned(),
            message: format!("{}: no OPF package document in archive", epub.display()),
        })?;
    let patched = patch_opf(&String::from_utf8_lossy(&opf.data), patch);
    opf.data = patched.into_bytes();

    for entry in entries.iter_mut().filter(|e| is_markup(&e.name)) {
        let Ok(text) = std::str::from_utf8(&entry.data) else {
            continue;
        };
        let mut text = text.to_owned();
        if is_cover_document(&entry.name, &text) {
            text = patch_cover(&text, &patch.cover_alt);
        }
        text = text.replace(r#"alt="""#, r#"alt="decorative""#);
        entry.data = text.into_bytes();
    }

    write_entries(epub, &entries)?;
    tracing::debug!(epub = %epub.display(), "patched epub package");
    Ok(())
}

fn read_entries(epub: &Path) -> Result<Vec<Entry>> {
    let file = std::fs::File::open(epub).map_err(|err| Error::io(epub, err))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| zip_error(epub, err))?;

    let mut entries = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let mut file = archive.by_index(idx).map_err(|err| zip_error(epub, err))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|err| Error::io(epub, err))?;
        entries.push(Entry {
            name: file.name().to_owned(),
            is_dir: file.is_dir(),
            data,
        });
    }
    Ok(entries)
}

fn write_entries(epub: &Path, entries: &[Entry]) -> Result<()> {
    let dir = epub.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|err| Error::io(dir, err))?;
    let mut zip = zip::ZipWriter::new(tmp);

    let stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let deflated = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mimetype = entries
        .iter()
        .find(|entry| entry.name == MIMETYPE)
        .map_or(&b"application/epub+zip"[..], |entry| entry.data.as_slice());
    zip.start_file(MIMETYPE, stored)
        .map_err(|err| zip_error(epub, err))?;
    zip.write_all(mimetype).map_err(|err| Error::io(epub, err))?;

    for entry in entries.iter().filter(|entry| entry.name != MIMETYPE) {
        if entry.is_dir {
            zip.add_directory(entry.name.as_str(), deflated)
                .map_err(|err| zip_error(epub, err))?;
            continue;
        }
        zip.start_file(entry.name.as_str(), deflated)
            .map_err(|err| zip_error(epub, err))?;
        zip.write_all(&entry.data)
            .map_err(|err| Error::io(epub, err))?;
    }

    let tmp = zip.finish().map_err(|err| zip_error(epub, err))?;
    tmp.persist(epub)
        .map_err(|err| Error::io(epub, err.error))?;
    Ok(())
}

fn zip_error(epub: &Path, err: zip::result::ZipError) -> Error {
    Error::Converter {
        format: "epub".to_owned(),
        message: format!("{}: {err}", epub.display()),
    }
}

fn is_markup(name: &str) -> bool {
    name.ends_with(".xhtml") || name.ends_with(".html")
}

fn is_cover_document(name: &str, text: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name).to_lowercase();
    file_name.contains("cover")
        || (text.to_lowercase().contains("cover")
            && (text.contains("<img") || text.contains("<image") || text.contains("<svg")))
}

/// Inject accessibility and series metadata before `</metadata>`.
///
/// Skipped when the package already declares `schema:accessMode`, so running
/// twice does not duplicate entries.
pub fn patch_opf(opf: &str, patch: &EpubPatch) -> String {
    let accessibility = &patch.accessibility;
    let mut meta = Vec::new();

    let mut property = |name: &str, value: &str| {
        let value = value.replace('\n', " ");
        let value = value.trim();
        if !value.is_empty() {
            meta.push(format!(
                r#"    <meta property="schema:{name}">{}</meta>"#,
                xml_escape(value)
            ));
        }
    };
    if let Some(value) = accessibility.access_mode.as_deref() {
        property("accessMode", value);
    }
    if let Some(value) = accessibility.access_mode_sufficient.as_deref() {
        property("accessModeSufficient", value);
    }
    for feature in &accessibility.accessibility_feature {
        property("accessibilityFeature", feature.as_str());
    }
    if let Some(value) = accessibility.accessibility_hazard.as_deref() {
        property("accessibilityHazard", value);
    }
    if let Some(value) = accessibility.accessibility_summary.as_deref() {
        property("accessibilitySummary", value);
    }

    if let Some(series) = &patch.series
        && !opf.contains("belongs-to-collection")
    {
        meta.push(format!(
            r#"    <meta property="belongs-to-collection" id="series">{}</meta>"#,
            xml_escape(series)
        ));
        meta.push(
            r##"    <meta refines="#series" property="collection-type">series</meta>"##.to_owned(),
        );
        if let Some(position) = patch.series_number {
            meta.push(format!(
                r##"    <meta refines="#series" property="group-position">{position}</meta>"##
            ));
        }
    }

    if meta.is_empty() || !opf.contains("</metadata>") || opf.contains("schema:accessMode") {
        return opf.to_owned();
    }
    opf.replacen(
        "</metadata>",
        &format!("{}\n  </metadata>", meta.join("\n")),
        1,
    )
}

/// Give the cover image an accessible name: `<title>` plus `role="img"` on an
/// SVG wrapper, `alt` on a plain `<img>`.
pub fn patch_cover(xhtml: &str, cover_alt: &str) -> String {
    let alt = xml_escape(cover_alt);
    let mut out = xhtml.to_owned();

    if out.contains("<svg") && out.contains("<image") {
        let needs_title = !out.contains("<title>");
        out = SVG_OPEN_RE
            .replace_all(&out, |caps: &Captures<'_>| {
                let tag = &caps[0];
                let tag = if tag.contains("role=") {
                    tag.to_owned()
                } else {
                    tag.replacen("<svg", r#"<svg role="img""#, 1)
                };
                if needs_title {
                    format!("{tag}\n<title>{alt}</title>")
                } else {
                    tag
                }
            })
            .into_owned();
    }

    if out.contains("<img") {
        out = IMG_TAG_RE
            .replace_all(&out, |caps: &Captures<'_>| {
                let attrs = &caps[1];
                let close = if caps[2].is_empty() { ">" } else { " />" };
                if attrs.contains(r#"alt="""#) {
                    let attrs = attrs.replace(r#"alt="""#, &format!(r#"alt="{alt}""#));
                    format!("<img{attrs}{close}")
                } else if attrs.contains("alt=") {
                    caps[0].to_owned()
                } else {
                    format!(r#"<img{attrs} alt="{alt}"{close}"#)
                }
            })
            .into_owned();
    }
    out
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use std::io::{Read as _, Write as _};

    use super::*;

    const OPF: &str = "<package>\n  <metadata>\n    <dc:title>T</dc:title>\n  </metadata>\n</package>\n";

    fn patch() -> EpubPatch {
        EpubPatch {
            accessibility: Accessibility {
                access_mode: Some("textual".to_owned()),
                accessibility_feature: vec!["tableOfContents".to_owned()],
                accessibility_summary: Some("Plain\ntext & prose".to_owned()),
                ..Accessibility::default()
            },
            series: Some("Trench Cycle".to_owned()),
            series_number: Some(1),
            cover_alt: "Cover image for T".to_owned(),
        }
    }

    #[test]
    fn opf_gains_accessibility_and_series_once() {
        let patched = patch_opf(OPF, &patch());
        assert!(patched.contains(r#"<meta property="schema:accessMode">textual</meta>"#));
        assert!(patched.contains(r#"schema:accessibilityFeature">tableOfContents<"#));
        assert!(patched.contains("Plain text &amp; prose"));
        assert!(patched.contains(r#"property="group-position">1<"#));
        assert!(patched.find("belongs-to-collection") < patched.find("</metadata>"));
        assert_eq!(patch_opf(&patched, &patch()), patched);
    }

    #[test]
    fn cover_img_and_svg_get_accessible_names() {
        let img = patch_cover(r#"<img src="cover.jpg" alt="" />"#, "Cover & more");
        assert_eq!(img, r#"<img src="cover.jpg" alt="Cover &amp; more" />"#);

        let img = patch_cover(r#"<img src="cover.jpg">"#, "Cover");
        assert_eq!(img, r#"<img src="cover.jpg" alt="Cover">"#);

        let svg = patch_cover(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><image href="cover.jpg"/></svg>"#,
            "Cover",
        );
        assert!(svg.starts_with(r#"<svg role="img" xmlns="#));
        assert!(svg.contains("<title>Cover</title>"));
    }

    fn write_epub(path: &Path, files: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path)?);
        let options = SimpleFileOptions::default();
        for (name, contents) in files {
            zip.start_file(*name, options)?;
            zip.write_all(contents.as_bytes())?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn patched_archive_keeps_mimetype_first_and_stored() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let epub = temp.path().join("t.epub");
        write_epub(
            &epub,
            &[
                ("META-INF/container.xml", "<container/>"),
                ("EPUB/content.opf", OPF),
                ("mimetype", "application/epub+zip"),
                ("EPUB/text/cover.xhtml", r#"<img src="cover.jpg" alt="" />"#),
                ("EPUB/text/ch001.xhtml", r#"<p><img src="map.png" alt=""/></p>"#),
            ],
        )?;

        patch_epub(&epub, &patch())?;

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&epub)?)?;
        {
            let first = archive.by_index(0)?;
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), zip::CompressionMethod::Stored);
        }
        let mut read = |name: &str| -> anyhow::Result<String> {
            let mut text = String::new();
            archive.by_name(name)?.read_to_string(&mut text)?;
            Ok(text)
        };
        assert!(read("EPUB/content.opf")?.contains("schema:accessMode"));
        assert!(read("EPUB/text/cover.xhtml")?.contains(r#"alt="Cover image for T""#));
        assert!(read("EPUB/text/ch001.xhtml")?.contains(r#"alt="decorative""#));
        Ok(())
    }
}
