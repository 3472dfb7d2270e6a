//! Layered artifact lookup: book `artifacts/` → shared `artifacts/` → built-in fallback.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactTier {
    Book,
    Shared,
    Fallback,
    /// Optional artifact with no candidate; the converter uses its own default.
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    /// Logical role, e.g. `stylesheet`.
    pub role: String,
    /// File name the book's settings ask for.
    pub file: String,
    pub path: Option<PathBuf>,
    pub tier: ArtifactTier,
}

impl ArtifactReference {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

type Lookup = fn(&Path, &str) -> Result<Option<PathBuf>>;

#[derive(Debug, Clone)]
struct SearchTier {
    tier: ArtifactTier,
    dir: PathBuf,
    lookup: Lookup,
}

/// Ordered list of lookup tiers for one book; the first hit wins.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    tiers: Vec<SearchTier>,
}

impl ArtifactResolver {
    pub fn for_book(workspace: &Workspace, book_dir: &Path) -> Self {
        Self {
            tiers: vec![
                SearchTier {
                    tier: ArtifactTier::Book,
                    dir: book_dir.join("artifacts"),
                    lookup: lookup_file,
                },
                SearchTier {
                    tier: ArtifactTier::Shared,
                    dir: workspace.artifacts_dir.clone(),
                    lookup: lookup_file,
                },
                SearchTier {
                    tier: ArtifactTier::Fallback,
                    dir: workspace.fallback_dir(),
                    lookup: materialize_fallback,
                },
            ],
        }
    }

    pub fn resolve(&self, role: &str, file: &str, required: bool) -> Result<ArtifactReference> {
        let file = file.trim();
        if !file.is_empty() {
            for search in &self.tiers {
                if let Some(path) = (search.lookup)(&search.dir, file)? {
                    tracing::debug!(role, file, tier = ?search.tier, path = %path.display(), "resolved artifact");
                    return Ok(ArtifactReference {
                        role: role.to_owned(),
                        file: file.to_owned(),
                        path: Some(path),
                        tier: search.tier,
                    });
                }
            }
        }

        if required {
            return Err(Error::MissingArtifact {
                role: role.to_owned(),
                file: file.to_owned(),
                searched: self
                    .tiers
                    .iter()
                    .filter(|search| search.tier != ArtifactTier::Fallback)
                    .map(|search| search.dir.join(file))
                    .collect(),
            });
        }

        Ok(ArtifactReference {
            role: role.to_owned(),
            file: file.to_owned(),
            path: None,
            tier: ArtifactTier::Absent,
        })
    }
}

fn lookup_file(dir: &Path, file: &str) -> Result<Option<PathBuf>> {
    let path = dir.join(file);
    if !path.is_file() {
        return Ok(None);
    }
    let path = path.canonicalize().map_err(|err| Error::io(&path, err))?;
    Ok(Some(path))
}

fn materialize_fallback(dir: &Path, file: &str) -> Result<Option<PathBuf>> {
    let Some(contents) = builtin_fallback(file) else {
        return Ok(None);
    };
    std::fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
    let path = dir.join(file);
    let up_to_date = std::fs::read_to_string(&path).is_ok_and(|existing| existing == contents);
    if !up_to_date {
        std::fs::write(&path, contents).map_err(|err| Error::io(&path, err))?;
    }
    let path = path.canonicalize().map_err(|err| Error::io(&path, err))?;
    Ok(Some(path))
}

fn builtin_fallback(file: &str) -> Option<&'static str> {
    match file {
        "epub.css" => Some(DEFAULT_EPUB_CSS),
        "strip_formatting.lua" => Some(STRIP_FORMATTING_LUA),
        _ => None,
    }
}

const DEFAULT_EPUB_CSS: &str = r#"@charset "utf-8";

html { font-family: serif; }
body { margin: 0; padding: 0 1.2em; line-height: 1.6; }
h1 { page-break-before: always; text-align: center; margin: 2em 0 1em; }
p { margin: 0; text-indent: 1.5em; }
h1 + p, hr + p { text-indent: 0; }
hr { border: none; margin: 1.5em 0; text-align: center; }
hr::after { content: "* * *"; }
img { max-width: 100%; height: auto; }
blockquote { margin: 1em 0; padding: 0 1em; }
"#;

const STRIP_FORMATTING_LUA: &str = r#"-- Plain merged manuscript: drop scene-break rules and unwrap fenced divs.
function HorizontalRule()
  return {}
end

function Div(el)
  return el.content
end
"#;

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _temp: tempfile::TempDir,
        workspace: Workspace,
        book_dir: PathBuf,
    }

    fn fixture() -> anyhow::Result<Fixture> {
        let temp = tempfile::TempDir::new()?;
        let workspace = Workspace::new(temp.path(), None);
        let book_dir = workspace.manuscript_dir.join("1_trench");
        std::fs::create_dir_all(book_dir.join("artifacts"))?;
        std::fs::create_dir_all(&workspace.artifacts_dir)?;
        Ok(Fixture {
            _temp: temp,
            workspace,
            book_dir,
        })
    }

    #[test]
    fn book_override_wins_over_shared() -> anyhow::Result<()> {
        let fx = fixture()?;
        std::fs::write(fx.book_dir.join("artifacts").join("cover.jpg"), b"book")?;
        std::fs::write(fx.workspace.artifacts_dir.join("cover.jpg"), b"shared")?;

        let resolver = ArtifactResolver::for_book(&fx.workspace, &fx.book_dir);
        let reference = resolver.resolve("cover", "cover.jpg", true)?;
        assert_eq!(reference.tier, ArtifactTier::Book);
        assert_eq!(std::fs::read(reference.path().unwrap())?, b"book");
        assert!(reference.path().unwrap().is_absolute());
        Ok(())
    }

    #[test]
    fn shared_used_when_book_has_no_override() -> anyhow::Result<()> {
        let fx = fixture()?;
        std::fs::write(fx.workspace.artifacts_dir.join("book.tex"), b"tex")?;

        let resolver = ArtifactResolver::for_book(&fx.workspace, &fx.book_dir);
        let reference = resolver.resolve("template", "book.tex", true)?;
        assert_eq!(reference.tier, ArtifactTier::Shared);
        Ok(())
    }

    #[test]
    fn builtin_fallback_is_materialized() -> anyhow::Result<()> {
        let fx = fixture()?;
        let resolver = ArtifactResolver::for_book(&fx.workspace, &fx.book_dir);
        let reference = resolver.resolve("stylesheet", "epub.css", false)?;
        assert_eq!(reference.tier, ArtifactTier::Fallback);
        let css = std::fs::read_to_string(reference.path().unwrap())?;
        assert!(css.contains("@charset"));
        Ok(())
    }

    #[test]
    fn optional_missing_artifact_is_absent() -> anyhow::Result<()> {
        let fx = fixture()?;
        let resolver = ArtifactResolver::for_book(&fx.workspace, &fx.book_dir);
        let reference = resolver.resolve("reference", "reference.docx", false)?;
        assert_eq!(reference.tier, ArtifactTier::Absent);
        assert!(reference.path().is_none());
        Ok(())
    }

    #[test]
    fn required_missing_artifact_lists_searched_locations() -> anyhow::Result<()> {
        let fx = fixture()?;
        let resolver = ArtifactResolver::for_book(&fx.workspace, &fx.book_dir);
        let err = resolver.resolve("template", "book.tex", true).unwrap_err();
        match &err {
            Error::MissingArtifact { role, searched, .. } => {
                assert_eq!(role, "template");
                assert_eq!(
                    searched,
                    &vec![
                        fx.book_dir.join("artifacts").join("book.tex"),
                        fx.workspace.artifacts_dir.join("book.tex"),
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("book.tex"));
        Ok(())
    }
}
