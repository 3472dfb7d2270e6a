//! Ordered manuscript assembly: front → chapters → back, natural sort within each.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const SOURCE_EXTENSION: &str = "md";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Front,
    Chapters,
    Back,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Front, Section::Chapters, Section::Back];

    pub fn dir_name(self) -> &'static str {
        match self {
            Section::Front => "front",
            Section::Chapters => "chapters",
            Section::Back => "back",
        }
    }
}

/// Which sections an operation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Full,
    /// Chapters only (editor hand-off copies, `lint --chapters`).
    Chapters,
}

impl Scope {
    pub fn includes(self, section: Section) -> bool {
        match self {
            Scope::Full => true,
            Scope::Chapters => section == Section::Chapters,
        }
    }
}

/// Natural sort key: leading digit run compared as an integer, then the full name.
///
/// Digit runs are kept as strings without leading zeros so arbitrarily long
/// prefixes still compare numerically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    number: Option<String>,
    name: String,
}

impl SortKey {
    pub fn new(file_name: &str) -> Self {
        let digits: String = file_name
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let number = if digits.is_empty() {
            None
        } else {
            Some(digits.trim_start_matches('0').to_owned())
        };
        Self {
            number,
            name: file_name.to_owned(),
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_number = match (&self.number, &other.number) {
            (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_number.then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManuscriptFile {
    pub path: PathBuf,
    pub section: Section,
    pub key: SortKey,
}

impl ManuscriptFile {
    pub fn file_name(&self) -> &str {
        &self.key.name
    }
}

/// Enumerate a book's sources in final order.
///
/// Falls back to `*.md` in the book root (treated as chapters) when no section
/// directory holds any source.
pub fn assemble(book_dir: &Path) -> Result<Vec<ManuscriptFile>> {
    let mut files = Vec::new();
    for section in Section::ALL {
        files.extend(section_files(&book_dir.join(section.dir_name()), section)?);
    }

    if files.is_empty() {
        files = section_files(book_dir, Section::Chapters)?;
        if !files.is_empty() {
            tracing::debug!(book_dir = %book_dir.display(), "using flat manuscript layout");
        }
    }

    if files.is_empty() {
        return Err(Error::assembly(
            book_dir,
            format!("no .{SOURCE_EXTENSION} sources found in front/, chapters/, back/ or the book root"),
        ));
    }

    Ok(files)
}

/// Keep only the files covered by `scope`, preserving order.
pub fn select(files: &[ManuscriptFile], scope: Scope) -> Vec<ManuscriptFile> {
    files
        .iter()
        .filter(|file| scope.includes(file.section))
        .cloned()
        .collect()
}

fn section_files(dir: &Path, section: Section) -> Result<Vec<ManuscriptFile>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|err| Error::io(dir, err))? {
        let entry = entry.map_err(|err| Error::io(dir, err))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_source = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION));
        if !is_source {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Err(Error::assembly(&path, "file name is not valid UTF-8"));
        };
        let key = SortKey::new(name);
        files.push(ManuscriptFile { path, section, key });
    }

    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

/// Concatenate sources with one blank line between files.
pub fn merge(files: &[ManuscriptFile]) -> Result<String> {
    let mut merged = String::new();
    for (idx, file) in files.iter().enumerate() {
        let contents = std::fs::read_to_string(&file.path).map_err(|err| {
            if err.kind() == io::ErrorKind::InvalidData {
                Error::assembly(&file.path, "source is not valid UTF-8")
            } else {
                Error::io(&file.path, err)
            }
        })?;

        if idx != 0 {
            if !merged.ends_with('\n') {
                merged.push('\n');
            }
            merged.push('\n');
        }
        merged.push_str(&contents);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, contents: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(name), contents)?;
        Ok(())
    }

    fn names(files: &[ManuscriptFile]) -> Vec<&str> {
        files.iter().map(ManuscriptFile::file_name).collect()
    }

    #[test]
    fn numeric_prefix_sorts_as_integer() {
        let mut keys: Vec<SortKey> = ["10_final.md", "2_draft.md", "epilogue.md", "1_start.md"]
            .into_iter()
            .map(SortKey::new)
            .collect();
        keys.sort();
        let sorted: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(
            sorted,
            vec!["1_start.md", "2_draft.md", "10_final.md", "epilogue.md"]
        );
    }

    #[test]
    fn equal_numbers_tie_break_on_name() {
        assert!(SortKey::new("01_a.md") < SortKey::new("1_a.md"));
        assert!(SortKey::new("3_a.md") < SortKey::new("3_b.md"));
        assert!(
            SortKey::new("99999999999999999999999_x.md")
                > SortKey::new("100_x.md")
        );
    }

    #[test]
    fn sections_are_concatenated_in_order() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let book = temp.path();
        touch(&book.join("back"), "1_about.md", "# About\n")?;
        touch(&book.join("chapters"), "10_end.md", "# End\n")?;
        touch(&book.join("chapters"), "2_middle.md", "# Middle\n")?;
        touch(&book.join("chapters"), "notes.txt", "ignored")?;
        touch(&book.join("front"), "title.md", "# Title\n")?;

        let files = assemble(book)?;
        assert_eq!(
            names(&files),
            vec!["title.md", "2_middle.md", "10_end.md", "1_about.md"]
        );
        assert_eq!(files[0].section, Section::Front);
        assert_eq!(files[3].section, Section::Back);

        let chapters = select(&files, Scope::Chapters);
        assert_eq!(names(&chapters), vec!["2_middle.md", "10_end.md"]);
        Ok(())
    }

    #[test]
    fn flat_layout_is_used_without_section_dirs() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        touch(temp.path(), "2_b.md", "b\n")?;
        touch(temp.path(), "1_a.md", "a\n")?;
        let files = assemble(temp.path())?;
        assert_eq!(names(&files), vec!["1_a.md", "2_b.md"]);
        assert!(files.iter().all(|f| f.section == Section::Chapters));
        Ok(())
    }

    #[test]
    fn empty_book_is_an_assembly_error() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let err = assemble(temp.path()).unwrap_err();
        assert!(matches!(err, Error::Assembly { .. }));
        Ok(())
    }

    #[test]
    fn merge_separates_files_with_one_blank_line() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let chapters = temp.path().join("chapters");
        touch(&chapters, "1_a.md", "# A\n\nText a.\n")?;
        touch(&chapters, "2_b.md", "# B\n\nText b.")?;
        touch(&chapters, "3_c.md", "# C\n")?;

        let files = assemble(temp.path())?;
        let merged = merge(&files)?;
        assert_eq!(merged, "# A\n\nText a.\n\n# B\n\nText b.\n\n# C\n");
        Ok(())
    }
}
