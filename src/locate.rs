//! Book identifier resolution: path, numeric prefix, or keyword.

use std::path::{Path, PathBuf};

use crate::config::CONFIG_FILE_NAME;
use crate::error::{Error, Result};
use crate::workspace::Workspace;

/// Resolve a user-supplied identifier to exactly one book directory.
///
/// 1. An existing directory containing `book.yaml`, as given or relative to the
///    project root.
/// 2. All digits `n`: directories under `manuscript/` whose name starts with
///    `n_`, compared as text (`1` does not match `01_...`).
/// 3. Otherwise a case-insensitive substring of the directory name with its
///    numeric prefix and separators stripped.
///
/// Rules 2 and 3 require exactly one match.
pub fn resolve(workspace: &Workspace, identifier: &str) -> Result<PathBuf> {
    for candidate in [PathBuf::from(identifier), workspace.root.join(identifier)] {
        if candidate.is_dir() && candidate.join(CONFIG_FILE_NAME).is_file() {
            let dir = candidate
                .canonicalize()
                .map_err(|err| Error::io(&candidate, err))?;
            tracing::debug!(identifier, dir = %dir.display(), "book resolved by path");
            return Ok(dir);
        }
    }

    let not_found = || Error::NotFound {
        identifier: identifier.to_owned(),
        root: workspace.manuscript_dir.clone(),
    };

    let needle = identifier.trim();
    if needle.is_empty() || !workspace.manuscript_dir.is_dir() {
        return Err(not_found());
    }

    let books = list_book_dirs(&workspace.manuscript_dir)?;
    let matches: Vec<PathBuf> = if needle.chars().all(|c| c.is_ascii_digit()) {
        let prefix = format!("{needle}_");
        books
            .into_iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(_, path)| path)
            .collect()
    } else {
        let needle = needle.to_lowercase();
        books
            .into_iter()
            .filter(|(name, _)| strip_prefix(name).to_lowercase().contains(&needle))
            .map(|(_, path)| path)
            .collect()
    };

    match matches.len() {
        0 => Err(not_found()),
        1 => {
            let dir = matches.into_iter().next().ok_or_else(not_found)?;
            tracing::debug!(identifier, dir = %dir.display(), "book resolved");
            Ok(dir)
        }
        _ => Err(Error::Ambiguous {
            identifier: identifier.to_owned(),
            candidates: matches,
        }),
    }
}

/// Directories under the manuscript root, sorted by name.
fn list_book_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root).map_err(|err| Error::io(root, err))? {
        let entry = entry.map_err(|err| Error::io(root, err))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        dirs.push((name.to_owned(), path));
    }
    dirs.sort();
    Ok(dirs)
}

fn strip_prefix(name: &str) -> &str {
    name.trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(['_', '-', '.', ' '])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with(books: &[&str]) -> anyhow::Result<(tempfile::TempDir, Workspace)> {
        let temp = tempfile::TempDir::new()?;
        let workspace = Workspace::new(temp.path(), None);
        for book in books {
            let dir = workspace.manuscript_dir.join(book);
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(CONFIG_FILE_NAME), "title: t\n")?;
        }
        Ok((temp, workspace))
    }

    #[test]
    fn numeric_identifier_matches_prefix_only() -> anyhow::Result<()> {
        let (_temp, ws) = workspace_with(&["1_the_trench_mage", "10_sequel", "2_other"])?;
        let dir = resolve(&ws, "1")?;
        assert!(dir.ends_with("1_the_trench_mage"));
        // Stable across repeated calls.
        assert_eq!(resolve(&ws, "1")?, dir);
        assert!(resolve(&ws, "10")?.ends_with("10_sequel"));
        Ok(())
    }

    #[test]
    fn numeric_identifier_is_matched_as_text() -> anyhow::Result<()> {
        let (_temp, ws) = workspace_with(&["1_alpha", "01_beta"])?;
        assert!(resolve(&ws, "1")?.ends_with("1_alpha"));
        assert!(resolve(&ws, "01")?.ends_with("01_beta"));
        assert!(matches!(resolve(&ws, "+1").unwrap_err(), Error::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn keyword_ignores_numeric_prefix_and_case() -> anyhow::Result<()> {
        let (_temp, ws) = workspace_with(&["1_the_trench_mage", "2_other"])?;
        assert!(resolve(&ws, "TRENCH")?.ends_with("1_the_trench_mage"));
        // The digit in "2_other" is stripped before matching.
        let err = resolve(&ws, "2_o").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn ambiguous_keyword_lists_every_candidate() -> anyhow::Result<()> {
        let (_temp, ws) = workspace_with(&["2_Draft", "10_Drafted", "3_final"])?;
        let err = resolve(&ws, "draft").unwrap_err();
        match err {
            Error::Ambiguous { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().any(|p| p.ends_with("2_Draft")));
                assert!(candidates.iter().any(|p| p.ends_with("10_Drafted")));
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn unknown_identifier_names_search_root() -> anyhow::Result<()> {
        let (_temp, ws) = workspace_with(&["1_a"])?;
        let err = resolve(&ws, "7").unwrap_err();
        assert!(err.to_string().contains("'7'"));
        assert!(err.to_string().contains("manuscript"));
        Ok(())
    }

    #[test]
    fn direct_path_with_config_is_used() -> anyhow::Result<()> {
        let (_temp, ws) = workspace_with(&["1_a", "2_a"])?;
        let dir = resolve(&ws, "manuscript/2_a")?;
        assert!(dir.ends_with("2_a"));
        Ok(())
    }
}
