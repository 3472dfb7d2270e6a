use std::path::PathBuf;

/// Project layout for one invocation.
///
/// ```text
/// <root>/
/// ├── manuscript/<book>/{front,chapters,back,artifacts}/
/// ├── artifacts/          shared defaults
/// └── output/             build outputs (override with --output-dir)
/// ```
///
/// Passed explicitly to every component so that nothing depends on the
/// process working directory after argument parsing.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub manuscript_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, output_dir: Option<PathBuf>) -> Self {
        let root = root.into();
        let output_dir = output_dir.unwrap_or_else(|| root.join("output"));
        Self {
            manuscript_dir: root.join("manuscript"),
            artifacts_dir: root.join("artifacts"),
            output_dir,
            root,
        }
    }

    /// Where built-in fallback artifacts are materialized.
    pub fn fallback_dir(&self) -> PathBuf {
        self.output_dir.join(".bookpipe").join("fallback")
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }
}
