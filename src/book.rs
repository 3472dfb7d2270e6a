use std::path::PathBuf;

use crate::assemble::{self, ManuscriptFile, Scope};
use crate::config::{self, Configuration};
use crate::error::Result;
use crate::locate;
use crate::workspace::Workspace;

/// One resolved manuscript: directory, configuration and ordered sources.
#[derive(Debug, Clone)]
pub struct Book {
    /// Directory name, e.g. `1_the_trench_mage`.
    pub id: String,
    pub dir: PathBuf,
    pub config: Configuration,
    pub files: Vec<ManuscriptFile>,
}

impl Book {
    pub fn open(workspace: &Workspace, identifier: &str) -> Result<Self> {
        let dir = locate::resolve(workspace, identifier)?;
        let config = config::load(&dir)?;
        let files = assemble::assemble(&dir)?;
        let id = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| identifier.to_owned());

        tracing::info!(book = %id, title = %config.title, files = files.len(), "opened book");
        Ok(Self {
            id,
            dir,
            config,
            files,
        })
    }

    pub fn sources(&self, scope: Scope) -> Vec<ManuscriptFile> {
        assemble::select(&self.files, scope)
    }
}
