use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::domain::{error::SeedError, ports::AssetStore};

/// A local directory of image files referenced by filename from product rows.
#[derive(Debug)]
pub struct AssetDirectory {
    root: PathBuf,
}

impl AssetDirectory {
    /// Fails with a configuration error when the path is not a readable
    /// directory, before any store instance is acquired.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SeedError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SeedError::Configuration(format!(
                "asset directory {} does not exist or is not a directory",
                root.display()
            )));
        }
        debug!("Asset directory: {}", root.display());
        Ok(Self { root })
    }
}

impl AssetStore for AssetDirectory {
    fn resolve(&self, filename: &str) -> Result<PathBuf, SeedError> {
        let relative = Path::new(filename);
        // Asset references must stay inside the directory.
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir));
        if escapes {
            return Err(SeedError::Store(format!(
                "asset reference '{}' escapes the asset directory",
                filename
            )));
        }

        let path = self.root.join(relative);
        if !path.is_file() {
            return Err(SeedError::Store(format!(
                "asset file '{}' not found in {}",
                filename,
                self.root.display()
            )));
        }
        Ok(path)
    }
}
