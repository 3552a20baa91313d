use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

const IMPORTANCE_FILE: &str = "importance.ini";
const SERVICES_DIR: &str = "services";

/// Application directories following the XDG base directory layout
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/mklauncher)
    pub config: PathBuf,

    /// Persisted importance values
    pub importance_file: PathBuf,

    /// Service registry directory ($XDG_RUNTIME_DIR/mklauncher/services)
    pub services: PathBuf,
}

impl Directories {
    /// Resolve the standard XDG paths.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no home directory can be determined.
    pub fn new() -> Result<Self> {
        let project = ProjectDirs::from("", "", "mklauncher")
            .ok_or_else(|| Error::Config("Failed to determine project directories".to_string()))?;

        let config = project.config_dir().to_path_buf();
        let runtime = project
            .runtime_dir()
            .map_or_else(|| std::env::temp_dir().join("mklauncher"), Path::to_path_buf);

        Ok(Self {
            importance_file: config.join(IMPORTANCE_FILE),
            services: runtime.join(SERVICES_DIR),
            config,
        })
    }

    /// Root every path under `base`, for tests and sandboxed runs.
    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            importance_file: base.join(IMPORTANCE_FILE),
            services: base.join(SERVICES_DIR),
            config: base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_layout() {
        let dirs = Directories::with_base(PathBuf::from("/tmp/mk"));
        assert_eq!(dirs.config, PathBuf::from("/tmp/mk"));
        assert_eq!(dirs.importance_file, PathBuf::from("/tmp/mk/importance.ini"));
        assert_eq!(dirs.services, PathBuf::from("/tmp/mk/services"));
    }
}
