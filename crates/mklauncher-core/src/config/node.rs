use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::debug;

use super::parse_bool;
use crate::{Error, Result};

/// Environment variable naming the node configuration file
pub const MACHINEKIT_INI_ENV: &str = "MACHINEKIT_INI";

/// Node configuration used when `MACHINEKIT_INI` is unset
pub const DEFAULT_MACHINEKIT_INI: &str = "/etc/machinekit/machinekit.ini";

const MACHINEKIT_SECTION: &str = "MACHINEKIT";

/// Node-wide settings shared by all Machinekit services on this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Instance UUID announced with every service
    pub uuid: String,

    /// Whether services accept connections from other hosts
    pub remote: bool,
}

impl NodeConfig {
    /// Path of the node configuration, honoring `MACHINEKIT_INI`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        std::env::var_os(MACHINEKIT_INI_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_MACHINEKIT_INI), PathBuf::from)
    }

    /// Load the node configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file is missing, unparsable or has no `MKUUID`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "MACHINEKIT_INI {} does not exist",
                path.display()
            )));
        }

        let ini = Ini::load_from_file(path).map_err(|e| Error::from_ini(path, e))?;
        let section = ini.section(Some(MACHINEKIT_SECTION));

        let uuid = section
            .and_then(|s| s.get("MKUUID"))
            .map(str::trim)
            .filter(|uuid| !uuid.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("{}: [MACHINEKIT] MKUUID is missing", path.display()))
            })?
            .to_string();

        let remote = match section.and_then(|s| s.get("REMOTE")) {
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                Error::Config(format!("{}: invalid REMOTE value '{raw}'", path.display()))
            })?,
            None => false,
        };

        debug!("Node config {}: uuid={uuid} remote={remote}", path.display());
        Ok(Self { uuid, remote })
    }

    /// Host to bind listeners to
    #[must_use]
    pub fn bind_host(&self) -> &'static str {
        if self.remote { "0.0.0.0" } else { "127.0.0.1" }
    }
}
