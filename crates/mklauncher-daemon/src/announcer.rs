//! Service announcement.
//!
//! Both endpoints are announced when the daemon starts and withdrawn at
//! shutdown. The default announcer writes descriptor files into the service
//! registry directory read by `mklauncher services`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mklauncher_rpc::{ServiceDescriptor, service_file};
use tracing::{debug, info, warn};

pub trait ServiceAnnouncer: Send {
    /// Announce one endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the announcement cannot be made.
    fn publish(&mut self, service: &ServiceDescriptor) -> io::Result<()>;

    /// Withdraw every endpoint announced so far.
    ///
    /// # Errors
    ///
    /// Returns an error if an announcement cannot be withdrawn.
    fn unpublish(&mut self) -> io::Result<()>;
}

/// Announces services as JSON files in a registry directory
#[derive(Debug)]
pub struct FileAnnouncer {
    dir: PathBuf,
    published: Vec<PathBuf>,
}

impl FileAnnouncer {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            published: Vec::new(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ServiceAnnouncer for FileAnnouncer {
    fn publish(&mut self, service: &ServiceDescriptor) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = service_file(&self.dir, service);

        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let json = serde_json::to_vec_pretty(service)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;

        info!(
            "Announced {} service '{}' at {}",
            service.kind, service.name, service.address
        );
        self.published.push(path);
        Ok(())
    }

    fn unpublish(&mut self) -> io::Result<()> {
        let mut result = Ok(());
        for path in self.published.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Withdrew {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {e}", path.display());
                    result = Err(e);
                }
            }
        }
        result
    }
}

/// Human-readable service name, `"<name> on <host>"` unless the host is suppressed.
#[must_use]
pub fn service_name(name: &str, suppress_host: bool) -> String {
    if suppress_host {
        return name.to_string();
    }
    match hostname::get() {
        Ok(host) => format!("{name} on {}", host.to_string_lossy()),
        Err(e) => {
            warn!("Failed to determine hostname: {e}");
            name.to_string()
        }
    }
}

/// Hostname used in announced addresses when listening on all interfaces
#[must_use]
pub fn announce_host(bind_host: &str) -> String {
    if bind_host == "0.0.0.0" {
        hostname::get().map_or_else(
            |_| "127.0.0.1".to_string(),
            |host| host.to_string_lossy().into_owned(),
        )
    } else {
        bind_host.to_string()
    }
}
