//! File-based service registry.
//!
//! The daemon announces each endpoint as one JSON file named
//! `<uuid>-<type>.json` in a registry directory; clients list that directory
//! to find endpoints.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mklauncher_types::ServiceDescriptor;
use tracing::{debug, warn};

/// Registry file path for a service
#[must_use]
pub fn service_file(dir: &Path, service: &ServiceDescriptor) -> PathBuf {
    dir.join(format!("{}-{}.json", service.uuid, service.kind))
}

/// List every service announced in `dir`. Unreadable entries are skipped.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn discover_services(dir: &Path) -> io::Result<Vec<ServiceDescriptor>> {
    if !dir.exists() {
        debug!("Service registry {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut services = Vec::new();
    for path in paths {
        match fs::read(&path).map(|raw| serde_json::from_slice::<ServiceDescriptor>(&raw)) {
            Ok(Ok(service)) => services.push(service),
            Ok(Err(e)) => warn!("Ignoring malformed service file {}: {e}", path.display()),
            Err(e) => warn!("Failed to read service file {}: {e}", path.display()),
        }
    }
    Ok(services)
}

/// First announced service of the given type
///
/// # Errors
///
/// Returns an error if the registry cannot be read.
pub fn find_service(dir: &Path, kind: &str) -> io::Result<Option<ServiceDescriptor>> {
    Ok(discover_services(dir)?
        .into_iter()
        .find(|service| service.kind == kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(kind: &str, port: u16) -> ServiceDescriptor {
        ServiceDescriptor {
            name: "Launcher".to_string(),
            kind: kind.to_string(),
            uuid: "a42c8c6b".to_string(),
            address: format!("tcp://127.0.0.1:{port}"),
            port,
        }
    }

    #[test]
    fn test_service_file_name() {
        let path = service_file(Path::new("/run/mk"), &service("launchercmd", 1));
        assert_eq!(path, PathBuf::from("/run/mk/a42c8c6b-launchercmd.json"));
    }

    #[test]
    fn test_discover_reads_json_files() {
        let dir = TempDir::new().unwrap();
        for svc in [service("launcher", 5600), service("launchercmd", 5601)] {
            fs::write(service_file(dir.path(), &svc), serde_json::to_vec(&svc).unwrap()).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        let services = discover_services(dir.path()).unwrap();
        assert_eq!(services.len(), 2);

        let cmd = find_service(dir.path(), "launchercmd").unwrap().unwrap();
        assert_eq!(cmd.port, 5601);
        assert!(find_service(dir.path(), "config").unwrap().is_none());
    }

    #[test]
    fn test_missing_registry_is_empty() {
        let dir = TempDir::new().unwrap();
        let services = discover_services(&dir.path().join("absent")).unwrap();
        assert!(services.is_empty());
    }
}
