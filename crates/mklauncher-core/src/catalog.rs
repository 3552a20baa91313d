//! Launcher discovery.
//!
//! Walks the configured directory trees for `launcher.ini` descriptors and
//! turns every section into a [`LauncherRecord`]. The result is ordered by
//! descending priority and indexed once; indices never change afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use ini::{Ini, Properties};
use mklauncher_types::{ImageData, LauncherInfo};
use tracing::{debug, info, warn};

use crate::config::parse_bool;
use crate::record::{LauncherId, LauncherRecord, LauncherStatus};
use crate::{Error, Result};

/// File name of a launcher descriptor
pub const DESCRIPTOR_FILE: &str = "launcher.ini";

const DEFAULT_NAME: &str = "Launcher";

/// Scan `directories` recursively and build the launcher catalog.
///
/// # Errors
///
/// Returns `Error::Config` for malformed descriptors or invalid integer and
/// boolean values, and `Error::Io` if a directory or image cannot be read.
pub fn scan<P: AsRef<Path>>(directories: &[P]) -> Result<Vec<LauncherRecord>> {
    let mut descriptors = Vec::new();
    for root in directories {
        let root = std::path::absolute(root.as_ref())?;
        if !root.is_dir() {
            warn!("Launcher directory does not exist: {}", root.display());
            continue;
        }
        find_descriptors(&root, &mut descriptors)?;
    }

    let mut records = Vec::new();
    for path in &descriptors {
        records.extend(load_descriptor(path)?);
    }

    // sort_by is stable: equal priorities keep scan order
    records.sort_by(|a, b| b.priority.cmp(&a.priority));
    for (index, record) in (0u32..).zip(records.iter_mut()) {
        record.index = index;
    }

    info!(
        "Loaded {} launchers from {} descriptor files",
        records.len(),
        descriptors.len()
    );
    Ok(records)
}

/// Depth-first walk in sorted order, collecting descriptor paths.
fn find_descriptors(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let descriptor = dir.join(DESCRIPTOR_FILE);
    if descriptor.is_file() {
        debug!("Found descriptor {}", descriptor.display());
        found.push(descriptor);
    }

    let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.path())
        .collect();
    subdirs.sort();

    for subdir in subdirs {
        find_descriptors(&subdir, found)?;
    }
    Ok(())
}

fn load_descriptor(path: &Path) -> Result<Vec<LauncherRecord>> {
    let ini = Ini::load_from_file(path).map_err(|e| Error::from_ini(path, e))?;
    let dir = path
        .parent()
        .ok_or_else(|| Error::Config(format!("{} has no parent directory", path.display())))?;
    let group = dir.display().to_string();

    let mut records = Vec::new();
    for (section, props) in ini.iter() {
        let Some(section) = section else {
            continue;
        };
        let fields = SectionFields {
            path,
            section,
            props,
        };
        records.push(fields.to_record(dir, &group)?);
    }
    Ok(records)
}

/// Typed accessors over one descriptor section
struct SectionFields<'a> {
    path: &'a Path,
    section: &'a str,
    props: &'a Properties,
}

impl SectionFields<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            .map(|(_, v)| v.trim())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    fn integer(&self, key: &str) -> Result<i32> {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|_| self.invalid(key, "integer", raw)),
            None => Ok(0),
        }
    }

    fn boolean(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            Some(raw) => parse_bool(raw).ok_or_else(|| self.invalid(key, "boolean", raw)),
            None => Ok(false),
        }
    }

    fn invalid(&self, key: &str, kind: &str, raw: &str) -> Error {
        Error::Config(format!(
            "{} [{}] {key}: invalid {kind} '{raw}'",
            self.path.display(),
            self.section
        ))
    }

    fn to_record(&self, dir: &Path, group: &str) -> Result<LauncherRecord> {
        let workdir = std::path::absolute(dir.join(self.get("workdir").unwrap_or(".")))?;

        let image = match self.get("image").filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(read_image(&dir.join(raw))?),
            None => None,
        };

        Ok(LauncherRecord {
            index: 0,
            id: LauncherId::new(group, self.section),
            name: self.string("name", DEFAULT_NAME),
            description: self.string("description", ""),
            info: LauncherInfo {
                kind: self.string("type", ""),
                manufacturer: self.string("manufacturer", ""),
                model: self.string("model", ""),
                variant: self.string("variant", ""),
            },
            priority: self.integer("priority")?,
            command: self.string("command", ""),
            shell: self.boolean("shell")?,
            workdir,
            image,
            status: LauncherStatus::default(),
        })
    }
}

fn read_image(path: &Path) -> Result<ImageData> {
    let blob = fs::read(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read image {}: {e}", path.display()),
        ))
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ImageData { name, blob })
}
