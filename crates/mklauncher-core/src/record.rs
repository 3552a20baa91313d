use std::path::PathBuf;

use mklauncher_types::{ImageData, Launcher, LauncherInfo, OutputLine};

/// Stable identity of a launcher across restarts.
///
/// `group` is the directory holding the descriptor file and `section` is the
/// section name inside it. Importance values are keyed by this pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LauncherId {
    pub group: String,
    pub section: String,
}

impl LauncherId {
    #[must_use]
    pub fn new(group: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            section: section.into(),
        }
    }
}

impl std::fmt::Display for LauncherId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.group, self.section)
    }
}

/// Mutable runtime status of a launcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LauncherStatus {
    pub importance: i32,
    pub running: bool,
    pub terminating: bool,
    pub returncode: i32,
    pub output: Vec<OutputLine>,
    /// Bumped every time `output` is reset
    pub output_epoch: u64,
}

impl LauncherStatus {
    /// Drop captured output ahead of a new run.
    pub fn reset_output(&mut self) {
        self.output.clear();
        self.output_epoch += 1;
    }

    /// Append a captured line, numbering it after the last one.
    pub fn push_output(&mut self, line: String) {
        let index = self.output.last().map_or(0, |last| last.index + 1);
        self.output.push(OutputLine { index, line });
    }
}

/// One launcher loaded from a descriptor section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherRecord {
    pub index: u32,
    pub id: LauncherId,
    pub name: String,
    pub description: String,
    pub info: LauncherInfo,
    pub priority: i32,
    pub command: String,
    pub shell: bool,
    pub workdir: PathBuf,
    pub image: Option<ImageData>,
    pub status: LauncherStatus,
}

impl LauncherRecord {
    /// Full wire representation, every field set.
    #[must_use]
    pub fn to_launcher(&self) -> Launcher {
        Launcher {
            index: self.index,
            name: Some(self.name.clone()),
            description: Some(self.description.clone()),
            info: Some(self.info.clone()),
            priority: Some(self.priority),
            importance: Some(self.status.importance),
            command: Some(self.command.clone()),
            shell: Some(self.shell),
            workdir: Some(self.workdir.display().to_string()),
            image: self.image.clone(),
            running: Some(self.status.running),
            terminating: Some(self.status.terminating),
            returncode: Some(self.status.returncode),
            output: Some(self.status.output.clone()),
        }
    }
}
