//! Binding to the external `zip`-compatible archiver.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

#[cfg(feature = "config")]
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tokio::process::Command;

/// Default archiver executable, resolved through `PATH`.
pub const DEFAULT_ARCHIVER: &str = "zip";

/// Layout of the members inside a produced archive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[cfg_attr(feature = "config", derive(ValueEnum))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArchiveMode {
    /// Files are stored without their directory prefix (`a.jpg`).
    #[default]
    Flatten,
    /// Files are stored relative to the archive root (`7kna/a.jpg`).
    Preserve,
}

/// Describes how to launch the archiver for one directory.
///
/// The archiver must write a ZIP byte stream to its standard output. Leading
/// arguments allow running it through a wrapper such as `nice -n 10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCommand {
    program: PathBuf,
    leading_args: Vec<OsString>,
    mode: ArchiveMode,
}

impl ArchiveCommand {
    /// Creates a binding for `program` in [`ArchiveMode::Flatten`] mode.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            mode: ArchiveMode::default(),
        }
    }

    /// Sets arguments placed before the archiver arguments.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.leading_args = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        self
    }

    /// Sets the archive member layout.
    pub fn with_mode(mut self, mode: ArchiveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the executable that will be spawned.
    #[inline]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Returns the archive member layout.
    #[inline]
    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    /// Builds the command archiving `root/archive_id` to standard output.
    ///
    /// Standard input is closed, both output streams are piped and the child
    /// is killed if its handle is dropped before being reaped.
    pub fn command(&self, root: &Path, archive_id: &str) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args);

        match self.mode {
            ArchiveMode::Flatten => {
                command.arg("-jr").arg("-").arg(root.join(archive_id));
            }
            ArchiveMode::Preserve => {
                command.current_dir(root).arg("-r").arg("-").arg(archive_id);
            }
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }
}

impl Default for ArchiveCommand {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &Command) -> Vec<String> {
        command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn flatten_mode_references_absolute_directory() {
        let command = ArchiveCommand::default().command(Path::new("photos"), "7kna");

        assert_eq!(command.as_std().get_program(), "zip");
        assert_eq!(args(&command), ["-jr", "-", "photos/7kna"]);
        assert_eq!(command.as_std().get_current_dir(), None);
    }

    #[test]
    fn preserve_mode_runs_inside_root() {
        let command = ArchiveCommand::default()
            .with_mode(ArchiveMode::Preserve)
            .command(Path::new("photos"), "7kna");

        assert_eq!(args(&command), ["-r", "-", "7kna"]);
        assert_eq!(
            command.as_std().get_current_dir(),
            Some(Path::new("photos"))
        );
    }

    #[test]
    fn leading_args_come_first() {
        let command = ArchiveCommand::new("nice")
            .with_leading_args(["-n", "10", "zip"])
            .command(Path::new("photos"), "7kna");

        assert_eq!(command.as_std().get_program(), "nice");
        assert_eq!(args(&command), ["-n", "10", "zip", "-jr", "-", "photos/7kna"]);
    }

    #[test]
    fn archive_mode_parses_from_lowercase() {
        assert_eq!("flatten".parse::<ArchiveMode>().ok(), Some(ArchiveMode::Flatten));
        assert_eq!("preserve".parse::<ArchiveMode>().ok(), Some(ArchiveMode::Preserve));
        assert_eq!(ArchiveMode::Preserve.to_string(), "preserve");
    }
}
