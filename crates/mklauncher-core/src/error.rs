use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Launcher {0} is already running")]
    AlreadyRunning(u32),

    #[error("Launcher {0} is not running")]
    NotRunning(u32),
}

impl Error {
    /// Wrap an INI load failure, keeping I/O errors distinguishable.
    pub(crate) fn from_ini(path: &std::path::Path, err: ini::Error) -> Self {
        match err {
            ini::Error::Io(e) => Self::Io(e),
            ini::Error::Parse(e) => Self::Config(format!("{}: {e}", path.display())),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("IO error"));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("priority: invalid integer".to_string());
        assert_eq!(err.to_string(), "Config error: priority: invalid integer");
    }

    #[test]
    fn test_error_display_process() {
        let err = Error::Process("spawn failed".to_string());
        assert_eq!(err.to_string(), "Process error: spawn failed");
    }

    #[test]
    fn test_error_display_running_state() {
        assert_eq!(
            Error::AlreadyRunning(2).to_string(),
            "Launcher 2 is already running"
        );
        assert_eq!(Error::NotRunning(0).to_string(), "Launcher 0 is not running");
    }

    #[test]
    fn test_from_ini_parse_error_is_config() {
        let parse_err = ini::Ini::load_from_str("[unterminated").unwrap_err();
        let err = Error::from_ini(std::path::Path::new("/tmp/launcher.ini"), ini::Error::Parse(parse_err));
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("/tmp/launcher.ini")));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
