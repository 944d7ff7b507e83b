use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("empty source")]
    Empty,

    #[error("unknown source '{0}'")]
    Unknown(String),

    #[error("missing path parameter")]
    MissingPath,

    #[error("'{0}' is a directory")]
    PathIsDirectory(String),

    #[error("missing service parameter")]
    MissingService,

    #[error("missing command parameter")]
    MissingCommand,

    #[error("superfluous parameter")]
    SuperfluousParameter,
}

/// A line-producing external subprocess, reduced to the command and
/// arguments the adaptor should spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File { path: String },
    Systemd { service: String },
    Kernel,
    Process { command: String, args: Vec<String> },
    Test { command: String, args: Vec<String> },
}

impl Source {
    /// Builds a `Source` from a rule's raw `source = [...]` list, where
    /// `params[0]` selects the variant and the rest are its arguments.
    pub fn from_params(params: &[String]) -> Result<Self, SourceError> {
        if params.is_empty() {
            return Err(SourceError::Empty);
        }

        match params[0].as_str() {
            "file" => {
                let rest = &params[1..];
                if rest.is_empty() {
                    return Err(SourceError::MissingPath);
                }
                if rest.len() > 1 {
                    return Err(SourceError::SuperfluousParameter);
                }
                let path = rest[0].clone();
                if Path::new(&path).is_dir() {
                    return Err(SourceError::PathIsDirectory(path));
                }
                Ok(Source::File { path })
            }
            "systemd" => {
                let rest = &params[1..];
                if rest.is_empty() {
                    return Err(SourceError::MissingService);
                }
                if rest.len() > 1 {
                    return Err(SourceError::SuperfluousParameter);
                }
                Ok(Source::Systemd {
                    service: rest[0].clone(),
                })
            }
            "kernel" => {
                if params.len() > 1 {
                    return Err(SourceError::SuperfluousParameter);
                }
                Ok(Source::Kernel)
            }
            "process" => {
                let rest = &params[1..];
                if rest.is_empty() {
                    return Err(SourceError::MissingCommand);
                }
                Ok(Source::Process {
                    command: rest[0].clone(),
                    args: rest[1..].to_vec(),
                })
            }
            "test" => {
                let rest = &params[1..];
                if rest.is_empty() {
                    return Err(SourceError::MissingCommand);
                }
                Ok(Source::Test {
                    command: rest[0].clone(),
                    args: rest[1..].to_vec(),
                })
            }
            other => Err(SourceError::Unknown(other.to_string())),
        }
    }

    /// The command and arguments the adaptor should spawn to produce lines
    /// for this source.
    pub fn command(&self) -> (String, Vec<String>) {
        match self {
            Source::File { path } => (
                "tail".to_string(),
                vec!["-n".to_string(), "0".to_string(), "-F".to_string(), path.clone()],
            ),
            Source::Systemd { service } => (
                "journalctl".to_string(),
                vec![
                    "-n".to_string(),
                    "0".to_string(),
                    "-f".to_string(),
                    "-u".to_string(),
                    service.clone(),
                ],
            ),
            Source::Kernel => (
                "journalctl".to_string(),
                vec!["-kf".to_string(), "-n".to_string(), "0".to_string()],
            ),
            Source::Process { command, args } | Source::Test { command, args } => {
                (command.clone(), args.clone())
            }
        }
    }
}
