use super::duration::{parse_duration, DurationParseError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("empty action")]
    Empty,

    #[error("unknown action '{0}'")]
    Unknown(String),

    #[error("missing duration parameter")]
    MissingDuration,

    #[error("invalid duration parameter: {0}")]
    InvalidDuration(#[from] DurationParseError),

    #[error("superfluous parameter")]
    SuperfluousParameter,

    #[error("missing mode parameter")]
    MissingLogMode,

    #[error("invalid log mode '{0}', expected 'simple' or 'extended'")]
    InvalidLogMode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Simple,
    Extended,
}

/// What to do with a Match once a rule (and its occurrence gate, if any)
/// decides it is worth acting on.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Ban(Duration),
    Log(LogMode),
    Test,
}

impl Action {
    pub fn from_params(params: &[String]) -> Result<Self, ActionError> {
        if params.is_empty() {
            return Err(ActionError::Empty);
        }

        match params[0].as_str() {
            "ban" => {
                let rest = &params[1..];
                if rest.is_empty() {
                    return Err(ActionError::MissingDuration);
                }
                if rest.len() > 1 {
                    return Err(ActionError::SuperfluousParameter);
                }
                let duration = parse_duration(&rest[0])?;
                Ok(Action::Ban(duration))
            }
            "log" => {
                let rest = &params[1..];
                if rest.is_empty() {
                    return Err(ActionError::MissingLogMode);
                }
                if rest.len() > 1 {
                    return Err(ActionError::SuperfluousParameter);
                }
                let mode = match rest[0].as_str() {
                    "simple" => LogMode::Simple,
                    "extended" => LogMode::Extended,
                    other => return Err(ActionError::InvalidLogMode(other.to_string())),
                };
                Ok(Action::Log(mode))
            }
            "test" => {
                if params.len() > 1 {
                    return Err(ActionError::SuperfluousParameter);
                }
                Ok(Action::Test)
            }
            other => Err(ActionError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_empty_action() {
        assert!(matches!(Action::from_params(&[]), Err(ActionError::Empty)));
    }

    #[test]
    fn ban_requires_valid_duration() {
        assert!(matches!(
            Action::from_params(&params(&["ban"])),
            Err(ActionError::MissingDuration)
        ));
        assert!(matches!(
            Action::from_params(&params(&["ban", "nope"])),
            Err(ActionError::InvalidDuration(_))
        ));
        let action = Action::from_params(&params(&["ban", "1h"])).unwrap();
        assert_eq!(action, Action::Ban(Duration::from_secs(3600)));
    }

    #[test]
    fn log_requires_known_mode() {
        assert!(matches!(
            Action::from_params(&params(&["log"])),
            Err(ActionError::MissingLogMode)
        ));
        assert!(matches!(
            Action::from_params(&params(&["log", "verbose"])),
            Err(ActionError::InvalidLogMode(_))
        ));
        assert_eq!(
            Action::from_params(&params(&["log", "simple"])).unwrap(),
            Action::Log(LogMode::Simple)
        );
        assert_eq!(
            Action::from_params(&params(&["log", "extended"])).unwrap(),
            Action::Log(LogMode::Extended)
        );
    }

    #[test]
    fn test_action_rejects_parameters() {
        assert_eq!(Action::from_params(&params(&["test"])).unwrap(), Action::Test);
        assert!(matches!(
            Action::from_params(&params(&["test", "extra"])),
            Err(ActionError::SuperfluousParameter)
        ));
    }

    #[test]
    fn rejects_unknown_action() {
        let err = Action::from_params(&params(&["drop"])).unwrap_err();
        assert!(matches!(err, ActionError::Unknown(s) if s == "drop"));
    }
}
