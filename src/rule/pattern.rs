use regex::Regex;
use thiserror::Error;

const IP_MAGIC: &str = "%ip%";
const ID_MAGIC: &str = "%id%";

const IP_SUBEXPR: &str = r"(?P<ip>(\d?\d?\d\.){3}\d?\d?\d|\[?([0-9A-Fa-f]{0,4}::?){1,6}[0-9A-Fa-f]{0,4}::?[0-9A-Fa-f]{0,4})\]?";
const ID_SUBEXPR: &str = r"(?P<id>(.*))";

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("regexp must not contain a subexpression named \"ip\" (\"(?P<ip>\")")]
    ReservedIpGroup,

    #[error("regexp must not contain a subexpression named \"id\" (\"(?P<id>\")")]
    ReservedIdGroup,

    #[error("\"{IP_MAGIC}\" must appear exactly once in regexp")]
    MissingIpPlaceholder,

    #[error("\"{ID_MAGIC}\" must appear exactly once in regexp if the aggregate option is used")]
    MissingIdPlaceholder,

    #[error("invalid regexp: {0}")]
    Compile(#[from] regex::Error),
}

/// Compiles a rule's raw regexp literal into a pattern that extracts the
/// offending IP address (and, for aggregate-correlated rules, an id) from a
/// matching log line.
///
/// `%ip%` must appear exactly once and expands to a named capture group
/// matching either an IPv4 dotted-quad or a bracketed/bare IPv6 literal.
/// `%id%` is only required when the pattern backs an aggregate phase; it
/// expands to a named capture spanning the rest of the match.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    pub compiled: Regex,
}

impl Pattern {
    pub fn compile(source: &str, require_id: bool) -> Result<Self, PatternError> {
        if source.contains("(?P<ip>") {
            return Err(PatternError::ReservedIpGroup);
        }
        if source.contains("(?P<id>") {
            return Err(PatternError::ReservedIdGroup);
        }

        if source.matches(IP_MAGIC).count() != 1 {
            return Err(PatternError::MissingIpPlaceholder);
        }

        if require_id && source.matches(ID_MAGIC).count() != 1 {
            return Err(PatternError::MissingIdPlaceholder);
        }

        let mut expanded = source.replacen(IP_MAGIC, IP_SUBEXPR, 1);
        if source.contains(ID_MAGIC) {
            expanded = expanded.replacen(ID_MAGIC, ID_SUBEXPR, 1);
        }

        let compiled = Regex::new(&expanded)?;

        Ok(Pattern {
            source: source.to_string(),
            compiled,
        })
    }

    /// Compiles a pattern used only for an aggregate's id-correlation phase,
    /// where `%id%` is mandatory and `%ip%` never appears.
    pub fn compile_id_only(source: &str) -> Result<Self, PatternError> {
        if source.contains("(?P<id>") {
            return Err(PatternError::ReservedIdGroup);
        }

        if source.matches(ID_MAGIC).count() != 1 {
            return Err(PatternError::MissingIdPlaceholder);
        }

        let expanded = source.replacen(ID_MAGIC, ID_SUBEXPR, 1);
        let compiled = Regex::new(&expanded)?;

        Ok(Pattern {
            source: source.to_string(),
            compiled,
        })
    }
}
