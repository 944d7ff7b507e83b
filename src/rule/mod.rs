pub mod action;
pub mod duration;
pub mod pattern;
pub mod source;

use self::action::{Action, ActionError};
use self::duration::{parse_duration, DurationParseError};
use self::pattern::{Pattern, PatternError};
use self::source::{Source, SourceError};
use crate::aggregate::AggregateRegistry;
use crate::config::RawRule;
use crate::occurrences::Occurrences;
use std::time::Duration as StdDuration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    Pattern(#[from] PatternError),

    #[error("{0}")]
    Action(#[from] ActionError),

    #[error("missing interval parameter")]
    AggregateMissingInterval,

    #[error("failed to parse interval parameter: {0}")]
    AggregateBadInterval(DurationParseError),

    #[error("missing regexp")]
    AggregateMissingRegexp,

    #[error("missing count parameter")]
    OccurrencesMissingCount,

    #[error("failed to parse count parameter: {0}")]
    OccurrencesBadCount(std::num::ParseIntError),

    #[error("invalid count parameter: must be > 1")]
    OccurrencesCountTooSmall,

    #[error("missing interval parameter")]
    OccurrencesMissingInterval,

    #[error("failed to parse interval parameter: {0}")]
    OccurrencesBadInterval(DurationParseError),
}

/// An aggregate-correlated rule's id-matching half: a TTL registry plus the
/// patterns that feed completion (Phase 1) lines into it.
#[derive(Debug)]
pub struct AggregateSpec {
    pub registry: AggregateRegistry,
    pub patterns: Vec<Pattern>,
}

#[derive(Debug)]
pub struct OccurrencesSpec {
    pub counter: Occurrences,
}

/// A fully initialized rule: compiled patterns, a resolved source and
/// action, and (optionally) the aggregate/occurrences sub-specs that gate
/// or enrich its matching behaviour.
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub source: Source,
    pub patterns: Vec<Pattern>,
    pub action: Action,
    pub aggregate: Option<AggregateSpec>,
    pub occurrences: Option<OccurrencesSpec>,
}

impl Rule {
    /// Builds and validates a `Rule` from its raw configuration record,
    /// compiling every pattern and sub-spec up front so that any
    /// configuration mistake surfaces before the daemon starts running.
    pub fn initialize(name: &str, raw: &RawRule) -> Result<Self, RuleError> {
        let source = Source::from_params(&raw.source)?;

        let has_aggregate = raw.aggregate.is_some();
        let mut patterns = Vec::with_capacity(raw.regexp.len());
        for template in &raw.regexp {
            patterns.push(Pattern::compile(template, has_aggregate)?);
        }

        let action = Action::from_params(&raw.action)?;

        let aggregate = match &raw.aggregate {
            None => None,
            Some(params) => Some(Self::initialize_aggregate(params)?),
        };

        let occurrences = match &raw.occurrences {
            None => None,
            Some(params) => Some(Self::initialize_occurrences(params)?),
        };

        Ok(Rule {
            name: name.to_string(),
            source,
            patterns,
            action,
            aggregate,
            occurrences,
        })
    }

    fn initialize_aggregate(params: &[String]) -> Result<AggregateSpec, RuleError> {
        let interval_literal = params.first().ok_or(RuleError::AggregateMissingInterval)?;
        let interval = parse_duration(interval_literal).map_err(RuleError::AggregateBadInterval)?;

        let templates = &params[1..];
        if templates.is_empty() {
            return Err(RuleError::AggregateMissingRegexp);
        }

        let mut patterns = Vec::with_capacity(templates.len());
        for template in templates {
            patterns.push(Pattern::compile_id_only(template)?);
        }

        Ok(AggregateSpec {
            registry: AggregateRegistry::new(interval),
            patterns,
        })
    }

    fn initialize_occurrences(params: &[String]) -> Result<OccurrencesSpec, RuleError> {
        let count_literal = params.first().ok_or(RuleError::OccurrencesMissingCount)?;
        let count: usize = count_literal.parse().map_err(RuleError::OccurrencesBadCount)?;
        if count < 2 {
            return Err(RuleError::OccurrencesCountTooSmall);
        }

        let interval_literal = params.get(1).ok_or(RuleError::OccurrencesMissingInterval)?;
        let interval: StdDuration = parse_duration(interval_literal).map_err(RuleError::OccurrencesBadInterval)?;

        Ok(OccurrencesSpec {
            counter: Occurrences::new(interval, count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(source: &[&str], regexp: &[&str], action: &[&str]) -> RawRule {
        RawRule {
            source: source.iter().map(|s| s.to_string()).collect(),
            regexp: regexp.iter().map(|s| s.to_string()).collect(),
            action: action.iter().map(|s| s.to_string()).collect(),
            aggregate: None,
            occurrences: None,
        }
    }

    #[test]
    fn initializes_a_minimal_rule() {
        let r = raw(&["test", "echo"], &["from %ip%"], &["ban", "1h"]);
        let rule = Rule::initialize("ssh", &r).unwrap();
        assert_eq!(rule.name, "ssh");
        assert_eq!(rule.patterns.len(), 1);
        assert!(rule.aggregate.is_none());
        assert!(rule.occurrences.is_none());
    }

    #[test]
    fn initializes_occurrences_sub_spec() {
        let mut r = raw(&["test", "echo"], &["from %ip%"], &["ban", "1h"]);
        r.occurrences = Some(vec!["3".to_string(), "1m".to_string()]);
        let rule = Rule::initialize("ssh", &r).unwrap();
        assert!(rule.occurrences.is_some());
    }

    #[test]
    fn rejects_occurrences_count_below_two() {
        let mut r = raw(&["test", "echo"], &["from %ip%"], &["ban", "1h"]);
        r.occurrences = Some(vec!["1".to_string(), "1m".to_string()]);
        let err = Rule::initialize("ssh", &r).unwrap_err();
        assert!(matches!(err, RuleError::OccurrencesCountTooSmall));
    }

    #[test]
    fn initializes_aggregate_sub_spec_and_requires_id_in_rule_patterns() {
        let mut r = raw(&["test", "echo"], &["opened for %id% from %ip%"], &["ban", "1h"]);
        r.aggregate = Some(vec!["30s".to_string(), "closed for %id%".to_string()]);
        let rule = Rule::initialize("ssh", &r).unwrap();
        assert!(rule.aggregate.is_some());
        assert_eq!(rule.aggregate.unwrap().patterns.len(), 1);
    }

    #[test]
    fn aggregate_requires_id_placeholder_in_rule_regexp() {
        let mut r = raw(&["test", "echo"], &["from %ip%"], &["ban", "1h"]);
        r.aggregate = Some(vec!["30s".to_string(), "closed for %id%".to_string()]);
        let err = Rule::initialize("ssh", &r).unwrap_err();
        assert!(matches!(err, RuleError::Pattern(PatternError::MissingIdPlaceholder)));
    }

    #[test]
    fn propagates_unknown_source_error() {
        let r = raw(&["bogus"], &["from %ip%"], &["ban", "1h"]);
        let err = Rule::initialize("ssh", &r).unwrap_err();
        assert!(matches!(err, RuleError::Source(SourceError::Unknown(_))));
    }
}
