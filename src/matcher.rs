use crate::aggregate::AggregateRegistry;
use crate::rule::pattern::Pattern;
use std::net::IpAddr;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("line does not match any regexp")]
    NoMatch,

    #[error("failed to parse matched IP \"{0}\"")]
    BadIp(String),

    #[error("aggregate id capture was empty")]
    BadId,
}

/// Sentinel outcome of an aggregate registration (Phase 2): the line
/// advanced the correlator's state but produced no IP to act on yet.
#[derive(Debug, PartialEq, Eq)]
pub struct IncompleteAggregate;

/// A successfully extracted offending IP, plus enough context to log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub time: SystemTime,
    pub line: String,
    pub ip: String,
    pub ipv6: bool,
    pub regexp: String,
}

impl Match {
    fn new(line: &str, ip: String, ipv6: bool, regexp: &str) -> Self {
        Match {
            time: SystemTime::now(),
            line: line.to_string(),
            ip,
            ipv6,
            regexp: regexp.to_string(),
        }
    }

    pub fn simple_string(&self) -> String {
        let family = if self.ipv6 { "IPv6" } else { "IPv4" };
        format!("IP = \"{}\", {}", self.ip, family)
    }

    pub fn extended_string(&self) -> String {
        format!(
            "{}, line = \"{}\", regexp = \"{}\"",
            self.simple_string(),
            self.line,
            self.regexp
        )
    }
}

/// Parses a captured `ip` group, stripping IPv6 brackets if present, and
/// reports whether it's an IPv4 or IPv6 address.
fn parse_ip(raw: &str) -> Option<(String, bool)> {
    let trimmed = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')).unwrap_or(raw);
    let parsed: IpAddr = trimmed.parse().ok()?;
    Some((raw.to_string(), parsed.is_ipv6()))
}

type ExtractedGroups<'a> = (Option<String>, Option<String>, &'a Pattern);

fn extract<'a>(patterns: &'a [Pattern], line: &str) -> Option<ExtractedGroups<'a>> {
    for pattern in patterns {
        if let Some(caps) = pattern.compiled.captures(line) {
            let ip = caps.name("ip").map(|m| m.as_str().to_string());
            let id = caps.name("id").map(|m| m.as_str().to_string());
            return Some((ip, id, pattern));
        }
    }
    None
}

/// Matches a line in simple mode: the first pattern to match wins and its
/// `ip` capture is parsed directly into a `Match`.
pub fn match_simple(patterns: &[Pattern], line: &str) -> Result<Match, MatchError> {
    let (ip, _id, pattern) = extract(patterns, line).ok_or(MatchError::NoMatch)?;
    let raw_ip = ip.ok_or_else(|| MatchError::NoMatch)?;
    let (ip, ipv6) = parse_ip(&raw_ip).ok_or_else(|| MatchError::BadIp(raw_ip.clone()))?;
    Ok(Match::new(line, ip, ipv6, &pattern.source))
}

/// Matches a line against an aggregate-correlated rule.
///
/// Phase 1 (completion) is tried first: if any aggregate pattern matches and
/// its `id` is pending in `registry`, the pending IP is returned as a
/// `Match` and the registration is consumed. Phase 2 (registration) is tried
/// next: if a rule pattern matches, its `ip`/`id` pair is registered for
/// later completion and `IncompleteAggregate` is returned. If neither phase
/// fires, `NoMatch`.
pub async fn match_aggregate(
    rule_patterns: &[Pattern],
    aggregate_patterns: &[Pattern],
    registry: &AggregateRegistry,
    line: &str,
) -> Result<Result<Match, IncompleteAggregate>, MatchError> {
    if let Some((_, id, pattern)) = extract(aggregate_patterns, line) {
        let id = id.ok_or(MatchError::BadId)?;
        if !id.is_empty() {
            if let Some(ip) = registry.complete(&id).await {
                let (ip, ipv6) = parse_ip(&ip).ok_or_else(|| MatchError::BadIp(ip.clone()))?;
                return Ok(Ok(Match::new(line, ip, ipv6, &pattern.source)));
            }
        }
    }

    if let Some((ip, id, _pattern)) = extract(rule_patterns, line) {
        let raw_ip = ip.ok_or(MatchError::NoMatch)?;
        let (_, _ipv6) = parse_ip(&raw_ip).ok_or_else(|| MatchError::BadIp(raw_ip.clone()))?;
        let id = id.ok_or(MatchError::BadId)?;
        if id.is_empty() {
            return Err(MatchError::BadId);
        }
        registry.register(id, raw_ip).await;
        return Ok(Err(IncompleteAggregate));
    }

    Err(MatchError::NoMatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::pattern::Pattern;
    use std::time::Duration;

    #[test]
    fn simple_mode_extracts_ipv4() {
        let patterns = vec![Pattern::compile(r"Failed password .* from %ip%", false).unwrap()];
        let m = match_simple(&patterns, "Failed password for root from 10.0.0.5").unwrap();
        assert_eq!(m.ip, "10.0.0.5");
        assert!(!m.ipv6);
    }

    #[test]
    fn simple_mode_strips_ipv6_brackets() {
        let patterns = vec![Pattern::compile(r"from %ip%", false).unwrap()];
        let m = match_simple(&patterns, "from [2001:db8::1]").unwrap();
        assert_eq!(m.ip, "[2001:db8::1]");
        assert!(m.ipv6);
    }

    #[test]
    fn simple_mode_reports_no_match() {
        let patterns = vec![Pattern::compile(r"from %ip%", false).unwrap()];
        let err = match_simple(&patterns, "nothing interesting here").unwrap_err();
        assert_eq!(err, MatchError::NoMatch);
    }

    #[test]
    fn simple_mode_reports_bad_ip() {
        let pattern = Pattern::compile(r"from %ip%", false).unwrap();
        let err = match_simple(std::slice::from_ref(&pattern), "from 999.999.999.999").unwrap_err();
        assert!(matches!(err, MatchError::BadIp(_)));
    }

    #[tokio::test]
    async fn aggregate_mode_registers_then_completes() {
        let rule_patterns = vec![Pattern::compile(r"opened for %id% from %ip%", true).unwrap()];
        let aggregate_patterns = vec![Pattern::compile_id_only(r"closed for %id%").unwrap()];
        let registry = AggregateRegistry::new(Duration::from_secs(30));

        let first = match_aggregate(&rule_patterns, &aggregate_patterns, &registry, "opened for sess-1 from 10.0.0.5")
            .await
            .unwrap();
        assert_eq!(first, Err(IncompleteAggregate));

        let second = match_aggregate(&rule_patterns, &aggregate_patterns, &registry, "closed for sess-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.ip, "10.0.0.5");
    }

    #[tokio::test]
    async fn aggregate_mode_completion_without_registration_is_no_match() {
        let rule_patterns = vec![Pattern::compile(r"opened for %id% from %ip%", true).unwrap()];
        let aggregate_patterns = vec![Pattern::compile_id_only(r"closed for %id%").unwrap()];
        let registry = AggregateRegistry::new(Duration::from_secs(30));

        let err = match_aggregate(&rule_patterns, &aggregate_patterns, &registry, "closed for never-opened")
            .await
            .unwrap_err();
        assert_eq!(err, MatchError::NoMatch);
    }
}
