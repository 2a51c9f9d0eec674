//! Version constraints and deterministic version selection
//!
//! A constraint is either an exact version (`1.2.0`, `v1.2.0`), a range
//! expression, or "latest". Ranges accept the comparator syntax chart
//! authors use in practice:
//!
//! - `>=1.0.0 <2.0.0` or `>=1.0.0, <2.0.0`
//! - `^1.2`, `~1.2.0`
//! - `1.2.x`, `1.*`, bare partial versions (`1.2` means `1.2.x`)
//! - `1.0 - 2.0` (inclusive hyphen range)
//! - `^1.0 || ^2.0` (alternation)
//!
//! Pre-release versions only satisfy a range when one of its comparators
//! names a pre-release of the same `major.minor.patch`.

use crate::error::{ChartError, ChartResult};
use semver::{Version, VersionReq};
use std::cmp::Ordering;
use std::fmt;

/// Characters that make up a comparison operator
const OPERATOR_CHARS: &[char] = &['<', '>', '=', '~', '^'];

/// A parsed version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    kind: ConstraintKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConstraintKind {
    /// Highest release version
    Latest,
    /// Exactly this version (build metadata ignored)
    Exact(Version),
    /// Any of the alternatives
    Range(Vec<VersionReq>),
}

impl VersionConstraint {
    /// Parse a constraint expression
    pub fn parse(input: &str) -> ChartResult<Self> {
        let trimmed = input.trim();
        let invalid = |reason: String| ChartError::InvalidConstraint {
            constraint: input.to_string(),
            reason,
        };

        let kind = if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("latest")
        {
            ConstraintKind::Latest
        } else if let Some(version) = parse_version(trimmed) {
            ConstraintKind::Exact(version)
        } else {
            let alternatives = trimmed
                .split("||")
                .map(|alt| normalize_requirement(alt).map_err(&invalid))
                .map(|normalized| {
                    normalized.and_then(|req| {
                        VersionReq::parse(&req).map_err(|e| invalid(e.to_string()))
                    })
                })
                .collect::<ChartResult<Vec<_>>>()?;
            ConstraintKind::Range(alternatives)
        };

        Ok(Self {
            raw: input.to_string(),
            kind,
        })
    }

    /// The expression as supplied by the caller
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check whether a version satisfies this constraint
    pub fn matches(&self, version: &Version) -> bool {
        match &self.kind {
            ConstraintKind::Latest => version.pre.is_empty(),
            ConstraintKind::Exact(wanted) => cmp_precedence(wanted, version) == Ordering::Equal,
            ConstraintKind::Range(alternatives) => {
                alternatives.iter().any(|req| req.matches(version))
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw.trim().is_empty() {
            write!(f, "latest")
        } else {
            write!(f, "{}", self.raw)
        }
    }
}

/// Parse a version leniently, accepting a leading `v`
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let stripped = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    Version::parse(stripped).ok()
}

/// Compare two versions by semantic-version precedence
///
/// Build metadata does not participate, so `1.0.0+a` and `1.0.0+b` compare
/// equal. Pre-releases sort below their release.
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Pick the highest item whose version satisfies the constraint
///
/// Items are scanned in order and only a strictly greater version replaces
/// the current best, so the first of several equal-precedence items wins.
/// Build metadata is not part of precedence, so an exact constraint
/// `1.0.0+b` resolves to `1.0.0+a` when that build is listed first.
pub fn select_highest<'a, T>(
    items: &'a [T],
    version_of: impl Fn(&T) -> &Version,
    constraint: &VersionConstraint,
) -> Option<&'a T> {
    let mut best: Option<&T> = None;

    for item in items {
        let candidate = version_of(item);
        if !constraint.matches(candidate) {
            continue;
        }
        match best {
            Some(current) if cmp_precedence(candidate, version_of(current)) != Ordering::Greater => {}
            _ => best = Some(item),
        }
    }

    best
}

/// Rewrite one alternative into the comma-separated form `semver` accepts
fn normalize_requirement(alternative: &str) -> Result<String, String> {
    let spaced = alternative.replace(',', " ");
    let raw_tokens: Vec<&str> = spaced.split_whitespace().collect();
    if raw_tokens.is_empty() {
        return Err("empty alternative".to_string());
    }

    // Glue detached operators to their operand: ">= 1.0" -> ">=1.0"
    let mut tokens: Vec<String> = Vec::with_capacity(raw_tokens.len());
    let mut pending_operator: Option<&str> = None;
    for token in raw_tokens {
        if token != "-" && token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            if pending_operator.is_some() {
                return Err(format!("dangling operator before '{}'", token));
            }
            pending_operator = Some(token);
            continue;
        }
        match pending_operator.take() {
            Some(op) => tokens.push(format!("{}{}", op, token)),
            None => tokens.push(token.to_string()),
        }
    }
    if let Some(op) = pending_operator {
        return Err(format!("operator '{}' has no version", op));
    }

    // Hyphen ranges: "1.0 - 2.0" -> ">=1.0, <=2.0"
    let mut comparators = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens.get(i + 1).map(String::as_str) == Some("-") {
            let upper = tokens
                .get(i + 2)
                .ok_or_else(|| "hyphen range is missing its upper bound".to_string())?;
            comparators.push(format!(">={}", strip_v(&tokens[i])));
            comparators.push(format!("<={}", strip_v(upper)));
            i += 3;
            continue;
        }
        if tokens[i] == "-" {
            return Err("hyphen range is missing its lower bound".to_string());
        }
        comparators.push(normalize_comparator(&tokens[i]));
        i += 1;
    }

    Ok(comparators.join(", "))
}

/// Give bare versions an explicit `=` and drop `v` prefixes
fn normalize_comparator(token: &str) -> String {
    let split = token
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(token.len());
    let (op, operand) = token.split_at(split);
    let operand = strip_wildcards(strip_v(operand));

    if operand.is_empty() {
        return "*".to_string();
    }
    if op.is_empty() {
        return format!("={}", operand);
    }
    format!("{}{}", op, operand)
}

/// Turn `1.2.x` / `1.*` into the partial versions `1.2` / `1`
fn strip_wildcards(mut operand: &str) -> &str {
    loop {
        let trimmed = ["*", "x", "X"]
            .iter()
            .find_map(|w| operand.strip_suffix(w))
            .filter(|rest| rest.is_empty() || rest.ends_with('.'));
        match trimmed {
            Some(rest) => operand = rest.strip_suffix('.').unwrap_or(rest),
            None => return operand,
        }
    }
}

fn strip_v(operand: &str) -> &str {
    match operand.strip_prefix('v').or_else(|| operand.strip_prefix('V')) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => operand,
    }
}
