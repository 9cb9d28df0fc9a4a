// src/version/mod.rs

//! Version handling and constraint satisfaction for package dependencies
//!
//! Ecosystems disagree on version syntax, so parsing is lenient: a leading
//! `v` is dropped, missing minor/patch components default to zero, extra
//! numeric components (`1.2.3.4`) are kept for ordering, and suffixes such
//! as `rc1` or `-beta.2` become pre-release identifiers.
//!
//! Constraints accept the union of the common grammars:
//! - `*`, `latest`, empty → unconstrained
//! - `==1.2`, `=1.2`, `1.2` → exact pin
//! - `>=`, `>`, `<=`, `<`, `!=` comparators joined by `,` or whitespace
//! - `^1.2.3`, `~1.2.3` (npm), `~=1.4` (pip), `~> 2.1` (bundler)
//! - wildcards `1.2.*`, `1.x`
//! - hyphen ranges `1.2.3 - 2.0.0`

mod range;

pub use range::{Bound, Comparator, VersionRange};

use crate::error::{Error, Result};
use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A parsed package version
///
/// Keeps the original text for display so manifests reproduce what the
/// registry published.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    raw: String,
    core: Version,
    /// Numeric components after patch, trailing zeros trimmed
    extra: Vec<u64>,
}

impl PackageVersion {
    /// Create a plain `major.minor.patch` version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            raw: format!("{}.{}.{}", major, minor, patch),
            core: Version::new(major, minor, patch),
            extra: Vec::new(),
        }
    }

    /// Parse a version string
    ///
    /// Examples:
    /// - "1.2.3" → 1.2.3
    /// - "v2" → 2.0.0
    /// - "1.26" → 1.26.0
    /// - "2.0.0rc1" → 2.0.0-rc1
    /// - "1.0.post2" → 1.0.0.2
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim();
        let body = raw
            .strip_prefix(['v', 'V'])
            .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
            .unwrap_or(raw);

        if !body.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid_version(raw, "must start with a digit"));
        }

        // Build metadata and PEP 440 local labels never affect ordering
        let body = body.split('+').next().unwrap_or(body);

        if let Ok(mut v) = Version::parse(body) {
            v.build = BuildMetadata::EMPTY;
            return Ok(Self {
                raw: raw.to_string(),
                core: v,
                extra: Vec::new(),
            });
        }

        let numeric_end = body
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(body.len());
        let (numeric, suffix) = body.split_at(numeric_end);

        let mut release = Vec::new();
        for part in numeric.split('.').filter(|p| !p.is_empty()) {
            let n = part
                .parse::<u64>()
                .map_err(|e| invalid_version(raw, &e.to_string()))?;
            release.push(n);
        }
        if release.is_empty() {
            return Err(invalid_version(raw, "no numeric components"));
        }

        let mut extra: Vec<u64> = release.iter().skip(3).copied().collect();
        let mut pre = Prerelease::EMPTY;

        let suffix = suffix.trim_start_matches(['-', '.', '_']);
        if !suffix.is_empty() {
            if let Some(post) = post_release_number(suffix) {
                // Post releases sort after the release they follow
                extra.push(post);
            } else {
                let ident = sanitize_prerelease(suffix);
                if !ident.is_empty() {
                    pre = Prerelease::new(&ident)
                        .map_err(|e| invalid_version(raw, &e.to_string()))?;
                }
            }
        }

        while extra.last() == Some(&0) {
            extra.pop();
        }

        let mut core = Version::new(
            release[0],
            release.get(1).copied().unwrap_or(0),
            release.get(2).copied().unwrap_or(0),
        );
        core.pre = pre;

        Ok(Self {
            raw: raw.to_string(),
            core,
            extra,
        })
    }

    pub fn major(&self) -> u64 {
        self.core.major
    }

    pub fn minor(&self) -> u64 {
        self.core.minor
    }

    pub fn patch(&self) -> u64 {
        self.core.patch
    }

    /// Whether this is a pre-release (alpha, beta, rc, dev...)
    pub fn is_prerelease(&self) -> bool {
        !self.core.pre.is_empty()
    }

    /// Original text of the version
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// First version of the release line this version belongs to
    ///
    /// Used to step back to the previous line when a version fails:
    /// - 1.4.2 → 1.4.0 (so `< 1.4.0` selects the 1.3 line)
    /// - 2.0.3 → 2.0.0 (so `< 2.0.0` selects the 1.x line)
    /// - 0.0.5 → 0.0.5 (no coarser line exists)
    pub fn line_floor(&self) -> PackageVersion {
        if self.major() == 0 && self.minor() == 0 {
            PackageVersion::new(0, 0, self.patch())
        } else {
            PackageVersion::new(self.major(), self.minor(), 0)
        }
    }

    /// Compare two versions
    pub fn compare(&self, other: &PackageVersion) -> Ordering {
        (self.core.major, self.core.minor, self.core.patch)
            .cmp(&(other.core.major, other.core.minor, other.core.patch))
            .then_with(|| self.extra.cmp(&other.extra))
            .then_with(|| {
                // A release sorts after all of its pre-releases
                match (self.core.pre.is_empty(), other.core.pre.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.core.pre.cmp(&other.core.pre),
                }
            })
    }
}

fn invalid_version(input: &str, reason: &str) -> Error {
    Error::InvalidVersion {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// `post1`, `post`, `.post12` → release number
fn post_release_number(suffix: &str) -> Option<u64> {
    let rest = suffix.to_ascii_lowercase();
    let digits = rest.strip_prefix("post")?;
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse().ok()
}

/// Turn an arbitrary suffix into valid semver pre-release identifiers
fn sanitize_prerelease(suffix: &str) -> String {
    let cleaned: String = suffix
        .chars()
        .filter_map(|c| match c {
            '_' => Some('-'),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => Some(c),
            _ => None,
        })
        .collect();

    cleaned
        .split('.')
        .filter(|ident| !ident.is_empty())
        .map(|ident| {
            // semver rejects numeric identifiers with leading zeros
            if ident.chars().all(|c| c.is_ascii_digit()) {
                ident.parse::<u64>().map(|n| n.to_string()).unwrap_or_else(|_| ident.to_string())
            } else {
                ident.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.major.hash(state);
        self.core.minor.hash(state);
        self.core.patch.hash(state);
        self.extra.hash(state);
        self.core.pre.as_str().hash(state);
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PackageVersion::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Version constraint carried by a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version pin
    Exact(PackageVersion),
    /// Conjunction of comparators
    Range(VersionRange),
}

impl VersionConstraint {
    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">=1.20,<2.0" → Range
    /// - "==1.0" → Exact(1.0)
    /// - "^4.17" → Range(>=4.17, <5.0.0)
    /// - "*" → Any
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" || s.eq_ignore_ascii_case("latest") || s == "x" || s == "X" {
            return Ok(VersionConstraint::Any);
        }

        if s.contains("||") {
            return Err(invalid_constraint(s, "union ranges (||) are not supported"));
        }

        let mut range = VersionRange::any();
        let mut saw_comparator = false;
        for piece in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            for token in comparator_tokens(piece) {
                let parsed = parse_comparator(&token).map_err(|reason| invalid_constraint(s, &reason))?;
                range = range.intersect(&parsed);
                saw_comparator = true;
            }
        }

        if !saw_comparator {
            return Ok(VersionConstraint::Any);
        }

        Ok(Self::from_range(range))
    }

    /// Collapse a range to the simplest equivalent constraint
    pub fn from_range(range: VersionRange) -> Self {
        if range.is_unbounded() {
            VersionConstraint::Any
        } else if let Some(point) = range.single_point() {
            VersionConstraint::Exact(point.clone())
        } else {
            VersionConstraint::Range(range)
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => version == v,
            VersionConstraint::Range(r) => r.contains(version),
        }
    }

    /// The constraint as a range (exact pins become single-point ranges)
    pub fn to_range(&self) -> VersionRange {
        match self {
            VersionConstraint::Any => VersionRange::any(),
            VersionConstraint::Exact(v) => VersionRange::exactly(v.clone()),
            VersionConstraint::Range(r) => r.clone(),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, VersionConstraint::Any)
    }

    /// The pinned version, if this is an exact pin
    pub fn exact(&self) -> Option<&PackageVersion> {
        match self {
            VersionConstraint::Exact(v) => Some(v),
            _ => None,
        }
    }
}

fn invalid_constraint(input: &str, reason: &str) -> Error {
    Error::InvalidConstraint {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '!', '~', '^'];

/// Split a comma-free piece into comparator tokens
///
/// Whitespace separates comparators (`>=1.2 <2`), but an operator standing
/// alone is glued to the following version (`>= 1.2`). A standalone `-`
/// forms a hyphen range.
fn comparator_tokens(piece: &str) -> Vec<String> {
    let words: Vec<&str> = piece.split_whitespace().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let word = words[i];
        if word == "-" && !tokens.is_empty() && i + 1 < words.len() {
            // Hyphen range: previous token is the inclusive lower bound
            if let Some(lower) = tokens.pop() {
                tokens.push(format!(">={}", lower));
                tokens.push(format!("<={}", words[i + 1]));
            }
            i += 2;
            continue;
        }
        if word.chars().all(|c| OPERATOR_CHARS.contains(&c)) && i + 1 < words.len() {
            tokens.push(format!("{}{}", word, words[i + 1]));
            i += 2;
            continue;
        }
        tokens.push(word.to_string());
        i += 1;
    }
    tokens
}

/// Parse one comparator (`>=1.2`, `^1.0`, `1.2.*`, ...) into a range
fn parse_comparator(token: &str) -> std::result::Result<VersionRange, String> {
    let token = token.trim();
    let op_len = token
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .ok_or_else(|| "operator without version".to_string())?;
    let (op, rest) = token.split_at(op_len);
    let rest = rest.trim();

    if is_wildcard(rest) {
        return match op {
            "" | "=" | "==" => wildcard_range(rest),
            _ => Err(format!("wildcard not supported with operator '{}'", op)),
        };
    }

    let version = || PackageVersion::parse(rest).map_err(|e| e.to_string());

    match op {
        "" | "=" | "==" | "===" => Ok(VersionRange::exactly(version()?)),
        ">=" => Ok(VersionRange::at_least(version()?)),
        ">" => Ok(VersionRange::greater_than(version()?)),
        "<=" => Ok(VersionRange::at_most(version()?)),
        "<" => Ok(VersionRange::less_than(version()?)),
        "!=" => Ok(VersionRange::excluding(version()?)),
        "~=" | "~>" => compatible_release(rest, version()?),
        "~" => tilde_range(rest, version()?),
        "^" => caret_range(rest, version()?),
        other => Err(format!("unknown operator '{}'", other)),
    }
}

fn is_wildcard(s: &str) -> bool {
    s.split('.').any(|part| matches!(part, "*" | "x" | "X"))
}

/// Count the numeric release components as written (`1.4` → 2)
fn written_components(s: &str) -> usize {
    let s = s.trim_start_matches(['v', 'V']);
    s.split('.')
        .take_while(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        .count()
}

/// Next component value for an exclusive upper bound
fn bump(component: u64) -> std::result::Result<u64, String> {
    component
        .checked_add(1)
        .ok_or_else(|| format!("version component {} has no successor", component))
}

/// `1.2.*` → [1.2.0, 1.3.0); `1.x` → [1.0.0, 2.0.0)
fn wildcard_range(s: &str) -> std::result::Result<VersionRange, String> {
    let fixed: Vec<u64> = s
        .split('.')
        .take_while(|part| !matches!(*part, "*" | "x" | "X"))
        .map(|part| part.parse::<u64>().map_err(|e| e.to_string()))
        .collect::<std::result::Result<_, _>>()?;

    match fixed.as_slice() {
        [] => Ok(VersionRange::any()),
        [major] => Ok(VersionRange::between(
            PackageVersion::new(*major, 0, 0),
            PackageVersion::new(bump(*major)?, 0, 0),
        )),
        [major, minor, ..] => Ok(VersionRange::between(
            PackageVersion::new(*major, *minor, 0),
            PackageVersion::new(*major, bump(*minor)?, 0),
        )),
    }
}

/// pip `~=` and bundler `~>`: drop the last written component and bump
fn compatible_release(
    written: &str,
    version: PackageVersion,
) -> std::result::Result<VersionRange, String> {
    let upper = match written_components(written) {
        0 => return Err("compatible release needs a numeric version".to_string()),
        1 | 2 => PackageVersion::new(bump(version.major())?, 0, 0),
        _ => PackageVersion::new(version.major(), bump(version.minor())?, 0),
    };
    Ok(VersionRange::between(version, upper))
}

/// npm `~`: patch-level changes if minor is given, else minor-level
fn tilde_range(written: &str, version: PackageVersion) -> std::result::Result<VersionRange, String> {
    let upper = if written_components(written) <= 1 {
        PackageVersion::new(bump(version.major())?, 0, 0)
    } else {
        PackageVersion::new(version.major(), bump(version.minor())?, 0)
    };
    Ok(VersionRange::between(version, upper))
}

/// npm `^`: changes that do not modify the left-most non-zero component
fn caret_range(written: &str, version: PackageVersion) -> std::result::Result<VersionRange, String> {
    let components = written_components(written);
    let upper = if version.major() > 0 || components == 1 {
        PackageVersion::new(bump(version.major())?, 0, 0)
    } else if version.minor() > 0 || components == 2 {
        PackageVersion::new(0, bump(version.minor())?, 0)
    } else {
        PackageVersion::new(0, 0, bump(version.patch())?)
    };
    Ok(VersionRange::between(version, upper))
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "=={}", v),
            VersionConstraint::Range(r) => write!(f, "{}", r),
        }
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VersionConstraint::parse(&s).map_err(serde::de::Error::custom)
    }
}
