// transitive-core/src/version.rs
// Maven version ordering and version requirements (soft versions, ranges and
// the LATEST/RELEASE keywords).

use std::cmp::Ordering;
use std::fmt;

use transitive_common::error::{ResolveError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(u64),
    Qualifier(String),
}

/// A version string with Maven ordering: numeric segments compare
/// numerically, `1.0` equals `1`, and qualifiers order as
/// `alpha < beta < milestone < rc < snapshot < (release) < sp < other`.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    items: Vec<Item>,
}

impl Version {
    pub fn parse(raw: &str) -> Self {
        let mut items = Vec::new();
        let mut token = String::new();
        let mut numeric = false;

        for c in raw.trim().to_ascii_lowercase().chars() {
            if matches!(c, '.' | '-' | '_') {
                push_item(&mut items, &mut token, numeric);
                continue;
            }
            let digit = c.is_ascii_digit();
            if !token.is_empty() && digit != numeric {
                push_item(&mut items, &mut token, numeric);
            }
            numeric = digit;
            token.push(c);
        }
        push_item(&mut items, &mut token, numeric);

        // Zeros in front of a qualifier are padding: `1.0-alpha` is `1-alpha`.
        let mut trimmed: Vec<Item> = Vec::with_capacity(items.len());
        for item in items {
            if matches!(item, Item::Qualifier(_)) {
                while matches!(trimmed.last(), Some(Item::Number(0))) {
                    trimmed.pop();
                }
            }
            trimmed.push(item);
        }
        let mut items = trimmed;

        while matches!(items.last(), Some(Item::Number(0))) || is_release(items.last()) {
            items.pop();
        }
        Self {
            raw: raw.to_string(),
            items,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_snapshot(&self) -> bool {
        self.raw.ends_with("-SNAPSHOT")
            || self
                .items
                .iter()
                .any(|i| matches!(i, Item::Qualifier(q) if q == "snapshot"))
    }
}

fn push_item(items: &mut Vec<Item>, token: &mut String, numeric: bool) {
    if token.is_empty() {
        return;
    }
    let item = if numeric {
        Item::Number(token.parse().unwrap_or(u64::MAX))
    } else {
        Item::Qualifier(
            match token.as_str() {
                "a" => "alpha",
                "b" => "beta",
                "m" => "milestone",
                "cr" => "rc",
                "ga" | "final" | "release" => "",
                other => other,
            }
            .to_string(),
        )
    };
    items.push(item);
    token.clear();
}

fn is_release(item: Option<&Item>) -> bool {
    matches!(item, Some(Item::Qualifier(q)) if q.is_empty())
}

fn qualifier_rank(qualifier: &str) -> u8 {
    match qualifier {
        "alpha" => 0,
        "beta" => 1,
        "milestone" => 2,
        "rc" => 3,
        "snapshot" => 4,
        "" => 5,
        "sp" => 6,
        _ => 7,
    }
}

fn compare_items(left: Option<&Item>, right: Option<&Item>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (Some(Item::Number(l)), Some(Item::Number(r))) => l.cmp(r),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Qualifier(l)), Some(Item::Qualifier(r))) => qualifier_rank(l)
            .cmp(&qualifier_rank(r))
            .then_with(|| l.cmp(r)),
        (Some(Item::Number(n)), None) => n.cmp(&0),
        (None, Some(Item::Number(n))) => 0.cmp(n),
        (Some(Item::Qualifier(q)), None) => qualifier_rank(q).cmp(&qualifier_rank("")),
        (None, Some(Item::Qualifier(q))) => qualifier_rank("").cmp(&qualifier_rank(q)),
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.items.len().max(other.items.len());
        (0..len)
            .map(|i| compare_items(self.items.get(i), other.items.get(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    version: Version,
    inclusive: bool,
}

/// One `[lower,upper)` style interval; a missing side is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Interval {
    fn contains(&self, version: &Version) -> bool {
        let above = self.lower.as_ref().map_or(true, |b| match version.cmp(&b.version) {
            Ordering::Greater => true,
            Ordering::Equal => b.inclusive,
            Ordering::Less => false,
        });
        let below = self.upper.as_ref().map_or(true, |b| match version.cmp(&b.version) {
            Ordering::Less => true,
            Ordering::Equal => b.inclusive,
            Ordering::Greater => false,
        });
        above && below
    }
}

/// What a `<version>` element asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequirement {
    /// A plain version; used as-is without consulting metadata.
    Soft(String),
    /// A union of intervals, e.g. `[1.0,2.0),[3.0,)`.
    Range(Vec<Interval>),
    /// Highest published version, snapshots included.
    Latest,
    /// Highest published non-snapshot version.
    Release,
}

impl VersionRequirement {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw {
            "LATEST" => return Ok(Self::Latest),
            "RELEASE" => return Ok(Self::Release),
            _ => {}
        }
        if !raw.starts_with(['[', '(']) {
            return Ok(Self::Soft(raw.to_string()));
        }

        let invalid = |reason: &str| {
            ResolveError::Validation(format!("Invalid version range '{raw}': {reason}"))
        };
        let mut intervals = Vec::new();
        let mut rest = raw;
        while !rest.is_empty() {
            let open = rest.chars().next().ok_or_else(|| invalid("empty interval"))?;
            if !matches!(open, '[' | '(') {
                return Err(invalid("expected '[' or '('"));
            }
            let close_at = rest
                .find([']', ')'])
                .ok_or_else(|| invalid("unterminated interval"))?;
            let close = rest[close_at..]
                .chars()
                .next()
                .ok_or_else(|| invalid("unterminated interval"))?;
            let body = &rest[1..close_at];
            intervals.push(parse_interval(open, body, close).map_err(|r| invalid(&r))?);

            rest = rest[close_at + 1..].trim_start();
            if let Some(next) = rest.strip_prefix(',') {
                rest = next.trim_start();
            } else if !rest.is_empty() {
                return Err(invalid("expected ',' between intervals"));
            }
        }
        Ok(Self::Range(intervals))
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Soft(_))
    }

    /// Highest version in `available` satisfying the requirement.
    pub fn select<'a>(&self, available: &'a [String]) -> Option<&'a str> {
        let candidates = available.iter().map(|v| (Version::parse(v), v.as_str()));
        match self {
            Self::Soft(version) => available
                .iter()
                .find(|v| *v == version)
                .map(String::as_str),
            Self::Latest => candidates.max_by(|a, b| a.0.cmp(&b.0)).map(|(_, v)| v),
            Self::Release => candidates
                .filter(|(parsed, _)| !parsed.is_snapshot())
                .max_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, v)| v),
            Self::Range(intervals) => candidates
                .filter(|(parsed, _)| intervals.iter().any(|i| i.contains(parsed)))
                .max_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, v)| v),
        }
    }
}

fn parse_interval(open: char, body: &str, close: char) -> std::result::Result<Interval, String> {
    let lower_inclusive = open == '[';
    let upper_inclusive = close == ']';

    let Some((lower, upper)) = body.split_once(',') else {
        // `[1.0]` pins an exact version.
        let version = body.trim();
        if version.is_empty() || !lower_inclusive || !upper_inclusive {
            return Err(format!("'{body}' is not a valid exact version"));
        }
        let bound = Bound {
            version: Version::parse(version),
            inclusive: true,
        };
        return Ok(Interval {
            lower: Some(bound.clone()),
            upper: Some(bound),
        });
    };

    let bound = |value: &str, inclusive: bool| {
        let value = value.trim();
        (!value.is_empty()).then(|| Bound {
            version: Version::parse(value),
            inclusive,
        })
    };
    let interval = Interval {
        lower: bound(lower, lower_inclusive),
        upper: bound(upper, upper_inclusive),
    };
    if let (Some(l), Some(u)) = (&interval.lower, &interval.upper) {
        if l.version > u.version {
            return Err(format!("lower bound {} exceeds upper bound {}", l.version, u.version));
        }
    }
    Ok(interval)
}
