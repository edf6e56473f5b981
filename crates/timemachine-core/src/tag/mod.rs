//! Version tag scheme.
//!
//! A tag names one logical snapshot across both backends:
//!
//! ```text
//! {category}/{YYYYMMDD-HHMMSS}-{disambiguator}
//! stable/20240301-120000-k3x9ab
//! ```
//!
//! The timestamp is UTC at second precision, so tags of one category sort
//! lexically in creation order. The disambiguator is a short random token
//! separating tags minted within the same second; the orchestrator rejects
//! any candidate that already exists and mints another.
//!
//! Tags of different categories are not ordered against each other:
//! [`compare`] returns `None` for them and `PartialOrd` follows suit.

pub mod clock;

pub use clock::{Clock, FixedClock, SystemClock};

use crate::errors::{Result, TimeMachineError};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// strftime layout of the timestamp segment
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Length of generated disambiguators
pub const DISAMBIGUATOR_LEN: usize = 6;

const TIMESTAMP_LEN: usize = 15;
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Immutable identifier of one logical snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionTag {
    category: String,
    timestamp: DateTime<Utc>,
    disambiguator: String,
}

impl VersionTag {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn disambiguator(&self) -> &str {
        &self.disambiguator
    }

    /// The part after `{category}/`, shared by every tag minted for the same
    /// instant and token regardless of category
    pub fn snapshot_id(&self) -> String {
        format!(
            "{}-{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.disambiguator
        )
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.snapshot_id())
    }
}

impl FromStr for VersionTag {
    type Err = TimeMachineError;

    fn from_str(s: &str) -> Result<Self> {
        parse_tag(s)
    }
}

impl TryFrom<String> for VersionTag {
    type Error = TimeMachineError;

    fn try_from(value: String) -> Result<Self> {
        parse_tag(&value)
    }
}

impl From<VersionTag> for String {
    fn from(tag: VersionTag) -> Self {
        tag.to_string()
    }
}

impl PartialOrd for VersionTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        compare(self, other)
    }
}

/// Mints tags for a configured set of risk categories
#[derive(Debug, Clone)]
pub struct TagScheme {
    categories: Vec<String>,
}

impl TagScheme {
    pub fn new(categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Construct a tag with a fresh random disambiguator.
    ///
    /// # Errors
    ///
    /// `InvalidCategory` if `category` is not configured.
    pub fn make_tag(&self, category: &str, clock: &dyn Clock) -> Result<VersionTag> {
        self.make_tag_with_token(category, clock, &random_token())
    }

    /// Construct a tag with an explicit disambiguator.
    ///
    /// # Errors
    ///
    /// `InvalidCategory` if `category` is not configured, `MalformedTag` if the
    /// token is not a valid disambiguator.
    pub fn make_tag_with_token(
        &self,
        category: &str,
        clock: &dyn Clock,
        token: &str,
    ) -> Result<VersionTag> {
        if !self.categories.iter().any(|c| c == category) {
            return Err(TimeMachineError::InvalidCategory {
                category: category.to_string(),
                known: self.categories.clone(),
            });
        }
        validate_token(token, token)?;

        let now = clock.now();
        let timestamp = now.with_nanosecond(0).unwrap_or(now);

        Ok(VersionTag {
            category: category.to_string(),
            timestamp,
            disambiguator: token.to_string(),
        })
    }
}

/// Parse a tag string.
///
/// Parsing checks the shape only; whether the category is configured is a
/// question for the caller.
///
/// # Errors
///
/// `MalformedTag` describing the first violated rule.
pub fn parse_tag(input: &str) -> Result<VersionTag> {
    let malformed = |reason: &str| TimeMachineError::MalformedTag {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let (category, rest) = input
        .split_once('/')
        .ok_or_else(|| malformed("missing '/' between category and timestamp"))?;

    if !is_valid_category(category) {
        return Err(malformed(
            "category must be lowercase alphanumeric words joined by '-'",
        ));
    }

    if rest.len() < TIMESTAMP_LEN + 2 {
        return Err(malformed("missing timestamp or disambiguator"));
    }
    let (stamp, tail) = match (rest.get(..TIMESTAMP_LEN), rest.get(TIMESTAMP_LEN..)) {
        (Some(stamp), Some(tail)) => (stamp, tail),
        _ => return Err(malformed("timestamp must be ASCII")),
    };
    let token = tail
        .strip_prefix('-')
        .ok_or_else(|| malformed("expected '-' before disambiguator"))?;

    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .map_err(|e| malformed(&format!("bad timestamp '{}': {}", stamp, e)))?;
    validate_token(input, token)?;

    Ok(VersionTag {
        category: category.to_string(),
        timestamp: naive.and_utc(),
        disambiguator: token.to_string(),
    })
}

/// Order two tags.
///
/// Same category: by timestamp, then disambiguator. Different categories:
/// `None`, the ordering is undefined and callers must not rely on one.
pub fn compare(a: &VersionTag, b: &VersionTag) -> Option<Ordering> {
    if a.category != b.category {
        return None;
    }
    Some(
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.disambiguator.cmp(&b.disambiguator)),
    )
}

fn random_token() -> String {
    let mut rng = rand::thread_rng();
    (0..DISAMBIGUATOR_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

fn validate_token(input: &str, token: &str) -> Result<()> {
    let ok = (4..=16).contains(&token.len())
        && token
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(TimeMachineError::MalformedTag {
            input: input.to_string(),
            reason: format!(
                "disambiguator '{}' must be 4-16 lowercase alphanumerics",
                token
            ),
        })
    }
}

/// Category names are lowercase alphanumeric words joined by single dashes.
pub fn is_valid_category(category: &str) -> bool {
    !category.is_empty()
        && category
            .split('-')
            .all(|word| !word.is_empty() && word.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()))
}
