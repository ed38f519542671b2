//! Tag-based test selection.
//!
//! Tests declare the tags they belong to; a [`TagFilter`] built from
//! configuration decides which of them run. A raw tag list is a comma
//! separated string such as `"small,-functional"`, where a leading `-`
//! excludes a tag.

use crate::{TestContext, TestbedConfig};
use tracing::debug;

pub const TAG_BASE: &str = "base";
pub const TAG_SMALL: &str = "small";
pub const TAG_MEDIUM: &str = "medium";
pub const TAG_LARGE: &str = "large";
/// Fast sanity check.
pub const TAG_SMOKE: &str = "smoke";
/// Does not use test doubles for low-level collaborators.
pub const TAG_FUNCTIONAL: &str = "functional";

/// Tags included when none are configured.
pub const DEFAULT_TAGS: &[&str] = &[TAG_BASE];

/// Result of [`parse_tags`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTags {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

/// Splits a raw tag list on commas, skipping empty entries.
pub fn parse_tags(raw: &str) -> ParsedTags {
    let mut parsed = ParsedTags::default();
    for entry in raw.split(',').map(str::trim) {
        match entry.strip_prefix('-') {
            Some("") => {}
            Some(tag) => parsed.excluded.push(tag.to_string()),
            None if entry.is_empty() => {}
            None => parsed.included.push(entry.to_string()),
        }
    }
    parsed
}

/// Decides which tagged tests run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    included: Vec<String>,
    excluded: Vec<String>,
}

impl Default for TagFilter {
    fn default() -> Self {
        Self::new("", false)
    }
}

impl TagFilter {
    /// Builds a filter from a raw tag list. `smoke` adds the smoke tag;
    /// when nothing is included the default tags are.
    pub fn new(raw: &str, smoke: bool) -> Self {
        let ParsedTags {
            mut included,
            excluded,
        } = parse_tags(raw);
        if smoke {
            included.push(TAG_SMOKE.to_string());
        }
        if included.is_empty() {
            included = DEFAULT_TAGS.iter().map(ToString::to_string).collect();
        }
        debug!(?included, ?excluded, "Tag filter configured");
        Self { included, excluded }
    }

    pub fn from_config(config: &TestbedConfig) -> Self {
        Self::new(&config.tags, config.smoke)
    }

    pub fn included(&self) -> &[String] {
        &self.included
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Returns the first of `tags` that is included, or `None` if none is
    /// or if any of them is excluded.
    pub fn match_tag<'a>(&self, tags: &[&'a str]) -> Option<&'a str> {
        if tags.iter().any(|tag| self.excluded.iter().any(|ex| ex == tag)) {
            return None;
        }
        tags.iter()
            .copied()
            .find(|tag| self.included.iter().any(|inc| inc == tag))
    }

    /// Returns true if any of `tags` matches.
    pub fn check_tag(&self, tags: &[&str]) -> bool {
        self.match_tag(tags).is_some()
    }

    /// Skips the test unless one of `tags` matches. Returns true if the test
    /// was skipped; the caller should return early.
    pub fn require_tag(&self, c: &mut TestContext, tags: &[&str]) -> bool {
        if self.check_tag(tags) {
            return false;
        }
        c.skip(format!("skipping due to no matching tags ({:?})", tags));
        true
    }

    /// Skips the test if one of `tags` matches. Returns true if the test was
    /// skipped; the caller should return early.
    pub fn skip_tag(&self, c: &mut TestContext, tags: &[&str]) -> bool {
        match self.match_tag(tags) {
            Some(matched) => {
                c.skip(format!("skipping due to {:?} tag", matched));
                true
            }
            None => false,
        }
    }
}
