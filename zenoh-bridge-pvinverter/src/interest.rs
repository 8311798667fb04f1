//! Static and runtime consumer interest.
//!
//! A device publishes the channels matched by its configured patterns. The
//! command surface can link and unlink patterns while the bridge runs.

use std::fmt;

use pvsight_modbus::{FieldId, InterestSource};

/// A channel selector: `*`, `group#*` or `group#name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelPattern {
    All,
    Group(String),
    Exact(FieldId),
}

impl ChannelPattern {
    /// Parse a selector. Returns `None` for malformed input.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s == "*" {
            return Some(ChannelPattern::All);
        }

        let (group, name) = s.split_once('#')?;
        if group.is_empty() || group.contains(['#', '*']) {
            return None;
        }

        match name {
            "*" => Some(ChannelPattern::Group(group.to_string())),
            _ => FieldId::parse(s)
                .filter(|id| !id.name.contains(['#', '*']))
                .map(ChannelPattern::Exact),
        }
    }

    pub fn matches(&self, field: &FieldId) -> bool {
        match self {
            ChannelPattern::All => true,
            ChannelPattern::Group(group) => &field.group == group,
            ChannelPattern::Exact(id) => id == field,
        }
    }
}

impl fmt::Display for ChannelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelPattern::All => f.write_str("*"),
            ChannelPattern::Group(group) => write!(f, "{}#*", group),
            ChannelPattern::Exact(id) => write!(f, "{}", id),
        }
    }
}

/// The set of linked channel patterns of one device.
#[derive(Debug, Clone, Default)]
pub struct ChannelInterest {
    patterns: Vec<ChannelPattern>,
}

impl ChannelInterest {
    /// Build from configured selectors. No selectors means every channel.
    ///
    /// Malformed selectors are skipped; configuration validation rejects them
    /// before this point.
    pub fn from_config(channels: &[String]) -> Self {
        if channels.is_empty() {
            return Self {
                patterns: vec![ChannelPattern::All],
            };
        }

        let mut interest = Self::default();
        for pattern in channels.iter().filter_map(|c| ChannelPattern::parse(c)) {
            interest.link(pattern);
        }
        interest
    }

    /// Add a pattern. Returns false if it was already linked.
    pub fn link(&mut self, pattern: ChannelPattern) -> bool {
        if self.patterns.contains(&pattern) {
            return false;
        }
        self.patterns.push(pattern);
        true
    }

    /// Remove a previously linked pattern. Returns false if it was not linked.
    ///
    /// Only the pattern itself is removed: unlinking `group#name` while
    /// `group#*` is linked keeps the channel of interest.
    pub fn unlink(&mut self, pattern: &ChannelPattern) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p != pattern);
        self.patterns.len() != before
    }

    pub fn patterns(&self) -> &[ChannelPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl InterestSource for ChannelInterest {
    fn is_interested(&self, field: &FieldId) -> bool {
        self.patterns.iter().any(|p| p.matches(field))
    }
}
