//! Topic patterns and structural matching.
//!
//! Topics are dot-segmented (`stock.modifie`). A subscription pattern is one of:
//!
//! - `*`: every topic
//! - `prefix.*`: every topic whose leading segments equal `prefix` and that has
//!   at least one more segment (`stock.*` matches `stock.modifie`, not `stock`
//!   nor `stockpile.x`)
//! - anything else: that exact topic

use crate::constants::topics::{ALL, SEPARATOR, WILDCARD_SUFFIX};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Split a topic into its segments
pub fn segments(topic: &str) -> impl Iterator<Item = &str> {
    topic.split(SEPARATOR)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Exact,
    Wildcard,
    Global,
}

/// Parsed subscription pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicPattern {
    Global,
    Prefix(Vec<String>),
    Exact(String),
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == ALL {
            return TopicPattern::Global;
        }
        match pattern.strip_suffix(WILDCARD_SUFFIX) {
            Some(prefix) if !prefix.is_empty() => {
                TopicPattern::Prefix(segments(prefix).map(str::to_string).collect())
            }
            _ => TopicPattern::Exact(pattern.to_string()),
        }
    }

    pub fn kind(&self) -> PatternKind {
        match self {
            TopicPattern::Global => PatternKind::Global,
            TopicPattern::Prefix(_) => PatternKind::Wildcard,
            TopicPattern::Exact(_) => PatternKind::Exact,
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Global => true,
            TopicPattern::Exact(exact) => exact == topic,
            TopicPattern::Prefix(prefix) => {
                let mut topic_segments = segments(topic);
                prefix
                    .iter()
                    .all(|expected| topic_segments.next() == Some(expected.as_str()))
                    && topic_segments.next().is_some()
            }
        }
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPattern::Global => f.write_str(ALL),
            TopicPattern::Exact(topic) => f.write_str(topic),
            TopicPattern::Prefix(prefix) => {
                write!(f, "{}{}", prefix.join(&SEPARATOR.to_string()), WILDCARD_SUFFIX)
            }
        }
    }
}
