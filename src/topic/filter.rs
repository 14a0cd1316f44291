use std::fmt;

use crate::utils::error::TopicError;

pub const LEVEL_SEPARATOR: char = '/';
pub const SINGLE_LEVEL_WILDCARD: &str = "*";
pub const MULTI_LEVEL_WILDCARD: &str = ">";

/// One level of a parsed subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Level {
    /// Must equal the topic level exactly.
    Literal(String),
    /// `*`: any single level.
    Single,
    /// Trailing `>`: this level and all remaining ones.
    Multi,
}

/// A subscription filter parsed once into its levels so matching an inbound
/// topic is a single walk over both sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    raw: String,
    levels: Vec<Level>,
}

impl TopicFilter {
    /// Parses `filter`, rejecting empty filters, empty levels and a `>` that
    /// is not the final level.
    pub fn parse(filter: &str) -> Result<Self, TopicError> {
        if filter.is_empty() {
            return Err(TopicError::Empty);
        }

        let parts: Vec<&str> = filter.split(LEVEL_SEPARATOR).collect();
        let last = parts.len() - 1;
        let mut levels = Vec::with_capacity(parts.len());

        for (idx, part) in parts.into_iter().enumerate() {
            let level = match part {
                "" => return Err(TopicError::EmptyLevel(filter.to_string())),
                SINGLE_LEVEL_WILDCARD => Level::Single,
                MULTI_LEVEL_WILDCARD if idx == last => Level::Multi,
                MULTI_LEVEL_WILDCARD => {
                    return Err(TopicError::MisplacedMultiLevel(filter.to_string()));
                }
                literal => Level::Literal(literal.to_string()),
            };
            levels.push(level);
        }

        Ok(Self {
            raw: filter.to_string(),
            levels,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// True when the filter contains no wildcard levels.
    pub fn is_exact(&self) -> bool {
        self.levels.iter().all(|l| matches!(l, Level::Literal(_)))
    }

    /// Returns whether `topic` falls under this filter.
    ///
    /// Without a trailing `>` the topic must have exactly as many levels as
    /// the filter. With one, the filter's prefix must match and at least one
    /// further topic level must be present. An empty topic, or one with an
    /// empty level, matches nothing.
    pub fn matches(&self, topic: &str) -> bool {
        if topic.split(LEVEL_SEPARATOR).any(str::is_empty) {
            return false;
        }
        let mut topic_levels = topic.split(LEVEL_SEPARATOR);

        for level in &self.levels {
            let Some(actual) = topic_levels.next() else {
                return false;
            };
            match level {
                Level::Multi => return true,
                Level::Single => {}
                Level::Literal(expected) if expected == actual => {}
                Level::Literal(_) => return false,
            }
        }

        topic_levels.next().is_none()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One-shot form of [`TopicFilter::matches`]; an unparsable filter matches
/// nothing.
pub fn matches(filter: &str, topic: &str) -> bool {
    TopicFilter::parse(filter)
        .map(|f| f.matches(topic))
        .unwrap_or(false)
}

/// Checks that `topic` is usable as a publish destination: non-empty, no
/// empty levels, no wildcard levels.
pub fn validate_topic(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    for level in topic.split(LEVEL_SEPARATOR) {
        match level {
            "" => return Err(TopicError::EmptyLevel(topic.to_string())),
            SINGLE_LEVEL_WILDCARD | MULTI_LEVEL_WILDCARD => {
                return Err(TopicError::WildcardInTopic(topic.to_string()));
            }
            _ => {}
        }
    }
    Ok(())
}
