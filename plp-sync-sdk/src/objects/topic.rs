//! Broadcast topics.
//!
//! Topics are plain strings on the wire: `all`, `market:<address>` and
//! `user:<owner>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Catch-all topic receiving every update.
    All,
    /// Updates for a single market address.
    Market(String),
    /// Position updates for a single owner wallet.
    User(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicParseError {
    #[error("unknown topic prefix: {0}")]
    UnknownPrefix(String),
    #[error("topic is missing an address")]
    MissingAddress,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::All => f.write_str("all"),
            Topic::Market(address) => write!(f, "market:{address}"),
            Topic::User(owner) => write!(f, "user:{owner}"),
        }
    }
}

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Topic::All);
        }
        let Some((prefix, address)) = s.split_once(':') else {
            return Err(TopicParseError::UnknownPrefix(s.to_owned()));
        };
        if address.is_empty() {
            return Err(TopicParseError::MissingAddress);
        }
        match prefix {
            "market" => Ok(Topic::Market(address.to_owned())),
            "user" => Ok(Topic::User(address.to_owned())),
            other => Err(TopicParseError::UnknownPrefix(other.to_owned())),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_topic_kinds() {
        assert_eq!("all".parse::<Topic>(), Ok(Topic::All));
        assert_eq!(
            "market:Abc".parse::<Topic>(),
            Ok(Topic::Market("Abc".into()))
        );
        assert_eq!("user:Xyz".parse::<Topic>(), Ok(Topic::User("Xyz".into())));
        assert_eq!(
            "market:".parse::<Topic>(),
            Err(TopicParseError::MissingAddress)
        );
        assert!("pool:Abc".parse::<Topic>().is_err());
    }

    #[test]
    fn display_matches_parse() {
        let topic = Topic::User("Owner1".into());
        assert_eq!(topic.to_string().parse::<Topic>(), Ok(topic));
    }
}
