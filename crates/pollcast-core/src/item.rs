// ── Item names ──
//
// The broker addresses everything by item name. Three shapes exist:
// `option_<entityId>`, `visitor_<uniqueId>` and the literal
// `visitors_count`. Anything else is rejected at subscribe time.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

pub const OPTION_PREFIX: &str = "option_";
pub const VISITOR_PREFIX: &str = "visitor_";
pub const VISITORS_COUNT: &str = "visitors_count";

/// Field name carried by `option_` updates.
pub const VOTE_COUNT_FIELD: &str = "vote_count";
/// Field name carried by the one-time `visitor_` snapshot.
pub const PING_FIELD: &str = "ping";
/// Field name carried by `visitors_count` updates.
pub const COUNT_FIELD: &str = "count";

/// Field/value pairs of one update, in wire order.
pub type Fields = Vec<(String, String)>;

/// What a subscription tracks. Derived from the item name, never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum ItemKind {
    VoteOption,
    VisitorPing,
    VisitorCount,
}

/// A parsed item name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Item {
    /// Vote counter of one poll option, keyed by the option's entity id.
    VoteOption(String),
    /// Presence ping of one client.
    VisitorPing(String),
    /// Aggregate number of live visitors.
    VisitorCount,
}

impl Item {
    /// Parse an item name. Unknown shapes and empty ids are rejected.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidItem {
            item: name.to_owned(),
        };

        if name == VISITORS_COUNT {
            return Ok(Self::VisitorCount);
        }
        if let Some(id) = name.strip_prefix(OPTION_PREFIX) {
            return non_empty(id).map(Self::VoteOption).ok_or_else(invalid);
        }
        if let Some(id) = name.strip_prefix(VISITOR_PREFIX) {
            return non_empty(id).map(Self::VisitorPing).ok_or_else(invalid);
        }
        Err(invalid())
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::VoteOption(_) => ItemKind::VoteOption,
            Self::VisitorPing(_) => ItemKind::VisitorPing,
            Self::VisitorCount => ItemKind::VisitorCount,
        }
    }

    /// Entity id of a `VoteOption`; `None` for the other kinds.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::VoteOption(id) => Some(id),
            Self::VisitorPing(_) | Self::VisitorCount => None,
        }
    }

    /// Item name of the vote counter for `entity_id`.
    pub fn option_name(entity_id: &str) -> String {
        format!("{OPTION_PREFIX}{entity_id}")
    }

    /// Item name of the presence ping for `visitor_id`.
    pub fn visitor_name(visitor_id: &str) -> String {
        format!("{VISITOR_PREFIX}{visitor_id}")
    }
}

fn non_empty(id: &str) -> Option<String> {
    (!id.is_empty()).then(|| id.to_owned())
}

impl FromStr for Item {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VoteOption(id) => write!(f, "{OPTION_PREFIX}{id}"),
            Self::VisitorPing(id) => write!(f, "{VISITOR_PREFIX}{id}"),
            Self::VisitorCount => f.write_str(VISITORS_COUNT),
        }
    }
}

// ── Field builders ───────────────────────────────────────────────────

pub fn vote_count_fields(value: i64) -> Fields {
    vec![(VOTE_COUNT_FIELD.to_owned(), value.to_string())]
}

pub fn ping_fields() -> Fields {
    vec![(PING_FIELD.to_owned(), "1".to_owned())]
}

pub fn count_fields(count: usize) -> Fields {
    vec![(COUNT_FIELD.to_owned(), count.to_string())]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_shapes() {
        assert_eq!(
            Item::parse("option_3f2a").unwrap(),
            Item::VoteOption("3f2a".into())
        );
        assert_eq!(
            Item::parse("visitor_abc").unwrap(),
            Item::VisitorPing("abc".into())
        );
        assert_eq!(Item::parse("visitors_count").unwrap(), Item::VisitorCount);
    }

    #[test]
    fn rejects_unknown_and_empty() {
        for name in ["foo_123", "option_", "visitor_", "", "visitors", "OPTION_1"] {
            let err = Item::parse(name).unwrap_err();
            assert!(err.is_validation(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn display_round_trips_name() {
        for name in ["option_x-1", "visitor_9", "visitors_count"] {
            assert_eq!(Item::parse(name).unwrap().to_string(), name);
        }
    }

    #[test]
    fn kind_and_entity_id() {
        let item: Item = "option_42".parse().unwrap();
        assert_eq!(item.kind(), ItemKind::VoteOption);
        assert_eq!(item.entity_id(), Some("42"));
        assert_eq!(Item::VisitorCount.entity_id(), None);
        assert_eq!(ItemKind::VisitorPing.to_string(), "VisitorPing");
    }

    #[test]
    fn fields_are_decimal_strings() {
        assert_eq!(vote_count_fields(17), vec![("vote_count".into(), "17".into())]);
        assert_eq!(ping_fields(), vec![("ping".into(), "1".into())]);
        assert_eq!(count_fields(0), vec![("count".into(), "0".into())]);
    }
}
