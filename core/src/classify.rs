use serde::Serialize;

use crate::models::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Plain,
    Secure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownType {
    pub code: i64,
    pub direction: Direction,
    pub channel: Channel,
}

/// Known message type codes. The secure variants set the push and secure
/// bits on top of the same base box type (20 inbox, 23 sent).
pub const TYPE_TABLE: &[KnownType] = &[
    KnownType { code: 20, direction: Direction::Received, channel: Channel::Plain },
    KnownType { code: 23, direction: Direction::Sent, channel: Channel::Plain },
    KnownType { code: 87, direction: Direction::Sent, channel: Channel::Plain },
    KnownType { code: 10485780, direction: Direction::Received, channel: Channel::Secure },
    KnownType { code: 10485783, direction: Direction::Sent, channel: Channel::Secure },
];

/// Direction used for any code missing from [`TYPE_TABLE`]. A message of
/// unknown provenance is shown as incoming, never as written by the owner.
pub const DEFAULT_DIRECTION: Direction = Direction::Received;

pub fn lookup(type_code: i64) -> Option<&'static KnownType> {
    TYPE_TABLE.iter().find(|known| known.code == type_code)
}

pub fn classify(type_code: i64) -> Direction {
    lookup(type_code)
        .map(|known| known.direction)
        .unwrap_or(DEFAULT_DIRECTION)
}
