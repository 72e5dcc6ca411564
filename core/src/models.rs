use serde::{Deserialize, Serialize};

/// Literal written in place of any absent source field.
pub const NULL_PLACEHOLDER: &str = "null";

pub fn or_placeholder(value: Option<String>) -> String {
    value.unwrap_or_else(|| NULL_PLACEHOLDER.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRow {
    pub id: i64,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub secondary_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub group_id: String,
    pub recipient_id: i64,
    pub members: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: i64,
    pub phone: String,
    pub name: Option<String>,
    pub secondary_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Multimedia,
}

/// Message as read from the store, before placeholder substitution.
#[derive(Debug, Clone)]
pub struct RawMessageRow {
    pub id: i64,
    pub kind: MessageKind,
    pub date: Option<i64>,
    pub type_code: Option<i64>,
    pub receiver_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub body: Option<String>,
    pub m_size: Option<i64>,
    pub m_type: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub kind: MessageKind,
    pub date: i64,
    pub type_code: i64,
    pub receiver_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub body: String,
    /// The source body was null; `body` then holds the placeholder.
    pub body_absent: bool,
    pub m_size: String,
    pub m_type: String,
}

impl From<RawMessageRow> for MessageRow {
    fn from(raw: RawMessageRow) -> Self {
        MessageRow {
            id: raw.id,
            kind: raw.kind,
            date: raw.date.unwrap_or(0),
            // unknown type codes classify as received
            type_code: raw.type_code.unwrap_or(-1),
            receiver_id: raw.receiver_id,
            sender_id: raw.sender_id,
            body_absent: raw.body.is_none(),
            body: or_placeholder(raw.body),
            m_size: or_placeholder(raw.m_size.map(|v| v.to_string())),
            m_type: or_placeholder(raw.m_type.map(|v| v.to_string())),
        }
    }
}

/// One attachment row. Text fields already carry the placeholder when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentPart {
    pub row_id: i64,
    pub unique_id: i64,
    pub seq: String,
    pub name: String,
    pub chset: String,
    pub cl: String,
    pub ct: String,
    pub caption: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    /// Value of the `type` / `msg_box` attribute.
    pub fn code(self) -> u8 {
        match self {
            Direction::Received => 1,
            Direction::Sent => 2,
        }
    }
}

/// Address role in an `addr` element. Only `Originator` and `Recipient` are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressRole {
    Bcc,
    Cc,
    Originator,
    Recipient,
}

impl AddressRole {
    pub fn code(self) -> u16 {
        match self {
            AddressRole::Bcc => 129,
            AddressRole::Cc => 130,
            AddressRole::Originator => 137,
            AddressRole::Recipient => 151,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsRecord {
    pub address: String,
    pub contact_name: String,
    pub date: i64,
    pub direction: Direction,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MmsPart {
    pub seq: String,
    pub ct: String,
    pub name: String,
    pub chset: String,
    pub cl: String,
    pub text: String,
    pub data: Option<String>,
}

impl MmsPart {
    /// Inline text only; a part carrying encoded `data` is never text.
    pub fn is_text(&self) -> bool {
        self.data.is_none() && self.ct.starts_with("text/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MmsAddress {
    pub address: String,
    pub role: AddressRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MmsRecord {
    pub address: String,
    pub contact_name: String,
    pub date: i64,
    pub direction: Direction,
    pub m_size: String,
    pub m_type: String,
    pub parts: Vec<MmsPart>,
    pub addrs: Vec<MmsAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputRecord {
    Sms(SmsRecord),
    Mms(MmsRecord),
}
