use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use crate::attachments::normalize_unique_id;
use crate::config::SortOrder;
use crate::error::CoreError;
use crate::models::{or_placeholder, AttachmentPart, GroupRow, MessageKind, RawMessageRow, RecipientRow};

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, CoreError> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name = ?1;",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, CoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn pick_column(conn: &Connection, table: &str, preferred: &[&str]) -> Result<Option<String>, CoreError> {
    for col in preferred {
        if column_exists(conn, table, col)? {
            return Ok(Some((*col).to_string()));
        }
    }
    Ok(None)
}

fn pick_table(conn: &Connection, preferred: &[&str]) -> Result<Option<String>, CoreError> {
    for table in preferred {
        if table_exists(conn, table)? {
            return Ok(Some((*table).to_string()));
        }
    }
    Ok(None)
}

fn qualified(alias: &str, column: Option<&str>) -> String {
    match column {
        Some(col) => format!("{alias}.{col}"),
        None => "NULL".to_string(),
    }
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Integer(v) => Some(v.to_string()),
        Value::Real(v) => Some(v.to_string()),
        Value::Text(v) => Some(v),
        Value::Blob(v) => Some(hex::encode(v)),
        Value::Null => None,
    }
}

/// Read-only view over a decrypted Signal database. Column names are probed
/// once so that every statement below is fixed for the lifetime of the
/// source.
pub struct SignalSource<'c> {
    conn: &'c Connection,
    recipients_sql: String,
    groups_sql: Option<String>,
    messages_sql: String,
    parts_sql: Option<String>,
}

impl<'c> SignalSource<'c> {
    pub fn open(conn: &'c Connection, order: SortOrder) -> Result<Self, CoreError> {
        let parts = PartColumns::detect(conn)?;
        Ok(SignalSource {
            conn,
            recipients_sql: recipients_sql(conn)?,
            groups_sql: groups_sql(conn)?,
            messages_sql: messages_sql(conn, parts.as_ref(), order)?,
            parts_sql: parts.as_ref().map(PartColumns::select_sql),
        })
    }

    pub fn recipients(&self) -> Result<Vec<RecipientRow>, CoreError> {
        let mut stmt = self.conn.prepare(&self.recipients_sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(RecipientRow {
                id: row.get(0)?,
                phone: row.get::<_, Option<Value>>(1)?.and_then(value_to_string),
                name: row.get(2)?,
                secondary_id: row.get::<_, Option<Value>>(3)?.and_then(value_to_string),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn groups(&self) -> Result<Vec<GroupRow>, CoreError> {
        let sql = match &self.groups_sql {
            Some(sql) => sql,
            None => return Ok(Vec::new()),
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let group_id: Value = row.get(0)?;
            let recipient_id: Option<i64> = row.get(1)?;
            let members: Option<String> = row.get(2)?;
            Ok((group_id, recipient_id, members))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (group_id, recipient_id, members) = row?;
            let recipient_id = match recipient_id {
                Some(id) => id,
                None => continue,
            };
            out.push(GroupRow {
                group_id: value_to_string(group_id).unwrap_or_default(),
                recipient_id,
                members,
            });
        }
        Ok(out)
    }

    pub fn messages(&self) -> Result<Vec<RawMessageRow>, CoreError> {
        let mut stmt = self.conn.prepare(&self.messages_sql)?;
        let rows = stmt.query_map([], |row| {
            let is_mms: i64 = row.get(1)?;
            Ok(RawMessageRow {
                id: row.get(0)?,
                kind: if is_mms != 0 {
                    MessageKind::Multimedia
                } else {
                    MessageKind::Text
                },
                date: row.get(2)?,
                type_code: row.get(3)?,
                receiver_id: row.get(4)?,
                sender_id: row.get(5)?,
                body: row.get(6)?,
                m_size: row.get(7)?,
                m_type: row.get(8)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn parts_for(&self, message_id: i64) -> Result<Vec<AttachmentPart>, CoreError> {
        let sql = match &self.parts_sql {
            Some(sql) => sql,
            None => return Ok(Vec::new()),
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![message_id], |row| {
            let row_id: i64 = row.get(0)?;
            let unique_id: Option<i64> = row.get(1)?;
            let seq: Option<Value> = row.get(2)?;
            Ok(AttachmentPart {
                row_id,
                unique_id: normalize_unique_id(unique_id),
                seq: or_placeholder(seq.and_then(value_to_string)),
                ct: or_placeholder(row.get(3)?),
                name: or_placeholder(row.get(4)?),
                chset: or_placeholder(row.get::<_, Option<Value>>(5)?.and_then(value_to_string)),
                cl: or_placeholder(row.get(6)?),
                caption: or_placeholder(row.get(7)?),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn recipients_sql(conn: &Connection) -> Result<String, CoreError> {
    if !table_exists(conn, "recipient")? {
        return Err(CoreError::MissingTable("recipient".to_string()));
    }
    let phone = pick_column(conn, "recipient", &["e164", "phone"])?;
    let mut names = Vec::new();
    for col in [
        "system_joined_name",
        "system_display_name",
        "profile_joined_name",
        "signal_profile_name",
    ] {
        if column_exists(conn, "recipient", col)? {
            names.push(format!("NULLIF(TRIM(r.{col}), '')"));
        }
    }
    let name_expr = match names.len() {
        0 => "NULL".to_string(),
        1 => names.remove(0),
        _ => format!("COALESCE({})", names.join(", ")),
    };
    let pni = pick_column(conn, "recipient", &["pni"])?;
    Ok(format!(
        "SELECT r._id, {phone}, {name}, {pni} FROM recipient r ORDER BY r._id;",
        phone = qualified("r", phone.as_deref()),
        name = name_expr,
        pni = qualified("r", pni.as_deref()),
    ))
}

fn groups_sql(conn: &Connection) -> Result<Option<String>, CoreError> {
    if !table_exists(conn, "groups")? {
        return Ok(None);
    }
    if !column_exists(conn, "groups", "recipient_id")? {
        return Ok(None);
    }
    let group_id = pick_column(conn, "groups", &["group_id"])?;
    let members_expr = if column_exists(conn, "groups", "members")? {
        "g.members".to_string()
    } else if table_exists(conn, "group_membership")? {
        // membership rows concatenate in table scan order
        "(SELECT GROUP_CONCAT(gm.recipient_id, ',') FROM group_membership gm WHERE gm.group_id = g.group_id)"
            .to_string()
    } else {
        "NULL".to_string()
    };
    Ok(Some(format!(
        "SELECT {group_id}, g.recipient_id, {members} FROM groups g ORDER BY g.rowid;",
        group_id = qualified("g", group_id.as_deref()),
        members = members_expr,
    )))
}

/// Projection shared by every message layout:
/// id, is_mms, date, type_code, receiver_id, sender_id, body, m_size, m_type.
struct MessageProjection {
    table: String,
    is_mms: String,
    date: String,
    type_code: String,
    receiver: String,
    sender: String,
    m_size: String,
    m_type: String,
    thread_join: String,
}

impl MessageProjection {
    fn detect(conn: &Connection, table: &str, is_mms: Option<String>) -> Result<Self, CoreError> {
        let date = pick_column(conn, table, &["date_sent", "date"])?;
        let type_code = pick_column(conn, table, &["type", "msg_box"])?;
        let sender = pick_column(conn, table, &["from_recipient_id", "recipient_id", "address"])?;
        let to_recipient = pick_column(conn, table, &["to_recipient_id"])?;
        let thread_col = pick_column(conn, table, &["thread_id"])?;
        let thread_recipient = if table_exists(conn, "thread")? {
            pick_column(conn, "thread", &["recipient_id", "thread_recipient_id", "recipient_ids"])?
        } else {
            None
        };

        let fallback_receiver = qualified("x", to_recipient.as_deref().or(sender.as_deref()));
        let (receiver, thread_join) = match (thread_col, thread_recipient) {
            (Some(thread_col), Some(rec_col)) => (
                format!("COALESCE(t.{rec_col}, {fallback_receiver})"),
                format!("LEFT JOIN thread t ON t._id = x.{thread_col}"),
            ),
            _ => (fallback_receiver, String::new()),
        };

        let is_mms = match is_mms {
            Some(expr) => expr,
            None => "0".to_string(),
        };
        let (m_size, m_type) = if is_mms == "0" {
            ("NULL".to_string(), "NULL".to_string())
        } else {
            (
                qualified("x", pick_column(conn, table, &["m_size"])?.as_deref()),
                qualified("x", pick_column(conn, table, &["m_type"])?.as_deref()),
            )
        };

        Ok(MessageProjection {
            table: table.to_string(),
            is_mms,
            date: qualified("x", date.as_deref()),
            type_code: qualified("x", type_code.as_deref()),
            receiver,
            sender: qualified("x", sender.as_deref()),
            m_size,
            m_type,
            thread_join,
        })
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT x._id AS id, {is_mms} AS is_mms, {date} AS date, {type_code} AS type_code, \
                    {receiver} AS receiver_id, {sender} AS sender_id, x.body AS body, \
                    {m_size} AS m_size, {m_type} AS m_type \
             FROM {table} x {join}",
            is_mms = self.is_mms,
            date = self.date,
            type_code = self.type_code,
            receiver = self.receiver,
            sender = self.sender,
            m_size = self.m_size,
            m_type = self.m_type,
            table = self.table,
            join = self.thread_join,
        )
    }
}

fn messages_sql(conn: &Connection, parts: Option<&PartColumns>, order: SortOrder) -> Result<String, CoreError> {
    let mut selects = Vec::new();
    if table_exists(conn, "message")? {
        // merged layout: multimedia rows carry an m_type or own parts
        let mut signals = Vec::new();
        if column_exists(conn, "message", "m_type")? {
            signals.push("COALESCE(x.m_type, 0) != 0".to_string());
        }
        if let Some(parts) = parts {
            signals.push(format!(
                "EXISTS (SELECT 1 FROM {table} p WHERE p.{mid} = x._id)",
                table = parts.table,
                mid = parts.mid
            ));
        }
        let is_mms = if signals.is_empty() {
            "0".to_string()
        } else {
            format!("(CASE WHEN {} THEN 1 ELSE 0 END)", signals.join(" OR "))
        };
        selects.push(MessageProjection::detect(conn, "message", Some(is_mms))?.select_sql());
    } else {
        if table_exists(conn, "sms")? {
            selects.push(MessageProjection::detect(conn, "sms", None)?.select_sql());
        }
        if table_exists(conn, "mms")? {
            selects.push(MessageProjection::detect(conn, "mms", Some("1".to_string()))?.select_sql());
        }
    }
    if selects.is_empty() {
        return Err(CoreError::MissingTable("message/mms/sms".to_string()));
    }
    Ok(format!(
        "SELECT id, is_mms, date, type_code, receiver_id, sender_id, body, m_size, m_type \
         FROM ({union}) ORDER BY date {dir}, is_mms ASC, id {dir};",
        union = selects.join(" UNION ALL "),
        dir = order.sql_keyword(),
    ))
}

struct PartColumns {
    table: String,
    mid: String,
    unique_id: Option<String>,
    seq: Option<String>,
    ct: Option<String>,
    name: Option<String>,
    chset: Option<String>,
    cl: Option<String>,
    caption: Option<String>,
}

impl PartColumns {
    fn detect(conn: &Connection) -> Result<Option<Self>, CoreError> {
        let table = match pick_table(conn, &["part", "attachment"])? {
            Some(table) => table,
            None => return Ok(None),
        };
        let mid = match pick_column(conn, &table, &["mid", "message_id"])? {
            Some(mid) => mid,
            None => return Ok(None),
        };
        Ok(Some(PartColumns {
            unique_id: pick_column(conn, &table, &["unique_id"])?,
            seq: pick_column(conn, &table, &["seq", "display_order"])?,
            ct: pick_column(conn, &table, &["ct", "content_type"])?,
            name: pick_column(conn, &table, &["name", "file_name"])?,
            chset: pick_column(conn, &table, &["chset"])?,
            cl: pick_column(conn, &table, &["cl"])?,
            caption: pick_column(conn, &table, &["caption"])?,
            table,
            mid,
        }))
    }

    fn select_sql(&self) -> String {
        let order = match &self.seq {
            Some(seq) => format!("p.{seq}, p._id"),
            None => "p._id".to_string(),
        };
        format!(
            "SELECT p._id, {unique}, {seq}, {ct}, {name}, {chset}, {cl}, {caption} \
             FROM {table} p WHERE p.{mid} = ?1 ORDER BY {order};",
            unique = qualified("p", self.unique_id.as_deref()),
            seq = qualified("p", self.seq.as_deref()),
            ct = qualified("p", self.ct.as_deref()),
            name = qualified("p", self.name.as_deref()),
            chset = qualified("p", self.chset.as_deref()),
            cl = qualified("p", self.cl.as_deref()),
            caption = qualified("p", self.caption.as_deref()),
            table = self.table,
            mid = self.mid,
            order = order,
        )
    }
}
