use std::collections::HashMap;

use tracing::info;

use crate::models::{ContactRecord, GroupRow, RecipientRow};

pub type ContactMap = HashMap<i64, ContactRecord>;
pub type GroupMap = HashMap<i64, Vec<ContactRecord>>;

pub fn normalize_phone(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | ' ' | '(' | ')'))
        .collect()
}

/// Recipients without a phone field are left out; most of them are groups
/// or other entities that cannot be addressed by number. A phone that
/// normalizes to nothing still gets an entry with an empty number.
pub fn build_contacts(rows: &[RecipientRow]) -> ContactMap {
    let mut contacts = ContactMap::with_capacity(rows.len());
    for row in rows {
        let phone = match row.phone.as_deref() {
            Some(raw) if !raw.is_empty() => normalize_phone(raw),
            _ => continue,
        };
        contacts.insert(
            row.id,
            ContactRecord {
                id: row.id,
                phone,
                name: row.name.clone().filter(|n| !n.trim().is_empty()),
                secondary_id: row.secondary_id.clone().filter(|s| !s.trim().is_empty()),
            },
        );
    }
    contacts
}

/// Groups keyed by their owning recipient id. A group whose member list is
/// non-empty always gets an entry, even if no member resolves.
pub fn build_groups(rows: &[GroupRow], contacts: &ContactMap) -> GroupMap {
    let mut groups = GroupMap::new();
    for row in rows {
        let members = match row.members.as_deref().map(str::trim) {
            Some(members) if !members.is_empty() => members,
            _ => continue,
        };
        let resolved = groups.entry(row.recipient_id).or_default();
        for token in members.split(',') {
            let token = token.trim();
            let member_id = match token.parse::<i64>() {
                Ok(id) => id,
                Err(_) => {
                    info!(group_id = %row.group_id, token, "skipping unparseable group member");
                    continue;
                }
            };
            match contacts.get(&member_id) {
                Some(contact) => resolved.push(contact.clone()),
                None => {
                    info!(group_id = %row.group_id, member_id, "group member has no contact, skipping");
                }
            }
        }
    }
    groups
}

pub fn resolve<'a>(
    receiver_id: i64,
    contacts: &'a ContactMap,
    groups: &'a GroupMap,
) -> Vec<&'a ContactRecord> {
    if let Some(members) = groups.get(&receiver_id) {
        return members.iter().collect();
    }
    contacts.get(&receiver_id).into_iter().collect()
}

/// Both lookup tables, built once before any message is translated.
#[derive(Debug, Clone, Default)]
pub struct Directories {
    pub contacts: ContactMap,
    pub groups: GroupMap,
}

impl Directories {
    pub fn build(recipients: &[RecipientRow], groups: &[GroupRow]) -> Self {
        let contacts = build_contacts(recipients);
        let groups = build_groups(groups, &contacts);
        Directories { contacts, groups }
    }

    pub fn resolve(&self, receiver_id: Option<i64>) -> Vec<&ContactRecord> {
        match receiver_id {
            Some(id) => resolve(id, &self.contacts, &self.groups),
            None => Vec::new(),
        }
    }

    pub fn contact(&self, id: Option<i64>) -> Option<&ContactRecord> {
        id.and_then(|id| self.contacts.get(&id))
    }
}
