use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::attachments::AttachmentStore;
use crate::classify::classify;
use crate::directory::Directories;
use crate::error::TranslationError;
use crate::models::{
    AddressRole, AttachmentPart, ContactRecord, Direction, MessageKind, MessageRow,
    MmsAddress, MmsPart, MmsRecord, OutputRecord, SmsRecord, NULL_PLACEHOLDER,
};

pub const PHONE_SEPARATOR: &str = "~";
pub const NAME_SEPARATOR: &str = ", ";

const VCARD_MARKER: &str = "BEGIN:VCARD";
const CHARSET_UTF8: &str = "106";

/// Decides which participants of a multimedia message are marked as its
/// originator. The source schema has no reliable "who sent this" for every
/// group message, so this is a heuristic.
pub trait RolePolicy {
    fn role(&self, participant: &ContactRecord, row: &MessageRow, direction: Direction) -> AddressRole;
}

/// Originator is either the row's direct sender on a received message, or,
/// for a sent message whose sender is the thread's own receiver, the
/// participant carrying a secondary identifier (the device owner).
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderMatchPolicy;

impl RolePolicy for SenderMatchPolicy {
    fn role(&self, participant: &ContactRecord, row: &MessageRow, direction: Direction) -> AddressRole {
        let direct_sender = direction == Direction::Received && row.sender_id == Some(participant.id);
        let own_identity = direction == Direction::Sent
            && row.sender_id.is_some()
            && row.sender_id == row.receiver_id
            && participant.secondary_id.is_some();
        if direct_sender || own_identity {
            AddressRole::Originator
        } else {
            AddressRole::Recipient
        }
    }
}

pub fn join_phones(participants: &[&ContactRecord]) -> String {
    participants
        .iter()
        .map(|c| c.phone.as_str())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PHONE_SEPARATOR)
}

pub fn join_names(participants: &[&ContactRecord]) -> String {
    participants
        .iter()
        .filter_map(|c| c.name.as_deref())
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>()
        .join(NAME_SEPARATOR)
}

/// Translates one row against already-resolved participants. Returns
/// `Ok(None)` for text rows whose source body was null: those are system
/// events.
pub fn translate<S, P>(
    row: &MessageRow,
    participants: &[&ContactRecord],
    parts: &[AttachmentPart],
    store: &S,
    policy: &P,
) -> Result<Option<OutputRecord>, TranslationError>
where
    S: AttachmentStore + ?Sized,
    P: RolePolicy + ?Sized,
{
    if row.kind == MessageKind::Text && row.body_absent {
        return Ok(None);
    }
    if participants.is_empty() {
        return Err(TranslationError::UnresolvedAddress {
            message_id: row.id,
            receiver: row.receiver_id,
        });
    }

    let direction = classify(row.type_code);
    let address = join_phones(participants);
    let contact_name = join_names(participants);

    let record = match row.kind {
        MessageKind::Text => OutputRecord::Sms(SmsRecord {
            address,
            contact_name,
            date: row.date,
            direction,
            body: row.body.clone(),
        }),
        MessageKind::Multimedia => {
            let mut mms_parts = Vec::with_capacity(parts.len() + 1);
            if let Some(body_part) = body_part(row) {
                mms_parts.push(body_part);
            }
            for part in parts {
                mms_parts.push(attachment_part(row.id, part, store)?);
            }
            let addrs = participants
                .iter()
                .map(|participant| MmsAddress {
                    address: participant.phone.clone(),
                    role: policy.role(participant, row, direction),
                })
                .collect();
            OutputRecord::Mms(MmsRecord {
                address,
                contact_name,
                date: row.date,
                direction,
                m_size: row.m_size.clone(),
                m_type: row.m_type.clone(),
                parts: mms_parts,
                addrs,
            })
        }
    };
    Ok(Some(record))
}

fn body_part(row: &MessageRow) -> Option<MmsPart> {
    let body = row.body.as_str();
    if row.body_absent || body.is_empty() {
        return None;
    }
    if body.starts_with(VCARD_MARKER) {
        return Some(MmsPart {
            seq: "0".to_string(),
            ct: "text/x-vCard".to_string(),
            name: "contact.vcf".to_string(),
            chset: CHARSET_UTF8.to_string(),
            cl: "contact.vcf".to_string(),
            text: NULL_PLACEHOLDER.to_string(),
            data: Some(BASE64_STANDARD.encode(body.as_bytes())),
        });
    }
    Some(MmsPart {
        seq: "0".to_string(),
        ct: "text/plain".to_string(),
        name: NULL_PLACEHOLDER.to_string(),
        chset: CHARSET_UTF8.to_string(),
        cl: "text_0.txt".to_string(),
        text: body.to_string(),
        data: None,
    })
}

fn attachment_part<S>(message_id: i64, part: &AttachmentPart, store: &S) -> Result<MmsPart, TranslationError>
where
    S: AttachmentStore + ?Sized,
{
    let bytes = store.load(message_id, part.row_id, part.unique_id)?;
    Ok(MmsPart {
        seq: part.seq.clone(),
        ct: part.ct.clone(),
        name: part.name.clone(),
        chset: part.chset.clone(),
        cl: part.cl.clone(),
        text: part.caption.clone(),
        data: Some(BASE64_STANDARD.encode(bytes)),
    })
}

/// Resolves participants through the directories, then translates.
pub struct Translator<'a, S: ?Sized, P> {
    directories: &'a Directories,
    store: &'a S,
    policy: P,
}

impl<'a, S, P> Translator<'a, S, P>
where
    S: AttachmentStore + ?Sized,
    P: RolePolicy,
{
    pub fn new(directories: &'a Directories, store: &'a S, policy: P) -> Self {
        Translator {
            directories,
            store,
            policy,
        }
    }

    /// Participants for the row's receiver; when nothing resolves, the
    /// row's sender contact stands in as the only participant.
    pub fn participants(&self, row: &MessageRow) -> Vec<&'a ContactRecord> {
        let directories: &'a Directories = self.directories;
        let resolved = directories.resolve(row.receiver_id);
        if !resolved.is_empty() {
            return resolved;
        }
        directories.contact(row.sender_id).into_iter().collect()
    }

    pub fn translate(
        &self,
        row: &MessageRow,
        parts: &[AttachmentPart],
    ) -> Result<Option<OutputRecord>, TranslationError> {
        let participants = self.participants(row);
        translate(row, &participants, parts, self.store, &self.policy)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::models::{GroupRow, RecipientRow};

    struct MemoryStore(HashMap<(i64, i64), Vec<u8>>);

    impl AttachmentStore for MemoryStore {
        fn locate(&self, message_id: i64, row_id: i64, unique_id: i64) -> Result<PathBuf, TranslationError> {
            Err(TranslationError::AttachmentNotFound {
                message_id,
                row_id,
                unique_id,
            })
        }

        fn load(&self, message_id: i64, row_id: i64, unique_id: i64) -> Result<Vec<u8>, TranslationError> {
            self.0
                .get(&(row_id, unique_id))
                .cloned()
                .ok_or(TranslationError::AttachmentNotFound {
                    message_id,
                    row_id,
                    unique_id,
                })
        }
    }

    fn contact(id: i64, phone: &str, name: Option<&str>, secondary: Option<&str>) -> ContactRecord {
        ContactRecord {
            id,
            phone: phone.to_string(),
            name: name.map(str::to_string),
            secondary_id: secondary.map(str::to_string),
        }
    }

    fn row(kind: MessageKind, type_code: i64, body: &str) -> MessageRow {
        MessageRow {
            id: 1,
            kind,
            date: 1000,
            type_code,
            receiver_id: Some(9),
            sender_id: Some(1),
            body: body.to_string(),
            body_absent: body == NULL_PLACEHOLDER,
            m_size: NULL_PLACEHOLDER.to_string(),
            m_type: NULL_PLACEHOLDER.to_string(),
        }
    }

    fn part(row_id: i64, unique_id: i64) -> AttachmentPart {
        AttachmentPart {
            row_id,
            unique_id,
            seq: "1".to_string(),
            name: "pic.jpg".to_string(),
            chset: NULL_PLACEHOLDER.to_string(),
            cl: NULL_PLACEHOLDER.to_string(),
            ct: "image/jpeg".to_string(),
            caption: NULL_PLACEHOLDER.to_string(),
        }
    }

    fn empty_store() -> MemoryStore {
        MemoryStore(HashMap::new())
    }

    #[test]
    fn joins_skip_missing_fields() {
        let a = contact(1, "111", Some("Ann"), None);
        let b = contact(2, "222", None, None);
        let c = contact(3, "333", Some("Cal"), None);
        assert_eq!(join_phones(&[&a, &b, &c]), "111~222~333");
        assert_eq!(join_names(&[&a, &b, &c]), "Ann, Cal");
        assert_eq!(join_names(&[&b]), "");
    }

    #[test]
    fn placeholder_text_body_is_excluded() {
        let a = contact(1, "111", None, None);
        let out = translate(
            &row(MessageKind::Text, 20, NULL_PLACEHOLDER),
            &[&a],
            &[],
            &empty_store(),
            &SenderMatchPolicy,
        )
        .expect("translate");
        assert!(out.is_none());
    }

    #[test]
    fn literal_null_text_is_a_message() {
        let a = contact(1, "111", None, None);
        let mut msg = row(MessageKind::Text, 20, "null");
        msg.body_absent = false;
        let out = translate(&msg, &[&a], &[], &empty_store(), &SenderMatchPolicy)
            .expect("translate")
            .expect("record");
        let OutputRecord::Sms(sms) = out else { panic!("expected sms") };
        assert_eq!(sms.body, "null");
    }

    #[test]
    fn text_without_participants_fails() {
        let err = translate(&row(MessageKind::Text, 20, "hi"), &[], &[], &empty_store(), &SenderMatchPolicy)
            .unwrap_err();
        assert!(matches!(err, TranslationError::UnresolvedAddress { message_id: 1, receiver: Some(9) }));
    }

    #[test]
    fn vcard_body_becomes_encoded_part() {
        let a = contact(1, "111", None, None);
        let body = "BEGIN:VCARD\nFN:Ann\nEND:VCARD";
        let out = translate(&row(MessageKind::Multimedia, 20, body), &[&a], &[], &empty_store(), &SenderMatchPolicy)
            .expect("translate")
            .expect("record");
        let OutputRecord::Mms(mms) = out else { panic!("expected mms") };
        assert_eq!(mms.parts.len(), 1);
        assert_eq!(mms.parts[0].ct, "text/x-vCard");
        assert_eq!(mms.parts[0].data.as_deref(), Some(BASE64_STANDARD.encode(body).as_str()));
    }

    #[test]
    fn attachments_inline_payload_after_body() {
        let a = contact(1, "111", None, None);
        let store = MemoryStore(HashMap::from([((5, 1), b"test".to_vec())]));
        let out = translate(
            &row(MessageKind::Multimedia, 23, "caption"),
            &[&a],
            &[part(5, 1)],
            &store,
            &SenderMatchPolicy,
        )
        .expect("translate")
        .expect("record");
        let OutputRecord::Mms(mms) = out else { panic!("expected mms") };
        assert_eq!(mms.direction, Direction::Sent);
        assert_eq!(mms.parts[0].text, "caption");
        assert_eq!(mms.parts[1].data.as_deref(), Some("dGVzdA=="));
    }

    #[test]
    fn missing_payload_fails_record() {
        let a = contact(1, "111", None, None);
        let err = translate(
            &row(MessageKind::Multimedia, 20, NULL_PLACEHOLDER),
            &[&a],
            &[part(5, 1)],
            &empty_store(),
            &SenderMatchPolicy,
        )
        .unwrap_err();
        assert!(matches!(err, TranslationError::AttachmentNotFound { row_id: 5, .. }));
    }

    #[test]
    fn received_sender_is_originator() {
        let sender = contact(1, "111", None, None);
        let other = contact(2, "222", None, None);
        let msg = row(MessageKind::Multimedia, 20, "x");
        assert_eq!(SenderMatchPolicy.role(&sender, &msg, Direction::Received), AddressRole::Originator);
        assert_eq!(SenderMatchPolicy.role(&other, &msg, Direction::Received), AddressRole::Recipient);
        assert_eq!(SenderMatchPolicy.role(&sender, &msg, Direction::Sent), AddressRole::Recipient);
    }

    #[test]
    fn own_identity_is_originator_when_sent_to_self_thread() {
        let owner = contact(1, "111", None, Some("PNI:abc"));
        let other = contact(2, "222", None, None);
        let mut msg = row(MessageKind::Multimedia, 23, "x");
        msg.sender_id = Some(9);
        msg.receiver_id = Some(9);
        assert_eq!(SenderMatchPolicy.role(&owner, &msg, Direction::Sent), AddressRole::Originator);
        assert_eq!(SenderMatchPolicy.role(&other, &msg, Direction::Sent), AddressRole::Recipient);
    }

    #[test]
    fn translator_falls_back_to_sender_contact() {
        let dirs = Directories::build(
            &[RecipientRow {
                id: 1,
                phone: Some("555-0100".to_string()),
                name: Some("Ann".to_string()),
                secondary_id: None,
            }],
            &[] as &[GroupRow],
        );
        let store = empty_store();
        let translator = Translator::new(&dirs, &store, SenderMatchPolicy);
        let out = translator
            .translate(&row(MessageKind::Text, 20, "hi"), &[])
            .expect("translate")
            .expect("record");
        let OutputRecord::Sms(sms) = out else { panic!("expected sms") };
        assert_eq!(sms.address, "5550100");
    }

    struct EveryoneRecipient;

    impl RolePolicy for EveryoneRecipient {
        fn role(&self, _: &ContactRecord, _: &MessageRow, _: Direction) -> AddressRole {
            AddressRole::Recipient
        }
    }

    #[test]
    fn role_policy_is_swappable() {
        let sender = contact(1, "111", None, None);
        let out = translate(&row(MessageKind::Multimedia, 20, "x"), &[&sender], &[], &empty_store(), &EveryoneRecipient)
            .expect("translate")
            .expect("record");
        let OutputRecord::Mms(mms) = out else { panic!("expected mms") };
        assert_eq!(mms.addrs[0].role, AddressRole::Recipient);
    }
}
