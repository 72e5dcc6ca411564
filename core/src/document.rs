use std::io::Write;

use chrono::DateTime;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::CoreError;
use crate::models::{MmsRecord, OutputRecord, SmsRecord, NULL_PLACEHOLDER};

const MMS_CONTENT_TYPE: &str = "application/vnd.wap.multipart.related";
const ADDR_CHARSET: &str = "106";

/// Escapes a value for a double-quoted attribute. Line breaks and tabs are
/// written as character references so parsers do not normalize them away.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            '\n' => out.push_str("&#10;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn readable_date(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.format("%b %-d, %Y %-I:%M:%S %p").to_string())
        .unwrap_or_else(|| NULL_PLACEHOLDER.to_string())
}

fn xml_err<E: std::fmt::Display>(err: E) -> CoreError {
    CoreError::Serialize(err.to_string())
}

fn element<'a>(name: &'a str, attrs: &[(&str, &str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        let escaped = escape_attr(value);
        // value is already escaped; the byte-slice form is written verbatim
        start.push_attribute(Attribute::from((key.as_bytes(), escaped.as_bytes())));
    }
    start
}

/// Collects translated records in processing order and serializes them as
/// one `smses` document.
#[derive(Debug, Default)]
pub struct DocumentAssembler {
    records: Vec<OutputRecord>,
}

impl DocumentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: OutputRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finalize(&self) -> Result<String, CoreError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        String::from_utf8(buf).map_err(xml_err)
    }

    pub fn write_to<W: Write>(&self, inner: W) -> Result<(), CoreError> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_err)?;
        let count = self.records.len().to_string();
        writer
            .write_event(Event::Start(element("smses", &[("count", count.as_str())])))
            .map_err(xml_err)?;
        for record in &self.records {
            match record {
                OutputRecord::Sms(sms) => write_sms(&mut writer, sms)?,
                OutputRecord::Mms(mms) => write_mms(&mut writer, mms)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new("smses")))
            .map_err(xml_err)?;
        writer.get_mut().write_all(b"\n")?;
        Ok(())
    }
}

fn write_sms<W: Write>(writer: &mut Writer<W>, sms: &SmsRecord) -> Result<(), CoreError> {
    let date = sms.date.to_string();
    let kind = sms.direction.code().to_string();
    let readable = readable_date(sms.date);
    let attrs = [
        ("protocol", "0"),
        ("address", sms.address.as_str()),
        ("date", date.as_str()),
        ("type", kind.as_str()),
        ("subject", NULL_PLACEHOLDER),
        ("body", sms.body.as_str()),
        ("toa", NULL_PLACEHOLDER),
        ("sc_toa", NULL_PLACEHOLDER),
        ("service_center", NULL_PLACEHOLDER),
        ("read", "1"),
        ("status", "-1"),
        ("locked", "0"),
        ("date_sent", date.as_str()),
        ("readable_date", readable.as_str()),
        ("contact_name", sms.contact_name.as_str()),
    ];
    writer
        .write_event(Event::Empty(element("sms", &attrs)))
        .map_err(xml_err)
}

fn write_mms<W: Write>(writer: &mut Writer<W>, mms: &MmsRecord) -> Result<(), CoreError> {
    let date = mms.date.to_string();
    let msg_box = mms.direction.code().to_string();
    let readable = readable_date(mms.date);
    let text_only = if mms.parts.iter().all(|p| p.is_text()) { "1" } else { "0" };
    let attrs = [
        ("date", date.as_str()),
        ("ct_t", MMS_CONTENT_TYPE),
        ("msg_box", msg_box.as_str()),
        ("rr", NULL_PLACEHOLDER),
        ("sub", NULL_PLACEHOLDER),
        ("read_status", "1"),
        ("address", mms.address.as_str()),
        ("contact_name", mms.contact_name.as_str()),
        ("m_id", NULL_PLACEHOLDER),
        ("read", "1"),
        ("m_size", mms.m_size.as_str()),
        ("m_type", mms.m_type.as_str()),
        ("sim_slot", "0"),
        ("text_only", text_only),
        ("readable_date", readable.as_str()),
    ];
    writer
        .write_event(Event::Start(element("mms", &attrs)))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("parts")))
        .map_err(xml_err)?;
    for part in &mms.parts {
        let mut attrs = vec![
            ("seq", part.seq.as_str()),
            ("ct", part.ct.as_str()),
            ("name", part.name.as_str()),
            ("chset", part.chset.as_str()),
            ("cl", part.cl.as_str()),
            ("text", part.text.as_str()),
        ];
        if let Some(data) = part.data.as_deref() {
            attrs.push(("data", data));
        }
        writer
            .write_event(Event::Empty(element("part", &attrs)))
            .map_err(xml_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("parts")))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("addrs")))
        .map_err(xml_err)?;
    for addr in &mms.addrs {
        let role = addr.role.code().to_string();
        let attrs = [
            ("address", addr.address.as_str()),
            ("type", role.as_str()),
            ("charset", ADDR_CHARSET),
        ];
        writer
            .write_event(Event::Empty(element("addr", &attrs)))
            .map_err(xml_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("addrs")))
        .map_err(xml_err)?;

    writer
        .write_event(Event::End(BytesEnd::new("mms")))
        .map_err(xml_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AddressRole, Direction, MmsAddress, MmsPart};

    fn sms(body: &str) -> OutputRecord {
        OutputRecord::Sms(SmsRecord {
            address: "5550100".to_string(),
            contact_name: "Ann".to_string(),
            date: 1_600_000_000_000,
            direction: Direction::Received,
            body: body.to_string(),
        })
    }

    #[test]
    fn escapes_markup_and_whitespace_controls() {
        assert_eq!(
            escape_attr("a&b<c>d\"e\tf\ng\rh'i"),
            "a&amp;b&lt;c&gt;d&quot;e&#9;f&#10;g&#13;h'i"
        );
    }

    #[test]
    fn empty_document_has_zero_count() {
        let xml = DocumentAssembler::new().finalize().expect("finalize");
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(xml.contains("<smses count=\"0\">"));
    }

    #[test]
    fn count_tracks_appended_records() {
        let mut doc = DocumentAssembler::new();
        doc.append(sms("one"));
        doc.append(sms("two"));
        assert_eq!(doc.len(), 2);
        let xml = doc.finalize().expect("finalize");
        assert!(xml.contains("<smses count=\"2\">"));
        let first = xml.find("body=\"one\"").expect("one");
        let second = xml.find("body=\"two\"").expect("two");
        assert!(first < second);
    }

    #[test]
    fn mms_writes_parts_and_addrs() {
        let mut doc = DocumentAssembler::new();
        doc.append(OutputRecord::Mms(MmsRecord {
            address: "111~222".to_string(),
            contact_name: "A, B".to_string(),
            date: 5,
            direction: Direction::Sent,
            m_size: NULL_PLACEHOLDER.to_string(),
            m_type: "128".to_string(),
            parts: vec![MmsPart {
                seq: "0".to_string(),
                ct: "image/png".to_string(),
                name: "a.png".to_string(),
                chset: NULL_PLACEHOLDER.to_string(),
                cl: NULL_PLACEHOLDER.to_string(),
                text: NULL_PLACEHOLDER.to_string(),
                data: Some("AAAA".to_string()),
            }],
            addrs: vec![
                MmsAddress {
                    address: "111".to_string(),
                    role: AddressRole::Originator,
                },
                MmsAddress {
                    address: "222".to_string(),
                    role: AddressRole::Recipient,
                },
            ],
        }));
        let xml = doc.finalize().expect("finalize");
        assert!(xml.contains("msg_box=\"2\""));
        assert!(xml.contains("text_only=\"0\""));
        assert!(xml.contains("data=\"AAAA\""));
        assert!(xml.contains("<addr address=\"111\" type=\"137\" charset=\"106\"/>"));
        assert!(xml.contains("<addr address=\"222\" type=\"151\" charset=\"106\"/>"));
    }

    #[test]
    fn vcard_only_mms_is_not_text_only() {
        let mut doc = DocumentAssembler::new();
        doc.append(OutputRecord::Mms(MmsRecord {
            address: "111".to_string(),
            contact_name: String::new(),
            date: 5,
            direction: Direction::Received,
            m_size: NULL_PLACEHOLDER.to_string(),
            m_type: NULL_PLACEHOLDER.to_string(),
            parts: vec![MmsPart {
                seq: "0".to_string(),
                ct: "text/x-vCard".to_string(),
                name: "contact.vcf".to_string(),
                chset: "106".to_string(),
                cl: "contact.vcf".to_string(),
                text: NULL_PLACEHOLDER.to_string(),
                data: Some("QkVHSU46VkNBUkQ=".to_string()),
            }],
            addrs: Vec::new(),
        }));
        let xml = doc.finalize().expect("finalize");
        assert!(xml.contains("text_only=\"0\""));
    }

    #[test]
    fn readable_date_renders_utc() {
        assert_eq!(readable_date(0), "Jan 1, 1970 12:00:00 AM");
        assert_eq!(readable_date(i64::MAX), NULL_PLACEHOLDER);
    }
}
