use proptest::prelude::*;
use quick_xml::events::Event;
use quick_xml::Reader;
use signal_export_core::document::DocumentAssembler;
use signal_export_core::models::{Direction, OutputRecord, SmsRecord};

fn sms_with_body(body: &str) -> OutputRecord {
    OutputRecord::Sms(SmsRecord {
        address: "5550100".to_string(),
        contact_name: "Ann & \"Bob\"".to_string(),
        date: 1,
        direction: Direction::Received,
        body: body.to_string(),
    })
}

fn decoded_attr(xml: &str, element: &str, name: &str) -> String {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().expect("xml") {
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == element.as_bytes() => {
                let attr = e.try_get_attribute(name).expect("attr").expect("present");
                return attr.unescape_value().expect("unescape").into_owned();
            }
            Event::Eof => panic!("element {} not found", element),
            _ => {}
        }
    }
}

#[test]
fn reserved_characters_and_tab_round_trip() {
    let body = "a & b < c > d \"quoted\"\tend";
    let mut doc = DocumentAssembler::new();
    doc.append(sms_with_body(body));
    let xml = doc.finalize().expect("finalize");
    assert!(xml.contains("&#9;"));
    assert!(!xml.contains('\t'));
    assert_eq!(decoded_attr(&xml, "sms", "body"), body);
    assert_eq!(decoded_attr(&xml, "sms", "contact_name"), "Ann & \"Bob\"");
}

#[test]
fn line_breaks_survive_as_character_references() {
    let body = "line one\r\nline two\nline three";
    let mut doc = DocumentAssembler::new();
    doc.append(sms_with_body(body));
    let xml = doc.finalize().expect("finalize");
    assert!(xml.contains("line one&#13;&#10;line two&#10;line three"));
    assert_eq!(decoded_attr(&xml, "sms", "body"), body);
}

proptest! {
    #[test]
    fn any_printable_body_round_trips(body in "[ -~\t\r\n\u{e9}\u{1F600}]{0,64}") {
        let mut doc = DocumentAssembler::new();
        doc.append(sms_with_body(&body));
        let xml = doc.finalize().expect("finalize");
        prop_assert_eq!(decoded_attr(&xml, "sms", "body"), body);
    }
}
