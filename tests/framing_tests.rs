//! Physical-layer behavior: string tag selection at the length boundary,
//! primitive data spanning frame boundaries, explicit resets, and rejection
//! of malformed text bodies.

use graphwire::{GraphReader, GraphWriter, GraphwireError, SchemaRegistry, Value};
use std::rc::Rc;

const TC_STRING: u8 = 0x74;
const TC_LONGSTRING: u8 = 0x7C;

fn encode(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    for v in values {
        w.write_value(v).unwrap();
    }
    w.flush().unwrap();
    drop(w);
    out
}

#[test]
fn string_tag_switches_at_the_u16_length_boundary() {
    let short = "a".repeat(65535);
    let bytes = encode(&[Value::string(&short)]);
    assert_eq!(bytes[4], TC_STRING);
    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    assert_eq!(r.read_value().unwrap().as_str(), Some(short.as_str()));

    let long = "a".repeat(65536);
    let bytes = encode(&[Value::string(&long)]);
    assert_eq!(bytes[4], TC_LONGSTRING);
    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    assert_eq!(r.read_value().unwrap().as_str(), Some(long.as_str()));
}

#[test]
fn primitive_data_spans_frame_boundaries() {
    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    w.write_i8(7).unwrap();
    for i in 0..200 {
        w.write_f64(f64::from(i) * 0.5).unwrap();
    }
    w.flush().unwrap();
    drop(w);

    // 1601 bytes of primitive data: more than one frame, with one f64
    // split across the frame boundary
    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(out.as_slice(), registry).unwrap();
    assert_eq!(r.read_i8().unwrap(), 7);
    for i in 0..200 {
        assert_eq!(r.read_f64().unwrap(), f64::from(i) * 0.5);
    }
}

#[test]
fn bulk_bytes_roundtrip_through_frames() {
    let payload: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    w.write_bytes(&payload).unwrap();
    w.flush().unwrap();
    drop(w);

    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(out.as_slice(), registry).unwrap();
    let mut back = vec![0u8; payload.len()];
    r.read_bytes(&mut back).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn reset_forgets_prior_handles() {
    let s = Value::string("dup");
    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    w.write_value(&s).unwrap();
    w.reset().unwrap();
    w.write_value(&s).unwrap();
    w.flush().unwrap();
    drop(w);

    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(out.as_slice(), registry).unwrap();
    let first = r.read_value().unwrap();
    let second = r.read_value().unwrap();
    assert_eq!(first.as_str(), Some("dup"));
    assert_eq!(second.as_str(), Some("dup"));
    // the second occurrence was re-encoded in full, not back-referenced
    assert!(!Value::ptr_eq(&first, &second));
}

#[test]
fn malformed_text_body_is_a_format_fault() {
    // header, short-string tag, declared length 2, invalid byte sequence
    let bytes = [0xACu8, 0xED, 0x00, 0x05, TC_STRING, 0x00, 0x02, 0xC3, 0x28];
    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(&bytes[..], registry).unwrap();
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, GraphwireError::Format(_)), "{err}");
}

#[test]
fn supplementary_characters_roundtrip() {
    let text = "clef: \u{1D11E}, face: \u{1F600}, mixed: žluťoučký";
    let bytes = encode(&[Value::string(text)]);
    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    assert_eq!(r.read_value().unwrap().as_str(), Some(text));
}
