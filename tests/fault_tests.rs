//! Fault semantics: resolution faults taint exactly the affected values,
//! structural faults abort, and the in-band abort marker crosses the wire.

use graphwire::{
    ArrayData, ArrayElems, ClassSchema, GraphReader, GraphWriter, GraphwireError, ObjectData,
    SchemaRegistry, Value,
};
use std::rc::Rc;

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
fn unknown_class_faults_without_desyncing_the_stream() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let ghost = write_registry.register(ClassSchema::builder("t.Ghost").field_i32("x").build());
    let bytes = encode(&[Value::object(ObjectData::new(&ghost)), Value::string("after")]);

    // reading side never registered t.Ghost
    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, GraphwireError::UnresolvedClass(_)), "{err}");
    // the faulted object's data was consumed: the next value is intact
    assert_eq!(r.read_value().unwrap().as_str(), Some("after"));
}

#[test]
fn version_mismatch_faults_like_a_missing_class() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let v1 = write_registry.register(
        ClassSchema::builder("t.Versioned")
            .version(1)
            .field_i32("x")
            .build(),
    );
    let bytes = encode(&[Value::object(ObjectData::new(&v1)), Value::string("after")]);

    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Versioned")
            .version(2)
            .field_i32("x")
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, GraphwireError::UnresolvedClass(_)), "{err}");
    assert_eq!(r.read_value().unwrap().as_str(), Some("after"));
}

#[test]
fn field_fault_taints_the_owning_object() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let ghost = write_registry.register(ClassSchema::builder("t.Ghost").field_i32("x").build());
    let holder = write_registry.register(
        ClassSchema::builder("t.Holder")
            .field_object("inner", "t.Ghost")
            .build(),
    );
    let mut data = ObjectData::new(&holder);
    data.set_value("inner", Value::object(ObjectData::new(&ghost)))
        .unwrap();
    let bytes = encode(&[Value::object(data)]);

    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Holder")
            .field_object("inner", "t.Ghost")
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    // the holder itself resolves, but it embeds a faulted value
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, GraphwireError::UnresolvedClass(_)), "{err}");
}

#[test]
fn array_elements_fault_in_isolation() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let ghost = write_registry.register(ClassSchema::builder("t.Ghost").field_i32("x").build());
    let known = write_registry.register(ClassSchema::builder("t.Known").field_i32("x").build());
    let arr_schema = write_registry.array_schema("[Lt.Any;").unwrap();
    let mut ok = ObjectData::new(&known);
    ok.set_i32("x", 5).unwrap();
    let elems = ArrayElems::Ref(vec![
        Value::object(ObjectData::new(&ghost)),
        Value::object(ok),
    ]);
    let bytes = encode(&[Value::array(ArrayData::new(arr_schema, elems).unwrap())]);

    let registry = Rc::new(SchemaRegistry::new());
    registry.register(ClassSchema::builder("t.Known").field_i32("x").build());
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    let data = back.as_array().unwrap().borrow();
    match &data.elems {
        ArrayElems::Ref(vals) => {
            assert!(matches!(
                vals[0].as_fault(),
                Some(GraphwireError::UnresolvedClass(_))
            ));
            let sibling = vals[1].as_object().unwrap().borrow();
            assert_eq!(sibling.get_i32("x").unwrap(), 5);
        }
        other => panic!("unexpected element storage: {other:?}"),
    }
}

#[test]
fn unknown_enum_constant_faults() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let wide = write_registry.register(ClassSchema::enumeration("t.Mode", &["A", "X"]));
    let x = write_registry.enum_value(&wide, "X").unwrap();
    let bytes = encode(&[x, Value::string("after")]);

    let registry = Rc::new(SchemaRegistry::new());
    registry.register(ClassSchema::enumeration("t.Mode", &["A"]));
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    match r.read_value().unwrap_err() {
        GraphwireError::UnresolvedConstant { class, constant } => {
            assert_eq!(class, "t.Mode");
            assert_eq!(constant, "X");
        }
        other => panic!("unexpected fault: {other}"),
    }
    assert_eq!(r.read_value().unwrap().as_str(), Some("after"));
}

#[test]
fn failed_write_leaves_an_abort_marker() {
    let registry = Rc::new(SchemaRegistry::new());
    let bomb = registry.register(
        ClassSchema::builder("t.Bomb")
            .field_i32("x")
            .write_replace(|_| Err(GraphwireError::Usage("armed".to_string())))
            .build(),
    );

    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    let err = w.write_value(&Value::object(ObjectData::new(&bomb))).unwrap_err();
    assert!(matches!(err, GraphwireError::Usage(_)), "{err}");
    w.flush().unwrap();
    drop(w);

    let mut r = GraphReader::new(out.as_slice(), registry).unwrap();
    match r.read_value().unwrap_err() {
        GraphwireError::Aborted(msg) => assert!(msg.contains("armed"), "{msg}"),
        other => panic!("unexpected fault: {other}"),
    }
}

#[test]
fn writing_a_fault_placeholder_is_a_usage_error() {
    let fault = Value::Fault(Rc::new(GraphwireError::Format("old".to_string())));
    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    let err = w.write_value(&fault).unwrap_err();
    assert!(matches!(err, GraphwireError::Usage(_)), "{err}");
}

#[test]
fn bad_magic_is_rejected() {
    let registry = Rc::new(SchemaRegistry::new());
    let err = GraphReader::new(&[0xDEu8, 0xAD, 0x00, 0x05][..], registry).unwrap_err();
    assert!(matches!(err, GraphwireError::Format(_)), "{err}");
}

#[test]
fn truncated_header_is_an_io_fault() {
    let registry = Rc::new(SchemaRegistry::new());
    let err = GraphReader::new(&[0xACu8][..], registry).unwrap_err();
    assert!(matches!(err, GraphwireError::Io(_)), "{err}");
}

#[test]
fn back_reference_to_unassigned_handle_is_rejected() {
    let registry = Rc::new(SchemaRegistry::new());
    // header, then a reference tag pointing at wire handle 0x7E0005
    let bytes = [
        0xACu8, 0xED, 0x00, 0x05, 0x71, 0x00, 0x7E, 0x00, 0x05,
    ];
    let mut r = GraphReader::new(&bytes[..], registry).unwrap();
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, GraphwireError::Format(_)), "{err}");
}

#[test]
fn externalizable_descriptors_are_rejected() {
    // header, object tag, inline descriptor "t.X" with suid 0 and the
    // externalizable flag bit set
    let mut bytes = vec![0xACu8, 0xED, 0x00, 0x05, 0x73, 0x72, 0x00, 0x03];
    bytes.extend_from_slice(b"t.X");
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.push(0x04);

    let registry = Rc::new(SchemaRegistry::new());
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, GraphwireError::Format(_)), "{err}");
}

#[test]
fn unknown_tag_is_rejected() {
    let registry = Rc::new(SchemaRegistry::new());
    let bytes = [0xACu8, 0xED, 0x00, 0x05, 0x6F];
    let mut r = GraphReader::new(&bytes[..], registry).unwrap();
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, GraphwireError::Format(_)), "{err}");
}
