//! End-to-end encode/decode coverage: primitives, identity, sharing, cycles,
//! enums, classes, and the unshared write/read paths.

use graphwire::{
    ClassSchema, GraphReader, GraphWriter, ObjectData, Result, SchemaRegistry, Value,
};
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;

fn registry_with_point() -> (Rc<SchemaRegistry>, Rc<ClassSchema>) {
    let registry = Rc::new(SchemaRegistry::new());
    let point = registry.register(
        ClassSchema::builder("geo.Point")
            .version(1)
            .field_bool("visible")
            .field_i8("tag")
            .field_char("glyph")
            .field_i16("layer")
            .field_i32("x")
            .field_i64("id")
            .field_f32("weight")
            .field_f64("precision")
            .field_object("label", "core.String")
            .build(),
    );
    (registry, point)
}

fn encode(values: &[Value]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out)?;
    for v in values {
        w.write_value(v)?;
    }
    w.flush()?;
    drop(w);
    Ok(out)
}

#[test]
fn all_primitive_kinds_roundtrip() {
    let (registry, point) = registry_with_point();
    let mut data = ObjectData::new(&point);
    data.set_bool("visible", true).unwrap();
    data.set_i8("tag", -7).unwrap();
    data.set_char("glyph", 0x2603).unwrap();
    data.set_i16("layer", -300).unwrap();
    data.set_i32("x", 123_456).unwrap();
    data.set_i64("id", -9_876_543_210).unwrap();
    data.set_f32("weight", 2.5).unwrap();
    data.set_f64("precision", -0.125).unwrap();
    data.set_value("label", Value::string("origin")).unwrap();

    let bytes = encode(&[Value::object(data)]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    let obj = back.as_object().unwrap().borrow();
    assert!(obj.get_bool("visible").unwrap());
    assert_eq!(obj.get_i8("tag").unwrap(), -7);
    assert_eq!(obj.get_char("glyph").unwrap(), 0x2603);
    assert_eq!(obj.get_i16("layer").unwrap(), -300);
    assert_eq!(obj.get_i32("x").unwrap(), 123_456);
    assert_eq!(obj.get_i64("id").unwrap(), -9_876_543_210);
    assert_eq!(obj.get_f32("weight").unwrap(), 2.5);
    assert_eq!(obj.get_f64("precision").unwrap(), -0.125);
    assert_eq!(
        obj.get_value("label").unwrap().as_str(),
        Some("origin")
    );
}

#[test]
fn shared_nodes_keep_identity() {
    let registry = Rc::new(SchemaRegistry::new());
    let holder = registry.register(
        ClassSchema::builder("t.Holder")
            .field_object("left", "core.String")
            .field_object("right", "core.String")
            .build(),
    );
    let shared = Value::string("only-once");
    let mut data = ObjectData::new(&holder);
    data.set_value("left", shared.clone()).unwrap();
    data.set_value("right", shared).unwrap();

    let bytes = encode(&[Value::object(data)]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    let obj = back.as_object().unwrap().borrow();
    let left = obj.get_value("left").unwrap();
    let right = obj.get_value("right").unwrap();
    assert!(Value::ptr_eq(&left, &right));
}

#[test]
fn two_node_cycle_roundtrips() {
    let registry = Rc::new(SchemaRegistry::new());
    let node = registry.register(
        ClassSchema::builder("t.Node")
            .field_i32("n")
            .field_object("next", "t.Node")
            .build(),
    );
    let a = Value::object(ObjectData::new(&node));
    let b = Value::object(ObjectData::new(&node));
    {
        let mut ad = a.as_object().unwrap().borrow_mut();
        ad.set_i32("n", 1).unwrap();
        ad.set_value("next", b.clone()).unwrap();
    }
    {
        let mut bd = b.as_object().unwrap().borrow_mut();
        bd.set_i32("n", 2).unwrap();
        bd.set_value("next", a.clone()).unwrap();
    }

    let bytes = encode(&[a]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let root = r.read_value().unwrap();
    let next = root.as_object().unwrap().borrow().get_value("next").unwrap();
    let back = next.as_object().unwrap().borrow().get_value("next").unwrap();
    assert_eq!(next.as_object().unwrap().borrow().get_i32("n").unwrap(), 2);
    assert!(Value::ptr_eq(&back, &root));
}

#[test]
fn repeated_string_in_array_is_one_node() {
    let registry = Rc::new(SchemaRegistry::new());
    let boxed = registry.register(ClassSchema::builder("core.Integer").field_i32("value").build());
    let arr_schema = registry.array_schema("[Lcore.Object;").unwrap();
    let a = Value::string("a");
    let mut mid = ObjectData::new(&boxed);
    mid.set_i32("value", 42).unwrap();
    let elems = graphwire::ArrayElems::Ref(vec![a.clone(), Value::object(mid), a]);
    let arr = Value::array(graphwire::ArrayData::new(arr_schema, elems).unwrap());

    let bytes = encode(&[arr]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    let data = back.as_array().unwrap().borrow();
    match &data.elems {
        graphwire::ArrayElems::Ref(vals) => {
            assert_eq!(vals.len(), 3);
            assert_eq!(vals[0].as_str(), Some("a"));
            // the unrelated middle value decodes between the two shared slots
            let mid = vals[1].as_object().unwrap().borrow();
            assert_eq!(mid.get_i32("value").unwrap(), 42);
            assert!(Value::ptr_eq(&vals[0], &vals[2]));
        }
        other => panic!("unexpected element storage: {other:?}"),
    }
}

#[test]
fn enum_constants_are_interned() {
    let registry = Rc::new(SchemaRegistry::new());
    let color = registry.register(ClassSchema::enumeration("t.Color", &["RED", "GREEN"]));
    let red = registry.enum_value(&color, "RED").unwrap();

    let bytes = encode(&[red.clone(), red]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), Rc::clone(&registry)).unwrap();
    let first = r.read_value().unwrap();
    let second = r.read_value().unwrap();
    assert_eq!(&*first.as_enum().unwrap().constant, "RED");
    assert!(Value::ptr_eq(&first, &second));
}

#[test]
fn class_values_resolve_to_local_schema() {
    let registry = Rc::new(SchemaRegistry::new());
    let point = registry.register(ClassSchema::builder("geo.Point").field_i32("x").build());

    let bytes = encode(&[Value::Class(Rc::clone(&point))]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    assert!(Rc::ptr_eq(back.as_class().unwrap(), &point));
}

#[test]
fn null_roundtrips() {
    let registry = Rc::new(SchemaRegistry::new());
    let bytes = encode(&[Value::Null]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    assert!(r.read_value().unwrap().is_null());
}

#[test]
fn back_references_span_top_level_writes() {
    let registry = Rc::new(SchemaRegistry::new());
    let s = Value::string("spanning");

    let bytes = encode(&[s.clone(), s]).unwrap();
    // the second write must be a 5-byte reference, not a second copy
    let first_len = encode(&[Value::string("spanning")]).unwrap().len();
    assert_eq!(bytes.len(), first_len + 5);

    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let first = r.read_value().unwrap();
    let second = r.read_value().unwrap();
    assert!(Value::ptr_eq(&first, &second));
}

#[test]
fn unshared_write_never_back_references() {
    let registry = Rc::new(SchemaRegistry::new());
    let s = Value::string("twice");

    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    w.write_value_unshared(&s).unwrap();
    w.write_value(&s).unwrap();
    w.flush().unwrap();
    drop(w);

    let mut r = GraphReader::new(out.as_slice(), registry).unwrap();
    let first = r.read_value().unwrap();
    let second = r.read_value().unwrap();
    assert_eq!(first.as_str(), Some("twice"));
    assert_eq!(second.as_str(), Some("twice"));
    assert!(!Value::ptr_eq(&first, &second));
}

#[test]
fn unshared_read_slot_rejects_later_back_reference() {
    let registry = Rc::new(SchemaRegistry::new());
    let s = Value::string("pinned");
    let bytes = encode(&[s.clone(), s]).unwrap();

    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let first = r.read_value_unshared().unwrap();
    assert_eq!(first.as_str(), Some("pinned"));
    // the stream back-references handle 0, which this reader refused to share
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, graphwire::GraphwireError::Format(_)), "{err}");
}

#[test]
fn write_replace_substitutes_and_memoizes() {
    let registry = Rc::new(SchemaRegistry::new());
    let secret = registry.register(
        ClassSchema::builder("t.Secret")
            .field_i32("code")
            .write_replace(|_| Ok(Some(Value::string("redacted"))))
            .build(),
    );
    let v = Value::object(ObjectData::new(&secret));

    let bytes = encode(&[v.clone(), v]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let first = r.read_value().unwrap();
    let second = r.read_value().unwrap();
    assert_eq!(first.as_str(), Some("redacted"));
    assert!(Value::ptr_eq(&first, &second));
}

#[test]
fn read_resolve_substitutes_and_covers_back_references() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let token_w = write_registry.register(ClassSchema::builder("t.Token").field_i32("id").build());
    let v = Value::object(ObjectData::new(&token_w));
    let bytes = encode(&[v.clone(), v]).unwrap();

    let read_registry = Rc::new(SchemaRegistry::new());
    read_registry.register(
        ClassSchema::builder("t.Token")
            .field_i32("id")
            .read_resolve(|_| Ok(Some(Value::string("canonical"))))
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), read_registry).unwrap();
    let first = r.read_value().unwrap();
    let second = r.read_value().unwrap();
    assert_eq!(first.as_str(), Some("canonical"));
    assert!(Value::ptr_eq(&first, &second));
}

#[test]
fn unshared_read_resolve_array_is_detached() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let token_w = write_registry.register(ClassSchema::builder("t.Token").field_i32("id").build());
    let bytes = encode(&[Value::object(ObjectData::new(&token_w))]).unwrap();

    let read_registry = Rc::new(SchemaRegistry::new());
    let arr_schema = read_registry.array_schema("[I").unwrap();
    let canned = Value::array(
        graphwire::ArrayData::new(arr_schema, graphwire::ArrayElems::I32(vec![1, 2, 3])).unwrap(),
    );
    let hook_instance = canned.clone();
    read_registry.register(
        ClassSchema::builder("t.Token")
            .field_i32("id")
            .read_resolve(move |_| Ok(Some(hook_instance.clone())))
            .build(),
    );

    let mut r = GraphReader::new(bytes.as_slice(), read_registry).unwrap();
    let back = r.read_value_unshared().unwrap();
    // the caller must not alias the hook's own array instance
    assert!(!Value::ptr_eq(&back, &canned));
    let data = back.as_array().unwrap().borrow();
    match &data.elems {
        graphwire::ArrayElems::I32(xs) => assert_eq!(xs, &[1, 2, 3]),
        other => panic!("unexpected element storage: {other:?}"),
    }
}

#[test]
fn schema_evolution_tolerates_added_and_removed_fields() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let v1 = write_registry.register(
        ClassSchema::builder("t.Evolving")
            .field_i32("kept")
            .field_i32("dropped")
            .build(),
    );
    let mut data = ObjectData::new(&v1);
    data.set_i32("kept", 11).unwrap();
    data.set_i32("dropped", 99).unwrap();
    let bytes = encode(&[Value::object(data)]).unwrap();

    let read_registry = Rc::new(SchemaRegistry::new());
    read_registry.register(
        ClassSchema::builder("t.Evolving")
            .field_i32("kept")
            .field_i32("added")
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), read_registry).unwrap();
    let back = r.read_value().unwrap();
    let obj = back.as_object().unwrap().borrow();
    assert_eq!(obj.get_i32("kept").unwrap(), 11);
    // absent from the stream: keeps its zeroed default
    assert_eq!(obj.get_i32("added").unwrap(), 0);
}

#[test]
fn inheritance_chain_roundtrips() {
    let registry = Rc::new(SchemaRegistry::new());
    let base = registry.register(ClassSchema::builder("t.Base").field_i32("b").build());
    let derived = registry.register(
        ClassSchema::builder("t.Derived")
            .extends(Rc::clone(&base))
            .field_i32("d")
            .build(),
    );
    let mut data = ObjectData::new(&derived);
    data.set_i32("b", 1).unwrap();
    data.set_i32("d", 2).unwrap();

    let bytes = encode(&[Value::object(data)]).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    let obj = back.as_object().unwrap().borrow();
    assert_eq!(obj.get_i32("b").unwrap(), 1);
    assert_eq!(obj.get_i32("d").unwrap(), 2);
}

#[test]
fn proxy_descriptors_resolve_by_interface_list() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let proxy_w = write_registry.register(ClassSchema::proxy("$Proxy0", &["t.Greeter", "t.Closer"]));

    let bytes = encode(&[Value::Class(proxy_w)]).unwrap();
    let read_registry = Rc::new(SchemaRegistry::new());
    // a different proxy class name, same interface list
    let proxy_r = read_registry.register(ClassSchema::proxy("$Proxy7", &["t.Greeter", "t.Closer"]));
    let mut r = GraphReader::new(bytes.as_slice(), read_registry).unwrap();
    let back = r.read_value().unwrap();
    assert!(Rc::ptr_eq(back.as_class().unwrap(), &proxy_r));
}

#[test]
fn stream_level_replacer_and_resolver_substitute() {
    let registry = Rc::new(SchemaRegistry::new());

    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    w.set_replacer(|v| {
        Ok(match v.as_str() {
            Some("secret") => Some(Value::string("masked")),
            _ => None,
        })
    });
    w.write_value(&Value::string("secret")).unwrap();
    w.write_value(&Value::string("plain")).unwrap();
    w.flush().unwrap();
    drop(w);

    let mut r = GraphReader::new(out.as_slice(), registry).unwrap();
    r.set_resolver(|v| {
        Ok(match v.as_str() {
            Some("masked") => Some(Value::string("resolved")),
            _ => None,
        })
    });
    assert_eq!(r.read_value().unwrap().as_str(), Some("resolved"));
    assert_eq!(r.read_value().unwrap().as_str(), Some("plain"));
}

#[test]
fn file_backed_stream_roundtrips() {
    let registry = Rc::new(SchemaRegistry::new());
    let point = registry.register(ClassSchema::builder("geo.Point").field_i32("x").build());
    let mut data = ObjectData::new(&point);
    data.set_i32("x", 77).unwrap();

    let file = tempfile::tempfile().unwrap();
    let mut w = GraphWriter::new(file).unwrap();
    w.write_value(&Value::object(data)).unwrap();
    let mut file = w.into_inner().unwrap();
    file.flush().unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).unwrap();
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    assert_eq!(
        back.as_object().unwrap().borrow().get_i32("x").unwrap(),
        77
    );
}
