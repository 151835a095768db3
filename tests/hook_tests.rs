//! Custom hook coverage: staged and defaulted field access, custom data
//! framing across mode boundaries, partial consumption, and validation
//! callbacks.

use graphwire::{
    ClassSchema, GraphReader, GraphWriter, GraphwireError, ObjectData, SchemaRegistry, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

fn encode(registry_values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    for v in registry_values {
        w.write_value(v).unwrap();
    }
    w.flush().unwrap();
    drop(w);
    out
}

#[test]
fn staged_fields_and_defaulted_reads() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let v1 = write_registry.register(
        ClassSchema::builder("t.Evo")
            .field_i32("x")
            .on_write(|w, _| {
                let mut fields = w.put_fields()?;
                fields.put_i32("x", 5)?;
                assert!(matches!(
                    fields.put_i32("nope", 1),
                    Err(GraphwireError::Usage(_))
                ));
                w.write_fields(fields)
            })
            .build(),
    );
    let bytes = encode(&[Value::object(ObjectData::new(&v1))]);

    let seen: Rc<RefCell<Option<(i32, i32, bool, bool)>>> = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Evo")
            .field_i32("x")
            .field_i32("y")
            .on_read(move |r, _| {
                let fields = r.read_fields()?;
                assert!(matches!(
                    fields.get_i32("z", 0),
                    Err(GraphwireError::Usage(_))
                ));
                *sink.borrow_mut() = Some((
                    fields.get_i32("x", 0)?,
                    fields.get_i32("y", 7)?,
                    fields.defaulted("x")?,
                    fields.defaulted("y")?,
                ));
                Ok(())
            })
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    r.read_value().unwrap();
    assert_eq!(*seen.borrow(), Some((5, 7, false, true)));
}

#[test]
fn custom_data_interleaves_primitives_and_values() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let mix = write_registry.register(
        ClassSchema::builder("t.Mix")
            .field_i32("a")
            .on_write(|w, _| {
                w.default_fields()?;
                w.write_i32(42)?;
                w.write_value(&Value::string("mid"))?;
                w.write_f64(1.5)?;
                w.write_utf("háček")
            })
            .build(),
    );
    let mut data = ObjectData::new(&mix);
    data.set_i32("a", 9).unwrap();
    let bytes = encode(&[Value::object(data)]);

    let done = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&done);
    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Mix")
            .field_i32("a")
            .on_read(move |r, _| {
                r.default_read_fields()?;
                assert_eq!(r.read_i32()?, 42);
                assert_eq!(r.read_value()?.as_str(), Some("mid"));
                assert_eq!(r.read_f64()?, 1.5);
                assert_eq!(r.read_utf()?, "háček");
                *flag.borrow_mut() = true;
                Ok(())
            })
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    assert!(*done.borrow());
    assert_eq!(back.as_object().unwrap().borrow().get_i32("a").unwrap(), 9);
}

#[test]
fn over_read_of_custom_data_signals_end_of_data() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let plain = write_registry.register(
        ClassSchema::builder("t.Plain")
            .field_i32("a")
            .on_write(|w, _| w.default_fields())
            .build(),
    );
    let bytes = encode(&[Value::object(ObjectData::new(&plain))]);

    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Plain")
            .field_i32("a")
            .on_read(|r, _| {
                r.default_read_fields()?;
                // the level carries no custom data beyond the field image
                match r.read_i32() {
                    Err(GraphwireError::OptionalData { length: 0, eof: true }) => Ok(()),
                    other => panic!("expected end-of-data, got {other:?}"),
                }
            })
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    r.read_value().unwrap();
}

#[test]
fn unconsumed_custom_data_is_skipped() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let chatty = write_registry.register(
        ClassSchema::builder("t.Chatty")
            .field_i32("a")
            .on_write(|w, _| {
                w.default_fields()?;
                w.write_i32(1)?;
                w.write_i64(2)?;
                w.write_value(&Value::string("extra"))
            })
            .build(),
    );
    let mut data = ObjectData::new(&chatty);
    data.set_i32("a", 3).unwrap();
    let bytes = encode(&[Value::object(data), Value::string("after")]);

    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Chatty")
            .field_i32("a")
            .on_read(|r, _| r.default_read_fields())
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    assert_eq!(back.as_object().unwrap().borrow().get_i32("a").unwrap(), 3);
    // the skipped custom data kept the stream in sync
    assert_eq!(r.read_value().unwrap().as_str(), Some("after"));
}

#[test]
fn validation_runs_highest_priority_first() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let plain = write_registry.register(ClassSchema::builder("t.Plain").field_i32("a").build());
    let bytes = encode(&[Value::object(ObjectData::new(&plain))]);

    let log: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Plain")
            .field_i32("a")
            .on_read(move |r, _| {
                r.default_read_fields()?;
                for priority in [1, 10, 5] {
                    let entry = Rc::clone(&sink);
                    r.register_validation(priority, move || {
                        entry.borrow_mut().push(priority);
                        Ok(())
                    })?;
                }
                Ok(())
            })
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    r.read_value().unwrap();
    assert_eq!(*log.borrow(), vec![10, 5, 1]);
}

#[test]
fn failing_validation_aborts_the_read() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let plain = write_registry.register(ClassSchema::builder("t.Plain").field_i32("a").build());
    let bytes = encode(&[Value::object(ObjectData::new(&plain))]);

    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Plain")
            .field_i32("a")
            .on_read(|r, _| {
                r.default_read_fields()?;
                r.register_validation(0, || {
                    Err(GraphwireError::Usage("graph invariant violated".to_string()))
                })
            })
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let err = r.read_value().unwrap_err();
    assert!(matches!(err, GraphwireError::Usage(_)), "{err}");
}

#[test]
fn double_field_write_is_a_usage_error() {
    let registry = Rc::new(SchemaRegistry::new());
    let greedy = registry.register(
        ClassSchema::builder("t.Greedy")
            .field_i32("a")
            .on_write(|w, _| {
                w.default_fields()?;
                w.default_fields()
            })
            .build(),
    );
    let mut out = Vec::new();
    let mut w = GraphWriter::new(&mut out).unwrap();
    let err = w.write_value(&Value::object(ObjectData::new(&greedy))).unwrap_err();
    assert!(matches!(err, GraphwireError::Usage(_)), "{err}");
}

#[test]
fn hook_populates_the_object_it_receives() {
    let write_registry = Rc::new(SchemaRegistry::new());
    let counted = write_registry.register(
        ClassSchema::builder("t.Counted")
            .field_i32("stored")
            .on_write(|w, _| {
                w.default_fields()?;
                w.write_i32(100)
            })
            .build(),
    );
    let mut data = ObjectData::new(&counted);
    data.set_i32("stored", 1).unwrap();
    let bytes = encode(&[Value::object(data)]);

    let registry = Rc::new(SchemaRegistry::new());
    registry.register(
        ClassSchema::builder("t.Counted")
            .field_i32("stored")
            .field_i32("derived")
            .on_read(|r, obj| {
                r.default_read_fields()?;
                let bonus = r.read_i32()?;
                let data = obj.as_object().ok_or_else(|| {
                    GraphwireError::Usage("hook invoked without an object".to_string())
                })?;
                let mut data = data.borrow_mut();
                let stored = data.get_i32("stored")?;
                data.set_i32("derived", stored + bonus)
            })
            .build(),
    );
    let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
    let back = r.read_value().unwrap();
    let obj = back.as_object().unwrap().borrow();
    assert_eq!(obj.get_i32("stored").unwrap(), 1);
    assert_eq!(obj.get_i32("derived").unwrap(), 101);
}
