//! Randomized round-trips over the codec.

use graphwire::{ArrayData, ArrayElems, GraphReader, GraphWriter, SchemaRegistry, Value};
use proptest::prelude::*;
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

proptest! {
    #[test]
    fn strings_roundtrip(s in "\\PC*") {
        let bytes = encode(&[Value::string(&s)]);
        let registry = Rc::new(SchemaRegistry::new());
        let mut r = GraphReader::new(bytes.as_slice(), registry).unwrap();
        let back = r.read_value().unwrap();
        prop_assert_eq!(back.as_str(), Some(s.as_str()));
    }

    #[test]
    fn i32_arrays_roundtrip(xs in proptest::collection::vec(any::<i32>(), 0..600)) {
        let registry = Rc::new(SchemaRegistry::new());
        let schema = registry.array_schema("[I").unwrap();
        let arr = ArrayData::new(schema, ArrayElems::I32(xs.clone())).unwrap();
        let bytes = encode(&[Value::array(arr)]);

        let mut r = GraphReader::new(bytes.as_slice(), Rc::clone(&registry)).unwrap();
        let back = r.read_value().unwrap();
        let data = back.as_array().unwrap().borrow();
        match &data.elems {
            ArrayElems::I32(ys) => prop_assert_eq!(ys, &xs),
            other => prop_assert!(false, "unexpected element storage: {:?}", other),
        }
    }

    #[test]
    fn primitive_sequences_roundtrip(
        ints in proptest::collection::vec(any::<i64>(), 0..300),
        floats in proptest::collection::vec(any::<f64>(), 0..300),
    ) {
        let mut out = Vec::new();
        let mut w = GraphWriter::new(&mut out).unwrap();
        for &i in &ints {
            w.write_i64(i).unwrap();
        }
        for &f in &floats {
            w.write_f64(f).unwrap();
        }
        w.flush().unwrap();
        drop(w);

        let registry = Rc::new(SchemaRegistry::new());
        let mut r = GraphReader::new(out.as_slice(), registry).unwrap();
        for &i in &ints {
            prop_assert_eq!(r.read_i64().unwrap(), i);
        }
        for &f in &floats {
            let back = r.read_f64().unwrap();
            prop_assert!(back == f || (back.is_nan() && f.is_nan()));
        }
    }
}
