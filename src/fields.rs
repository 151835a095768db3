//! Field adapters for custom hooks: staged writes ([`PutField`]) and
//! schema-tolerant reads ([`GetField`]).
//!
//! A `PutField` stages one level's field image by name before anything touches
//! the stream; `write_fields` consumes it by value, so a staged image cannot
//! be replayed or leak across levels. A `GetField` holds one level's decoded
//! field image keyed by the *stream* schema, and falls back to caller-supplied
//! defaults for fields the stream did not carry, the escape hatch for schema
//! evolution.

use crate::error::{GraphwireError, Result};
use crate::schema::{ClassSchema, FieldDesc, TypeCode};
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

// --- PUT ---

/// Staged field image for one schema level, written by a custom write hook.
pub struct PutField {
    schema: Rc<ClassSchema>,
    prims: Vec<u8>,
    objs: Vec<Value>,
}

impl fmt::Debug for PutField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutField")
            .field("schema", &self.schema.name())
            .finish_non_exhaustive()
    }
}

impl PutField {
    pub(crate) fn new(schema: Rc<ClassSchema>) -> Self {
        let prims = vec![0u8; schema.prim_data_size()];
        let objs = vec![Value::Null; schema.num_obj_fields()];
        Self {
            schema,
            prims,
            objs,
        }
    }

    pub(crate) fn schema(&self) -> &Rc<ClassSchema> {
        &self.schema
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<Value>) {
        (self.prims, self.objs)
    }

    fn field(&self, name: &str, code: TypeCode) -> Result<FieldDesc> {
        let f = self.schema.field(name).ok_or_else(|| {
            GraphwireError::Usage(format!(
                "no field {name:?} declared by {}",
                self.schema.name()
            ))
        })?;
        if f.code() != code {
            return Err(GraphwireError::Usage(format!(
                "field {name:?} has kind {:?}, not {code:?}",
                f.code()
            )));
        }
        Ok(f.clone())
    }

    fn put_bytes(&mut self, f: &FieldDesc, bytes: &[u8]) -> Result<()> {
        let dst = self
            .prims
            .get_mut(f.offset()..f.offset() + bytes.len())
            .ok_or_else(|| {
                GraphwireError::Internal(format!("primitive offset {} out of range", f.offset()))
            })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Stages a `bool` field.
    pub fn put_bool(&mut self, name: &str, v: bool) -> Result<()> {
        let f = self.field(name, TypeCode::Bool)?;
        self.put_bytes(&f, &[u8::from(v)])
    }

    /// Stages an `i8` field.
    pub fn put_i8(&mut self, name: &str, v: i8) -> Result<()> {
        let f = self.field(name, TypeCode::I8)?;
        self.put_bytes(&f, &[v as u8])
    }

    /// Stages a UTF-16 code unit field.
    pub fn put_char(&mut self, name: &str, v: u16) -> Result<()> {
        let f = self.field(name, TypeCode::Char)?;
        self.put_bytes(&f, &v.to_be_bytes())
    }

    /// Stages an `i16` field.
    pub fn put_i16(&mut self, name: &str, v: i16) -> Result<()> {
        let f = self.field(name, TypeCode::I16)?;
        self.put_bytes(&f, &v.to_be_bytes())
    }

    /// Stages an `i32` field.
    pub fn put_i32(&mut self, name: &str, v: i32) -> Result<()> {
        let f = self.field(name, TypeCode::I32)?;
        self.put_bytes(&f, &v.to_be_bytes())
    }

    /// Stages an `i64` field.
    pub fn put_i64(&mut self, name: &str, v: i64) -> Result<()> {
        let f = self.field(name, TypeCode::I64)?;
        self.put_bytes(&f, &v.to_be_bytes())
    }

    /// Stages an `f32` field.
    pub fn put_f32(&mut self, name: &str, v: f32) -> Result<()> {
        let f = self.field(name, TypeCode::F32)?;
        self.put_bytes(&f, &v.to_bits().to_be_bytes())
    }

    /// Stages an `f64` field.
    pub fn put_f64(&mut self, name: &str, v: f64) -> Result<()> {
        let f = self.field(name, TypeCode::F64)?;
        self.put_bytes(&f, &v.to_bits().to_be_bytes())
    }

    /// Stages a reference field (object or array kind).
    pub fn put_value(&mut self, name: &str, v: Value) -> Result<()> {
        let f = self
            .field(name, TypeCode::Object)
            .or_else(|_| self.field(name, TypeCode::Array))?;
        let slot = self.objs.get_mut(f.offset()).ok_or_else(|| {
            GraphwireError::Internal(format!("reference slot {} out of range", f.offset()))
        })?;
        *slot = v;
        Ok(())
    }
}

// --- GET ---

/// Decoded field image for one stream level, read by a custom read hook.
///
/// Lookups are answered from the stream image when the stream carried the
/// field, and from the supplied default when only the local schema declares
/// it. Asking for a field neither side declares is a usage fault.
pub struct GetField {
    local: Option<Rc<ClassSchema>>,
    stream_fields: Vec<FieldDesc>,
    prims: Vec<u8>,
    objs: Vec<Value>,
}

impl fmt::Debug for GetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetField")
            .field("stream_fields", &self.stream_fields.len())
            .finish_non_exhaustive()
    }
}

impl GetField {
    pub(crate) fn new(
        local: Option<Rc<ClassSchema>>,
        stream_fields: Vec<FieldDesc>,
        prims: Vec<u8>,
        objs: Vec<Value>,
    ) -> Self {
        Self {
            local,
            stream_fields,
            prims,
            objs,
        }
    }

    fn stream_field(&self, name: &str, code: TypeCode) -> Result<Option<&FieldDesc>> {
        match self.stream_fields.iter().find(|f| f.name() == name) {
            Some(f) if f.code() == code => Ok(Some(f)),
            Some(f) => Err(GraphwireError::Usage(format!(
                "stream field {name:?} has kind {:?}, not {code:?}",
                f.code()
            ))),
            None => Ok(None),
        }
    }

    fn check_declared(&self, name: &str) -> Result<()> {
        let locally = self
            .local
            .as_ref()
            .is_some_and(|l| l.field(name).is_some());
        if locally {
            Ok(())
        } else {
            Err(GraphwireError::Usage(format!(
                "field {name:?} is declared by neither the stream nor the local schema"
            )))
        }
    }

    /// Whether `name` was absent from the stream (so a `get_*` call would
    /// return the supplied default).
    pub fn defaulted(&self, name: &str) -> Result<bool> {
        if self.stream_fields.iter().any(|f| f.name() == name) {
            return Ok(false);
        }
        self.check_declared(name)?;
        Ok(true)
    }

    fn prim_bytes(&self, f: &FieldDesc, len: usize) -> Result<&[u8]> {
        self.prims.get(f.offset()..f.offset() + len).ok_or_else(|| {
            GraphwireError::Internal(format!("primitive offset {} out of range", f.offset()))
        })
    }

    /// Reads a `bool` field, or `default` when the stream omitted it.
    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.stream_field(name, TypeCode::Bool)? {
            Some(f) => Ok(self.prim_bytes(f, 1)?[0] != 0),
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }

    /// Reads an `i8` field, or `default` when the stream omitted it.
    pub fn get_i8(&self, name: &str, default: i8) -> Result<i8> {
        match self.stream_field(name, TypeCode::I8)? {
            Some(f) => Ok(self.prim_bytes(f, 1)?[0] as i8),
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }

    /// Reads a UTF-16 code unit field, or `default` when the stream omitted it.
    pub fn get_char(&self, name: &str, default: u16) -> Result<u16> {
        match self.stream_field(name, TypeCode::Char)? {
            Some(f) => {
                let b = self.prim_bytes(f, 2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]))
            }
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }

    /// Reads an `i16` field, or `default` when the stream omitted it.
    pub fn get_i16(&self, name: &str, default: i16) -> Result<i16> {
        match self.stream_field(name, TypeCode::I16)? {
            Some(f) => {
                let b = self.prim_bytes(f, 2)?;
                Ok(i16::from_be_bytes([b[0], b[1]]))
            }
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }

    /// Reads an `i32` field, or `default` when the stream omitted it.
    pub fn get_i32(&self, name: &str, default: i32) -> Result<i32> {
        match self.stream_field(name, TypeCode::I32)? {
            Some(f) => {
                let b = self.prim_bytes(f, 4)?;
                Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }

    /// Reads an `i64` field, or `default` when the stream omitted it.
    pub fn get_i64(&self, name: &str, default: i64) -> Result<i64> {
        match self.stream_field(name, TypeCode::I64)? {
            Some(f) => {
                let b = self.prim_bytes(f, 8)?;
                Ok(i64::from_be_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }

    /// Reads an `f32` field, or `default` when the stream omitted it.
    pub fn get_f32(&self, name: &str, default: f32) -> Result<f32> {
        match self.stream_field(name, TypeCode::F32)? {
            Some(f) => {
                let b = self.prim_bytes(f, 4)?;
                Ok(f32::from_bits(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            }
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }

    /// Reads an `f64` field, or `default` when the stream omitted it.
    pub fn get_f64(&self, name: &str, default: f64) -> Result<f64> {
        match self.stream_field(name, TypeCode::F64)? {
            Some(f) => {
                let b = self.prim_bytes(f, 8)?;
                Ok(f64::from_bits(u64::from_be_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ])))
            }
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }

    /// Reads a reference field, or `default` when the stream omitted it.
    pub fn get_value(&self, name: &str, default: Value) -> Result<Value> {
        let found = match self.stream_field(name, TypeCode::Object) {
            Ok(f) => f,
            Err(_) => self.stream_field(name, TypeCode::Array)?,
        };
        match found {
            Some(f) => self.objs.get(f.offset()).cloned().ok_or_else(|| {
                GraphwireError::Internal(format!("reference slot {} out of range", f.offset()))
            }),
            None => {
                self.check_declared(name)?;
                Ok(default)
            }
        }
    }
}
