//! The dynamic value model: graph nodes as explicit values.
//!
//! There is no reflection to lean on, so the graph the codec walks is made of
//! [`Value`] nodes. Identity, the thing back-references preserve, is `Rc` pointer
//! identity: two `Value::Object`s are "the same node" exactly when they share
//! the same allocation.
//!
//! An [`ObjectData`] is laid out per its schema lineage: one level per class,
//! each level a packed big-endian primitive buffer plus a vector of
//! reference-field slots. That layout is exactly the default field image on
//! the wire, so default encode/decode is a buffer copy plus a slot walk.

use crate::error::{GraphwireError, Result};
use crate::schema::{ClassSchema, FieldDesc, TypeCode};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable handle to an object node.
pub type ObjRef = Rc<RefCell<ObjectData>>;

/// Shared, mutable handle to an array node.
pub type ArrRef = Rc<RefCell<ArrayData>>;

/// One node of an object graph.
#[derive(Debug, Clone)]
pub enum Value {
    /// The null reference.
    Null,
    /// An immutable string node.
    Str(Rc<str>),
    /// An ordinary object node.
    Object(ObjRef),
    /// An array node.
    Array(ArrRef),
    /// An enum constant (interned per registry).
    Enum(Rc<EnumValue>),
    /// A class used as a first-class value.
    Class(Rc<ClassSchema>),
    /// Decode-side placeholder for an array element whose class or constant
    /// could not be resolved. Writing one is a usage fault.
    Fault(Rc<GraphwireError>),
}

impl Value {
    /// Builds a string node.
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    /// Wraps freshly built object data into a node.
    pub fn object(data: ObjectData) -> Self {
        Self::Object(Rc::new(RefCell::new(data)))
    }

    /// Wraps freshly built array data into a node.
    pub fn array(data: ArrayData) -> Self {
        Self::Array(Rc::new(RefCell::new(data)))
    }

    /// Whether this is the null reference.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The string payload, if this is a string node.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The object handle, if this is an object node.
    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The array handle, if this is an array node.
    pub fn as_array(&self) -> Option<&ArrRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The enum constant, if this is an enum node.
    pub fn as_enum(&self) -> Option<&Rc<EnumValue>> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// The class, if this is a class node.
    pub fn as_class(&self) -> Option<&Rc<ClassSchema>> {
        match self {
            Self::Class(c) => Some(c),
            _ => None,
        }
    }

    /// The recorded fault, if this is a fault placeholder.
    pub fn as_fault(&self) -> Option<&GraphwireError> {
        match self {
            Self::Fault(e) => Some(e),
            _ => None,
        }
    }

    /// Node identity: same allocation (or both null).
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Self::Null, Self::Null) => true,
            (Self::Str(x), Self::Str(y)) => Rc::ptr_eq(x, y),
            (Self::Object(x), Self::Object(y)) => Rc::ptr_eq(x, y),
            (Self::Array(x), Self::Array(y)) => Rc::ptr_eq(x, y),
            (Self::Enum(x), Self::Enum(y)) => Rc::ptr_eq(x, y),
            (Self::Class(x), Self::Class(y)) => Rc::ptr_eq(x, y),
            (Self::Fault(x), Self::Fault(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Raw allocation pointer for identity-keyed tables. Null and fault nodes
    /// have no identity.
    pub(crate) fn ident(&self) -> Option<usize> {
        match self {
            Self::Null | Self::Fault(_) => None,
            Self::Str(s) => Some(Rc::as_ptr(s) as *const u8 as usize),
            Self::Object(o) => Some(Rc::as_ptr(o) as usize),
            Self::Array(a) => Some(Rc::as_ptr(a) as usize),
            Self::Enum(e) => Some(Rc::as_ptr(e) as usize),
            Self::Class(c) => Some(Rc::as_ptr(c) as usize),
        }
    }
}

/// An enum constant: its schema plus the constant name.
#[derive(Debug)]
pub struct EnumValue {
    /// The enum's schema.
    pub schema: Rc<ClassSchema>,
    /// The constant name.
    pub constant: Rc<str>,
}

// --- OBJECT DATA ---

/// Field storage for one schema level.
#[derive(Debug, Clone)]
pub(crate) struct LevelData {
    pub(crate) prims: Vec<u8>,
    pub(crate) objs: Vec<Value>,
}

/// An object instance laid out per its schema lineage.
pub struct ObjectData {
    schema: Rc<ClassSchema>,
    chain: Vec<Rc<ClassSchema>>,
    levels: Vec<LevelData>,
}

impl fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectData")
            .field("schema", &self.schema.name())
            .finish_non_exhaustive()
    }
}

impl ObjectData {
    /// Builds a zeroed instance of `schema`: all primitives zero, all
    /// reference slots null.
    pub fn new(schema: &Rc<ClassSchema>) -> Self {
        let chain = schema.chain();
        let levels = chain
            .iter()
            .map(|level| LevelData {
                prims: vec![0u8; level.prim_data_size()],
                objs: vec![Value::Null; level.num_obj_fields()],
            })
            .collect();
        Self {
            schema: Rc::clone(schema),
            chain,
            levels,
        }
    }

    /// The most-derived schema of this instance.
    pub fn schema(&self) -> &Rc<ClassSchema> {
        &self.schema
    }

    pub(crate) fn level(&self, idx: usize) -> Result<&LevelData> {
        self.levels
            .get(idx)
            .ok_or_else(|| GraphwireError::Internal(format!("level index {idx} out of range")))
    }

    pub(crate) fn level_mut(&mut self, idx: usize) -> Result<&mut LevelData> {
        self.levels
            .get_mut(idx)
            .ok_or_else(|| GraphwireError::Internal(format!("level index {idx} out of range")))
    }

    /// Finds a field by name, searching the lineage most-derived level first.
    fn locate(&self, name: &str, code: TypeCode) -> Result<(usize, FieldDesc)> {
        for idx in (0..self.chain.len()).rev() {
            if let Some(f) = self.chain[idx].field(name) {
                if f.code() != code {
                    return Err(GraphwireError::Usage(format!(
                        "field {name:?} of {} has kind {:?}, not {code:?}",
                        self.chain[idx].name(),
                        f.code()
                    )));
                }
                return Ok((idx, f.clone()));
            }
        }
        Err(GraphwireError::Usage(format!(
            "no field {name:?} declared by {} or its lineage",
            self.schema.name()
        )))
    }

    fn prim_bytes(&self, idx: usize, offset: usize, len: usize) -> Result<&[u8]> {
        let level = self.level(idx)?;
        level.prims.get(offset..offset + len).ok_or_else(|| {
            GraphwireError::Internal(format!("primitive offset {offset} out of range"))
        })
    }

    fn prim_bytes_mut(&mut self, idx: usize, offset: usize, len: usize) -> Result<&mut [u8]> {
        let level = self.level_mut(idx)?;
        level.prims.get_mut(offset..offset + len).ok_or_else(|| {
            GraphwireError::Internal(format!("primitive offset {offset} out of range"))
        })
    }

    /// Reads a `bool` field.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        let (idx, f) = self.locate(name, TypeCode::Bool)?;
        Ok(self.prim_bytes(idx, f.offset(), 1)?[0] != 0)
    }

    /// Writes a `bool` field.
    pub fn set_bool(&mut self, name: &str, v: bool) -> Result<()> {
        let (idx, f) = self.locate(name, TypeCode::Bool)?;
        self.prim_bytes_mut(idx, f.offset(), 1)?[0] = u8::from(v);
        Ok(())
    }

    /// Reads an `i8` field.
    pub fn get_i8(&self, name: &str) -> Result<i8> {
        let (idx, f) = self.locate(name, TypeCode::I8)?;
        Ok(self.prim_bytes(idx, f.offset(), 1)?[0] as i8)
    }

    /// Writes an `i8` field.
    pub fn set_i8(&mut self, name: &str, v: i8) -> Result<()> {
        let (idx, f) = self.locate(name, TypeCode::I8)?;
        self.prim_bytes_mut(idx, f.offset(), 1)?[0] = v as u8;
        Ok(())
    }

    /// Reads a UTF-16 code unit field.
    pub fn get_char(&self, name: &str) -> Result<u16> {
        let (idx, f) = self.locate(name, TypeCode::Char)?;
        let b = self.prim_bytes(idx, f.offset(), 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Writes a UTF-16 code unit field.
    pub fn set_char(&mut self, name: &str, v: u16) -> Result<()> {
        let (idx, f) = self.locate(name, TypeCode::Char)?;
        self.prim_bytes_mut(idx, f.offset(), 2)?
            .copy_from_slice(&v.to_be_bytes());
        Ok(())
    }

    /// Reads an `i16` field.
    pub fn get_i16(&self, name: &str) -> Result<i16> {
        let (idx, f) = self.locate(name, TypeCode::I16)?;
        let b = self.prim_bytes(idx, f.offset(), 2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    /// Writes an `i16` field.
    pub fn set_i16(&mut self, name: &str, v: i16) -> Result<()> {
        let (idx, f) = self.locate(name, TypeCode::I16)?;
        self.prim_bytes_mut(idx, f.offset(), 2)?
            .copy_from_slice(&v.to_be_bytes());
        Ok(())
    }

    /// Reads an `i32` field.
    pub fn get_i32(&self, name: &str) -> Result<i32> {
        let (idx, f) = self.locate(name, TypeCode::I32)?;
        let b = self.prim_bytes(idx, f.offset(), 4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Writes an `i32` field.
    pub fn set_i32(&mut self, name: &str, v: i32) -> Result<()> {
        let (idx, f) = self.locate(name, TypeCode::I32)?;
        self.prim_bytes_mut(idx, f.offset(), 4)?
            .copy_from_slice(&v.to_be_bytes());
        Ok(())
    }

    /// Reads an `i64` field.
    pub fn get_i64(&self, name: &str) -> Result<i64> {
        let (idx, f) = self.locate(name, TypeCode::I64)?;
        let b = self.prim_bytes(idx, f.offset(), 8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Writes an `i64` field.
    pub fn set_i64(&mut self, name: &str, v: i64) -> Result<()> {
        let (idx, f) = self.locate(name, TypeCode::I64)?;
        self.prim_bytes_mut(idx, f.offset(), 8)?
            .copy_from_slice(&v.to_be_bytes());
        Ok(())
    }

    /// Reads an `f32` field.
    pub fn get_f32(&self, name: &str) -> Result<f32> {
        let (idx, f) = self.locate(name, TypeCode::F32)?;
        let b = self.prim_bytes(idx, f.offset(), 4)?;
        Ok(f32::from_bits(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
    }

    /// Writes an `f32` field.
    pub fn set_f32(&mut self, name: &str, v: f32) -> Result<()> {
        let (idx, f) = self.locate(name, TypeCode::F32)?;
        self.prim_bytes_mut(idx, f.offset(), 4)?
            .copy_from_slice(&v.to_bits().to_be_bytes());
        Ok(())
    }

    /// Reads an `f64` field.
    pub fn get_f64(&self, name: &str) -> Result<f64> {
        let (idx, f) = self.locate(name, TypeCode::F64)?;
        let b = self.prim_bytes(idx, f.offset(), 8)?;
        Ok(f64::from_bits(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ])))
    }

    /// Writes an `f64` field.
    pub fn set_f64(&mut self, name: &str, v: f64) -> Result<()> {
        let (idx, f) = self.locate(name, TypeCode::F64)?;
        self.prim_bytes_mut(idx, f.offset(), 8)?
            .copy_from_slice(&v.to_bits().to_be_bytes());
        Ok(())
    }

    fn locate_ref(&self, name: &str) -> Result<(usize, FieldDesc)> {
        self.locate(name, TypeCode::Object)
            .or_else(|_| self.locate(name, TypeCode::Array))
    }

    /// Reads a reference field (object or array kind).
    pub fn get_value(&self, name: &str) -> Result<Value> {
        let (idx, f) = self.locate_ref(name)?;
        let level = self.level(idx)?;
        level.objs.get(f.offset()).cloned().ok_or_else(|| {
            GraphwireError::Internal(format!("reference slot {} out of range", f.offset()))
        })
    }

    /// Writes a reference field (object or array kind).
    pub fn set_value(&mut self, name: &str, v: Value) -> Result<()> {
        let (idx, f) = self.locate_ref(name)?;
        let offset = f.offset();
        let level = self.level_mut(idx)?;
        let slot = level.objs.get_mut(offset).ok_or_else(|| {
            GraphwireError::Internal(format!("reference slot {offset} out of range"))
        })?;
        *slot = v;
        Ok(())
    }
}

// --- ARRAY DATA ---

/// Element storage of an array node: one variant per primitive kind plus
/// reference arrays.
#[derive(Debug, Clone)]
pub enum ArrayElems {
    /// `[Z`
    Bool(Vec<bool>),
    /// `[B`
    I8(Vec<i8>),
    /// `[C`: UTF-16 code units
    Char(Vec<u16>),
    /// `[S`
    I16(Vec<i16>),
    /// `[I`
    I32(Vec<i32>),
    /// `[J`
    I64(Vec<i64>),
    /// `[F`
    F32(Vec<f32>),
    /// `[D`
    F64(Vec<f64>),
    /// `[L…;` or nested `[[…`: reference elements
    Ref(Vec<Value>),
}

impl ArrayElems {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::Char(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Ref(v) => v.len(),
        }
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn code(&self) -> TypeCode {
        match self {
            Self::Bool(_) => TypeCode::Bool,
            Self::I8(_) => TypeCode::I8,
            Self::Char(_) => TypeCode::Char,
            Self::I16(_) => TypeCode::I16,
            Self::I32(_) => TypeCode::I32,
            Self::I64(_) => TypeCode::I64,
            Self::F32(_) => TypeCode::F32,
            Self::F64(_) => TypeCode::F64,
            // nested arrays are reference elements too
            Self::Ref(_) => TypeCode::Object,
        }
    }
}

/// An array node: its (derived) array schema plus element storage.
#[derive(Debug)]
pub struct ArrayData {
    schema: Rc<ClassSchema>,
    /// Element storage; public so callers can match on the kind directly.
    pub elems: ArrayElems,
}

impl ArrayData {
    /// Pairs element storage with its array schema, checking that the kinds
    /// agree.
    pub fn new(schema: Rc<ClassSchema>, elems: ArrayElems) -> Result<Self> {
        let declared = schema.array_elem().ok_or_else(|| {
            GraphwireError::Usage(format!("{} is not an array schema", schema.name()))
        })?;
        let actual = elems.code();
        let matches = if declared.is_prim() {
            declared == actual
        } else {
            actual == TypeCode::Object
        };
        if !matches {
            return Err(GraphwireError::Usage(format!(
                "element storage {actual:?} does not match array schema {}",
                schema.name()
            )));
        }
        Ok(Self { schema, elems })
    }

    pub(crate) fn raw(schema: Rc<ClassSchema>, elems: ArrayElems) -> Self {
        Self { schema, elems }
    }

    /// The array's schema (name is the array signature).
    pub fn schema(&self) -> &Rc<ClassSchema> {
        &self.schema
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// A new array node with the same schema and a copied element vector
    /// (reference elements share their targets).
    pub fn shallow_clone(&self) -> Self {
        Self {
            schema: Rc::clone(&self.schema),
            elems: self.elems.clone(),
        }
    }
}
