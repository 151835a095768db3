//! Class schemas: the explicit, reflection-free description of what a graph
//! node looks like on the wire.
//!
//! A [`ClassSchema`] names a class, its stream version, its fields (primitives
//! first, then object fields), an optional super schema, and the optional
//! custom hooks (write, read, write-replace, read-resolve). Schemas are built
//! once with [`ClassSchemaBuilder`] and shared through a [`SchemaRegistry`],
//! which both the writer and the reader consult by qualified name.
//!
//! The registry cache is explicit: entries live until [`SchemaRegistry::evict`]
//! removes them. Nothing is dropped behind the caller's back.

use crate::error::{GraphwireError, Result};
use crate::reader::HookReader;
use crate::value::{EnumValue, Value};
use crate::wire::{SC_ENUM, SC_SERIALIZABLE, SC_WRITE_METHOD};
use crate::writer::HookWriter;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::rc::Rc;
use tracing::debug;
use twox_hash::XxHash64;

type XxMap<K, V> = HashMap<K, V, BuildHasherDefault<XxHash64>>;

// --- HOOK SIGNATURES ---

/// Custom per-level write hook: runs inside block-data mode with a scoped
/// [`HookWriter`] and the object being written.
pub type WriteHook = Rc<dyn Fn(&mut HookWriter<'_>, &Value) -> Result<()>>;

/// Custom per-level read hook: runs inside block-data mode with a scoped
/// [`HookReader`] and the object being populated.
pub type ReadHook = Rc<dyn Fn(&mut HookReader<'_>, &Value) -> Result<()>>;

/// Substitution hook (write-replace, read-resolve, or stream-level).
/// Returning `None` keeps the value as-is.
pub type SubstituteHook = Rc<dyn Fn(&Value) -> Result<Option<Value>>>;

// --- TYPE CODES ---

/// Field kind, with its one-byte wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    /// `Z`: one byte, 0 or 1.
    Bool,
    /// `B`: one byte.
    I8,
    /// `C`: UTF-16 code unit, two bytes.
    Char,
    /// `S`: two bytes.
    I16,
    /// `I`: four bytes.
    I32,
    /// `J`: eight bytes.
    I64,
    /// `F`: four bytes, IEEE-754 bits.
    F32,
    /// `D`: eight bytes, IEEE-754 bits.
    F64,
    /// `L`: reference to another value; signature `L<name>;`.
    Object,
    /// `[`: reference to an array; signature `[<element signature>`.
    Array,
}

impl TypeCode {
    /// The one-byte wire code for this kind.
    pub fn wire_code(self) -> u8 {
        match self {
            Self::Bool => b'Z',
            Self::I8 => b'B',
            Self::Char => b'C',
            Self::I16 => b'S',
            Self::I32 => b'I',
            Self::I64 => b'J',
            Self::F32 => b'F',
            Self::F64 => b'D',
            Self::Object => b'L',
            Self::Array => b'[',
        }
    }

    /// Decodes a wire code, or `None` for bytes outside the set.
    pub fn from_wire(b: u8) -> Option<Self> {
        match b {
            b'Z' => Some(Self::Bool),
            b'B' => Some(Self::I8),
            b'C' => Some(Self::Char),
            b'S' => Some(Self::I16),
            b'I' => Some(Self::I32),
            b'J' => Some(Self::I64),
            b'F' => Some(Self::F32),
            b'D' => Some(Self::F64),
            b'L' => Some(Self::Object),
            b'[' => Some(Self::Array),
            _ => None,
        }
    }

    /// Decodes the leading code of a field or array-element signature.
    pub fn from_signature(sig: &str) -> Option<Self> {
        sig.bytes().next().and_then(Self::from_wire)
    }

    /// Encoded byte size for primitive kinds, `None` for reference kinds.
    pub fn prim_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::I8 => Some(1),
            Self::Char | Self::I16 => Some(2),
            Self::I32 | Self::F32 => Some(4),
            Self::I64 | Self::F64 => Some(8),
            Self::Object | Self::Array => None,
        }
    }

    /// Whether this kind is stored in the packed primitive buffer.
    pub fn is_prim(self) -> bool {
        self.prim_size().is_some()
    }
}

// --- FIELD DESCRIPTORS ---

/// One declared field of a schema level.
///
/// Primitive fields carry a byte offset into the level's packed primitive
/// buffer; reference fields carry a slot index into the level's object-slot
/// vector. Layout is primitives first (declaration order), then reference
/// fields (declaration order), fixed at build time.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    name: Rc<str>,
    code: TypeCode,
    signature: Rc<str>,
    unshared: bool,
    offset: usize,
}

impl FieldDesc {
    pub(crate) fn new(
        name: Rc<str>,
        code: TypeCode,
        signature: Rc<str>,
        unshared: bool,
        offset: usize,
    ) -> Self {
        Self {
            name,
            code,
            signature,
            unshared,
            offset,
        }
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field kind.
    pub fn code(&self) -> TypeCode {
        self.code
    }

    /// Type signature (`Z`…`D` for primitives, `L<name>;` or `[<sig>` for
    /// reference fields).
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub(crate) fn signature_rc(&self) -> Rc<str> {
        Rc::clone(&self.signature)
    }

    /// Whether values of this field are written without back-reference sharing.
    pub fn unshared(&self) -> bool {
        self.unshared
    }

    /// Byte offset (primitive) or slot index (reference field).
    pub fn offset(&self) -> usize {
        self.offset
    }
}

// --- CLASS SCHEMAS ---

#[derive(Debug, Clone)]
pub(crate) enum SchemaKind {
    Plain,
    Enum { constants: Vec<Rc<str>> },
    Proxy { interfaces: Vec<Rc<str>> },
    Array { elem: TypeCode },
}

/// Immutable description of one class: identity, layout, lineage, hooks.
pub struct ClassSchema {
    name: Rc<str>,
    suid: i64,
    kind: SchemaKind,
    super_schema: Option<Rc<ClassSchema>>,
    fields: Vec<FieldDesc>,
    prim_data_size: usize,
    num_obj_fields: usize,
    instantiable: bool,
    write_hook: Option<WriteHook>,
    read_hook: Option<ReadHook>,
    write_replace: Option<SubstituteHook>,
    read_resolve: Option<SubstituteHook>,
}

impl fmt::Debug for ClassSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSchema")
            .field("name", &self.name)
            .field("suid", &self.suid)
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .field("super", &self.super_schema.as_ref().map(|s| s.name()))
            .finish_non_exhaustive()
    }
}

impl ClassSchema {
    /// Starts building a plain class schema.
    pub fn builder(name: &str) -> ClassSchemaBuilder {
        ClassSchemaBuilder {
            name: Rc::from(name),
            suid: 0,
            super_schema: None,
            pending: Vec::new(),
            instantiable: true,
            write_hook: None,
            read_hook: None,
            write_replace: None,
            read_resolve: None,
        }
    }

    /// Builds an enum schema with the given constant names.
    pub fn enumeration(name: &str, constants: &[&str]) -> Self {
        Self {
            name: Rc::from(name),
            suid: 0,
            kind: SchemaKind::Enum {
                constants: constants.iter().map(|c| Rc::from(*c)).collect(),
            },
            super_schema: None,
            fields: Vec::new(),
            prim_data_size: 0,
            num_obj_fields: 0,
            instantiable: true,
            write_hook: None,
            read_hook: None,
            write_replace: None,
            read_resolve: None,
        }
    }

    /// Builds a proxy schema resolvable by its interface list.
    pub fn proxy(name: &str, interfaces: &[&str]) -> Self {
        Self {
            name: Rc::from(name),
            suid: 0,
            kind: SchemaKind::Proxy {
                interfaces: interfaces.iter().map(|i| Rc::from(*i)).collect(),
            },
            super_schema: None,
            fields: Vec::new(),
            prim_data_size: 0,
            num_obj_fields: 0,
            instantiable: true,
            write_hook: None,
            read_hook: None,
            write_replace: None,
            read_resolve: None,
        }
    }

    pub(crate) fn array(signature: &str, elem: TypeCode) -> Self {
        Self {
            name: Rc::from(signature),
            suid: 0,
            kind: SchemaKind::Array { elem },
            super_schema: None,
            fields: Vec::new(),
            prim_data_size: 0,
            num_obj_fields: 0,
            instantiable: true,
            write_hook: None,
            read_hook: None,
            write_replace: None,
            read_resolve: None,
        }
    }

    /// Qualified class name (array schemas use their signature as the name).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        Rc::clone(&self.name)
    }

    /// Stream version identifier.
    pub fn suid(&self) -> i64 {
        self.suid
    }

    /// Declared fields of this level, primitives first.
    pub fn fields(&self) -> &[FieldDesc] {
        &self.fields
    }

    /// Finds a field of this level by name (super levels are not searched).
    pub fn field(&self, name: &str) -> Option<&FieldDesc> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    /// Super schema, if any.
    pub fn super_schema(&self) -> Option<&Rc<ClassSchema>> {
        self.super_schema.as_ref()
    }

    /// Whether decoded instances of this class can be materialized.
    pub fn is_instantiable(&self) -> bool {
        self.instantiable
    }

    /// Whether this schema describes an enum class.
    pub fn is_enum(&self) -> bool {
        matches!(self.kind, SchemaKind::Enum { .. })
    }

    /// Whether this schema describes a proxy class.
    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, SchemaKind::Proxy { .. })
    }

    /// Array element kind, if this is an array schema.
    pub fn array_elem(&self) -> Option<TypeCode> {
        match self.kind {
            SchemaKind::Array { elem } => Some(elem),
            _ => None,
        }
    }

    /// Enum constant names, if this is an enum schema.
    pub fn constants(&self) -> &[Rc<str>] {
        match &self.kind {
            SchemaKind::Enum { constants } => constants,
            _ => &[],
        }
    }

    /// Proxy interface names, if this is a proxy schema.
    pub fn interfaces(&self) -> &[Rc<str>] {
        match &self.kind {
            SchemaKind::Proxy { interfaces } => interfaces,
            _ => &[],
        }
    }

    /// Total packed size of this level's primitive fields.
    pub fn prim_data_size(&self) -> usize {
        self.prim_data_size
    }

    /// Number of reference-field slots on this level.
    pub fn num_obj_fields(&self) -> usize {
        self.num_obj_fields
    }

    pub(crate) fn write_hook(&self) -> Option<WriteHook> {
        self.write_hook.clone()
    }

    pub(crate) fn read_hook(&self) -> Option<ReadHook> {
        self.read_hook.clone()
    }

    pub(crate) fn write_replace_hook(&self) -> Option<SubstituteHook> {
        self.write_replace.clone()
    }

    pub(crate) fn read_resolve_hook(&self) -> Option<SubstituteHook> {
        self.read_resolve.clone()
    }

    /// Descriptor flag byte as written on the wire.
    pub(crate) fn descriptor_flags(&self) -> u8 {
        if self.is_enum() {
            return SC_SERIALIZABLE | SC_ENUM;
        }
        let mut flags = SC_SERIALIZABLE;
        if self.write_hook.is_some() {
            flags |= SC_WRITE_METHOD;
        }
        flags
    }

    /// The schema lineage, super-most first.
    pub fn chain(self: &Rc<Self>) -> Vec<Rc<ClassSchema>> {
        let mut out = Vec::new();
        let mut cur = Some(Rc::clone(self));
        while let Some(c) = cur {
            cur = c.super_schema().cloned();
            out.push(c);
        }
        out.reverse();
        out
    }
}

/// Builder for plain [`ClassSchema`] values.
pub struct ClassSchemaBuilder {
    name: Rc<str>,
    suid: i64,
    super_schema: Option<Rc<ClassSchema>>,
    pending: Vec<(Rc<str>, TypeCode, Rc<str>, bool)>,
    instantiable: bool,
    write_hook: Option<WriteHook>,
    read_hook: Option<ReadHook>,
    write_replace: Option<SubstituteHook>,
    read_resolve: Option<SubstituteHook>,
}

impl fmt::Debug for ClassSchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSchemaBuilder")
            .field("name", &self.name)
            .field("fields", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl ClassSchemaBuilder {
    /// Sets the stream version identifier (defaults to 0).
    pub fn version(mut self, suid: i64) -> Self {
        self.suid = suid;
        self
    }

    /// Sets the super schema.
    pub fn extends(mut self, parent: Rc<ClassSchema>) -> Self {
        self.super_schema = Some(parent);
        self
    }

    /// Marks decoded instances as non-materializable: the reader consumes the
    /// field data but yields null.
    pub fn not_instantiable(mut self) -> Self {
        self.instantiable = false;
        self
    }

    fn push_prim(mut self, name: &str, code: TypeCode) -> Self {
        let sig: Rc<str> = Rc::from((code.wire_code() as char).to_string().as_str());
        self.pending.push((Rc::from(name), code, sig, false));
        self
    }

    /// Declares a `bool` field.
    pub fn field_bool(self, name: &str) -> Self {
        self.push_prim(name, TypeCode::Bool)
    }

    /// Declares an `i8` field.
    pub fn field_i8(self, name: &str) -> Self {
        self.push_prim(name, TypeCode::I8)
    }

    /// Declares a UTF-16 code unit field.
    pub fn field_char(self, name: &str) -> Self {
        self.push_prim(name, TypeCode::Char)
    }

    /// Declares an `i16` field.
    pub fn field_i16(self, name: &str) -> Self {
        self.push_prim(name, TypeCode::I16)
    }

    /// Declares an `i32` field.
    pub fn field_i32(self, name: &str) -> Self {
        self.push_prim(name, TypeCode::I32)
    }

    /// Declares an `i64` field.
    pub fn field_i64(self, name: &str) -> Self {
        self.push_prim(name, TypeCode::I64)
    }

    /// Declares an `f32` field.
    pub fn field_f32(self, name: &str) -> Self {
        self.push_prim(name, TypeCode::F32)
    }

    /// Declares an `f64` field.
    pub fn field_f64(self, name: &str) -> Self {
        self.push_prim(name, TypeCode::F64)
    }

    /// Declares an object field referencing `class_name`.
    pub fn field_object(mut self, name: &str, class_name: &str) -> Self {
        let sig: Rc<str> = Rc::from(format!("L{class_name};").as_str());
        self.pending
            .push((Rc::from(name), TypeCode::Object, sig, false));
        self
    }

    /// Declares an object field written without back-reference sharing.
    pub fn field_object_unshared(mut self, name: &str, class_name: &str) -> Self {
        let sig: Rc<str> = Rc::from(format!("L{class_name};").as_str());
        self.pending
            .push((Rc::from(name), TypeCode::Object, sig, true));
        self
    }

    /// Declares an array field with the given array signature (for example
    /// `[I` for an `i32` array, `[Lsome.Class;` for a reference array).
    pub fn field_array(mut self, name: &str, signature: &str) -> Self {
        self.pending
            .push((Rc::from(name), TypeCode::Array, Rc::from(signature), false));
        self
    }

    /// Attaches a custom write hook for this level.
    pub fn on_write(mut self, hook: impl Fn(&mut HookWriter<'_>, &Value) -> Result<()> + 'static) -> Self {
        self.write_hook = Some(Rc::new(hook));
        self
    }

    /// Attaches a custom read hook for this level.
    pub fn on_read(mut self, hook: impl Fn(&mut HookReader<'_>, &Value) -> Result<()> + 'static) -> Self {
        self.read_hook = Some(Rc::new(hook));
        self
    }

    /// Attaches a write-replace substitution hook.
    pub fn write_replace(mut self, hook: impl Fn(&Value) -> Result<Option<Value>> + 'static) -> Self {
        self.write_replace = Some(Rc::new(hook));
        self
    }

    /// Attaches a read-resolve substitution hook.
    pub fn read_resolve(mut self, hook: impl Fn(&Value) -> Result<Option<Value>> + 'static) -> Self {
        self.read_resolve = Some(Rc::new(hook));
        self
    }

    /// Computes the field layout and freezes the schema.
    pub fn build(self) -> ClassSchema {
        let mut fields = Vec::with_capacity(self.pending.len());
        let mut prim_cursor = 0usize;
        let mut obj_cursor = 0usize;
        // primitives first, then reference fields, declaration order preserved
        for (name, code, sig, unshared) in self.pending.iter().filter(|p| p.1.is_prim()) {
            let size = code.prim_size().unwrap_or(0);
            fields.push(FieldDesc::new(
                Rc::clone(name),
                *code,
                Rc::clone(sig),
                *unshared,
                prim_cursor,
            ));
            prim_cursor += size;
        }
        for (name, code, sig, unshared) in self.pending.iter().filter(|p| !p.1.is_prim()) {
            fields.push(FieldDesc::new(
                Rc::clone(name),
                *code,
                Rc::clone(sig),
                *unshared,
                obj_cursor,
            ));
            obj_cursor += 1;
        }
        ClassSchema {
            name: self.name,
            suid: self.suid,
            kind: SchemaKind::Plain,
            super_schema: self.super_schema,
            fields,
            prim_data_size: prim_cursor,
            num_obj_fields: obj_cursor,
            instantiable: self.instantiable,
            write_hook: self.write_hook,
            read_hook: self.read_hook,
            write_replace: self.write_replace,
            read_resolve: self.read_resolve,
        }
    }
}

// --- STREAM DESCRIPTORS (READ SIDE) ---

/// A class descriptor as it appeared on the stream, before and after local
/// resolution. Handle slots hold these behind `Rc<RefCell<..>>` because the
/// handle is assigned before the descriptor body has been read (descriptor
/// chains can be self-referential through field signatures).
#[derive(Debug, Default)]
pub(crate) struct StreamSchema {
    pub(crate) name: Rc<str>,
    pub(crate) suid: i64,
    pub(crate) flags: u8,
    pub(crate) proxy: bool,
    pub(crate) interfaces: Vec<Rc<str>>,
    pub(crate) fields: Vec<FieldDesc>,
    pub(crate) prim_data_size: usize,
    pub(crate) super_desc: Option<DescRef>,
    /// Locally resolved schema, when resolution succeeded.
    pub(crate) local: Option<Rc<ClassSchema>>,
    /// Recorded resolution fault, re-raised through handle taint.
    pub(crate) resolve_err: Option<GraphwireError>,
}

pub(crate) type DescRef = Rc<RefCell<StreamSchema>>;

impl StreamSchema {
    pub(crate) fn has_write_data(&self) -> bool {
        self.flags & SC_WRITE_METHOD != 0
    }

    /// The stream descriptor lineage, super-most first.
    pub(crate) fn chain(desc: &DescRef) -> Vec<DescRef> {
        let mut out = Vec::new();
        let mut cur = Some(Rc::clone(desc));
        while let Some(c) = cur {
            cur = c.borrow().super_desc.clone();
            out.push(c);
        }
        out.reverse();
        out
    }
}

// --- REGISTRY ---

/// Name-keyed schema cache shared by writers and readers.
///
/// The cache is explicit: [`register`](Self::register) inserts,
/// [`evict`](Self::evict) removes, and nothing expires on its own. Array
/// schemas are derived from their signature on first use and cached the same
/// way. Proxy schemas are additionally resolvable by interface list.
pub struct SchemaRegistry {
    classes: RefCell<XxMap<String, Rc<ClassSchema>>>,
    proxies: RefCell<XxMap<String, Rc<ClassSchema>>>,
    enums: RefCell<XxMap<(String, String), Rc<EnumValue>>>,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("classes", &self.classes.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            classes: RefCell::new(HashMap::default()),
            proxies: RefCell::new(HashMap::default()),
            enums: RefCell::new(HashMap::default()),
        }
    }

    /// Registers a schema under its qualified name, returning the shared
    /// handle. Proxy schemas are also indexed by their interface list.
    pub fn register(&self, schema: ClassSchema) -> Rc<ClassSchema> {
        let schema = Rc::new(schema);
        if schema.is_proxy() {
            let key = proxy_key(schema.interfaces());
            self.proxies.borrow_mut().insert(key, Rc::clone(&schema));
        }
        self.classes
            .borrow_mut()
            .insert(schema.name().to_string(), Rc::clone(&schema));
        schema
    }

    /// Resolves a schema by qualified name. Array signatures are derived and
    /// cached on first use.
    pub fn resolve(&self, name: &str) -> Option<Rc<ClassSchema>> {
        if let Some(s) = self.classes.borrow().get(name) {
            return Some(Rc::clone(s));
        }
        if name.starts_with('[') {
            return self.array_schema(name).ok();
        }
        None
    }

    /// Resolves a proxy schema by its exact interface list.
    pub fn resolve_proxy(&self, interfaces: &[Rc<str>]) -> Option<Rc<ClassSchema>> {
        self.proxies.borrow().get(&proxy_key(interfaces)).map(Rc::clone)
    }

    /// Derives (or fetches the cached) array schema for an array signature
    /// such as `[I` or `[Lsome.Class;`.
    pub fn array_schema(&self, signature: &str) -> Result<Rc<ClassSchema>> {
        if let Some(s) = self.classes.borrow().get(signature) {
            return Ok(Rc::clone(s));
        }
        let elem_sig = signature.strip_prefix('[').ok_or_else(|| {
            GraphwireError::Format(format!("not an array signature: {signature:?}"))
        })?;
        let elem = TypeCode::from_signature(elem_sig).ok_or_else(|| {
            GraphwireError::Format(format!("invalid array element signature: {elem_sig:?}"))
        })?;
        let schema = Rc::new(ClassSchema::array(signature, elem));
        self.classes
            .borrow_mut()
            .insert(signature.to_string(), Rc::clone(&schema));
        Ok(schema)
    }

    /// Removes a schema (and, for proxies, its interface-list index entry).
    pub fn evict(&self, name: &str) {
        let removed = self.classes.borrow_mut().remove(name);
        if let Some(schema) = removed {
            debug!(class = name, "schema evicted");
            if schema.is_proxy() {
                self.proxies
                    .borrow_mut()
                    .remove(&proxy_key(schema.interfaces()));
            }
            self.enums
                .borrow_mut()
                .retain(|(class, _), _| class != name);
        }
    }

    /// Interned enum constant for the given schema. Repeated calls return the
    /// same instance, so repeated writes of one constant share a handle.
    pub fn enum_value(&self, schema: &Rc<ClassSchema>, constant: &str) -> Result<Value> {
        if !schema.is_enum() {
            return Err(GraphwireError::Usage(format!(
                "{} is not an enum schema",
                schema.name()
            )));
        }
        let declared = schema
            .constants()
            .iter()
            .find(|c| &***c == constant)
            .cloned();
        let Some(name) = declared else {
            return Err(GraphwireError::UnresolvedConstant {
                class: schema.name().to_string(),
                constant: constant.to_string(),
            });
        };
        let key = (schema.name().to_string(), constant.to_string());
        let mut enums = self.enums.borrow_mut();
        let ev = enums.entry(key).or_insert_with(|| {
            Rc::new(EnumValue {
                schema: Rc::clone(schema),
                constant: name,
            })
        });
        Ok(Value::Enum(Rc::clone(ev)))
    }
}

fn proxy_key(interfaces: &[Rc<str>]) -> String {
    interfaces
        .iter()
        .map(|i| i.as_ref())
        .collect::<Vec<_>>()
        .join(";")
}
