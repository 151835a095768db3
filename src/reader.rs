//! Graph codec, read path.
//!
//! [`GraphReader`] validates the stream header, then decodes tagged values by
//! peeking one byte and dispatching. Identity is rebuilt through the handle
//! list: every decoded node is assigned a handle in stream order, and
//! back-references resolve against it, including references into nodes that
//! are still being populated, which is how cycles close.
//!
//! Resolution failures (unknown class, version mismatch, unknown enum
//! constant) are not immediate aborts: the fault is recorded against the
//! affected handle, the node's data is consumed to keep the stream in sync,
//! and the fault surfaces when the affected value (or anything that embeds
//! it) reaches the caller. Structural faults (corrupt bytes, I/O failure,
//! a peer abort marker) do abort, and discard the read state.

use crate::block::{BlockDataReader, PrimSource};
use crate::error::{GraphwireError, Result};
use crate::fields::GetField;
use crate::handles::{HandleList, Slotted, NULL_HANDLE};
use crate::schema::{
    ClassSchema, DescRef, FieldDesc, SchemaRegistry, StreamSchema, SubstituteHook, TypeCode,
};
use crate::validate::{ValidationFn, ValidationList};
use crate::value::{ArrayData, ArrayElems, ObjectData, Value};
use crate::wire::{
    Tag, BASE_WIRE_HANDLE, SC_ENUM, SC_EXTERNALIZABLE, STREAM_MAGIC, STREAM_VERSION,
};
use std::cell::RefCell;
use std::fmt;
use std::io::Read;
use std::rc::Rc;
use tracing::debug;

// --- SCOPED HOOK SURFACE ---

/// The reader operations a custom hook is allowed to reach, erased so hooks
/// stay object-safe across any `R`.
pub(crate) trait ReadCore {
    fn core_read_value(&mut self, unshared: bool) -> Result<Value>;
    fn core_default_read_fields(&mut self) -> Result<()>;
    fn core_read_fields(&mut self) -> Result<GetField>;
    fn core_register_validation(&mut self, priority: i32, callback: ValidationFn) -> Result<()>;
    fn core_prim(&mut self) -> &mut dyn PrimSource;
}

/// Scoped reader surface handed to custom read hooks.
///
/// A `HookReader` is a borrow into the invoking [`GraphReader`], valid only
/// for the duration of the hook call.
pub struct HookReader<'a> {
    core: &'a mut dyn ReadCore,
}

impl fmt::Debug for HookReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookReader").finish_non_exhaustive()
    }
}

impl<'a> HookReader<'a> {
    pub(crate) fn new(core: &'a mut dyn ReadCore) -> Self {
        Self { core }
    }

    /// Reads a nested value (shared). Re-raises any fault recorded against
    /// the value just read.
    pub fn read_value(&mut self) -> Result<Value> {
        self.core.core_read_value(false)
    }

    /// Reads a nested value without back-reference sharing.
    pub fn read_value_unshared(&mut self) -> Result<Value> {
        self.core.core_read_value(true)
    }

    /// Decodes the default field image for the current level into the object.
    /// At most one of `default_read_fields` / `read_fields` may run per level.
    pub fn default_read_fields(&mut self) -> Result<()> {
        self.core.core_default_read_fields()
    }

    /// Decodes the current level's field image into a [`GetField`] for
    /// schema-tolerant, by-name access.
    pub fn read_fields(&mut self) -> Result<GetField> {
        self.core.core_read_fields()
    }

    /// Registers a callback to run once the whole top-level graph is decoded.
    /// Higher priorities run first; the first fault aborts the rest.
    pub fn register_validation(
        &mut self,
        priority: i32,
        callback: impl FnOnce() -> Result<()> + 'static,
    ) -> Result<()> {
        self.core
            .core_register_validation(priority, Box::new(callback))
    }

    /// Reads a `bool` from the level's custom data.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.core.core_prim().source_bool()
    }

    /// Reads an `i8` from the level's custom data.
    pub fn read_i8(&mut self) -> Result<i8> {
        self.core.core_prim().source_i8()
    }

    /// Reads a raw byte from the level's custom data.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.core.core_prim().source_u8()
    }

    /// Reads a UTF-16 code unit from the level's custom data.
    pub fn read_char(&mut self) -> Result<u16> {
        self.core.core_prim().source_char()
    }

    /// Reads an `i16` from the level's custom data.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.core.core_prim().source_i16()
    }

    /// Reads an `i32` from the level's custom data.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.core.core_prim().source_i32()
    }

    /// Reads an `i64` from the level's custom data.
    pub fn read_i64(&mut self) -> Result<i64> {
        self.core.core_prim().source_i64()
    }

    /// Reads an `f32` from the level's custom data.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.core.core_prim().source_f32()
    }

    /// Reads an `f64` from the level's custom data.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.core.core_prim().source_f64()
    }

    /// Fills `out` from the level's custom data.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        self.core.core_prim().source_bytes(out)
    }

    /// Reads a short-form string from the level's custom data.
    pub fn read_utf(&mut self) -> Result<String> {
        self.core.core_prim().source_utf()
    }
}

// --- READER ---

/// Active hook context: which object and which level a running custom read
/// hook belongs to.
struct ReadCtx {
    obj: Value,
    obj_handle: i32,
    local: Rc<ClassSchema>,
    local_idx: usize,
    stream: DescRef,
    fields_done: bool,
}

/// Stream reader for object graphs.
///
/// Construction validates the 4-byte header. Handles persist across top-level
/// reads (matching the writer) until a reset marker arrives.
pub struct GraphReader<R: Read> {
    bin: BlockDataReader<R>,
    registry: Rc<SchemaRegistry>,
    handles: HandleList,
    vlist: ValidationList,
    resolver: Option<SubstituteHook>,
    depth: u32,
    pass_handle: i32,
    cur: Option<ReadCtx>,
}

impl<R: Read> fmt::Debug for GraphReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphReader")
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl<R: Read> GraphReader<R> {
    /// Opens a stream over `src`, validating the magic number and version.
    pub fn new(src: R, registry: Rc<SchemaRegistry>) -> Result<Self> {
        let mut bin = BlockDataReader::new(src);
        let magic = bin.read_u16()?;
        let version = bin.read_u16()?;
        if magic != STREAM_MAGIC || version != STREAM_VERSION {
            return Err(GraphwireError::Format(format!(
                "invalid stream header: magic 0x{magic:04X}, version {version}"
            )));
        }
        bin.set_mode(true)?;
        bin.set_reset_allowed(true);
        debug!("stream header validated");
        Ok(Self {
            bin,
            registry,
            handles: HandleList::default(),
            vlist: ValidationList::default(),
            resolver: None,
            depth: 0,
            pass_handle: NULL_HANDLE,
            cur: None,
        })
    }

    /// Installs a stream-level substitution hook, consulted for every decoded
    /// object after its own read-resolve hook.
    pub fn set_resolver(&mut self, hook: impl Fn(&Value) -> Result<Option<Value>> + 'static) {
        self.resolver = Some(Rc::new(hook));
    }

    /// Reads a value (shared). Re-raises any fault recorded against the value
    /// just read; validation callbacks run before a successful return.
    pub fn read_value(&mut self) -> Result<Value> {
        self.read_top(false)
    }

    /// Reads a value without registering it as a back-reference target.
    pub fn read_value_unshared(&mut self) -> Result<Value> {
        self.read_top(true)
    }

    fn read_top(&mut self, unshared: bool) -> Result<Value> {
        self.pass_handle = NULL_HANDLE;
        let res = match self.read_object0(unshared) {
            Ok(v) => match self.handles.lookup_exception(self.pass_handle) {
                Some(e) => Err(e),
                None => Ok(v),
            },
            Err(e) => Err(e),
        };
        let res = match res {
            Ok(v) => self.vlist.run().map(|_| v),
            Err(e) => Err(e),
        };
        self.pass_handle = NULL_HANDLE;
        if let Err(e) = &res {
            // resolution and usage faults leave the stream in sync; structural
            // faults do not, and nothing after them can be trusted
            self.vlist.clear();
            if is_structural(e) {
                debug!(%e, "structural fault at top level, discarding read state");
                self.handles.clear();
            }
        }
        res
    }

    // --- TOP-LEVEL PRIMITIVES ---

    /// Reads a `bool` from the top-level block data.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.bin.read_bool()
    }

    /// Reads an `i8` from the top-level block data.
    pub fn read_i8(&mut self) -> Result<i8> {
        self.bin.read_i8()
    }

    /// Reads a raw byte from the top-level block data.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.bin.read_u8()
    }

    /// Reads a UTF-16 code unit from the top-level block data.
    pub fn read_char(&mut self) -> Result<u16> {
        self.bin.read_char()
    }

    /// Reads an `i16` from the top-level block data.
    pub fn read_i16(&mut self) -> Result<i16> {
        self.bin.read_i16()
    }

    /// Reads an `i32` from the top-level block data.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.bin.read_i32()
    }

    /// Reads an `i64` from the top-level block data.
    pub fn read_i64(&mut self) -> Result<i64> {
        self.bin.read_i64()
    }

    /// Reads an `f32` from the top-level block data.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.bin.read_f32()
    }

    /// Reads an `f64` from the top-level block data.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.bin.read_f64()
    }

    /// Fills `out` from the top-level block data.
    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        self.bin.read_fully(out)
    }

    /// Reads a short-form string from the top-level block data.
    pub fn read_utf(&mut self) -> Result<String> {
        self.bin.read_utf()
    }

    // --- DISPATCH ---

    fn handle_reset(&mut self) -> Result<()> {
        if self.depth != 0 {
            return Err(GraphwireError::Format(
                "reset tag inside nested value data".to_string(),
            ));
        }
        debug!("reset tag: clearing handle table");
        self.handles.clear();
        Ok(())
    }

    fn read_object0(&mut self, unshared: bool) -> Result<Value> {
        let old_mode = self.bin.mode();
        if old_mode {
            let rem = self.bin.current_block_remaining();
            if rem > 0 {
                return Err(GraphwireError::OptionalData {
                    length: rem,
                    eof: false,
                });
            }
            self.bin.set_mode(false)?;
        }
        // a reset may have been absorbed by an earlier frame scan
        if self.bin.take_pending_reset() {
            self.handle_reset()?;
        }
        let tag = loop {
            let b = self.bin.peek_raw()?;
            if b == Tag::Reset.as_u8() {
                self.bin.read_u8()?;
                self.handle_reset()?;
                continue;
            }
            break b;
        };
        let tag = Tag::from_byte(tag)
            .ok_or_else(|| GraphwireError::Format(format!("unknown type tag 0x{tag:02x}")))?;

        self.depth += 1;
        self.bin.set_reset_allowed(false);
        let res = self.read_dispatch(tag, old_mode, unshared);
        self.depth -= 1;
        if self.depth == 0 {
            self.bin.set_reset_allowed(true);
        }
        match res {
            Ok(v) => {
                self.bin.set_mode(old_mode)?;
                Ok(v)
            }
            Err(e) => Err(e),
        }
    }

    fn read_dispatch(&mut self, tag: Tag, old_mode: bool, unshared: bool) -> Result<Value> {
        match tag {
            Tag::Null => {
                self.bin.read_u8()?;
                self.pass_handle = NULL_HANDLE;
                Ok(Value::Null)
            }
            Tag::Reference => self.read_handle_value(unshared),
            Tag::Class => self.read_class(unshared),
            Tag::String => self.read_string(false, unshared),
            Tag::LongString => self.read_string(true, unshared),
            Tag::Array => self.read_array(unshared),
            Tag::Enum => self.read_enum(unshared),
            Tag::Object => self.read_ordinary(unshared),
            Tag::Exception => self.read_fatal(),
            Tag::ClassDesc | Tag::ProxyClassDesc => Err(GraphwireError::Format(
                "class descriptor tag where a value was expected".to_string(),
            )),
            Tag::BlockData | Tag::BlockDataLong => {
                if old_mode {
                    // the caller is inside custom data: surface how much of it
                    // is still pending instead of misreading the frame
                    self.bin.set_mode(true)?;
                    self.bin.peek_block()?;
                    Err(GraphwireError::OptionalData {
                        length: self.bin.current_block_remaining(),
                        eof: false,
                    })
                } else {
                    Err(GraphwireError::Format(
                        "block data where a value was expected".to_string(),
                    ))
                }
            }
            Tag::EndBlockData => {
                if old_mode {
                    // level terminator, left unconsumed for the codec
                    Err(GraphwireError::OptionalData {
                        length: 0,
                        eof: true,
                    })
                } else {
                    Err(GraphwireError::Format(
                        "end-block-data where a value was expected".to_string(),
                    ))
                }
            }
            Tag::Reset => Err(GraphwireError::Internal(
                "reset tag reached value dispatch".to_string(),
            )),
        }
    }

    fn read_handle_value(&mut self, unshared: bool) -> Result<Value> {
        self.bin.read_u8()?;
        let wire = self.bin.read_i32()?;
        let handle = wire.wrapping_sub(BASE_WIRE_HANDLE);
        if handle < 0 || handle >= self.handles.len() {
            return Err(GraphwireError::Format(format!(
                "back-reference to unassigned handle 0x{wire:08x}"
            )));
        }
        if unshared {
            return Err(GraphwireError::Format(
                "back-reference read in an unshared context".to_string(),
            ));
        }
        self.pass_handle = handle;
        match self.handles.lookup_value(handle) {
            Some(Slotted::Value(v)) => Ok(v.clone()),
            Some(Slotted::Unshared) => Err(GraphwireError::Format(
                "back-reference to a value written unshared".to_string(),
            )),
            Some(Slotted::Desc(_)) => Err(GraphwireError::Format(
                "back-reference to a class descriptor where a value was expected".to_string(),
            )),
            None => Err(GraphwireError::Internal(format!(
                "assigned handle {handle} has no slot"
            ))),
        }
    }

    fn read_string(&mut self, long: bool, unshared: bool) -> Result<Value> {
        self.bin.read_u8()?;
        let len = if long {
            let l = self.bin.read_i64()?;
            u64::try_from(l)
                .map_err(|_| GraphwireError::Format(format!("negative string length {l}")))?
        } else {
            u64::from(self.bin.read_u16()?)
        };
        let s = self.bin.read_utf_body(len)?;
        let v = Value::string(s);
        let h = self.handles.assign(if unshared {
            Slotted::Unshared
        } else {
            Slotted::Value(v.clone())
        });
        self.handles.finish(h);
        self.pass_handle = h;
        Ok(v)
    }

    fn read_class(&mut self, unshared: bool) -> Result<Value> {
        self.bin.read_u8()?;
        let desc = self.read_class_desc0()?.ok_or_else(|| {
            GraphwireError::Format("null class descriptor where a class was expected".to_string())
        })?;
        let (local, resolve_err) = {
            let d = desc.borrow();
            (d.local.clone(), d.resolve_err.clone())
        };
        let v = match (&local, &resolve_err) {
            (Some(l), None) => Value::Class(Rc::clone(l)),
            _ => Value::Null,
        };
        let h = self.handles.assign(if unshared {
            Slotted::Unshared
        } else {
            Slotted::Value(v.clone())
        });
        if let Some(e) = resolve_err {
            self.handles.mark_exception(h, e);
        }
        self.handles.finish(h);
        self.pass_handle = h;
        Ok(v)
    }

    fn read_enum(&mut self, unshared: bool) -> Result<Value> {
        self.bin.read_u8()?;
        let desc = self.read_class_desc0()?.ok_or_else(|| {
            GraphwireError::Format("null class descriptor for enum constant".to_string())
        })?;
        let (local, resolve_err, flags, name) = {
            let d = desc.borrow();
            (
                d.local.clone(),
                d.resolve_err.clone(),
                d.flags,
                Rc::clone(&d.name),
            )
        };
        if flags & SC_ENUM == 0 {
            return Err(GraphwireError::Format(format!(
                "{name}: enum tag with a non-enum descriptor"
            )));
        }
        let h = self.handles.assign(if unshared {
            Slotted::Unshared
        } else {
            Slotted::Value(Value::Null)
        });
        if let Some(e) = resolve_err.clone() {
            self.handles.mark_exception(h, e);
        }
        self.pass_handle = h;
        let constant = match self.read_object0(false)? {
            Value::Str(s) => s,
            _ => {
                return Err(GraphwireError::Format(
                    "enum constant name is not a string".to_string(),
                ))
            }
        };
        let mut result = Value::Null;
        if resolve_err.is_none() {
            if let Some(l) = &local {
                if l.is_enum() {
                    match self.registry.enum_value(l, &constant) {
                        Ok(v) => {
                            self.handles.set_value(h, v.clone());
                            result = v;
                        }
                        Err(e) => self.handles.mark_exception(h, e),
                    }
                } else {
                    self.handles.mark_exception(
                        h,
                        GraphwireError::UnresolvedClass(format!(
                            "{name}: local schema is not an enum"
                        )),
                    );
                }
            }
        }
        self.handles.finish(h);
        self.pass_handle = h;
        Ok(result)
    }

    fn read_array(&mut self, unshared: bool) -> Result<Value> {
        self.bin.read_u8()?;
        let desc = self
            .read_class_desc0()?
            .ok_or_else(|| GraphwireError::Format("null class descriptor for array".to_string()))?;
        let (name, local, resolve_err) = {
            let d = desc.borrow();
            (Rc::clone(&d.name), d.local.clone(), d.resolve_err.clone())
        };
        let len = self.bin.read_i32()?;
        if len < 0 {
            return Err(GraphwireError::Format(format!(
                "negative array length {len}"
            )));
        }
        let len = len as usize;
        // element kind comes from the stream signature, so the data can be
        // consumed even when local resolution recorded a fault
        let elem = name
            .strip_prefix('[')
            .and_then(TypeCode::from_signature)
            .ok_or_else(|| GraphwireError::Format(format!("invalid array signature {name:?}")))?;
        let schema = match &local {
            Some(l) => Rc::clone(l),
            None => self.registry.array_schema(&name)?,
        };
        let arr = Rc::new(RefCell::new(ArrayData::raw(
            schema,
            ArrayElems::Ref(Vec::new()),
        )));
        let v = Value::Array(Rc::clone(&arr));
        let h = self.handles.assign(if unshared {
            Slotted::Unshared
        } else {
            Slotted::Value(v.clone())
        });
        if let Some(e) = resolve_err {
            self.handles.mark_exception(h, e);
        }
        self.pass_handle = h;
        let elems = match elem {
            TypeCode::Bool => ArrayElems::Bool(self.bin.read_bools(len)?),
            TypeCode::I8 => ArrayElems::I8(self.bin.read_i8s(len)?),
            TypeCode::Char => ArrayElems::Char(self.bin.read_chars(len)?),
            TypeCode::I16 => ArrayElems::I16(self.bin.read_i16s(len)?),
            TypeCode::I32 => ArrayElems::I32(self.bin.read_i32s(len)?),
            TypeCode::I64 => ArrayElems::I64(self.bin.read_i64s(len)?),
            TypeCode::F32 => ArrayElems::F32(self.bin.read_f32s(len)?),
            TypeCode::F64 => ArrayElems::F64(self.bin.read_f64s(len)?),
            TypeCode::Object | TypeCode::Array => {
                let mut vals = Vec::with_capacity(len);
                for _ in 0..len {
                    let ev = self.read_object0(false)?;
                    // element resolution faults become fault slots: one bad
                    // element does not poison its siblings or the array
                    match self.handles.lookup_exception(self.pass_handle) {
                        Some(e) => vals.push(Value::Fault(Rc::new(e))),
                        None => vals.push(ev),
                    }
                }
                ArrayElems::Ref(vals)
            }
        };
        arr.borrow_mut().elems = elems;
        self.handles.finish(h);
        self.pass_handle = h;
        Ok(v)
    }

    fn read_ordinary(&mut self, unshared: bool) -> Result<Value> {
        self.bin.read_u8()?;
        let desc = self
            .read_class_desc0()?
            .ok_or_else(|| GraphwireError::Format("null class descriptor for object".to_string()))?;
        let (local, resolve_err, flags, name) = {
            let d = desc.borrow();
            (
                d.local.clone(),
                d.resolve_err.clone(),
                d.flags,
                Rc::clone(&d.name),
            )
        };
        if flags & SC_ENUM != 0 {
            return Err(GraphwireError::Format(format!(
                "{name}: object tag with an enum descriptor"
            )));
        }
        let obj = match &local {
            Some(l) if resolve_err.is_none() && l.is_instantiable() && !l.is_enum() => {
                Value::object(ObjectData::new(l))
            }
            _ => Value::Null,
        };
        let h = self.handles.assign(if unshared {
            Slotted::Unshared
        } else {
            Slotted::Value(obj.clone())
        });
        if let Some(e) = resolve_err {
            self.handles.mark_exception(h, e);
        }
        self.pass_handle = h;
        self.read_serial_data(&obj, h, &desc)?;
        self.handles.finish(h);
        self.pass_handle = h;

        let mut result = obj;
        if !result.is_null() && self.handles.lookup_exception(h).is_none() {
            if let Some(hook) = local.as_ref().and_then(|l| l.read_resolve_hook()) {
                if let Some(rep) = hook(&result)? {
                    let rep = if unshared { detach_array(rep) } else { rep };
                    if !Value::ptr_eq(&rep, &result) {
                        self.handles.set_value(h, rep.clone());
                        result = rep;
                    }
                }
            }
            if let Some(resolver) = self.resolver.clone() {
                if let Some(rep) = resolver(&result)? {
                    let rep = if unshared { detach_array(rep) } else { rep };
                    self.handles.set_value(h, rep.clone());
                    result = rep;
                }
            }
        }
        Ok(result)
    }

    fn read_fatal(&mut self) -> Result<Value> {
        self.bin.read_u8()?;
        debug!("in-band fault marker from the writing peer");
        // the peer cleared its tables before writing the fault value
        self.handles.clear();
        let cause = self.read_object0(false);
        self.handles.clear();
        self.vlist.clear();
        let message = match cause {
            Ok(Value::Str(s)) => s.to_string(),
            Ok(_) => "peer aborted the write".to_string(),
            Err(e) => format!("unreadable fault marker ({e})"),
        };
        Err(GraphwireError::Aborted(message))
    }

    // --- CLASS DESCRIPTORS ---

    /// Reads a class descriptor production: null, a back-reference to an
    /// earlier descriptor, or an inline (proxy or non-proxy) descriptor.
    fn read_class_desc0(&mut self) -> Result<Option<DescRef>> {
        let tag = self.bin.peek_raw()?;
        if tag == Tag::Null.as_u8() {
            self.bin.read_u8()?;
            self.pass_handle = NULL_HANDLE;
            return Ok(None);
        }
        if tag == Tag::Reference.as_u8() {
            self.bin.read_u8()?;
            let wire = self.bin.read_i32()?;
            let handle = wire.wrapping_sub(BASE_WIRE_HANDLE);
            if handle < 0 || handle >= self.handles.len() {
                return Err(GraphwireError::Format(format!(
                    "back-reference to unassigned handle 0x{wire:08x}"
                )));
            }
            let desc = match self.handles.lookup_value(handle) {
                Some(Slotted::Desc(d)) => Rc::clone(d),
                _ => {
                    return Err(GraphwireError::Format(
                        "back-reference to a non-descriptor where a class descriptor was expected"
                            .to_string(),
                    ))
                }
            };
            self.pass_handle = handle;
            return Ok(Some(desc));
        }
        if tag == Tag::ClassDesc.as_u8() {
            return self.read_nonproxy_desc().map(Some);
        }
        if tag == Tag::ProxyClassDesc.as_u8() {
            return self.read_proxy_desc().map(Some);
        }
        Err(GraphwireError::Format(format!(
            "expected a class descriptor, found tag 0x{tag:02x}"
        )))
    }

    fn read_nonproxy_desc(&mut self) -> Result<DescRef> {
        self.bin.read_u8()?;
        let desc: DescRef = Rc::new(RefCell::new(StreamSchema::default()));
        let h = self.handles.assign(Slotted::Desc(Rc::clone(&desc)));

        let name: Rc<str> = Rc::from(self.bin.read_utf()?.as_str());
        let suid = self.bin.read_i64()?;
        let flags = self.bin.read_u8()?;
        if flags & SC_EXTERNALIZABLE != 0 {
            return Err(GraphwireError::Format(format!(
                "{name}: externalizable stream data is not supported"
            )));
        }
        let nfields = self.bin.read_u16()? as usize;
        let mut raw_fields = Vec::with_capacity(nfields);
        for _ in 0..nfields {
            let code_b = self.bin.read_u8()?;
            let code = TypeCode::from_wire(code_b).ok_or_else(|| {
                GraphwireError::Format(format!("invalid field type code 0x{code_b:02x}"))
            })?;
            let fname: Rc<str> = Rc::from(self.bin.read_utf()?.as_str());
            let sig: Rc<str> = if code.is_prim() {
                Rc::from((code.wire_code() as char).to_string().as_str())
            } else {
                // reference-field signatures are shared string values
                match self.read_object0(false)? {
                    Value::Str(s) => s,
                    _ => {
                        return Err(GraphwireError::Format(format!(
                            "field signature of {name}.{fname} is not a string"
                        )))
                    }
                }
            };
            raw_fields.push((fname, code, sig));
        }

        let local = self.registry.resolve(&name);
        let resolve_err = match &local {
            None => Some(GraphwireError::UnresolvedClass(name.to_string())),
            Some(l) if l.suid() != suid => Some(GraphwireError::UnresolvedClass(format!(
                "{name}: stream version {suid} does not match local version {}",
                l.suid()
            ))),
            Some(_) => None,
        };
        if resolve_err.is_some() {
            debug!(class = %name, "class resolution failed");
        }

        // layout offsets follow the stream's declaration order
        let mut fields = Vec::with_capacity(raw_fields.len());
        let mut prim_cursor = 0usize;
        let mut obj_cursor = 0usize;
        for (fname, code, sig) in raw_fields {
            let unshared = local
                .as_ref()
                .and_then(|l| l.field(&fname))
                .map(|lf| lf.code() == code && lf.unshared())
                .unwrap_or(false);
            let offset = if let Some(size) = code.prim_size() {
                let o = prim_cursor;
                prim_cursor += size;
                o
            } else {
                let o = obj_cursor;
                obj_cursor += 1;
                o
            };
            fields.push(FieldDesc::new(fname, code, sig, unshared, offset));
        }

        self.skip_custom_data()?; // annotation segment
        let super_desc = self.read_class_desc0()?;
        {
            let mut d = desc.borrow_mut();
            d.name = name;
            d.suid = suid;
            d.flags = flags;
            d.proxy = false;
            d.fields = fields;
            d.prim_data_size = prim_cursor;
            d.super_desc = super_desc;
            d.local = local;
            d.resolve_err = resolve_err;
        }
        self.handles.finish(h);
        self.pass_handle = h;
        Ok(desc)
    }

    fn read_proxy_desc(&mut self) -> Result<DescRef> {
        self.bin.read_u8()?;
        let desc: DescRef = Rc::new(RefCell::new(StreamSchema::default()));
        let h = self.handles.assign(Slotted::Desc(Rc::clone(&desc)));

        let count = self.bin.read_i32()?;
        if count < 0 {
            return Err(GraphwireError::Format(format!(
                "negative proxy interface count {count}"
            )));
        }
        let mut interfaces: Vec<Rc<str>> = Vec::with_capacity(count as usize);
        for _ in 0..count {
            interfaces.push(Rc::from(self.bin.read_utf()?.as_str()));
        }
        let local = self.registry.resolve_proxy(&interfaces);
        let resolve_err = match &local {
            None => Some(GraphwireError::UnresolvedClass(format!(
                "no proxy schema for interfaces [{}]",
                interfaces
                    .iter()
                    .map(|i| i.as_ref())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
            Some(_) => None,
        };
        if resolve_err.is_some() {
            debug!("proxy resolution failed");
        }

        self.skip_custom_data()?; // annotation segment
        let super_desc = self.read_class_desc0()?;
        {
            let mut d = desc.borrow_mut();
            d.name = local
                .as_ref()
                .map(|l| l.name_rc())
                .unwrap_or_else(|| Rc::from("<proxy>"));
            d.proxy = true;
            d.interfaces = interfaces;
            d.super_desc = super_desc;
            d.local = local;
            d.resolve_err = resolve_err;
        }
        self.handles.finish(h);
        self.pass_handle = h;
        Ok(desc)
    }

    // --- SERIAL DATA ---

    fn read_serial_data(&mut self, obj: &Value, obj_handle: i32, desc: &DescRef) -> Result<()> {
        let stream_chain = StreamSchema::chain(desc);
        let local_chain: Vec<Rc<ClassSchema>> = match obj.as_object() {
            Some(o) => o.borrow().schema().chain(),
            None => Vec::new(),
        };
        for sdesc in &stream_chain {
            let (sname, has_write_data) = {
                let d = sdesc.borrow();
                (Rc::clone(&d.name), d.has_write_data())
            };
            // levels are matched across stream and local lineage by name;
            // a tainted object consumes its data without populating anything
            let tainted = self.handles.lookup_exception(obj_handle).is_some();
            let target = if tainted {
                None
            } else {
                local_chain
                    .iter()
                    .enumerate()
                    .find(|(_, l)| l.name() == &*sname)
                    .map(|(i, l)| (i, Rc::clone(l)))
            };
            let hook = target.as_ref().and_then(|(_, l)| l.read_hook());
            match (target, hook) {
                (Some((idx, level)), Some(hook)) => {
                    let saved = self.cur.take();
                    self.cur = Some(ReadCtx {
                        obj: obj.clone(),
                        obj_handle,
                        local: level,
                        local_idx: idx,
                        stream: Rc::clone(sdesc),
                        fields_done: false,
                    });
                    self.bin.set_mode(true)?;
                    let res = hook(&mut HookReader::new(self), obj);
                    self.cur = saved;
                    res?;
                }
                (target, _) => {
                    self.default_read_fields(obj, target, sdesc, obj_handle)?;
                }
            }
            if has_write_data {
                self.skip_custom_data()?;
            } else if self.bin.mode() {
                self.bin.set_mode(false)?;
            }
            self.pass_handle = obj_handle;
        }
        Ok(())
    }

    fn default_read_fields(
        &mut self,
        obj: &Value,
        target: Option<(usize, Rc<ClassSchema>)>,
        sdesc: &DescRef,
        owner: i32,
    ) -> Result<()> {
        let (fields, prim_size) = {
            let d = sdesc.borrow();
            (d.fields.clone(), d.prim_data_size)
        };
        let mut prims = vec![0u8; prim_size];
        self.bin.read_fully(&mut prims)?;

        // primitive fields: copy matched bytes into the local layout
        if let (Some((idx, level)), Some(oref)) = (&target, obj.as_object()) {
            let mut data = oref.borrow_mut();
            for f in fields.iter().filter(|f| f.code().is_prim()) {
                let matched = level
                    .field(f.name())
                    .filter(|lf| lf.code() == f.code())
                    .cloned();
                if let Some(lf) = matched {
                    let size = f.code().prim_size().unwrap_or(0);
                    let src = prims.get(f.offset()..f.offset() + size).ok_or_else(|| {
                        GraphwireError::Internal(format!(
                            "stream primitive offset {} out of range",
                            f.offset()
                        ))
                    })?;
                    let lv = data.level_mut(*idx)?;
                    let dst = lv
                        .prims
                        .get_mut(lf.offset()..lf.offset() + size)
                        .ok_or_else(|| {
                            GraphwireError::Internal(format!(
                                "local primitive offset {} out of range",
                                lf.offset()
                            ))
                        })?;
                    dst.copy_from_slice(src);
                }
            }
        }

        // reference fields: decode in stream order, store the matched ones,
        // dependency-link them to the owning object
        for f in fields.iter().filter(|f| !f.code().is_prim()) {
            let matched = target.as_ref().and_then(|(idx, level)| {
                level
                    .field(f.name())
                    .filter(|lf| !lf.code().is_prim())
                    .map(|lf| (*idx, lf.clone()))
            });
            let unshared = matched
                .as_ref()
                .map(|(_, lf)| lf.unshared())
                .unwrap_or_else(|| f.unshared());
            let val = self.read_object0(unshared)?;
            if let Some((idx, lf)) = matched {
                self.handles.mark_dependency(owner, self.pass_handle);
                if let Some(oref) = obj.as_object() {
                    let mut data = oref.borrow_mut();
                    let lv = data.level_mut(idx)?;
                    let slot = lv.objs.get_mut(lf.offset()).ok_or_else(|| {
                        GraphwireError::Internal(format!(
                            "reference slot {} out of range",
                            lf.offset()
                        ))
                    })?;
                    *slot = val;
                }
            }
        }
        self.pass_handle = owner;
        Ok(())
    }

    /// Consumes whatever remains of the current level's custom data, frames
    /// and nested values alike, through its end-block-data terminator.
    fn skip_custom_data(&mut self) -> Result<()> {
        loop {
            if self.bin.mode() {
                self.bin.skip_block_data()?;
                self.bin.set_mode(false)?;
            }
            let b = self.bin.peek_raw()?;
            if b == Tag::BlockData.as_u8() || b == Tag::BlockDataLong.as_u8() {
                self.bin.set_mode(true)?;
            } else if b == Tag::EndBlockData.as_u8() {
                self.bin.read_u8()?;
                return Ok(());
            } else if b == Tag::Reset.as_u8() {
                return Err(GraphwireError::Format(
                    "reset tag inside nested value data".to_string(),
                ));
            } else {
                // a nested value the consumer did not read: decode and drop
                self.read_object0(false)?;
            }
        }
    }
}

impl<R: Read> ReadCore for GraphReader<R> {
    fn core_read_value(&mut self, unshared: bool) -> Result<Value> {
        let outer = self.pass_handle;
        match self.read_object0(unshared) {
            Ok(v) => {
                self.handles.mark_dependency(outer, self.pass_handle);
                let res = match self.handles.lookup_exception(self.pass_handle) {
                    Some(e) => Err(e),
                    None => Ok(v),
                };
                self.pass_handle = outer;
                res
            }
            Err(e) => {
                self.pass_handle = outer;
                Err(e)
            }
        }
    }

    fn core_default_read_fields(&mut self) -> Result<()> {
        let (obj, owner, local, local_idx, stream) = match self.cur.as_ref() {
            Some(ctx) if !ctx.fields_done => (
                ctx.obj.clone(),
                ctx.obj_handle,
                Rc::clone(&ctx.local),
                ctx.local_idx,
                Rc::clone(&ctx.stream),
            ),
            Some(_) => {
                return Err(GraphwireError::Usage(
                    "field data already read for this level".to_string(),
                ))
            }
            None => {
                return Err(GraphwireError::Usage(
                    "default_read_fields outside a custom read hook".to_string(),
                ))
            }
        };
        if let Some(ctx) = self.cur.as_mut() {
            ctx.fields_done = true;
        }
        self.bin.set_mode(false)?;
        self.default_read_fields(&obj, Some((local_idx, local)), &stream, owner)?;
        self.bin.set_mode(true)?;
        if !stream.borrow().has_write_data() {
            // no framed custom section follows the field image on this level
            self.bin.force_end_of_data();
        }
        Ok(())
    }

    fn core_read_fields(&mut self) -> Result<GetField> {
        let (owner, local, stream) = match self.cur.as_ref() {
            Some(ctx) if !ctx.fields_done => (
                ctx.obj_handle,
                Rc::clone(&ctx.local),
                Rc::clone(&ctx.stream),
            ),
            Some(_) => {
                return Err(GraphwireError::Usage(
                    "field data already read for this level".to_string(),
                ))
            }
            None => {
                return Err(GraphwireError::Usage(
                    "read_fields outside a custom read hook".to_string(),
                ))
            }
        };
        if let Some(ctx) = self.cur.as_mut() {
            ctx.fields_done = true;
        }
        self.bin.set_mode(false)?;
        let (fields, prim_size, has_write_data) = {
            let d = stream.borrow();
            (d.fields.clone(), d.prim_data_size, d.has_write_data())
        };
        let mut prims = vec![0u8; prim_size];
        self.bin.read_fully(&mut prims)?;
        let mut objs = Vec::new();
        for f in fields.iter().filter(|f| !f.code().is_prim()) {
            let unshared = local
                .field(f.name())
                .map(|lf| lf.unshared())
                .unwrap_or_else(|| f.unshared());
            let v = self.read_object0(unshared)?;
            self.handles.mark_dependency(owner, self.pass_handle);
            objs.push(v);
        }
        self.pass_handle = owner;
        self.bin.set_mode(true)?;
        if !has_write_data {
            self.bin.force_end_of_data();
        }
        Ok(GetField::new(Some(local), fields, prims, objs))
    }

    fn core_register_validation(&mut self, priority: i32, callback: ValidationFn) -> Result<()> {
        if self.depth == 0 {
            return Err(GraphwireError::Usage(
                "validation callbacks can only be registered during a read".to_string(),
            ));
        }
        self.vlist.register(priority, callback);
        Ok(())
    }

    fn core_prim(&mut self) -> &mut dyn PrimSource {
        &mut self.bin
    }
}

/// A read-resolve replacement handed to an unshared read must not leak a
/// shareable array: detach it with a shallow copy.
fn detach_array(v: Value) -> Value {
    match &v {
        Value::Array(a) => Value::array(a.borrow().shallow_clone()),
        _ => v,
    }
}

fn is_structural(e: &GraphwireError) -> bool {
    matches!(
        e,
        GraphwireError::Io(_)
            | GraphwireError::Format(_)
            | GraphwireError::Aborted(_)
            | GraphwireError::Internal(_)
    )
}
