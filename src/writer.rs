//! Graph codec, write path.
//!
//! [`GraphWriter`] linearizes a live object graph into the stream format:
//! every node gets a handle in visit order, revisited nodes become
//! back-references, class descriptors are written inline once and referenced
//! after that, and per-level custom write hooks run inside block-data mode so
//! their output is framed and skippable by a reader that does not understand
//! it.
//!
//! The write pipeline for one node (see [`GraphWriter::write_value`]):
//! replace-table memoization, back-reference lookup, the write-replace fixed
//! point, the stream-level replacer, then category dispatch.

use crate::block::{utf_len, BlockDataWriter, PrimSink};
use crate::error::{GraphwireError, Result};
use crate::fields::PutField;
use crate::handles::{HandleTable, ReplaceTable};
use crate::schema::{ClassSchema, SubstituteHook};
use crate::value::{ArrayElems, Value};
use crate::wire::{Tag, BASE_WIRE_HANDLE, STREAM_MAGIC, STREAM_VERSION};
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use tracing::{debug, warn};

// --- SCOPED HOOK SURFACE ---

/// The writer operations a custom hook is allowed to reach, erased so hooks
/// stay object-safe across any `W`.
pub(crate) trait WriteCore {
    fn core_write_value(&mut self, v: &Value, unshared: bool) -> Result<()>;
    fn core_default_fields(&mut self) -> Result<()>;
    fn core_put_fields(&mut self) -> Result<PutField>;
    fn core_write_fields(&mut self, fields: PutField) -> Result<()>;
    fn core_prim(&mut self) -> &mut dyn PrimSink;
}

/// Scoped writer surface handed to custom write hooks.
///
/// A `HookWriter` is a borrow into the invoking [`GraphWriter`], valid only
/// for the duration of the hook call. It cannot be stored, sent anywhere, or
/// used after the hook returns.
pub struct HookWriter<'a> {
    core: &'a mut dyn WriteCore,
}

impl fmt::Debug for HookWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookWriter").finish_non_exhaustive()
    }
}

impl<'a> HookWriter<'a> {
    pub(crate) fn new(core: &'a mut dyn WriteCore) -> Self {
        Self { core }
    }

    /// Writes a nested value (shared).
    pub fn write_value(&mut self, v: &Value) -> Result<()> {
        self.core.core_write_value(v, false)
    }

    /// Writes a nested value without back-reference sharing.
    pub fn write_value_unshared(&mut self, v: &Value) -> Result<()> {
        self.core.core_write_value(v, true)
    }

    /// Writes the default field image for the current level. At most one of
    /// `default_fields` / `write_fields` may run per level.
    pub fn default_fields(&mut self) -> Result<()> {
        self.core.core_default_fields()
    }

    /// Stages a field image for the current level, to be written with
    /// [`write_fields`](Self::write_fields).
    pub fn put_fields(&mut self) -> Result<PutField> {
        self.core.core_put_fields()
    }

    /// Writes a staged field image, consuming it.
    pub fn write_fields(&mut self, fields: PutField) -> Result<()> {
        self.core.core_write_fields(fields)
    }

    /// Writes a `bool` into the level's custom data.
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.core.core_prim().sink_bool(v)
    }

    /// Writes an `i8` into the level's custom data.
    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.core.core_prim().sink_i8(v)
    }

    /// Writes a raw byte into the level's custom data.
    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.core.core_prim().sink_u8(v)
    }

    /// Writes a UTF-16 code unit into the level's custom data.
    pub fn write_char(&mut self, v: u16) -> Result<()> {
        self.core.core_prim().sink_char(v)
    }

    /// Writes an `i16` into the level's custom data.
    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.core.core_prim().sink_i16(v)
    }

    /// Writes an `i32` into the level's custom data.
    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.core.core_prim().sink_i32(v)
    }

    /// Writes an `i64` into the level's custom data.
    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.core.core_prim().sink_i64(v)
    }

    /// Writes an `f32` into the level's custom data.
    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.core.core_prim().sink_f32(v)
    }

    /// Writes an `f64` into the level's custom data.
    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.core.core_prim().sink_f64(v)
    }

    /// Writes raw bytes into the level's custom data.
    pub fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.core.core_prim().sink_bytes(b)
    }

    /// Writes a short-form string into the level's custom data.
    pub fn write_utf(&mut self, s: &str) -> Result<()> {
        self.core.core_prim().sink_utf(s)
    }
}

// --- WRITER ---

/// Active hook context: which object and which schema level a running custom
/// write hook belongs to.
struct WriteCtx {
    obj: Value,
    level: Rc<ClassSchema>,
    level_idx: usize,
    fields_done: bool,
}

/// Stream writer for object graphs.
///
/// Construction writes the 4-byte stream header and enters block-data mode;
/// from then on, primitive writes coalesce into frames and
/// [`write_value`](Self::write_value) calls interleave freely with them.
/// Handles persist across top-level writes until [`reset`](Self::reset).
pub struct GraphWriter<W: Write> {
    bin: BlockDataWriter<W>,
    handles: HandleTable,
    replace: ReplaceTable,
    replacer: Option<SubstituteHook>,
    depth: u32,
    cur: Option<WriteCtx>,
}

impl<W: Write> fmt::Debug for GraphWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphWriter")
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl<W: Write> GraphWriter<W> {
    /// Opens a stream over `dest`: writes the magic number and version, then
    /// switches to block-data mode.
    pub fn new(dest: W) -> Result<Self> {
        let mut bin = BlockDataWriter::new(dest);
        bin.write_u16(STREAM_MAGIC)?;
        bin.write_u16(STREAM_VERSION)?;
        bin.set_mode(true)?;
        debug!("stream header written");
        Ok(Self {
            bin,
            handles: HandleTable::default(),
            replace: ReplaceTable::default(),
            replacer: None,
            depth: 0,
            cur: None,
        })
    }

    /// Installs a stream-level substitution hook, consulted for every node
    /// after its own write-replace hook.
    pub fn set_replacer(&mut self, hook: impl Fn(&Value) -> Result<Option<Value>> + 'static) {
        self.replacer = Some(Rc::new(hook));
    }

    /// Writes a value (shared: revisits become back-references).
    pub fn write_value(&mut self, v: &Value) -> Result<()> {
        self.write_top(v, false)
    }

    /// Writes a value without recording it as a back-reference target. The
    /// node's own nested values are still written shared.
    pub fn write_value_unshared(&mut self, v: &Value) -> Result<()> {
        self.write_top(v, true)
    }

    fn write_top(&mut self, v: &Value, unshared: bool) -> Result<()> {
        match self.write_object0(v, unshared) {
            Ok(()) => Ok(()),
            Err(e) => {
                if self.depth == 0 {
                    self.write_fatal(&e);
                }
                Err(e)
            }
        }
    }

    // --- TOP-LEVEL PRIMITIVES ---

    /// Writes a `bool` into the top-level block data.
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.bin.write_bool(v)
    }

    /// Writes an `i8` into the top-level block data.
    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.bin.write_i8(v)
    }

    /// Writes a raw byte into the top-level block data.
    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.bin.write_u8(v)
    }

    /// Writes a UTF-16 code unit into the top-level block data.
    pub fn write_char(&mut self, v: u16) -> Result<()> {
        self.bin.write_char(v)
    }

    /// Writes an `i16` into the top-level block data.
    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.bin.write_i16(v)
    }

    /// Writes an `i32` into the top-level block data.
    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.bin.write_i32(v)
    }

    /// Writes an `i64` into the top-level block data.
    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.bin.write_i64(v)
    }

    /// Writes an `f32` into the top-level block data.
    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.bin.write_f32(v)
    }

    /// Writes an `f64` into the top-level block data.
    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.bin.write_f64(v)
    }

    /// Writes raw bytes into the top-level block data.
    pub fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.bin.write_raw(b)
    }

    /// Writes a short-form string into the top-level block data.
    pub fn write_utf(&mut self, s: &str) -> Result<()> {
        self.bin.write_utf(s)
    }

    // --- STREAM CONTROL ---

    /// Emits a reset marker and clears the handle and replace tables, so
    /// nothing written before it can be back-referenced after it. Only legal
    /// between top-level writes.
    pub fn reset(&mut self) -> Result<()> {
        if self.depth != 0 || self.cur.is_some() {
            return Err(GraphwireError::Usage(
                "reset while a value write is in progress".to_string(),
            ));
        }
        self.bin.set_mode(false)?;
        self.bin.write_u8(Tag::Reset.as_u8())?;
        self.bin.set_mode(true)?;
        self.handles.clear();
        self.replace.clear();
        debug!("stream reset");
        Ok(())
    }

    /// Drains buffered block data and flushes the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.bin.flush()
    }

    /// Closes the current frame and returns the underlying sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.bin.set_mode(false)?;
        self.bin.into_inner()
    }

    // --- DISPATCH ---

    fn write_object0(&mut self, v: &Value, unshared: bool) -> Result<()> {
        let old_mode = self.bin.set_mode(false)?;
        self.depth += 1;
        let res = self.write_dispatch(v, unshared);
        self.depth -= 1;
        match res {
            Ok(()) => {
                self.bin.set_mode(old_mode)?;
                Ok(())
            }
            // stream state is left broken here; write_top records the fault
            Err(e) => Err(e),
        }
    }

    fn write_dispatch(&mut self, v: &Value, unshared: bool) -> Result<()> {
        if v.is_null() {
            return self.bin.write_u8(Tag::Null.as_u8());
        }
        if let Value::Fault(e) = v {
            return Err(GraphwireError::Usage(format!(
                "fault placeholders cannot be encoded ({e})"
            )));
        }

        // 1. previously substituted node: reuse the memoized replacement
        let mut obj = match self.replace.lookup(v) {
            Some(rep) => rep,
            None => v.clone(),
        };

        // 2. already-assigned shared identity: back-reference
        if !unshared {
            if let Some(h) = self.handles.lookup_value(&obj) {
                return self.write_ref(h);
            }
        }

        // 3. write-replace fixed point: a replacement of a different class
        //    may itself want replacing; stop once the class settles
        loop {
            let Some(schema) = value_schema(&obj) else {
                break;
            };
            let Some(hook) = schema.write_replace_hook() else {
                break;
            };
            let Some(rep) = hook(&obj)? else {
                break;
            };
            if Value::ptr_eq(&rep, &obj) {
                break;
            }
            let settled = value_schema(&rep).is_some_and(|rs| Rc::ptr_eq(&rs, &schema));
            obj = rep;
            if settled {
                break;
            }
        }

        // 4. stream-level replacer
        if let Some(replacer) = self.replacer.clone() {
            if let Some(rep) = replacer(&obj)? {
                obj = rep;
            }
        }

        // 5. replacement happened: memoize and redo the null/handle checks
        if !Value::ptr_eq(&obj, v) {
            self.replace.assign(v, obj.clone());
            if obj.is_null() {
                return self.bin.write_u8(Tag::Null.as_u8());
            }
            if let Value::Fault(e) = &obj {
                return Err(GraphwireError::Usage(format!(
                    "substitution produced a fault placeholder ({e})"
                )));
            }
            if !unshared {
                if let Some(h) = self.handles.lookup_value(&obj) {
                    return self.write_ref(h);
                }
            }
        }

        // 6. category dispatch
        match &obj {
            Value::Str(s) => self.write_string(&obj, Rc::clone(s), unshared),
            Value::Class(c) => self.write_class(&obj, Rc::clone(c), unshared),
            Value::Enum(e) => {
                let constant = Rc::clone(&e.constant);
                let schema = Rc::clone(&e.schema);
                self.write_enum(&obj, schema, constant, unshared)
            }
            Value::Array(_) => self.write_array(&obj, unshared),
            Value::Object(_) => self.write_ordinary(&obj, unshared),
            Value::Null | Value::Fault(_) => Err(GraphwireError::Internal(
                "dispatch after substitution checks saw a null or fault".to_string(),
            )),
        }
    }

    fn write_ref(&mut self, handle: i32) -> Result<()> {
        self.bin.write_u8(Tag::Reference.as_u8())?;
        self.bin.write_i32(BASE_WIRE_HANDLE + handle)
    }

    fn write_string(&mut self, v: &Value, s: Rc<str>, unshared: bool) -> Result<()> {
        self.handles.assign_value(v, !unshared);
        if utf_len(&s) <= u16::MAX as u64 {
            self.bin.write_u8(Tag::String.as_u8())?;
            self.bin.write_utf(&s)
        } else {
            self.bin.write_u8(Tag::LongString.as_u8())?;
            self.bin.write_long_utf(&s)
        }
    }

    fn write_class(&mut self, v: &Value, schema: Rc<ClassSchema>, unshared: bool) -> Result<()> {
        self.bin.write_u8(Tag::Class.as_u8())?;
        self.write_class_desc(Some(&schema))?;
        self.handles.assign_value(v, !unshared);
        Ok(())
    }

    fn write_enum(
        &mut self,
        v: &Value,
        schema: Rc<ClassSchema>,
        constant: Rc<str>,
        unshared: bool,
    ) -> Result<()> {
        self.bin.write_u8(Tag::Enum.as_u8())?;
        self.write_class_desc(Some(&schema))?;
        self.handles.assign_value(v, !unshared);
        self.write_object0(&Value::Str(constant), false)
    }

    fn write_array(&mut self, v: &Value, unshared: bool) -> Result<()> {
        let arr = v
            .as_array()
            .ok_or_else(|| GraphwireError::Internal("array dispatch on non-array".to_string()))?
            .clone();
        let schema = Rc::clone(arr.borrow().schema());
        self.bin.write_u8(Tag::Array.as_u8())?;
        self.write_class_desc(Some(&schema))?;
        self.handles.assign_value(v, !unshared);

        // bulk-write primitives under the borrow; reference elements recurse,
        // so those are cloned out first
        let ref_elems: Option<Vec<Value>> = {
            let data = arr.borrow();
            let len = i32::try_from(data.len()).map_err(|_| {
                GraphwireError::Format(format!("array length {} out of range", data.len()))
            })?;
            self.bin.write_i32(len)?;
            match &data.elems {
                ArrayElems::Bool(xs) => {
                    self.bin.write_bools(xs)?;
                    None
                }
                ArrayElems::I8(xs) => {
                    self.bin.write_i8s(xs)?;
                    None
                }
                ArrayElems::Char(xs) => {
                    self.bin.write_chars(xs)?;
                    None
                }
                ArrayElems::I16(xs) => {
                    self.bin.write_i16s(xs)?;
                    None
                }
                ArrayElems::I32(xs) => {
                    self.bin.write_i32s(xs)?;
                    None
                }
                ArrayElems::I64(xs) => {
                    self.bin.write_i64s(xs)?;
                    None
                }
                ArrayElems::F32(xs) => {
                    self.bin.write_f32s(xs)?;
                    None
                }
                ArrayElems::F64(xs) => {
                    self.bin.write_f64s(xs)?;
                    None
                }
                ArrayElems::Ref(xs) => Some(xs.clone()),
            }
        };
        if let Some(xs) = ref_elems {
            for x in &xs {
                self.write_object0(x, false)?;
            }
        }
        Ok(())
    }

    fn write_ordinary(&mut self, v: &Value, unshared: bool) -> Result<()> {
        let schema = value_schema(v).ok_or_else(|| {
            GraphwireError::Internal("object dispatch on non-object".to_string())
        })?;
        self.bin.write_u8(Tag::Object.as_u8())?;
        self.write_class_desc(Some(&schema))?;
        self.handles.assign_value(v, !unshared);
        self.write_serial_data(v, &schema)
    }

    // --- CLASS DESCRIPTORS ---

    fn write_class_desc(&mut self, schema: Option<&Rc<ClassSchema>>) -> Result<()> {
        let Some(schema) = schema else {
            return self.bin.write_u8(Tag::Null.as_u8());
        };
        if let Some(h) = self.handles.lookup_schema(schema) {
            return self.write_ref(h);
        }
        if schema.is_proxy() {
            self.write_proxy_desc(schema)
        } else {
            self.write_nonproxy_desc(schema)
        }
    }

    fn write_nonproxy_desc(&mut self, schema: &Rc<ClassSchema>) -> Result<()> {
        self.bin.write_u8(Tag::ClassDesc.as_u8())?;
        self.handles.assign_schema(schema);
        self.bin.write_utf(schema.name())?;
        self.bin.write_i64(schema.suid())?;
        self.bin.write_u8(schema.descriptor_flags())?;
        let fields = schema.fields();
        let count = u16::try_from(fields.len()).map_err(|_| {
            GraphwireError::Usage(format!(
                "{} declares more than 65535 fields",
                schema.name()
            ))
        })?;
        self.bin.write_u16(count)?;
        for f in fields {
            self.bin.write_u8(f.code().wire_code())?;
            self.bin.write_utf(f.name())?;
            if !f.code().is_prim() {
                // signatures are shared string values: repeats back-reference
                self.write_object0(&Value::Str(f.signature_rc()), false)?;
            }
        }
        self.write_desc_tail(schema.super_schema())
    }

    fn write_proxy_desc(&mut self, schema: &Rc<ClassSchema>) -> Result<()> {
        self.bin.write_u8(Tag::ProxyClassDesc.as_u8())?;
        self.handles.assign_schema(schema);
        let interfaces = schema.interfaces();
        let count = i32::try_from(interfaces.len()).map_err(|_| {
            GraphwireError::Usage(format!("{} declares too many interfaces", schema.name()))
        })?;
        self.bin.write_i32(count)?;
        for iface in interfaces {
            self.bin.write_utf(iface)?;
        }
        self.write_desc_tail(schema.super_schema())
    }

    /// Empty annotation segment, terminator, then the super descriptor.
    fn write_desc_tail(&mut self, super_schema: Option<&Rc<ClassSchema>>) -> Result<()> {
        self.bin.set_mode(true)?;
        self.bin.set_mode(false)?;
        self.bin.write_u8(Tag::EndBlockData.as_u8())?;
        self.write_class_desc(super_schema)
    }

    // --- SERIAL DATA ---

    fn write_serial_data(&mut self, v: &Value, schema: &Rc<ClassSchema>) -> Result<()> {
        let chain = schema.chain();
        for (idx, level) in chain.iter().enumerate() {
            if let Some(hook) = level.write_hook() {
                let saved = self.cur.take();
                self.cur = Some(WriteCtx {
                    obj: v.clone(),
                    level: Rc::clone(level),
                    level_idx: idx,
                    fields_done: false,
                });
                self.bin.set_mode(true)?;
                let res = hook(&mut HookWriter::new(self), v);
                self.cur = saved;
                res?;
                self.bin.set_mode(false)?;
                self.bin.write_u8(Tag::EndBlockData.as_u8())?;
            } else {
                self.default_write_fields(v, idx, level)?;
            }
        }
        Ok(())
    }

    fn default_write_fields(
        &mut self,
        v: &Value,
        level_idx: usize,
        level: &Rc<ClassSchema>,
    ) -> Result<()> {
        let (prims, obj_vals) = {
            let obj = v.as_object().ok_or_else(|| {
                GraphwireError::Internal("field data requested for a non-object".to_string())
            })?;
            let data = obj.borrow();
            let lv = data.level(level_idx)?;
            (lv.prims.clone(), lv.objs.clone())
        };
        self.bin.write_raw(&prims)?;
        for f in level.fields().iter().filter(|f| !f.code().is_prim()) {
            let val = obj_vals.get(f.offset()).cloned().ok_or_else(|| {
                GraphwireError::Internal(format!("reference slot {} out of range", f.offset()))
            })?;
            self.write_object0(&val, f.unshared())?;
        }
        Ok(())
    }

    // --- FATAL PROTOCOL ---

    /// Best-effort in-band fault marker at depth zero. A second failure while
    /// reporting is logged and swallowed; the caller returns the original.
    fn write_fatal(&mut self, cause: &GraphwireError) {
        debug!(%cause, "top-level write failed, recording in-band fault marker");
        if let Err(second) = self.try_write_fatal(cause) {
            warn!(%second, "could not record in-band fault marker");
        }
    }

    fn try_write_fatal(&mut self, cause: &GraphwireError) -> Result<()> {
        self.handles.clear();
        self.replace.clear();
        self.bin.set_mode(false)?;
        self.bin.write_u8(Tag::Exception.as_u8())?;
        self.write_object0(&Value::string(cause.to_string()), false)?;
        self.handles.clear();
        self.replace.clear();
        self.bin.set_mode(true)?;
        Ok(())
    }
}

impl<W: Write> WriteCore for GraphWriter<W> {
    fn core_write_value(&mut self, v: &Value, unshared: bool) -> Result<()> {
        self.write_object0(v, unshared)
    }

    fn core_default_fields(&mut self) -> Result<()> {
        let (obj, level, level_idx) = match self.cur.as_ref() {
            Some(ctx) if !ctx.fields_done => {
                (ctx.obj.clone(), Rc::clone(&ctx.level), ctx.level_idx)
            }
            Some(_) => {
                return Err(GraphwireError::Usage(
                    "field data already written for this level".to_string(),
                ))
            }
            None => {
                return Err(GraphwireError::Usage(
                    "default_fields outside a custom write hook".to_string(),
                ))
            }
        };
        if let Some(ctx) = self.cur.as_mut() {
            ctx.fields_done = true;
        }
        self.bin.set_mode(false)?;
        self.default_write_fields(&obj, level_idx, &level)?;
        self.bin.set_mode(true)?;
        Ok(())
    }

    fn core_put_fields(&mut self) -> Result<PutField> {
        match self.cur.as_ref() {
            Some(ctx) => Ok(PutField::new(Rc::clone(&ctx.level))),
            None => Err(GraphwireError::Usage(
                "put_fields outside a custom write hook".to_string(),
            )),
        }
    }

    fn core_write_fields(&mut self, fields: PutField) -> Result<()> {
        let level = match self.cur.as_ref() {
            Some(ctx) if !ctx.fields_done => {
                if !Rc::ptr_eq(fields.schema(), &ctx.level) {
                    return Err(GraphwireError::Usage(format!(
                        "staged fields belong to {}, not the current level {}",
                        fields.schema().name(),
                        ctx.level.name()
                    )));
                }
                Rc::clone(&ctx.level)
            }
            Some(_) => {
                return Err(GraphwireError::Usage(
                    "field data already written for this level".to_string(),
                ))
            }
            None => {
                return Err(GraphwireError::Usage(
                    "write_fields outside a custom write hook".to_string(),
                ))
            }
        };
        if let Some(ctx) = self.cur.as_mut() {
            ctx.fields_done = true;
        }
        let (prims, objs) = fields.into_parts();
        self.bin.set_mode(false)?;
        self.bin.write_raw(&prims)?;
        for f in level.fields().iter().filter(|f| !f.code().is_prim()) {
            let val = objs.get(f.offset()).cloned().ok_or_else(|| {
                GraphwireError::Internal(format!("reference slot {} out of range", f.offset()))
            })?;
            self.write_object0(&val, f.unshared())?;
        }
        self.bin.set_mode(true)?;
        Ok(())
    }

    fn core_prim(&mut self) -> &mut dyn PrimSink {
        &mut self.bin
    }
}

fn value_schema(v: &Value) -> Option<Rc<ClassSchema>> {
    match v {
        Value::Object(o) => Some(Rc::clone(o.borrow().schema())),
        _ => None,
    }
}
