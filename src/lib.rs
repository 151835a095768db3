//! # Graphwire
//!
//! A stream codec for cyclic, shared, polymorphic object graphs. One writer
//! encodes a graph of dynamic [`Value`] nodes into a tagged, framed byte
//! stream; one reader rebuilds the graph on the other side, identity,
//! sharing, and cycles included.
//!
//! ## Overview
//!
//! Graphwire does not serialize Rust structs. It serializes *graphs*: nodes
//! (objects, arrays, strings, enum constants, classes) connected by reference,
//! described by explicit, registry-held [`ClassSchema`]s instead of
//! reflection. That indirection is what buys the interesting properties:
//!
//! *   **Identity-preserving:** every shared node is written once and
//!     back-referenced afterwards, so aliasing survives the round trip and
//!     cyclic graphs encode in finite space.
//! *   **Self-describing:** class descriptors travel inline ahead of the
//!     first instance of each class, and later instances back-reference them.
//! *   **Schema-tolerant:** the reader matches stream descriptors against
//!     local schemas by name and field, tolerating added, removed, and
//!     reordered fields; [`GetField`] gives hooks defaulted access to
//!     whatever the stream did or did not carry.
//! *   **Fault-containing:** an unresolvable class or enum constant taints
//!     exactly the values built from it (and whatever embeds them), while
//!     unrelated parts of the same stream keep decoding.
//!
//! ## Architecture
//!
//! ### The framed channel
//!
//! Beneath the codec sits a two-mode byte channel. In raw mode, tags and
//! descriptors pass straight through. In block-data mode, primitive data is
//! coalesced into length-prefixed frames, which is what lets a decoder skip a
//! custom data section it has no hook for without understanding its contents.
//!
//! ### Handles
//!
//! Both sides number values in stream order. The writer keeps an
//! identity-to-handle table; the reader keeps the inverse list, with
//! per-handle status and dependency links so a resolution fault anywhere in a
//! subgraph propagates to every value that transitively embedded it.
//!
//! ### Hooks
//!
//! A schema may carry custom write/read hooks (framed custom data per level),
//! write-replace/read-resolve substitution hooks, and post-decode validation
//! callbacks: the full protocol surface of an evolvable format.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use graphwire::{ClassSchema, GraphReader, GraphWriter, ObjectData, SchemaRegistry, Value};
//! use std::rc::Rc;
//!
//! let registry = Rc::new(SchemaRegistry::new());
//! let point = registry.register(
//!     ClassSchema::builder("geo.Point")
//!         .version(1)
//!         .field_i32("x")
//!         .field_i32("y")
//!         .build(),
//! );
//!
//! let mut data = ObjectData::new(&point);
//! data.set_i32("x", 3)?;
//! data.set_i32("y", 4)?;
//!
//! let mut out = Vec::new();
//! let mut w = GraphWriter::new(&mut out)?;
//! w.write_value(&Value::object(data))?;
//! w.flush()?;
//!
//! let mut r = GraphReader::new(out.as_slice(), Rc::clone(&registry))?;
//! let back = r.read_value()?;
//! ```
//!
//! ### Safety and error handling
//!
//! * **No unsafe:** the crate is `#![deny(unsafe_code)]`.
//! * **No panics:** no `unwrap()` or `panic!()` in the library (enforced by
//!   clippy lints); every failure surfaces as a [`GraphwireError`].
//! * **Single-threaded by design:** a writer or reader owns one stream;
//!   values are `Rc`-shared, not `Send`.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod error;
pub mod fields;
pub mod reader;
pub mod schema;
pub mod value;
pub mod wire;
pub mod writer;

// Private modules
mod block;
mod handles;
mod validate;

// --- RE-EXPORTS ---

pub use error::{GraphwireError, Result};
pub use fields::{GetField, PutField};
pub use reader::{GraphReader, HookReader};
pub use schema::{
    ClassSchema, ClassSchemaBuilder, FieldDesc, ReadHook, SchemaRegistry, SubstituteHook, TypeCode,
    WriteHook,
};
pub use value::{ArrRef, ArrayData, ArrayElems, EnumValue, ObjRef, ObjectData, Value};
pub use writer::{GraphWriter, HookWriter};
