//! Handle tables: the identity bookkeeping behind back-references.
//!
//! The write side maps node identity (allocation pointer) to the handle it was
//! assigned, so a revisited node becomes a back-reference instead of a second
//! copy; this is what makes cycles terminate. The read side keeps a list of
//! slots in assignment order, each carrying a status (unknown / ok /
//! exception), the decoded payload, and a dependency list used to propagate
//! faults to every node that transitively embedded the failed one.

use crate::error::GraphwireError;
use crate::schema::DescRef;
use crate::value::Value;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::rc::Rc;
use tracing::{debug, trace};
use twox_hash::XxHash64;

type XxMap<K, V> = HashMap<K, V, BuildHasherDefault<XxHash64>>;

/// Internal marker for "no handle". Never appears on the wire.
pub(crate) const NULL_HANDLE: i32 = -1;

// --- WRITE SIDE ---

/// Things a write-side handle can pin alive. Pointer-keyed maps are only
/// sound while the pointee cannot be freed and its address reused.
enum Keep {
    Val(Value),
    Schema(Rc<crate::schema::ClassSchema>),
}

/// Write-side table: identity → handle.
///
/// Handles are assigned in stream order, shared or not; unshared writes burn a
/// handle number without entering the identity map, so they can never be the
/// target of a back-reference.
#[derive(Default)]
pub(crate) struct HandleTable {
    map: XxMap<(usize, u8), i32>,
    keep: Vec<Keep>,
    next: i32,
}

impl HandleTable {
    /// Assigns the next handle to a value node. Only shared assignments become
    /// back-reference targets.
    pub(crate) fn assign_value(&mut self, v: &Value, shared: bool) -> i32 {
        let h = self.next;
        self.next += 1;
        self.keep.push(Keep::Val(v.clone()));
        if shared {
            if let Some(ptr) = v.ident() {
                self.map.insert((ptr, 0), h);
            }
        }
        h
    }

    /// Assigns the next handle to a class descriptor. Descriptors are keyed
    /// separately from `Value::Class` nodes of the same schema: the class and
    /// its descriptor are distinct stream entities with distinct handles.
    pub(crate) fn assign_schema(&mut self, s: &Rc<crate::schema::ClassSchema>) -> i32 {
        let h = self.next;
        self.next += 1;
        self.keep.push(Keep::Schema(Rc::clone(s)));
        self.map.insert((Rc::as_ptr(s) as usize, 1), h);
        h
    }

    pub(crate) fn lookup_value(&self, v: &Value) -> Option<i32> {
        v.ident().and_then(|ptr| self.map.get(&(ptr, 0)).copied())
    }

    pub(crate) fn lookup_schema(&self, s: &Rc<crate::schema::ClassSchema>) -> Option<i32> {
        self.map.get(&(Rc::as_ptr(s) as usize, 1)).copied()
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.keep.clear();
        self.next = 0;
    }
}

/// Memoized write-replace results, keyed by the original node's identity, so
/// a node substituted once is substituted to the same replacement everywhere.
#[derive(Default)]
pub(crate) struct ReplaceTable {
    map: XxMap<usize, Value>,
    keep: Vec<Value>,
}

impl ReplaceTable {
    pub(crate) fn lookup(&self, v: &Value) -> Option<Value> {
        v.ident().and_then(|ptr| self.map.get(&ptr).cloned())
    }

    pub(crate) fn assign(&mut self, original: &Value, replacement: Value) {
        if let Some(ptr) = original.ident() {
            self.keep.push(original.clone());
            self.map.insert(ptr, replacement);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.keep.clear();
    }
}

// --- READ SIDE ---

/// Payload of a read-side slot.
#[derive(Clone)]
pub(crate) enum Slotted {
    /// A decoded (possibly still in-progress) value node.
    Value(Value),
    /// A stream class descriptor.
    Desc(DescRef),
    /// Marker for an unshared read: never a legal back-reference target.
    Unshared,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Status {
    Unknown,
    Ok,
    Exception,
}

struct Slot {
    status: Status,
    payload: Slotted,
    deps: Vec<i32>,
    err: Option<GraphwireError>,
}

/// Read-side handle list with dependency tracking and taint propagation.
///
/// Slots start `Unknown` while the value behind them is still being decoded.
/// `finish` flips fully-decoded runs to `Ok` using a low-watermark: during a
/// cycle, the outermost in-progress handle is the only one allowed to settle
/// its dependents, so a fault recorded anywhere inside the cycle still reaches
/// everyone.
pub(crate) struct HandleList {
    slots: Vec<Slot>,
    /// Lowest handle that acquired a dependent while still `Unknown`;
    /// `NULL_HANDLE` when none is pending.
    low_dep: i32,
}

impl Default for HandleList {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            low_dep: NULL_HANDLE,
        }
    }
}

impl HandleList {
    pub(crate) fn assign(&mut self, payload: Slotted) -> i32 {
        let h = self.slots.len() as i32;
        self.slots.push(Slot {
            status: Status::Unknown,
            payload,
            deps: Vec::new(),
            err: None,
        });
        h
    }

    pub(crate) fn len(&self) -> i32 {
        self.slots.len() as i32
    }

    /// Records that `dependent` embeds the value behind `target`. If `target`
    /// already failed, the fault propagates to `dependent` immediately; if it
    /// is still in progress, the link is deferred until `target` settles.
    pub(crate) fn mark_dependency(&mut self, dependent: i32, target: i32) {
        if dependent == NULL_HANDLE || target == NULL_HANDLE {
            return;
        }
        let (status, err) = match self.slots.get(target as usize) {
            Some(slot) => (slot.status, slot.err.clone()),
            None => return,
        };
        match status {
            Status::Ok => {}
            Status::Exception => {
                if let Some(e) = err {
                    self.mark_exception(dependent, e);
                }
            }
            Status::Unknown => {
                if let Some(slot) = self.slots.get_mut(target as usize) {
                    slot.deps.push(dependent);
                }
                if self.low_dep == NULL_HANDLE || target < self.low_dep {
                    self.low_dep = target;
                }
            }
        }
    }

    /// Records a fault against `handle` and every recorded dependent,
    /// transitively. Already-settled dependents are re-opened as faulted;
    /// their payloads are dropped.
    pub(crate) fn mark_exception(&mut self, handle: i32, err: GraphwireError) {
        if handle == NULL_HANDLE {
            return;
        }
        let mut work = vec![handle];
        let mut tainted = 0usize;
        while let Some(h) = work.pop() {
            let Some(slot) = self.slots.get_mut(h as usize) else {
                continue;
            };
            if slot.status == Status::Exception {
                continue;
            }
            slot.status = Status::Exception;
            slot.payload = Slotted::Value(Value::Null);
            slot.err = Some(err.clone());
            tainted += 1;
            work.append(&mut slot.deps);
        }
        debug!(handle, tainted, %err, "fault recorded on handle");
    }

    /// Settles `handle` (and, when it is the pending low-watermark, the whole
    /// run of later handles) from `Unknown` to `Ok`.
    pub(crate) fn finish(&mut self, handle: i32) {
        if handle == NULL_HANDLE {
            return;
        }
        let end;
        if self.low_dep == NULL_HANDLE {
            // no pending cross-handle dependencies: settle just this one
            end = handle + 1;
        } else if self.low_dep >= handle {
            // unwinding past the watermark: settle everything assigned since
            end = self.slots.len() as i32;
            self.low_dep = NULL_HANDLE;
        } else {
            // a lower in-progress handle still owns the run
            return;
        }
        for h in handle..end {
            if let Some(slot) = self.slots.get_mut(h as usize) {
                if slot.status == Status::Unknown {
                    slot.status = Status::Ok;
                    slot.deps.clear();
                }
            }
        }
        trace!(handle, end, "handles settled");
    }

    /// The fault recorded against `handle`, if any.
    pub(crate) fn lookup_exception(&self, handle: i32) -> Option<GraphwireError> {
        if handle == NULL_HANDLE {
            return None;
        }
        self.slots
            .get(handle as usize)
            .and_then(|slot| slot.err.clone())
    }

    /// The value behind `handle`. In-progress values are returned as-is;
    /// that is what lets a cycle close on a partially-populated node.
    pub(crate) fn lookup_value(&self, handle: i32) -> Option<&Slotted> {
        if handle == NULL_HANDLE {
            return None;
        }
        self.slots.get(handle as usize).map(|slot| &slot.payload)
    }

    /// Replaces the value behind `handle` (read-resolve substitution).
    /// Unshared markers stay markers.
    pub(crate) fn set_value(&mut self, handle: i32, v: Value) {
        if handle == NULL_HANDLE {
            return;
        }
        if let Some(slot) = self.slots.get_mut(handle as usize) {
            if matches!(slot.payload, Slotted::Value(_)) {
                slot.payload = Slotted::Value(v);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.low_dep = NULL_HANDLE;
    }
}
