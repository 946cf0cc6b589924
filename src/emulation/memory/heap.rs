//! Managed heap implementation for CIL emulation.
//!
//! This module provides [`ManagedHeap`], which simulates the .NET runtime's
//! garbage-collected heap. It supports allocation of:
//!
//! - **Strings** - Immutable .NET strings
//! - **Arrays** - Single-dimensional arrays with element type tracking
//! - **Objects** - Class instances with field storage keyed by field definition
//! - **Boxed values** - Value types wrapped as reference types
//! - **Delegates** - Method references with optional target objects
//! - **Reflection objects** - `System.Type`, `MethodInfo` and `PropertyInfo` instances
//!
//! # Ownership
//!
//! Every emulator owns its heap. Nothing on it is shared between threads, so the heap
//! needs no locking. Emulating the same module on several threads means several heaps.
//!
//! # Object References
//!
//! Objects are referenced via [`HeapRef`], an opaque handle holding a slot index.
//! References stay valid for the lifetime of the heap (no garbage collection is
//! simulated).

use std::{collections::HashMap, fmt};

use crate::emulation::{EmValue, EmulationError, HeapRef, Member, RuntimeType};

/// Default maximum number of live objects.
pub const DEFAULT_HEAP_LIMIT: usize = 1 << 20;

/// Object stored on the managed heap.
#[derive(Clone, Debug)]
pub enum HeapObject<'m> {
    /// A .NET string
    String(String),

    /// A boxed value type
    Boxed {
        /// The unboxed value
        value: EmValue<'m>,
        /// Type the value was boxed as
        ty: RuntimeType<'m>,
    },

    /// A single-dimensional array
    Array {
        /// Element type
        element: RuntimeType<'m>,
        /// Elements
        items: Vec<EmValue<'m>>,
    },

    /// An instance of a class defined in some module
    Object {
        /// Runtime type
        ty: Member<'m>,
        /// Field values, fields never written read as their type's zero value
        fields: HashMap<Member<'m>, EmValue<'m>>,
    },

    /// A delegate bound to a method and an optional receiver
    Delegate {
        /// Delegate type
        ty: Member<'m>,
        /// Receiver, `null` for static methods
        target: EmValue<'m>,
        /// Bound method
        method: Member<'m>,
    },

    /// A `System.Type`
    Type(RuntimeType<'m>),

    /// A `System.Reflection.MethodInfo`
    Method(Member<'m>),

    /// A `System.Reflection.PropertyInfo`
    Property {
        /// Declaring type
        declaring: RuntimeType<'m>,
        /// Property name
        name: String,
    },
}

impl HeapObject<'_> {
    /// Short description of the object kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HeapObject::String(_) => "string",
            HeapObject::Boxed { .. } => "boxed value",
            HeapObject::Array { .. } => "array",
            HeapObject::Object { .. } => "object",
            HeapObject::Delegate { .. } => "delegate",
            HeapObject::Type(_) => "type",
            HeapObject::Method(_) => "method info",
            HeapObject::Property { .. } => "property info",
        }
    }
}

impl fmt::Display for HeapObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapObject::String(s) => write!(f, "\"{s}\""),
            HeapObject::Boxed { value, ty } => write!(f, "box<{ty}>({value})"),
            HeapObject::Array { element, items } => write!(f, "{element}[{}]", items.len()),
            HeapObject::Object { ty, .. } => write!(f, "{ty}"),
            HeapObject::Delegate { method, .. } => write!(f, "delegate {method}"),
            HeapObject::Type(ty) => write!(f, "typeof({ty})"),
            HeapObject::Method(method) => write!(f, "{method}"),
            HeapObject::Property { declaring, name } => write!(f, "{declaring}::{name}"),
        }
    }
}

/// Simulated managed heap.
#[derive(Debug)]
pub struct ManagedHeap<'m> {
    objects: Vec<HeapObject<'m>>,
    limit: usize,
}

impl Default for ManagedHeap<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_LIMIT)
    }
}

impl<'m> ManagedHeap<'m> {
    /// Creates an empty heap holding at most `limit` objects
    #[must_use]
    pub fn new(limit: usize) -> Self {
        ManagedHeap {
            objects: Vec::new(),
            limit,
        }
    }

    /// Allocates an object
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::HeapLimitExceeded`] if the heap is full.
    pub fn alloc(&mut self, object: HeapObject<'m>) -> Result<HeapRef, EmulationError> {
        if self.objects.len() >= self.limit {
            return Err(EmulationError::HeapLimitExceeded(self.limit));
        }
        let id = u32::try_from(self.objects.len())
            .map_err(|_| EmulationError::HeapLimitExceeded(self.limit))?;
        self.objects.push(object);
        Ok(HeapRef::new(id))
    }

    /// Allocates a string
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::HeapLimitExceeded`] if the heap is full.
    pub fn alloc_string(&mut self, value: impl Into<String>) -> Result<HeapRef, EmulationError> {
        self.alloc(HeapObject::String(value.into()))
    }

    /// The object behind a reference
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidHeapRef`] for a dangling reference.
    pub fn get(&self, object: HeapRef) -> Result<&HeapObject<'m>, EmulationError> {
        usize::try_from(object.id())
            .ok()
            .and_then(|index| self.objects.get(index))
            .ok_or(EmulationError::InvalidHeapRef(object))
    }

    /// The object behind a reference, mutably
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidHeapRef`] for a dangling reference.
    pub fn get_mut(&mut self, object: HeapRef) -> Result<&mut HeapObject<'m>, EmulationError> {
        usize::try_from(object.id())
            .ok()
            .and_then(|index| self.objects.get_mut(index))
            .ok_or(EmulationError::InvalidHeapRef(object))
    }

    /// The contents of a string object, `None` for other objects
    #[must_use]
    pub fn string(&self, object: HeapRef) -> Option<&str> {
        match self.get(object).ok()? {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Number of allocated objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing was allocated
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates over all objects in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (HeapRef, &HeapObject<'m>)> {
        (0u32..)
            .zip(&self.objects)
            .map(|(id, object)| (HeapRef::new(id), object))
    }
}
