//! Handle registry for callables and opaque references
//!
//! Each runtime owns one registry. Ids are reused after release; releasing an
//! id twice is reported as [`Error::InvalidHandle`].

use crate::value::{Callable, Opaque, Value};
use crate::{Error, Result};
use std::cell::RefCell;
use std::fmt;

/// Integer id of a registered entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    /// Wrap a raw id, e.g. one round-tripped through Lua as an integer
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Raw id, starting at 1
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered entry
#[derive(Debug, Clone)]
pub enum Entry {
    Callable(Callable),
    Opaque(Opaque),
}

impl From<Callable> for Entry {
    fn from(c: Callable) -> Self {
        Entry::Callable(c)
    }
}

impl From<Opaque> for Entry {
    fn from(o: Opaque) -> Self {
        Entry::Opaque(o)
    }
}

#[derive(Default)]
struct Slots {
    /// Index `i` holds handle id `i + 1`
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
}

/// Registry of callables and opaque references crossing the boundary
#[derive(Default)]
pub struct HandleRegistry {
    slots: RefCell<Slots>,
}

impl HandleRegistry {
    /// Empty registry; the first handle issued is `#1`
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry and return its handle
    pub fn register(&self, entry: impl Into<Entry>) -> Handle {
        let entry = entry.into();
        let mut slots = self.slots.borrow_mut();
        let handle = match slots.free.pop() {
            Some(id) => {
                slots.entries[id as usize - 1] = Some(entry);
                Handle(id)
            }
            None => {
                slots.entries.push(Some(entry));
                Handle(slots.entries.len() as u32)
            }
        };
        tracing::debug!("registered handle {}", handle);
        handle
    }

    /// Look up an entry; the returned clone stays valid even if the handle is
    /// released afterwards
    pub fn get(&self, handle: Handle) -> Result<Entry> {
        let slots = self.slots.borrow();
        handle
            .0
            .checked_sub(1)
            .and_then(|i| slots.entries.get(i as usize))
            .and_then(Option::as_ref)
            .cloned()
            .ok_or(Error::InvalidHandle(handle))
    }

    /// Call a registered callable.
    ///
    /// The registry is not borrowed while the callable runs, so it may
    /// register or release handles (including its own).
    pub fn invoke(&self, handle: Handle, args: &[Value]) -> Result<Vec<Value>> {
        match self.get(handle)? {
            Entry::Callable(callable) => callable.call(args),
            Entry::Opaque(_) => Err(Error::InvalidHandle(handle)),
        }
    }

    /// Fetch a registered opaque reference
    pub fn opaque(&self, handle: Handle) -> Result<Opaque> {
        match self.get(handle)? {
            Entry::Opaque(opaque) => Ok(opaque),
            Entry::Callable(_) => Err(Error::InvalidHandle(handle)),
        }
    }

    /// Invalidate a handle; its id may be handed out again
    pub fn release(&self, handle: Handle) -> Result<()> {
        let released = {
            let mut slots = self.slots.borrow_mut();
            let taken = handle
                .0
                .checked_sub(1)
                .and_then(|i| slots.entries.get_mut(i as usize))
                .and_then(Option::take);
            if taken.is_some() {
                slots.free.push(handle.0);
            }
            taken
        };
        // Dropped outside the borrow: the entry may own values whose drop
        // touches this registry
        match released {
            Some(_) => {
                tracing::debug!("released handle {}", handle);
                Ok(())
            }
            None => Err(Error::InvalidHandle(handle)),
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_ok()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.slots
            .borrow()
            .entries
            .iter()
            .filter(|e| e.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.len())
            .finish()
    }
}
