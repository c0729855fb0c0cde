use std::hash::Hash;
use std::marker::PhantomData;

/// Typed reference to an object living in a [`Pool`].
///
/// Handles are small copyable ids; the pool detects stale handles through
/// the generation counter, so a handle to a removed object never aliases a
/// newer object in the same slot.
pub struct Handle<T> {
    pub slot: u16,
    pub generation: u16,
    phantom: PhantomData<T>,
}

// Manual impl so the handle is printable without a `T: Debug` bound, like
// the other hand-written impls below.
impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self {
            slot: u16::MAX,
            generation: u16::MAX,
            phantom: PhantomData,
        }
    }
}

impl<T> Handle<T> {
    pub(crate) fn from_raw_parts(slot: u16, generation: u16) -> Self {
        Self {
            slot,
            generation,
            phantom: PhantomData,
        }
    }
}

/// Generational object pool backing the typed [`Handle`]s.
pub struct Pool<T> {
    items: Vec<Option<T>>,
    empty: Vec<usize>,
    generation: Vec<u16>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new(64)
    }
}

impl<T> Pool<T> {
    pub fn new(initial_size: usize) -> Self {
        let mut items = Vec::with_capacity(initial_size);
        items.resize_with(initial_size, || None);
        Pool {
            items,
            empty: (0..initial_size).rev().collect(),
            generation: vec![0; initial_size],
        }
    }

    pub fn insert(&mut self, item: T) -> Handle<T> {
        let slot = match self.empty.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.items.len();
                self.items.push(None);
                self.generation.push(0);
                slot
            }
        };

        self.items[slot] = Some(item);
        Handle {
            slot: slot as u16,
            generation: self.generation[slot],
            phantom: PhantomData,
        }
    }

    /// Remove the object, bumping the slot generation so outstanding copies
    /// of the handle go stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = handle.slot as usize;
        if slot >= self.items.len() || self.generation[slot] != handle.generation {
            return None;
        }
        let item = self.items[slot].take()?;
        self.generation[slot] = self.generation[slot].wrapping_add(1);
        self.empty.push(slot);
        Some(item)
    }

    pub fn get_ref(&self, handle: Handle<T>) -> Option<&T> {
        let slot = handle.slot as usize;
        if slot < self.items.len() && self.generation[slot] == handle.generation {
            self.items[slot].as_ref()
        } else {
            None
        }
    }

    pub fn get_mut_ref(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = handle.slot as usize;
        if slot < self.items.len() && self.generation[slot] == handle.generation {
            self.items[slot].as_mut()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter_map(|item| item.as_ref())
    }

    /// Drain every live object out of the pool.
    pub fn drain(&mut self) -> Vec<T> {
        let drained: Vec<T> = self.items.iter_mut().filter_map(|item| item.take()).collect();
        self.empty.clear();
        for (slot, generation) in self.generation.iter_mut().enumerate().rev() {
            *generation = generation.wrapping_add(1);
            self.empty.push(slot);
        }
        drained
    }
}
