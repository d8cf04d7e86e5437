//! Slab storage for stream records with generation-tagged handles.
//!
//! A handle carries the slot index and the generation the slot had when the
//! stream was allocated. Every allocation into a slot bumps its generation,
//! so a handle to a freed stream never resolves to the stream that later
//! reuses the slot.

use std::collections::HashMap;

use slab::Slab;

/// Handle to a claimed stream. Cheap to copy; stale handles resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    index: usize,
    generation: u32,
}

impl std::fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: T,
}

#[derive(Debug)]
pub struct StreamArena<T> {
    slots: Slab<Slot<T>>,
    generations: HashMap<usize, u32>,
}

impl<T> StreamArena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Slab::with_capacity(capacity),
            generations: HashMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, value: T) -> StreamHandle {
        let entry = self.slots.vacant_entry();
        let index = entry.key();
        let generation = self.generations.entry(index).or_insert(0);
        *generation = generation.wrapping_add(1);
        let generation = *generation;
        entry.insert(Slot { generation, value });
        StreamHandle { index, generation }
    }

    pub fn get(&self, handle: StreamHandle) -> Option<&T> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, handle: StreamHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .map(|slot| &mut slot.value)
    }

    pub fn contains(&self, handle: StreamHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn remove(&mut self, handle: StreamHandle) -> Option<T> {
        if !self.contains(handle) {
            return None;
        }
        self.slots.try_remove(handle.index).map(|slot| slot.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StreamHandle, &T)> {
        self.slots.iter().map(|(index, slot)| {
            (
                StreamHandle {
                    index,
                    generation: slot.generation,
                },
                &slot.value,
            )
        })
    }

    pub fn handles(&self) -> Vec<StreamHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
