//! Generation-checked arena storage
//!
//! Objects in an arena are addressed by [Handle]s. A handle records the generation of
//! the slot it was issued for, so a handle to a removed object never reaches an object
//! that later reuses the slot.

use crate::field::Field;
use crate::grid::element::Element;
use crate::grid::node::Node;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A handle to an object in an [Arena]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
            marker: PhantomData,
        }
    }

    /// The slot index
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

/// A handle to a node
pub type NodeHandle = Handle<Node>;
/// A handle to an element
pub type ElementHandle = Handle<Element>;
/// A handle to a field
pub type FieldHandle = Handle<Field>;

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Storage for objects addressed by handles
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: vec![],
            free: vec![],
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of objects
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the arena empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add an object
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let generation = match self.slots[index] {
                Slot::Vacant { generation } => generation + 1,
                Slot::Occupied { generation, .. } => generation + 1,
            };
            self.slots[index] = Slot::Occupied { generation, value };
            Handle::new(index, generation)
        } else {
            self.slots.push(Slot::Occupied {
                generation: 0,
                value,
            });
            Handle::new(self.slots.len() - 1, 0)
        }
    }

    /// Get an object
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        match self.slots.get(handle.index())? {
            Slot::Occupied { generation, value } if *generation == handle.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Get an object mutably
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.slots.get_mut(handle.index())? {
            Slot::Occupied { generation, value } if *generation == handle.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Does the handle refer to an object in this arena?
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Remove an object
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let generation = match self.slots.get(handle.index())? {
            Slot::Occupied { generation, .. } if *generation == handle.generation => *generation,
            _ => return None,
        };
        let old = std::mem::replace(
            &mut self.slots[handle.index()],
            Slot::Vacant { generation },
        );
        self.free.push(handle.index());
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Iterate over the objects and their handles
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((Handle::new(index, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }
}
