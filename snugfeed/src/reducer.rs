//! Ordered local lists fed by immutable change records.
//!
//! Every open scope (a feed, a comment thread) owns exactly one [`ListState`]
//! and routes all mutations through [`ListState::apply`], so duplicate or late
//! events can never produce a second copy of an item.

use crate::types::{Comment, Post};

/// Items addressable by their row id.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Post {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Comment {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Where newly arrived items are spliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Newest first (feeds).
    Front,
    /// Arrival order (comment threads).
    Back,
}

/// One change to apply to a list.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent<T> {
    Inserted(T),
    Replaced(T),
    Removed(String),
}

/// Loading status of a list, so an empty list is never confused with a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Loading,
    Ready,
    Failed { message: String },
}

impl LoadState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ListState<T> {
    items: Vec<T>,
    placement: Placement,
}

impl<T: Keyed> ListState<T> {
    pub fn new(placement: Placement) -> Self {
        Self {
            items: Vec::new(),
            placement,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.position(id).map(|index| &self.items[index])
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.key() == id)
    }

    /// Replaces the whole list with a fresh fetch, keeping the first copy of any repeated id.
    pub fn reset(&mut self, items: Vec<T>) {
        self.items.clear();
        for item in items {
            if !self.contains(item.key()) {
                self.items.push(item);
            }
        }
    }

    /// Applies one event; returns whether the list changed.
    pub fn apply(&mut self, event: ListEvent<T>) -> bool {
        match event {
            ListEvent::Inserted(item) => {
                if self.contains(item.key()) {
                    return false;
                }
                match self.placement {
                    Placement::Front => self.items.insert(0, item),
                    Placement::Back => self.items.push(item),
                }
                true
            }
            ListEvent::Replaced(item) => match self.position(item.key()) {
                Some(index) => {
                    self.items[index] = item;
                    true
                }
                None => false,
            },
            ListEvent::Removed(id) => {
                let before = self.items.len();
                self.items.retain(|item| item.key() != id);
                self.items.len() != before
            }
        }
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}
