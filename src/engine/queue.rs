//! Ordered, key-unique working set of cards. Front is the card being shown.

use std::collections::{HashSet, VecDeque};

use super::card::CardRecord;

/// Insertion point for `QueueStore::insert_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offset {
    /// Index into the current contents, clamped to `[0, len]`.
    At(usize),
    End,
}

#[derive(Clone, Debug, Default)]
pub struct QueueStore {
    cards: VecDeque<CardRecord>,
    keys: HashSet<String>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn head(&self) -> Option<&CardRecord> {
        self.cards.front()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CardRecord> {
        self.cards.iter()
    }

    /// Merge a fetched page. With `reset` the current contents are discarded first.
    /// Unknown keys are appended fresh; known keys are left untouched.
    /// Returns how many cards were appended.
    pub fn merge(&mut self, incoming: Vec<CardRecord>, reset: bool) -> usize {
        if reset {
            self.cards.clear();
            self.keys.clear();
        }
        let mut added = 0;
        for card in incoming {
            if self.contains(&card.key) {
                continue;
            }
            self.keys.insert(card.key.clone());
            self.cards.push_back(CardRecord {
                session_repetition: 0,
                last_rating: None,
                ..card
            });
            added += 1;
        }
        self.check();
        added
    }

    pub fn pop_front(&mut self) -> Option<CardRecord> {
        let card = self.cards.pop_front()?;
        self.keys.remove(&card.key);
        Some(card)
    }

    /// Insert `card` into the current contents. Returns the resolved index.
    pub fn insert_at(&mut self, card: CardRecord, offset: Offset) -> usize {
        debug_assert!(!self.contains(&card.key), "duplicate key {} inserted", card.key);
        let index = match offset {
            Offset::At(n) => n.min(self.cards.len()),
            Offset::End => self.cards.len(),
        };
        self.keys.insert(card.key.clone());
        self.cards.insert(index, card);
        self.check();
        index
    }

    pub fn push_front(&mut self, card: CardRecord) {
        self.insert_at(card, Offset::At(0));
    }

    /// Remove the card with `key`, wherever it sits.
    pub fn remove(&mut self, key: &str) -> Option<CardRecord> {
        if !self.keys.remove(key) {
            return None;
        }
        let pos = self.iter().position(|c| c.key == key)?;
        self.cards.remove(pos)
    }

    fn check(&self) {
        debug_assert_eq!(self.cards.len(), self.keys.len(), "queue key index out of sync");
    }
}
