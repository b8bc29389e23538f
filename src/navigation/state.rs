//! In-memory navigation model.
//!
//! Three sequences describe where the slideshow is:
//! - `pending`: discovered items not yet shown, popped from the tail.
//! - `history`: every item shown, in display order. Only `advance` grows it.
//! - `forward`: items stepped back over by `recall`, replayed by `advance`.
//!
//! `forward` always mirrors the slice of `history` just after the cursor
//! (reversed, so its tail is `history[cursor + 1]`). Nothing here touches the
//! filesystem; callers resolve ids and deal with files that have vanished.

use std::collections::HashSet;
use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Relative path of a displayable image, namespaced with `uploaded/` for
/// items living in the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// How a freshly discovered batch is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryOrder {
    /// Unbiased shuffle of each batch.
    #[default]
    Shuffle,
    /// Keep the order the scanner produced; the first candidate is shown first.
    Preserve,
}

/// Point-in-time copy of the navigation counters, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationSnapshot {
    pub pending: usize,
    pub history: usize,
    pub forward: usize,
    pub seen: usize,
    pub cursor: Option<usize>,
    pub current: Option<ItemId>,
}

impl NavigationSnapshot {
    /// 1-based position of the displayed item, 0 when nothing is shown.
    pub fn position(&self) -> usize {
        self.cursor.map_or(0, |c| c + 1)
    }
}

#[derive(Debug)]
pub struct NavigationState {
    pending: Vec<ItemId>,
    history: Vec<ItemId>,
    forward: Vec<ItemId>,
    cursor: Option<usize>,
    current: Option<ItemId>,
    seen: HashSet<ItemId>,
    order: DiscoveryOrder,
    rng: StdRng,
}

impl NavigationState {
    pub fn new(order: DiscoveryOrder, rng: StdRng) -> Self {
        Self {
            pending: Vec::new(),
            history: Vec::new(),
            forward: Vec::new(),
            cursor: None,
            current: None,
            seen: HashSet::new(),
            order,
            rng,
        }
    }

    /// Build a state whose shuffles are reproducible when `seed` is set.
    pub fn with_seed(order: DiscoveryOrder, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(order, rng)
    }

    /// Queue every candidate not seen since the last full reset.
    ///
    /// Returns how many ids were queued; redundant batches are a no-op.
    pub fn discover<I>(&mut self, candidates: I) -> usize
    where
        I: IntoIterator<Item = ItemId>,
    {
        let seen = &mut self.seen;
        let mut fresh: Vec<ItemId> = candidates
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if fresh.is_empty() {
            return 0;
        }
        match self.order {
            DiscoveryOrder::Shuffle => fresh.shuffle(&mut self.rng),
            // pending pops from the tail
            DiscoveryOrder::Preserve => fresh.reverse(),
        }
        let added = fresh.len();
        self.pending.extend(fresh);
        added
    }

    /// True when the next advance would have to draw from an empty pending
    /// queue, i.e. a rescan could supply something new.
    pub fn needs_refill(&self) -> bool {
        self.forward.is_empty() && self.at_history_end() && self.pending.is_empty()
    }

    fn at_history_end(&self) -> bool {
        match self.cursor {
            Some(cursor) => cursor + 1 >= self.history.len(),
            None => true,
        }
    }

    /// Step to the next item. Returns `None` only when nothing was ever shown
    /// and nothing is pending.
    pub fn advance(&mut self) -> Option<ItemId> {
        if let Some(id) = self.forward.pop() {
            let next = self.cursor.map_or(0, |cursor| cursor + 1);
            debug_assert_eq!(
                self.history.get(next),
                Some(&id),
                "forward stack out of step with history"
            );
            self.cursor = Some(next);
            self.current = Some(id);
            return self.current.clone();
        }

        if let Some(cursor) = self.cursor {
            if cursor + 1 < self.history.len() {
                self.cursor = Some(cursor + 1);
                self.current = Some(self.history[cursor + 1].clone());
                return self.current.clone();
            }
        }

        match self.pending.pop() {
            Some(id) => {
                self.history.push(id.clone());
                self.cursor = Some(self.history.len() - 1);
                self.current = Some(id);
            }
            None => match self.history.first() {
                // circular fallback
                Some(first) => {
                    self.cursor = Some(0);
                    self.current = Some(first.clone());
                }
                None => {
                    self.cursor = None;
                    self.current = None;
                }
            },
        }
        self.current.clone()
    }

    /// Step back one item, remembering the one left so `advance` can replay it.
    /// Saturates at the start of history.
    pub fn recall(&mut self) -> Option<ItemId> {
        if let Some(cursor) = self.cursor.filter(|c| *c > 0) {
            self.forward.push(self.history[cursor].clone());
            self.cursor = Some(cursor - 1);
            self.current = Some(self.history[cursor - 1].clone());
        }
        self.current.clone()
    }

    /// Forget all navigation. A full reset also forgets what was discovered,
    /// so the next scan queues everything again.
    pub fn reset(&mut self, full: bool) {
        self.pending.clear();
        self.history.clear();
        self.forward.clear();
        self.cursor = None;
        self.current = None;
        if full {
            self.seen.clear();
        }
    }

    /// Stop pointing at anything while keeping history and `seen`. Used when
    /// the displayed item can no longer be resolved; the next advance draws
    /// from pending or wraps to the start of history.
    pub fn clear_current(&mut self) {
        self.forward.clear();
        self.cursor = None;
        self.current = None;
    }

    pub fn set_order(&mut self, order: DiscoveryOrder) {
        self.order = order;
    }

    pub fn order(&self) -> DiscoveryOrder {
        self.order
    }

    pub fn current(&self) -> Option<&ItemId> {
        self.current.as_ref()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn pending(&self) -> &[ItemId] {
        &self.pending
    }

    pub fn history(&self) -> &[ItemId] {
        &self.history
    }

    pub fn forward(&self) -> &[ItemId] {
        &self.forward
    }

    pub fn seen(&self) -> &HashSet<ItemId> {
        &self.seen
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        NavigationSnapshot {
            pending: self.pending.len(),
            history: self.history.len(),
            forward: self.forward.len(),
            seen: self.seen.len(),
            cursor: self.cursor,
            current: self.current.clone(),
        }
    }
}
