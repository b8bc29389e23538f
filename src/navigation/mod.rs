//! Thread-safe wrapper around [`NavigationState`].
//!
//! Every operation holds one mutex for its whole duration. The only slow part
//! of navigation, rescanning the library when the pending queue runs dry,
//! happens between two critical sections.

pub mod state;

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

pub use state::{DiscoveryOrder, ItemId, NavigationSnapshot, NavigationState};

/// Anything that can list the currently available items.
pub trait ItemSource {
    fn scan(&self) -> Vec<ItemId>;
}

impl<F> ItemSource for F
where
    F: Fn() -> Vec<ItemId>,
{
    fn scan(&self) -> Vec<ItemId> {
        self()
    }
}

#[derive(Debug)]
pub struct Navigator {
    state: Mutex<NavigationState>,
}

impl Navigator {
    pub fn new(order: DiscoveryOrder, seed: Option<u64>) -> Self {
        Self::from_state(NavigationState::with_seed(order, seed))
    }

    pub fn from_state(state: NavigationState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NavigationState> {
        // operations never panic mid-mutation, so a poisoned state is intact
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn discover(&self, candidates: Vec<ItemId>) -> usize {
        self.lock().discover(candidates)
    }

    /// Advance, rescanning `source` first when the pending queue is exhausted.
    pub fn advance<S>(&self, source: &S) -> Option<ItemId>
    where
        S: ItemSource + ?Sized,
    {
        {
            let mut state = self.lock();
            if !state.needs_refill() {
                return state.advance();
            }
        }
        let batch = source.scan();
        let mut state = self.lock();
        let added = state.discover(batch);
        if added > 0 {
            debug!(added, "frontier rescan queued new items");
        }
        state.advance()
    }

    pub fn recall(&self) -> Option<ItemId> {
        self.lock().recall()
    }

    pub fn reset(&self, full: bool) {
        self.lock().reset(full);
    }

    pub fn clear_current(&self) {
        self.lock().clear_current();
    }

    /// Switch discovery order and forget everything, ready for a rescan.
    pub fn reconfigure(&self, order: DiscoveryOrder) {
        let mut state = self.lock();
        state.set_order(order);
        state.reset(true);
    }

    /// Full reset, discover `batch` and show its first item, in one critical section.
    pub fn restart_with(&self, order: DiscoveryOrder, batch: Vec<ItemId>) -> Option<ItemId> {
        let mut state = self.lock();
        state.set_order(order);
        state.reset(true);
        state.discover(batch);
        state.advance()
    }

    pub fn current(&self) -> Option<ItemId> {
        self.lock().current().cloned()
    }

    /// 1-based index of the displayed item in history, 0 when nothing is shown.
    pub fn position(&self) -> usize {
        self.lock().cursor().map_or(0, |c| c + 1)
    }

    pub fn snapshot(&self) -> NavigationSnapshot {
        self.lock().snapshot()
    }

    /// Run `f` against the locked state.
    pub fn inspect<R>(&self, f: impl FnOnce(&NavigationState) -> R) -> R {
        f(&self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn advance_rescans_only_at_the_frontier() {
        let scans = AtomicUsize::new(0);
        let source = || {
            scans.fetch_add(1, Ordering::SeqCst);
            vec![ItemId::from("a"), ItemId::from("b")]
        };
        let nav = Navigator::new(DiscoveryOrder::Preserve, Some(1));
        assert_eq!(nav.advance(&source), Some(ItemId::from("a")));
        assert_eq!(scans.load(Ordering::SeqCst), 1);
        assert_eq!(nav.advance(&source), Some(ItemId::from("b")));
        assert_eq!(scans.load(Ordering::SeqCst), 1);
        // frontier again: rescan finds nothing new and wraps
        assert_eq!(nav.advance(&source), Some(ItemId::from("a")));
        assert_eq!(scans.load(Ordering::SeqCst), 2);
        assert_eq!(nav.position(), 1);
    }

    #[test]
    fn rescan_picks_up_new_files() {
        let nav = Navigator::new(DiscoveryOrder::Preserve, None);
        nav.discover(vec![ItemId::from("a")]);
        assert_eq!(nav.advance(&Vec::<ItemId>::new), Some(ItemId::from("a")));
        let grown = || vec![ItemId::from("a"), ItemId::from("new")];
        assert_eq!(nav.advance(&grown), Some(ItemId::from("new")));
    }

    #[test]
    fn concurrent_advances_rescan_instead_of_wrapping() {
        let nav = Arc::new(Navigator::new(DiscoveryOrder::Preserve, None));
        nav.discover(vec![ItemId::from("seed-a"), ItemId::from("seed-b")]);
        let minted = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let nav = Arc::clone(&nav);
                let minted = Arc::clone(&minted);
                thread::spawn(move || {
                    // every scan turns up one brand-new file
                    let source = || {
                        let n = minted.fetch_add(1, Ordering::SeqCst);
                        vec![ItemId::new(format!("fresh-{n}.jpg"))]
                    };
                    for _ in 0..500 {
                        nav.advance(&source);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = nav.snapshot();
        assert_eq!(snapshot.history, 2000);
        assert_eq!(snapshot.cursor, Some(1999));
    }

    #[test]
    fn concurrent_callers_never_duplicate_history() {
        let nav = Arc::new(Navigator::new(DiscoveryOrder::Shuffle, Some(3)));
        let universe: Vec<ItemId> = (0..64).map(|i| ItemId::new(format!("{i}.jpg"))).collect();
        nav.discover(universe.clone());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let nav = Arc::clone(&nav);
                thread::spawn(move || {
                    for i in 0..200 {
                        if (i + t) % 3 == 0 {
                            nav.recall();
                        } else {
                            nav.advance(&Vec::<ItemId>::new);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        nav.inspect(|state| {
            let mut unique: Vec<&ItemId> = state.history().iter().collect();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), state.history().len());
            assert!(state.history().len() <= universe.len());
        });
    }
}
