//! Process-local window storage.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::window::Window;

/// Mapping from identity key to its counting window.
///
/// Backed by a sharded concurrent map. Mutation goes through
/// [`WindowStore::with_window`], which holds the key's shard lock for the
/// whole read-check-mutate sequence. Only the quota engine mutates a store.
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: DashMap<String, Window>,
}

impl WindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the slot for `key` while holding its lock.
    ///
    /// `f` sees `None` for an absent key. Leaving `Some` in the slot stores
    /// the window, leaving `None` removes it.
    pub(crate) fn with_window<R>(&self, key: &str, f: impl FnOnce(&mut Option<Window>) -> R) -> R {
        match self.windows.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let mut slot = Some(*entry.get());
                let result = f(&mut slot);
                match slot {
                    Some(window) => *entry.get_mut() = window,
                    None => {
                        entry.remove();
                    }
                }
                result
            }
            Entry::Vacant(entry) => {
                let mut slot = None;
                let result = f(&mut slot);
                if let Some(window) = slot {
                    entry.insert(window);
                }
                result
            }
        }
    }

    /// Remove every window that has expired at `now`.
    ///
    /// Returns the number of removed windows.
    pub(crate) fn remove_expired(&self, now: u64) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep = !window.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Drop every window.
    pub(crate) fn clear(&self) {
        self.windows.clear();
    }

    /// Snapshot of the stored window for `key`, expired or not.
    pub fn get(&self, key: &str) -> Option<Window> {
        self.windows.get(key).map(|w| *w)
    }

    /// Number of stored windows, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the store holds no windows.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_window_inserts_and_updates() {
        let store = WindowStore::new();

        store.with_window("a", |slot| {
            assert!(slot.is_none());
            *slot = Some(Window::open(100));
        });
        assert_eq!(store.get("a"), Some(Window { count: 1, reset_time: 100 }));

        store.with_window("a", |slot| {
            if let Some(window) = slot.as_mut() {
                window.count += 1;
            }
        });
        assert_eq!(store.get("a").map(|w| w.count), Some(2));
    }

    #[test]
    fn test_with_window_none_removes() {
        let store = WindowStore::new();
        store.with_window("a", |slot| *slot = Some(Window::open(100)));
        store.with_window("a", |slot| *slot = None);

        assert!(store.get("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_vacant_slot_left_empty_stores_nothing() {
        let store = WindowStore::new();
        store.with_window("a", |_| ());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_remove_expired_keeps_live_windows() {
        let store = WindowStore::new();
        store.with_window("old", |slot| *slot = Some(Window::open(50)));
        store.with_window("edge", |slot| *slot = Some(Window::open(100)));
        store.with_window("live", |slot| *slot = Some(Window::open(500)));

        let removed = store.remove_expired(100);

        assert_eq!(removed, 1);
        assert!(store.get("old").is_none());
        assert!(store.get("edge").is_some());
        assert!(store.get("live").is_some());
    }

    #[test]
    fn test_clear() {
        let store = WindowStore::new();
        store.with_window("a", |slot| *slot = Some(Window::open(1)));
        store.clear();
        assert!(store.is_empty());
    }
}
