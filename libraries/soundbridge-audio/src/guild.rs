//! Per-guild state registry
//!
//! Each guild's state sits behind its own mutex; the outer `RwLock` only
//! guards the map itself. Every read-modify-write sequence for one guild
//! happens while holding that guild's mutex, and different guilds never
//! contend with each other.

use soundbridge_core::GuildId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map of guild id to independently locked state
pub struct GuildMap<T> {
    inner: RwLock<HashMap<GuildId, Arc<Mutex<T>>>>,
}

impl<T> Default for GuildMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GuildMap<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Handle to a guild's state, if it exists
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Mutex<T>>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild_id)
            .cloned()
    }

    /// Handle to a guild's state, creating it with `init` on first use
    pub fn get_or_insert_with(&self, guild_id: GuildId, init: impl FnOnce() -> T) -> Arc<Mutex<T>> {
        if let Some(entry) = self.get(guild_id) {
            return entry;
        }
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(guild_id)
                .or_insert_with(|| Arc::new(Mutex::new(init()))),
        )
    }

    /// Run `f` on an existing guild's state
    pub fn with<R>(&self, guild_id: GuildId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let entry = self.get(guild_id)?;
        let mut state = lock(&entry);
        Some(f(&mut state))
    }

    /// Run `f` on a guild's state, creating it with `init` if needed
    pub fn with_or_insert<R>(
        &self,
        guild_id: GuildId,
        init: impl FnOnce() -> T,
        f: impl FnOnce(&mut T) -> R,
    ) -> R {
        let entry = self.get_or_insert_with(guild_id, init);
        let mut state = lock(&entry);
        f(&mut state)
    }

    /// Drop a guild's state
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<Mutex<T>>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&guild_id)
    }

    /// Snapshot of all guild ids (sorted)
    pub fn guilds(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of every guild's handle, for whole-registry walks
    pub fn entries(&self) -> Vec<(GuildId, Arc<Mutex<T>>)> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn insert_once_then_reuse() {
        let map: GuildMap<u32> = GuildMap::new();
        let guild = GuildId::new(1);
        map.with_or_insert(guild, || 5, |v| *v += 1);
        map.with_or_insert(guild, || 100, |v| *v += 1);
        assert_eq!(map.with(guild, |v| *v), Some(7));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn missing_guild_is_none() {
        let map: GuildMap<u32> = GuildMap::new();
        assert!(map.with(GuildId::new(9), |v| *v).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn concurrent_increments_are_serialized_per_guild() {
        let map: Arc<GuildMap<u64>> = Arc::new(GuildMap::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        map.with_or_insert(GuildId::new(3), || 0, |v| *v += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.with(GuildId::new(3), |v| *v), Some(8000));
    }

    #[test]
    fn poisoned_guild_recovers() {
        let map: Arc<GuildMap<u32>> = Arc::new(GuildMap::new());
        map.with_or_insert(GuildId::new(1), || 1, |_| ());
        let clone = Arc::clone(&map);
        let _ = thread::spawn(move || {
            clone.with(GuildId::new(1), |_| panic!("boom"));
        })
        .join();
        assert_eq!(map.with(GuildId::new(1), |v| *v), Some(1));
    }
}
