///
/// Handle wrapper cache
///
/// Maps native addresses to shared host-side wrappers so the same native
/// object is represented by the same wrapper while it is alive. Entries hold
/// only a `Weak` reference and carry an explicit liveness flag:
/// - `invalidate` is called when the native object is released; the entry
///   stops resolving even if wrappers are still held elsewhere.
/// - An address reused by the allocator after invalidation gets a fresh
///   wrapper, never the stale one.
///

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::trace;

use crate::marshal::NativeHandle;

struct Entry<T> {
    wrapper: Weak<T>,
    live: bool,
}

pub struct HandleCache<T> {
    entries: Mutex<HashMap<usize, Entry<T>>>,
}

impl<T> HandleCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The live wrapper for `handle`, creating one with `make` when there is
    /// none. Null handles are never cached.
    pub fn get_or_insert_with<H, M>(&self, handle: H, make: M) -> Option<Arc<T>>
    where
        H: NativeHandle,
        M: FnOnce(H) -> T,
    {
        if handle.is_null() {
            return None;
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries
            .get(&handle.addr())
            .filter(|entry| entry.live)
            .and_then(|entry| entry.wrapper.upgrade())
        {
            return Some(existing);
        }

        let wrapper = Arc::new(make(handle));
        entries.insert(
            handle.addr(),
            Entry {
                wrapper: Arc::downgrade(&wrapper),
                live: true,
            },
        );
        trace!(addr = handle.addr(), "cached handle wrapper");
        Some(wrapper)
    }

    /// Records an already-built wrapper, replacing any previous entry.
    pub fn register<H: NativeHandle>(&self, handle: H, wrapper: &Arc<T>) {
        if handle.is_null() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            handle.addr(),
            Entry {
                wrapper: Arc::downgrade(wrapper),
                live: true,
            },
        );
    }

    pub fn lookup<H: NativeHandle>(&self, handle: H) -> Option<Arc<T>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&handle.addr())
            .filter(|entry| entry.live)
            .and_then(|entry| entry.wrapper.upgrade())
    }

    /// Marks the native object at `handle` as released.
    pub fn invalidate<H: NativeHandle>(&self, handle: H) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&handle.addr()) {
            Some(entry) if entry.live => {
                entry.live = false;
                trace!(addr = handle.addr(), "invalidated handle wrapper");
                true
            }
            _ => false,
        }
    }

    pub fn is_live<H: NativeHandle>(&self, handle: H) -> bool {
        self.lookup(handle).is_some()
    }

    /// Drops entries that are invalidated or whose wrappers are gone.
    pub fn purge(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.live && entry.wrapper.strong_count() > 0);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for HandleCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;

    crate::native_handle!(
        struct Voice;
    );

    #[derive(Debug)]
    struct VoiceWrapper {
        handle: Voice,
    }

    fn voice(addr: usize) -> Voice {
        Voice::from_raw(addr as *mut c_void)
    }

    #[test]
    fn test_same_address_same_wrapper() {
        let cache = HandleCache::new();
        let a = cache
            .get_or_insert_with(voice(0x1000), |handle| VoiceWrapper { handle })
            .unwrap();
        let b = cache
            .get_or_insert_with(voice(0x1000), |handle| VoiceWrapper { handle })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.handle, voice(0x1000));
        assert!(cache.is_live(voice(0x1000)));
    }

    #[test]
    fn test_reused_address_after_invalidate_gets_fresh_wrapper() {
        let cache = HandleCache::new();
        let first = cache
            .get_or_insert_with(voice(0x2000), |handle| VoiceWrapper { handle })
            .unwrap();

        assert!(cache.invalidate(voice(0x2000)));
        assert!(!cache.invalidate(voice(0x2000)));
        assert!(cache.lookup(voice(0x2000)).is_none());

        let second = cache
            .get_or_insert_with(voice(0x2000), |handle| VoiceWrapper { handle })
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_null_handles_are_not_cached() {
        let cache: HandleCache<VoiceWrapper> = HandleCache::new();
        assert!(cache
            .get_or_insert_with(Voice::NULL, |handle| VoiceWrapper { handle })
            .is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_drops_dead_entries() {
        let cache = HandleCache::new();
        let kept = cache
            .get_or_insert_with(voice(0x10), |handle| VoiceWrapper { handle })
            .unwrap();
        drop(cache.get_or_insert_with(voice(0x20), |handle| VoiceWrapper { handle }));
        let released = Arc::new(VoiceWrapper { handle: voice(0x30) });
        cache.register(voice(0x30), &released);
        cache.invalidate(voice(0x30));

        assert_eq!(cache.purge(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(voice(0x10)).is_some());
        drop(kept);
    }
}
