///
/// Scoped pinning of by-reference trampoline arguments
///
/// A `PinScope` lives for exactly one indirect call. Each reference lowered
/// into it stays borrowed (and therefore at a fixed address) until the
/// scope drops, which happens after the callee returns or while unwinding
/// out of it. Counters are per thread so concurrent callers never observe
/// each other's pins.
///

use std::cell::Cell;
use std::marker::PhantomData;

use tracing::trace;

thread_local! {
    static ACTIVE: Cell<usize> = const { Cell::new(0) };
    static TAKEN: Cell<u64> = const { Cell::new(0) };
}

pub struct PinScope<'a> {
    pinned: usize,
    _borrows: PhantomData<&'a mut ()>,
}

impl<'a> PinScope<'a> {
    pub fn new() -> Self {
        Self {
            pinned: 0,
            _borrows: PhantomData,
        }
    }

    pub fn pin_mut<T>(&mut self, target: &'a mut T) -> *mut T {
        let ptr = target as *mut T;
        self.record(ptr as usize);
        ptr
    }

    pub fn pin<T>(&mut self, target: &'a T) -> *const T {
        let ptr = target as *const T;
        self.record(ptr as usize);
        ptr
    }

    /// Number of references pinned by this scope.
    pub fn len(&self) -> usize {
        self.pinned
    }

    pub fn is_empty(&self) -> bool {
        self.pinned == 0
    }

    fn record(&mut self, addr: usize) {
        self.pinned += 1;
        ACTIVE.with(|active| active.set(active.get() + 1));
        TAKEN.with(|taken| taken.set(taken.get() + 1));
        trace!("pinned reference argument at {:#x}", addr);
    }
}

impl Default for PinScope<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PinScope<'_> {
    fn drop(&mut self) {
        if self.pinned > 0 {
            ACTIVE.with(|active| active.set(active.get() - self.pinned));
        }
    }
}

/// Pins currently held on this thread.
pub fn active_pins() -> usize {
    ACTIVE.with(Cell::get)
}

/// Pins ever taken on this thread.
pub fn pins_taken() -> u64 {
    TAKEN.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_releases_on_drop() {
        let mut a = 1u32;
        let b = 2u64;
        let before = pins_taken();
        {
            let mut scope = PinScope::new();
            let pa = scope.pin_mut(&mut a);
            let pb = scope.pin(&b);
            assert_eq!(scope.len(), 2);
            assert_eq!(active_pins(), 2);
            unsafe {
                *pa += 1;
                assert_eq!(*pb, 2);
            }
        }
        assert_eq!(active_pins(), 0);
        assert_eq!(pins_taken(), before + 2);
        assert_eq!(a, 2);
    }

    #[test]
    fn test_scope_releases_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let mut value = 0i32;
            let mut scope = PinScope::new();
            scope.pin_mut(&mut value);
            assert_eq!(active_pins(), 1);
            panic!("callee failed");
        });
        assert!(result.is_err());
        assert_eq!(active_pins(), 0);
    }
}
