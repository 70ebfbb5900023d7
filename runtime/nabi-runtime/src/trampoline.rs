///
/// Indirect-call trampolines
///
/// Native structures hand the host function pointers it must call later
/// (completion callbacks). A `Trampoline<F>` performs that indirect call for
/// one erased signature shape `F`, taking the target address as an argument
/// on every invocation.
///
/// Table:
/// - One trampoline per erased signature, built on first request and leaked
///   for the process lifetime (it holds no per-call state).
/// - Guarded by an RwLock: one writer per new shape, readers afterwards.
///
/// Invocation:
/// 1. Null target → `TrampolineError::NullFunctionPointer`, nothing called.
/// 2. Arguments are lowered; `&mut T` / `&T` are pinned in a `PinScope`.
/// 3. Indirect C call; the raw ABI return value is handed back unchanged.
/// 4. The scope drops, releasing pins (also when unwinding).
///

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{LazyLock, PoisonError, RwLock};

use tracing::debug;

use crate::abi::{AbiReturn, AbiType, AbiValue, NativeFn, RawFnPtr, Shape};
use crate::error::TrampolineError;
use crate::marshal::{Marshal, MarshalKind, NativeBool};
use crate::pinning::PinScope;

/// One trampoline argument, lowered to its erased ABI value.
pub trait CallArg<'a> {
    type Abi: AbiValue;

    fn lower(self, pins: &mut PinScope<'a>) -> Self::Abi;
}

macro_rules! call_arg_identity {
    ($($ty:ty),* $(,)?) => {$(
        impl<'a> CallArg<'a> for $ty {
            type Abi = $ty;

            #[inline]
            fn lower(self, _pins: &mut PinScope<'a>) -> $ty {
                self
            }
        }
    )*};
}

call_arg_identity!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, RawFnPtr);

impl<'a> CallArg<'a> for NativeBool {
    type Abi = i32;

    #[inline]
    fn lower(self, _pins: &mut PinScope<'a>) -> i32 {
        self.raw()
    }
}

impl<'a, T: 'static> CallArg<'a> for *const T {
    type Abi = *const c_void;

    #[inline]
    fn lower(self, _pins: &mut PinScope<'a>) -> *const c_void {
        self.cast()
    }
}

impl<'a, T: 'static> CallArg<'a> for *mut T {
    type Abi = *mut c_void;

    #[inline]
    fn lower(self, _pins: &mut PinScope<'a>) -> *mut c_void {
        self.cast()
    }
}

impl<'a, T> CallArg<'a> for &'a mut T {
    type Abi = *mut c_void;

    #[inline]
    fn lower(self, pins: &mut PinScope<'a>) -> *mut c_void {
        pins.pin_mut(self).cast()
    }
}

impl<'a, T> CallArg<'a> for &'a T {
    type Abi = *const c_void;

    #[inline]
    fn lower(self, pins: &mut PinScope<'a>) -> *const c_void {
        pins.pin(self).cast()
    }
}

/// A tuple of trampoline arguments.
pub trait TrampolineArgs<'a> {
    type Abi;

    fn lower(self, pins: &mut PinScope<'a>) -> Self::Abi;
}

macro_rules! impl_trampoline_args {
    ($($arg:ident $val:ident),*) => {
        impl<'a, $($arg: CallArg<'a>),*> TrampolineArgs<'a> for ($($arg,)*) {
            type Abi = ($(<$arg as CallArg<'a>>::Abi,)*);

            #[inline]
            #[allow(unused_variables)]
            fn lower(self, pins: &mut PinScope<'a>) -> Self::Abi {
                let ($($val,)*) = self;
                ($($val.lower(pins),)*)
            }
        }
    };
}

impl_trampoline_args!();
impl_trampoline_args!(A1 a1);
impl_trampoline_args!(A1 a1, A2 a2);
impl_trampoline_args!(A1 a1, A2 a2, A3 a3);
impl_trampoline_args!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_trampoline_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_trampoline_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_trampoline_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_trampoline_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrampolineState {
    Unbuilt,
    Ready,
}

pub struct Trampoline<F> {
    shape: Shape,
    _signature: PhantomData<F>,
}

impl<F: NativeFn> Trampoline<F> {
    fn build() -> Self {
        Self {
            shape: F::shape(),
            _signature: PhantomData,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Calls `target` with `args`.
    ///
    /// # Safety
    ///
    /// A non-null `target` must be a C function with this trampoline's
    /// signature, and the arguments must satisfy its contract.
    pub unsafe fn invoke<'a, A>(&self, target: RawFnPtr, args: A) -> Result<F::Ret, TrampolineError>
    where
        A: TrampolineArgs<'a, Abi = F::Args>,
    {
        if target.is_null() {
            return Err(TrampolineError::NullFunctionPointer {
                shape: self.shape.clone(),
            });
        }

        let mut pins = PinScope::new();
        let abi = args.lower(&mut pins);
        let entry = unsafe { F::from_raw(target) };
        let ret = unsafe { entry.call(abi) };
        drop(pins);

        Ok(ret)
    }
}

impl<F> fmt::Debug for Trampoline<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline").field("shape", &self.shape).finish()
    }
}

struct TableEntry {
    shape: Shape,
    trampoline: &'static (dyn Any + Send + Sync),
}

type TrampolineTable = HashMap<TypeId, TableEntry>;

static TRAMPOLINES: LazyLock<RwLock<TrampolineTable>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn cached<F: NativeFn>(table: &TrampolineTable) -> Option<&'static Trampoline<F>> {
    let entry: &'static (dyn Any + Send + Sync) = table.get(&TypeId::of::<F>())?.trampoline;
    entry.downcast_ref::<Trampoline<F>>()
}

/// Returns the trampoline for `F`'s signature shape, building it on first use.
pub fn trampoline<F: NativeFn>() -> &'static Trampoline<F::Erased> {
    {
        let table = TRAMPOLINES.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(ready) = cached::<F::Erased>(&table) {
            return ready;
        }
    }

    let mut table = TRAMPOLINES.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(ready) = cached::<F::Erased>(&table) {
        return ready;
    }

    let built: &'static Trampoline<F::Erased> = Box::leak(Box::new(Trampoline::build()));
    table.insert(
        TypeId::of::<F::Erased>(),
        TableEntry {
            shape: built.shape.clone(),
            trampoline: built,
        },
    );
    debug!(shape = %built.shape, "built trampoline");
    built
}

pub fn trampoline_state<F: NativeFn>() -> TrampolineState {
    let table = TRAMPOLINES.read().unwrap_or_else(PoisonError::into_inner);
    match cached::<F::Erased>(&table) {
        Some(_) => TrampolineState::Ready,
        None => TrampolineState::Unbuilt,
    }
}

/// Shapes of every trampoline built so far.
pub fn built_shapes() -> Vec<Shape> {
    let table = TRAMPOLINES.read().unwrap_or_else(PoisonError::into_inner);
    table.values().map(|entry| entry.shape.clone()).collect()
}

/// A typed, nullable native function pointer stored inside a native
/// structure. The host calls through it with [`Callback::invoke`].
#[repr(transparent)]
pub struct Callback<F> {
    raw: RawFnPtr,
    _signature: PhantomData<F>,
}

impl<F: NativeFn> Callback<F> {
    pub const fn null() -> Self {
        Self {
            raw: RawFnPtr::NULL,
            _signature: PhantomData,
        }
    }

    pub fn from_fn(entry: F) -> Self {
        Self {
            raw: entry.to_raw(),
            _signature: PhantomData,
        }
    }

    /// # Safety
    ///
    /// A non-null `raw` must point to a C function with signature `F`.
    pub const unsafe fn from_raw(raw: RawFnPtr) -> Self {
        Self {
            raw,
            _signature: PhantomData,
        }
    }

    pub fn raw(self) -> RawFnPtr {
        self.raw
    }

    pub fn is_null(self) -> bool {
        self.raw.is_null()
    }

    /// Calls through the stored pointer via the shared trampoline.
    ///
    /// This is the untyped entry point. `args` is checked only against the
    /// erased ABI shape of `F`, so `(&mut u8, i32)` is accepted where `F`
    /// takes `*mut Request, i32`. Generated structs wrap each callback field
    /// in an `invoke_<field>` helper with the declared parameter types;
    /// call that instead where one exists.
    ///
    /// # Safety
    ///
    /// The stored pointer must still be valid and `args` must satisfy the
    /// callee's contract.
    pub unsafe fn invoke<'a, A>(
        self,
        args: A,
    ) -> Result<<F::Erased as NativeFn>::Ret, TrampolineError>
    where
        A: TrampolineArgs<'a, Abi = <F::Erased as NativeFn>::Args>,
    {
        unsafe { trampoline::<F>().invoke(self.raw, args) }
    }
}

impl<F> Clone for Callback<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for Callback<F> {}

impl<F> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", self.raw.as_ptr())
    }
}

unsafe impl<F: NativeFn> AbiValue for Callback<F> {
    const ABI: AbiType = AbiType::FnPtr;
    type Erased = RawFnPtr;

    #[inline]
    fn erase(self) -> RawFnPtr {
        self.raw
    }
}

unsafe impl<F: NativeFn> AbiReturn for Callback<F> {
    const ABI: AbiType = AbiType::FnPtr;
    type Erased = RawFnPtr;
}

impl<F: NativeFn> Marshal for Callback<F> {
    type Abi = Callback<F>;
    const KIND: MarshalKind = MarshalKind::Direct;

    #[inline]
    fn to_abi(self) -> Self {
        self
    }

    #[inline]
    fn from_abi(abi: Self) -> Self {
        abi
    }
}

impl<'a, F: NativeFn> CallArg<'a> for Callback<F> {
    type Abi = RawFnPtr;

    #[inline]
    fn lower(self, _pins: &mut PinScope<'a>) -> RawFnPtr {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct Counter {
        hits: i32,
    }

    unsafe extern "C" fn bump(counter: *mut Counter, by: i32) {
        unsafe { (*counter).hits += by };
    }

    unsafe extern "C" fn scale(value: f64, factor: u16) -> f64 {
        value * factor as f64
    }

    #[test]
    fn test_same_shape_shares_one_trampoline() {
        type Typed = unsafe extern "C" fn(*mut Counter, i32);
        type Untyped = unsafe extern "C" fn(*mut c_void, i32);

        let a = trampoline::<Typed>() as *const _ as usize;
        let b = trampoline::<Untyped>() as *const _ as usize;
        assert_eq!(a, b);
        assert_eq!(trampoline_state::<Typed>(), TrampolineState::Ready);
        assert!(built_shapes().contains(&Typed::shape()));
    }

    #[test]
    fn test_unbuilt_shape_reports_unbuilt() {
        type Never = unsafe extern "C" fn(u8, u8, u8, u8, u8, u8, u8, i8) -> i8;
        assert_eq!(trampoline_state::<Never>(), TrampolineState::Unbuilt);
    }

    #[test]
    fn test_callback_invoke_pins_reference() {
        type Bump = unsafe extern "C" fn(*mut Counter, i32);
        let callback = Callback::from_fn(bump as Bump);
        let mut counter = Counter { hits: 1 };

        let result = unsafe { callback.invoke((&mut counter, 4i32)) };
        assert_eq!(result, Ok(()));
        assert_eq!(counter.hits, 5);
        assert_eq!(crate::pinning::active_pins(), 0);
    }

    #[test]
    fn test_return_value_passes_through() {
        type Scale = unsafe extern "C" fn(f64, u16) -> f64;
        let callback = Callback::from_fn(scale as Scale);
        let result = unsafe { callback.invoke((1.5f64, 4u16)) };
        assert_eq!(result, Ok(6.0));
    }

    #[test]
    fn test_null_callback_is_rejected() {
        type Bump = unsafe extern "C" fn(*mut Counter, i32);
        let callback: Callback<Bump> = Callback::null();
        let mut counter = Counter { hits: 0 };

        let err = unsafe { callback.invoke((&mut counter, 1i32)) }.unwrap_err();
        assert_eq!(
            err,
            TrampolineError::NullFunctionPointer {
                shape: Bump::shape()
            }
        );
        assert_eq!(counter.hits, 0);
    }
}
