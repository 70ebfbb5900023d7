///
/// ABI Types and Native Function Signatures
///
/// Describes values as they cross the C boundary. Every type that may sit
/// in a native argument list, return slot or `#[repr(C)]` field implements
/// `AbiValue`; every `unsafe extern "C" fn` type up to eight parameters
/// implements `NativeFn`.
///
/// Erasure:
/// - Each `AbiValue` names an `Erased` type that shares its machine-level
///   representation (`*mut Sound` → `*mut c_void`, handles → `*mut c_void`,
///   `NativeBool` → `i32`).
/// - `NativeFn::Erased` applies erasure to a whole signature, so all
///   signatures with the same ABI shape collapse onto one erased fn type.
///   The trampoline table is keyed by that erased type.
///

use std::ffi::c_void;
use std::fmt;

/// Machine-level class of a value crossing the native boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiType {
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    ConstPtr,
    MutPtr,
    FnPtr,
    Struct(&'static str),
    Void,
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbiType::I8 => "i8",
            AbiType::I16 => "i16",
            AbiType::I32 => "i32",
            AbiType::I64 => "i64",
            AbiType::Isize => "isize",
            AbiType::U8 => "u8",
            AbiType::U16 => "u16",
            AbiType::U32 => "u32",
            AbiType::U64 => "u64",
            AbiType::Usize => "usize",
            AbiType::F32 => "f32",
            AbiType::F64 => "f64",
            AbiType::ConstPtr => "ptr",
            AbiType::MutPtr => "ptr_mut",
            AbiType::FnPtr => "fnptr",
            AbiType::Struct(name) => name,
            AbiType::Void => "void",
        };
        f.write_str(name)
    }
}

/// The call-signature shape of a native function: ordered ABI parameter
/// types plus the ABI return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    params: Vec<AbiType>,
    ret: AbiType,
}

impl Shape {
    pub fn new(params: Vec<AbiType>, ret: AbiType) -> Self {
        Self { params, ret }
    }

    pub fn params(&self) -> &[AbiType] {
        &self.params
    }

    pub fn ret(&self) -> AbiType {
        self.ret
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// An untyped native code address. May be null.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawFnPtr(*const c_void);

impl RawFnPtr {
    pub const NULL: Self = Self(std::ptr::null());

    pub const fn from_ptr(ptr: *const c_void) -> Self {
        Self(ptr)
    }

    pub const fn as_ptr(self) -> *const c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

// A code address carries no thread affinity.
unsafe impl Send for RawFnPtr {}
unsafe impl Sync for RawFnPtr {}

impl fmt::Debug for RawFnPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFnPtr({:p})", self.0)
    }
}

impl Default for RawFnPtr {
    fn default() -> Self {
        Self::NULL
    }
}

/// A value that can be passed to or returned from a C function unchanged.
///
/// # Safety
///
/// Implementors must be FFI-safe (`#[repr(C)]`, `#[repr(transparent)]` or a
/// primitive) and `Erased` must have an identical ABI representation.
pub unsafe trait AbiValue: Copy + 'static {
    const ABI: AbiType;
    type Erased: AbiValue;

    fn erase(self) -> Self::Erased;
}

/// A type allowed in the return slot of a native function; `()` is `void`.
///
/// # Safety
///
/// Same contract as [`AbiValue`].
pub unsafe trait AbiReturn: 'static {
    const ABI: AbiType;
    type Erased: AbiReturn;
}

unsafe impl AbiReturn for () {
    const ABI: AbiType = AbiType::Void;
    type Erased = ();
}

macro_rules! abi_scalar {
    ($($ty:ty => $abi:ident),* $(,)?) => {$(
        unsafe impl AbiValue for $ty {
            const ABI: AbiType = AbiType::$abi;
            type Erased = $ty;

            #[inline]
            fn erase(self) -> $ty {
                self
            }
        }

        unsafe impl AbiReturn for $ty {
            const ABI: AbiType = AbiType::$abi;
            type Erased = $ty;
        }
    )*};
}

abi_scalar!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
);

unsafe impl<T: 'static> AbiValue for *const T {
    const ABI: AbiType = AbiType::ConstPtr;
    type Erased = *const c_void;

    #[inline]
    fn erase(self) -> *const c_void {
        self.cast()
    }
}

unsafe impl<T: 'static> AbiReturn for *const T {
    const ABI: AbiType = AbiType::ConstPtr;
    type Erased = *const c_void;
}

unsafe impl<T: 'static> AbiValue for *mut T {
    const ABI: AbiType = AbiType::MutPtr;
    type Erased = *mut c_void;

    #[inline]
    fn erase(self) -> *mut c_void {
        self.cast()
    }
}

unsafe impl<T: 'static> AbiReturn for *mut T {
    const ABI: AbiType = AbiType::MutPtr;
    type Erased = *mut c_void;
}

unsafe impl AbiValue for RawFnPtr {
    const ABI: AbiType = AbiType::FnPtr;
    type Erased = RawFnPtr;

    #[inline]
    fn erase(self) -> RawFnPtr {
        self
    }
}

unsafe impl AbiReturn for RawFnPtr {
    const ABI: AbiType = AbiType::FnPtr;
    type Erased = RawFnPtr;
}

/// An `unsafe extern "C" fn` pointer type with an ABI-checked signature.
///
/// # Safety
///
/// Only implemented for C-ABI function pointer types whose parameters and
/// return are `AbiValue`/`AbiReturn`.
pub unsafe trait NativeFn: Copy + Send + Sync + 'static {
    /// Argument tuple, in declaration order.
    type Args;
    type Ret: AbiReturn;
    /// Same signature with every parameter and the return erased.
    type Erased: NativeFn;

    fn shape() -> Shape;

    /// Reinterprets a native code address as this function type.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and point to a function with this exact
    /// signature and the C calling convention.
    unsafe fn from_raw(ptr: RawFnPtr) -> Self;

    fn to_raw(self) -> RawFnPtr;

    /// # Safety
    ///
    /// Calls foreign code; the callee's contract must be upheld by `args`.
    unsafe fn call(self, args: Self::Args) -> Self::Ret;
}

macro_rules! impl_native_fn {
    ($($arg:ident $val:ident),*) => {
        unsafe impl<R: AbiReturn, $($arg: AbiValue),*> NativeFn for unsafe extern "C" fn($($arg),*) -> R {
            type Args = ($($arg,)*);
            type Ret = R;
            type Erased = unsafe extern "C" fn($(<$arg as AbiValue>::Erased),*) -> <R as AbiReturn>::Erased;

            fn shape() -> Shape {
                Shape::new(vec![$(<$arg as AbiValue>::ABI),*], <R as AbiReturn>::ABI)
            }

            #[inline]
            unsafe fn from_raw(ptr: RawFnPtr) -> Self {
                debug_assert!(!ptr.is_null());
                unsafe { std::mem::transmute_copy::<*const c_void, Self>(&ptr.as_ptr()) }
            }

            #[inline]
            fn to_raw(self) -> RawFnPtr {
                RawFnPtr::from_ptr(self as *const c_void)
            }

            #[inline]
            unsafe fn call(self, args: Self::Args) -> R {
                let ($($val,)*) = args;
                unsafe { (self)($($val),*) }
            }
        }
    };
}

impl_native_fn!();
impl_native_fn!(A1 a1);
impl_native_fn!(A1 a1, A2 a2);
impl_native_fn!(A1 a1, A2 a2, A3 a3);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
impl_native_fn!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7, A8 a8);

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::TypeId;

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct Info {
        value: i32,
    }

    unsafe extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    #[test]
    fn test_shape_display() {
        type Done = unsafe extern "C" fn(*mut c_void, i32);
        assert_eq!(Done::shape().to_string(), "(ptr_mut, i32) -> void");
        assert_eq!(Done::shape().arity(), 2);
    }

    #[test]
    fn test_erasure_collapses_pointer_types() {
        type Typed = unsafe extern "C" fn(*mut Info, i32) -> *const Info;
        type Untyped = unsafe extern "C" fn(*mut c_void, i32) -> *const c_void;
        assert_eq!(
            TypeId::of::<<Typed as NativeFn>::Erased>(),
            TypeId::of::<Untyped>()
        );
        assert_eq!(Typed::shape(), Untyped::shape());
    }

    #[test]
    fn test_raw_round_trip_and_call() {
        type Add = unsafe extern "C" fn(i32, i32) -> i32;
        let raw = (add as Add).to_raw();
        assert!(!raw.is_null());
        let f = unsafe { Add::from_raw(raw) };
        assert_eq!(unsafe { f.call((2, 40)) }, 42);
    }

    #[test]
    fn test_raw_fn_ptr_null() {
        assert!(RawFnPtr::NULL.is_null());
        assert_eq!(RawFnPtr::default(), RawFnPtr::NULL);
        assert_eq!(RawFnPtr::NULL.addr(), 0);
    }
}
