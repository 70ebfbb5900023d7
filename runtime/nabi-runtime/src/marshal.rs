///
/// Marshaling between host domain types and native ABI values
///
/// Three marshal kinds exist and are fixed per domain type:
/// - Direct: primitives, raw pointers, blittable structs, callbacks
/// - HandleUnwrap: opaque handle newtypes reduce to their address
/// - BoolAsInt32: `bool` travels as a 4-byte integer, nonzero = true
///
/// Handle newtypes come from `native_handle!`, blittable structs from
/// `blittable!`. Generated forwarders only ever call `Marshal::to_abi` and
/// `Marshal::from_abi`, so a mismatch between the generator's ABI mapping
/// and these impls is a compile error in the generated crate.
///

use std::ffi::c_void;

use crate::abi::{AbiReturn, AbiType, AbiValue, RawFnPtr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarshalKind {
    Direct,
    HandleUnwrap,
    BoolAsInt32,
}

impl MarshalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MarshalKind::Direct => "direct",
            MarshalKind::HandleUnwrap => "handle",
            MarshalKind::BoolAsInt32 => "bool-as-i32",
        }
    }
}

/// Conversion between a domain type and its native representation.
pub trait Marshal: Sized {
    type Abi: AbiValue;
    const KIND: MarshalKind;

    fn to_abi(self) -> Self::Abi;
    fn from_abi(abi: Self::Abi) -> Self;
}

macro_rules! marshal_direct {
    ($($ty:ty),* $(,)?) => {$(
        impl Marshal for $ty {
            type Abi = $ty;
            const KIND: MarshalKind = MarshalKind::Direct;

            #[inline]
            fn to_abi(self) -> $ty {
                self
            }

            #[inline]
            fn from_abi(abi: $ty) -> Self {
                abi
            }
        }
    )*};
}

marshal_direct!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, RawFnPtr);

impl<T: 'static> Marshal for *const T {
    type Abi = *const T;
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

impl<T: 'static> Marshal for *mut T {
    type Abi = *mut T;
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

impl Marshal for bool {
    type Abi = i32;
    const KIND: MarshalKind = MarshalKind::BoolAsInt32;

    #[inline]
    fn to_abi(self) -> i32 {
        self as i32
    }

    #[inline]
    fn from_abi(abi: i32) -> Self {
        abi != 0
    }
}

/// A boolean stored the way native code stores it: a 4-byte integer.
///
/// Used for `bool` fields inside `#[repr(C)]` structs and for `bool`
/// pointees, where the host `bool` (1 byte) would have the wrong layout.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeBool(i32);

impl NativeBool {
    pub const TRUE: Self = Self(1);
    pub const FALSE: Self = Self(0);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for NativeBool {
    fn from(value: bool) -> Self {
        Self(value as i32)
    }
}

impl From<NativeBool> for bool {
    fn from(value: NativeBool) -> Self {
        value.get()
    }
}

unsafe impl AbiValue for NativeBool {
    const ABI: AbiType = AbiType::I32;
    type Erased = i32;

    #[inline]
    fn erase(self) -> i32 {
        self.0
    }
}

unsafe impl AbiReturn for NativeBool {
    const ABI: AbiType = AbiType::I32;
    type Erased = i32;
}

impl Marshal for NativeBool {
    type Abi = NativeBool;
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

/// An opaque native object reference whose only state is its address.
pub trait NativeHandle: Copy {
    fn from_raw(addr: *mut c_void) -> Self;
    fn as_raw(self) -> *mut c_void;

    fn is_null(self) -> bool {
        self.as_raw().is_null()
    }

    fn addr(self) -> usize {
        self.as_raw() as usize
    }
}

/// Declares an opaque handle newtype over a native address.
///
/// ```rust,ignore
/// nabi_runtime::native_handle!(
///     /// A loaded sound.
///     pub struct Sound;
/// );
/// ```
#[macro_export]
macro_rules! native_handle {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis struct $name(*mut ::std::ffi::c_void);

        impl $name {
            pub const NULL: Self = Self(::std::ptr::null_mut());

            pub const fn from_raw(addr: *mut ::std::ffi::c_void) -> Self {
                Self(addr)
            }

            pub const fn as_raw(self) -> *mut ::std::ffi::c_void {
                self.0
            }

            pub fn is_null(self) -> bool {
                self.0.is_null()
            }
        }

        // Handles are addresses; thread rules are the native library's.
        unsafe impl ::std::marker::Send for $name {}
        unsafe impl ::std::marker::Sync for $name {}

        impl $crate::NativeHandle for $name {
            fn from_raw(addr: *mut ::std::ffi::c_void) -> Self {
                Self(addr)
            }

            fn as_raw(self) -> *mut ::std::ffi::c_void {
                self.0
            }
        }

        impl $crate::Marshal for $name {
            type Abi = *mut ::std::ffi::c_void;
            const KIND: $crate::MarshalKind = $crate::MarshalKind::HandleUnwrap;

            #[inline]
            fn to_abi(self) -> *mut ::std::ffi::c_void {
                self.0
            }

            #[inline]
            fn from_abi(abi: *mut ::std::ffi::c_void) -> Self {
                Self(abi)
            }
        }

        unsafe impl $crate::AbiValue for $name {
            const ABI: $crate::AbiType = $crate::AbiType::MutPtr;
            type Erased = *mut ::std::ffi::c_void;

            #[inline]
            fn erase(self) -> *mut ::std::ffi::c_void {
                self.0
            }
        }

        unsafe impl $crate::AbiReturn for $name {
            const ABI: $crate::AbiType = $crate::AbiType::MutPtr;
            type Erased = *mut ::std::ffi::c_void;
        }

        impl<'a> $crate::CallArg<'a> for $name {
            type Abi = *mut ::std::ffi::c_void;

            #[inline]
            fn lower(self, _pins: &mut $crate::PinScope<'a>) -> Self::Abi {
                self.0
            }
        }
    };
}

/// Marks `#[repr(C)]`, `Copy` structs as blittable so they can travel by
/// value through forwarders and trampolines.
///
/// Every field must itself be blittable; the generator verifies this
/// before emitting the invocation.
#[macro_export]
macro_rules! blittable {
    ($($name:ident),+ $(,)?) => {$(
        unsafe impl $crate::AbiValue for $name {
            const ABI: $crate::AbiType = $crate::AbiType::Struct(stringify!($name));
            type Erased = $name;

            #[inline]
            fn erase(self) -> $name {
                self
            }
        }

        unsafe impl $crate::AbiReturn for $name {
            const ABI: $crate::AbiType = $crate::AbiType::Struct(stringify!($name));
            type Erased = $name;
        }

        impl $crate::Marshal for $name {
            type Abi = $name;
            const KIND: $crate::MarshalKind = $crate::MarshalKind::Direct;

            #[inline]
            fn to_abi(self) -> $name {
                self
            }

            #[inline]
            fn from_abi(abi: $name) -> Self {
                abi
            }
        }

        impl<'a> $crate::CallArg<'a> for $name {
            type Abi = $name;

            #[inline]
            fn lower(self, _pins: &mut $crate::PinScope<'a>) -> $name {
                self
            }
        }
    )+};
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::native_handle!(
        /// Test handle.
        struct Probe;
    );

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Point {
        x: f32,
        y: f32,
    }

    crate::blittable!(Point);

    #[test]
    fn test_bool_round_trip() {
        for value in [true, false] {
            let abi = value.to_abi();
            assert_eq!(abi, if value { 1 } else { 0 });
            assert_eq!(bool::from_abi(abi), value);
        }
        assert!(bool::from_abi(-7));
        assert_eq!(<bool as Marshal>::KIND, MarshalKind::BoolAsInt32);
    }

    #[test]
    fn test_handle_round_trip() {
        let addr = 0x5000usize as *mut c_void;
        let handle = Probe::from_abi(addr);
        assert_eq!(handle.to_abi(), addr);
        assert_eq!(NativeHandle::addr(handle), 0x5000);
        assert!(!handle.is_null());
        assert!(Probe::NULL.is_null());
        assert_eq!(<Probe as Marshal>::KIND, MarshalKind::HandleUnwrap);
    }

    #[test]
    fn test_native_bool() {
        assert!(NativeBool::from(true).get());
        assert!(!bool::from(NativeBool::FALSE));
        assert!(NativeBool::from_raw(2).get());
        assert_eq!(NativeBool::TRUE.erase(), 1);
        assert_eq!(std::mem::size_of::<NativeBool>(), 4);
    }

    #[test]
    fn test_blittable_struct_is_direct() {
        let p = Point { x: 1.0, y: 2.0 };
        assert_eq!(Point::from_abi(p.to_abi()), p);
        assert_eq!(<Point as AbiValue>::ABI, AbiType::Struct("Point"));
        assert_eq!(<Point as Marshal>::KIND, MarshalKind::Direct);
    }
}
