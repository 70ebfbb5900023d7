///
/// nabi Runtime
///
/// Support library for bindings generated by `nabic`. Generated code only
/// names items re-exported here.
///
/// Contains:
/// - ABI value classes and typed native fn signatures (abi)
/// - Marshal kinds, handle newtypes, blittable structs (marshal)
/// - Required/optional binding slots and load-time resolution (binding)
/// - Shared library loading and in-process symbol tables (library)
/// - Signature-keyed indirect-call trampolines and callbacks (trampoline)
/// - Scoped pinning of by-reference trampoline arguments (pinning)
/// - Native handle → wrapper cache with liveness tracking (handle_cache)
///

pub mod abi;
pub mod binding;
pub mod error;
pub mod handle_cache;
pub mod library;
pub mod marshal;
pub mod pinning;
pub mod trampoline;

pub use abi::{AbiReturn, AbiType, AbiValue, NativeFn, RawFnPtr, Shape};
pub use binding::{NativeBindings, Optional, Required, ResolutionReport, Resolver, SymbolStatus};
pub use error::{LoadError, MissingEntryPoint, TrampolineError};
pub use handle_cache::HandleCache;
pub use library::{NativeLibrary, SymbolMap, SymbolSource};
pub use marshal::{Marshal, MarshalKind, NativeBool, NativeHandle};
pub use pinning::PinScope;
pub use trampoline::{
    trampoline, trampoline_state, CallArg, Callback, Trampoline, TrampolineArgs, TrampolineState,
};
