///
/// Runtime error types.
///
/// - LoadError: the binding object could not be constructed (load time)
/// - MissingEntryPoint: an optional binding was called but never resolved
/// - TrampolineError: an indirect call was refused before reaching native code
///

use thiserror::Error;

use crate::abi::Shape;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to load native library '{path}': {source}")]
    Library {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error(
        "native library '{library}' is missing required entry points: {}",
        .symbols.join(", ")
    )]
    MissingSymbols {
        library: String,
        symbols: Vec<String>,
    },

    #[error("invalid native symbol name '{0}'")]
    InvalidSymbol(String),
}

/// An optional binding whose native symbol was absent at load time.
///
/// Callers may recover from this by taking a fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing entry point: {symbol} (the loaded native library is too old to provide it)")]
pub struct MissingEntryPoint {
    pub symbol: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrampolineError {
    #[error("null function pointer passed to trampoline {shape}")]
    NullFunctionPointer { shape: Shape },
}
