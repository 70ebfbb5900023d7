///
/// Binding slots and load-time resolution
///
/// A generated binding object owns one slot per logical method:
/// - `Required<F>`: resolved at construction, construction fails otherwise
/// - `Optional<F>`: may be unresolved; calling it yields `MissingEntryPoint`
///   and nothing crosses into native code
///
/// `Resolver` walks a `SymbolSource` once while a binding is constructed and
/// reports every missing required symbol together rather than stopping at
/// the first one.
///

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::abi::{NativeFn, RawFnPtr};
use crate::error::{LoadError, MissingEntryPoint};
use crate::library::SymbolSource;

/// A binding that is guaranteed to be resolved.
#[derive(Clone, Copy)]
pub struct Required<F> {
    symbol: &'static str,
    entry: F,
}

impl<F: NativeFn> Required<F> {
    #[inline]
    pub fn get(&self) -> F {
        self.entry
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub fn raw(&self) -> RawFnPtr {
        self.entry.to_raw()
    }
}

impl<F: NativeFn> fmt::Debug for Required<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Required({} @ {:?})", self.symbol, self.raw())
    }
}

/// A binding whose symbol may be absent from the loaded library.
#[derive(Clone, Copy)]
pub struct Optional<F> {
    symbol: &'static str,
    entry: Option<F>,
}

impl<F: NativeFn> Optional<F> {
    pub fn unresolved(symbol: &'static str) -> Self {
        Self {
            symbol,
            entry: None,
        }
    }

    /// The resolved entry point, or the error a caller can recover from.
    #[inline]
    pub fn get(&self) -> Result<F, MissingEntryPoint> {
        self.entry.ok_or(MissingEntryPoint {
            symbol: self.symbol,
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.entry.is_some()
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }
}

impl<F: NativeFn> fmt::Debug for Optional<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry {
            Some(entry) => write!(f, "Optional({} @ {:?})", self.symbol, entry.to_raw()),
            None => write!(f, "Optional({} unresolved)", self.symbol),
        }
    }
}

pub struct Resolver<'s> {
    source: &'s dyn SymbolSource,
    required: usize,
    optional: usize,
    optional_missing: usize,
}

impl<'s> Resolver<'s> {
    pub fn new(source: &'s dyn SymbolSource) -> Self {
        Self {
            source,
            required: 0,
            optional: 0,
            optional_missing: 0,
        }
    }

    /// Checks every required symbol up front and names all that are absent.
    pub fn require_all(&self, symbols: &[&'static str]) -> Result<(), LoadError> {
        let missing: Vec<String> = symbols
            .iter()
            .filter(|symbol| self.source.lookup(symbol).is_none())
            .map(|symbol| symbol.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoadError::MissingSymbols {
                library: self.source.name().to_string(),
                symbols: missing,
            })
        }
    }

    pub fn required<F: NativeFn>(&mut self, symbol: &'static str) -> Result<Required<F>, LoadError> {
        let raw = self
            .source
            .lookup(symbol)
            .ok_or_else(|| LoadError::MissingSymbols {
                library: self.source.name().to_string(),
                symbols: vec![symbol.to_string()],
            })?;

        self.required += 1;
        debug!(symbol, addr = ?raw, "resolved required entry point");
        Ok(Required {
            symbol,
            entry: unsafe { F::from_raw(raw) },
        })
    }

    pub fn optional<F: NativeFn>(&mut self, symbol: &'static str) -> Optional<F> {
        self.optional += 1;
        match self.source.lookup(symbol) {
            Some(raw) => {
                debug!(symbol, addr = ?raw, "resolved optional entry point");
                Optional {
                    symbol,
                    entry: Some(unsafe { F::from_raw(raw) }),
                }
            }
            None => {
                self.optional_missing += 1;
                warn!(symbol, library = self.source.name(), "optional entry point not exported");
                Optional::unresolved(symbol)
            }
        }
    }

    pub fn finish(self) {
        info!(
            library = self.source.name(),
            required = self.required,
            optional = self.optional,
            optional_missing = self.optional_missing,
            "resolved native bindings"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolStatus {
    pub symbol: String,
    pub optional: bool,
    pub resolved: bool,
}

/// Which symbols of a surface a given library exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionReport {
    pub library: String,
    pub entries: Vec<SymbolStatus>,
}

impl ResolutionReport {
    pub fn probe(source: &dyn SymbolSource, required: &[&str], optional: &[&str]) -> Self {
        let status = |symbol: &str, optional: bool| SymbolStatus {
            symbol: symbol.to_string(),
            optional,
            resolved: source.lookup(symbol).is_some(),
        };

        let entries = required
            .iter()
            .map(|symbol| status(symbol, false))
            .chain(optional.iter().map(|symbol| status(symbol, true)))
            .collect();

        Self {
            library: source.name().to_string(),
            entries,
        }
    }

    pub fn missing(&self) -> impl Iterator<Item = &SymbolStatus> {
        self.entries.iter().filter(|entry| !entry.resolved)
    }

    /// Every required symbol resolved; optional gaps are allowed.
    pub fn is_loadable(&self) -> bool {
        self.missing().all(|entry| entry.optional)
    }

    pub fn is_complete(&self) -> bool {
        self.missing().next().is_none()
    }
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.library)?;
        for entry in &self.entries {
            let mark = if entry.resolved { "ok" } else { "missing" };
            let kind = if entry.optional { "optional" } else { "required" };
            writeln!(f, "  {:<8} {:<9} {}", mark, kind, entry.symbol)?;
        }
        Ok(())
    }
}

/// Implemented by every generated binding object.
pub trait NativeBindings: Sized {
    const SURFACE: &'static str;
    const REQUIRED_SYMBOLS: &'static [&'static str];
    const OPTIONAL_SYMBOLS: &'static [&'static str];

    fn load_from(source: Arc<dyn SymbolSource>) -> Result<Self, LoadError>;

    fn source(&self) -> &dyn SymbolSource;

    fn resolution(&self) -> ResolutionReport {
        ResolutionReport::probe(self.source(), Self::REQUIRED_SYMBOLS, Self::OPTIONAL_SYMBOLS)
    }
}
