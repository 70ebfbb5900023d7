///
/// Symbol sources
///
/// A `SymbolSource` answers "what is the address of this exported symbol?".
/// Bindings resolve every slot through one, so the same generated code runs
/// against a real shared library (`NativeLibrary`) or an in-process table of
/// stub functions (`SymbolMap`).
///

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::Path;

use libloading::Library;
use tracing::{debug, trace, warn};

use crate::abi::{NativeFn, RawFnPtr};
use crate::error::LoadError;

pub trait SymbolSource: Send + Sync {
    /// Address of `symbol`, or `None` when it is not exported.
    fn lookup(&self, symbol: &str) -> Option<RawFnPtr>;

    /// Human-readable name used in diagnostics.
    fn name(&self) -> &str;
}

/// A shared library opened with the platform loader.
pub struct NativeLibrary {
    library: Library,
    path: String,
}

impl NativeLibrary {
    /// Opens the library at `path`.
    ///
    /// Running a library's initializers executes foreign code; callers are
    /// trusting the file they name.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library {
            path: path.display().to_string(),
            source,
        })?;

        debug!(path = %path.display(), "opened native library");
        Ok(Self {
            library,
            path: path.display().to_string(),
        })
    }

    /// Opens a library by base name (`"audio"` → `libaudio.so`), letting the
    /// platform loader search its usual paths.
    pub fn open_by_name(name: &str) -> Result<Self, LoadError> {
        Self::open(Self::platform_lib_name(name))
    }

    pub fn platform_lib_name(name: &str) -> String {
        #[cfg(target_os = "windows")]
        {
            format!("{}.dll", name)
        }
        #[cfg(target_os = "macos")]
        {
            format!("lib{}.dylib", name)
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            format!("lib{}.so", name)
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SymbolSource for NativeLibrary {
    fn lookup(&self, symbol: &str) -> Option<RawFnPtr> {
        if symbol.is_empty() || symbol.contains('\0') {
            return None;
        }

        let found = unsafe { self.library.get::<*const c_void>(symbol.as_bytes()) };
        match found {
            Ok(sym) => {
                let addr = *sym;
                trace!(symbol, addr = ?addr, "resolved symbol");
                (!addr.is_null()).then(|| RawFnPtr::from_ptr(addr))
            }
            Err(_) => None,
        }
    }

    fn name(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary").field("path", &self.path).finish()
    }
}

/// An in-process symbol table, for hosts that link the native code
/// statically or for exercising bindings without a shared library.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    name: String,
    symbols: HashMap<String, RawFnPtr>,
}

impl SymbolMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: impl Into<String>, addr: RawFnPtr) -> Result<(), LoadError> {
        let symbol = symbol.into();
        if symbol.is_empty() || symbol.contains('\0') {
            return Err(LoadError::InvalidSymbol(symbol));
        }
        self.symbols.insert(symbol, addr);
        Ok(())
    }

    /// Builder form of [`SymbolMap::insert`] for a typed function.
    ///
    /// An invalid symbol name is skipped with a warning.
    pub fn with_fn<F: NativeFn>(mut self, symbol: &str, entry: F) -> Self {
        if let Err(err) = self.insert(symbol, entry.to_raw()) {
            warn!(map = %self.name, %err, "symbol not registered");
        }
        self
    }

    pub fn remove(&mut self, symbol: &str) -> Option<RawFnPtr> {
        self.symbols.remove(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for SymbolMap {
    fn lookup(&self, symbol: &str) -> Option<RawFnPtr> {
        self.symbols.get(symbol).copied().filter(|addr| !addr.is_null())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn answer() -> i32 {
        42
    }

    #[test]
    fn test_platform_lib_name() {
        let name = NativeLibrary::platform_lib_name("audio");
        #[cfg(target_os = "windows")]
        assert_eq!(name, "audio.dll");
        #[cfg(target_os = "macos")]
        assert_eq!(name, "libaudio.dylib");
        #[cfg(target_os = "linux")]
        assert_eq!(name, "libaudio.so");
    }

    #[test]
    fn test_open_missing_library_fails() {
        let err = NativeLibrary::open("/nonexistent/libnabi_missing.so").unwrap_err();
        assert!(matches!(err, LoadError::Library { .. }));
        assert!(err.to_string().contains("libnabi_missing.so"));
    }

    #[test]
    fn test_symbol_map_lookup() {
        type Answer = unsafe extern "C" fn() -> i32;
        let map = SymbolMap::new("stubs").with_fn("answer", answer as Answer);

        assert_eq!(map.len(), 1);
        assert!(map.contains("answer"));
        assert_eq!(map.name(), "stubs");

        let raw = map.lookup("answer").expect("symbol registered");
        let f = unsafe { Answer::from_raw(raw) };
        assert_eq!(unsafe { f() }, 42);
        assert!(map.lookup("question").is_none());
    }

    #[test]
    fn test_symbol_map_rejects_bad_names_and_null() {
        let mut map = SymbolMap::new("stubs");
        assert!(matches!(
            map.insert("bad\0name", RawFnPtr::NULL),
            Err(LoadError::InvalidSymbol(_))
        ));
        map.insert("null_entry", RawFnPtr::NULL).unwrap();
        assert!(map.lookup("null_entry").is_none());
        assert!(map.remove("null_entry").is_some());
        assert!(map.is_empty());
    }

    #[test]
    fn test_with_fn_warns_on_invalid_symbol() {
        use std::io;
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl io::Write for Capture {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        type Answer = unsafe extern "C" fn() -> i32;
        let logs = Capture(Arc::new(Mutex::new(Vec::new())));
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let map = tracing::subscriber::with_default(subscriber, || {
            SymbolMap::new("stubs")
                .with_fn("", answer as Answer)
                .with_fn("ans\0wer", answer as Answer)
                .with_fn("answer", answer as Answer)
        });

        assert_eq!(map.len(), 1);
        assert!(map.contains("answer"));
        let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(logs.matches("symbol not registered").count(), 2);
        assert!(logs.contains("WARN"));
    }
}
