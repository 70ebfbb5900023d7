///
/// The binding struct and release guards.
///
/// One slot per logical method: `Required<ffi::X>` or `Optional<ffi::X>`.
/// Forwarders marshal each parameter with `Marshal::to_abi`, call the slot,
/// and convert the result back with `Marshal::from_abi`. Forwarders of
/// optional methods return `Result<_, MissingEntryPoint>` and touch native
/// code only when the slot is resolved.
///

use crate::naming::escape_keyword;
use crate::surface::{BindingSurface, HandleInfo, LogicalMethod};
use crate::types::DomainType;

use super::RustGenerator;

const ARC: &str = "::std::sync::Arc<dyn ::nabi_runtime::SymbolSource>";
const LOAD_RESULT: &str = "::std::result::Result<Self, ::nabi_runtime::LoadError>";

fn symbol_list(symbols: &[&str]) -> String {
    let quoted: Vec<String> = symbols.iter().map(|s| format!("{:?}", s)).collect();
    format!("&[{}]", quoted.join(", "))
}

fn slot_type(method: &LogicalMethod) -> String {
    let kind = if method.optional { "Optional" } else { "Required" };
    format!("::nabi_runtime::{}<ffi::{}>", kind, method.fn_alias())
}

pub fn emit_binding(g: &mut RustGenerator, surface: &BindingSurface) {
    let name = &surface.type_name;

    match surface.doc.as_deref() {
        Some(doc) => g.doc(Some(doc)),
        None => g.doc(Some(&format!("Bindings for the `{}` native surface.", surface.name))),
    }
    g.open(&format!("pub struct {}", name));
    g.line(&format!("source: {},", ARC));
    for method in &surface.methods {
        g.line(&format!("{}: {},", escape_keyword(&method.host_name), slot_type(method)));
    }
    g.close("");
    g.line("");

    g.open(&format!("impl {}", name));
    emit_constants(g, surface);
    emit_constructors(g, surface);
    for method in surface.methods.iter().filter(|m| m.optional) {
        g.line("");
        g.line(&format!("/// Whether the loaded library exports `{}`.", method.symbol));
        g.open(&format!("pub fn has_{}(&self) -> bool", method.host_name));
        g.line(&format!("self.{}.is_resolved()", escape_keyword(&method.host_name)));
        g.close("");
    }
    g.line("");
    g.line("/// Which of this surface's symbols the loaded library exports.");
    g.open("pub fn resolution(&self) -> ::nabi_runtime::ResolutionReport");
    g.line("<Self as ::nabi_runtime::NativeBindings>::resolution(self)");
    g.close("");
    for method in &surface.methods {
        emit_forwarder(g, method);
    }
    g.close("");
    g.line("");

    emit_trait_impl(g, surface);
    emit_debug(g, surface);
}

fn emit_constants(g: &mut RustGenerator, surface: &BindingSurface) {
    g.line(&format!("pub const SURFACE: &'static str = {:?};", surface.name));
    match &surface.library {
        Some(library) => g.line(&format!(
            "pub const LIBRARY: ::std::option::Option<&'static str> = ::std::option::Option::Some({:?});",
            library
        )),
        None => g.line("pub const LIBRARY: ::std::option::Option<&'static str> = ::std::option::Option::None;"),
    }
    g.line(&format!(
        "pub const REQUIRED_SYMBOLS: &'static [&'static str] = {};",
        symbol_list(&surface.required_symbols())
    ));
    g.line(&format!(
        "pub const OPTIONAL_SYMBOLS: &'static [&'static str] = {};",
        symbol_list(&surface.optional_symbols())
    ));
}

fn emit_constructors(g: &mut RustGenerator, surface: &BindingSurface) {
    g.line("");
    g.line("/// Resolves every entry point against `source`.");
    g.line("///");
    g.line("/// Fails, naming all of them, when a required symbol is missing.");
    g.line("/// Missing optional symbols leave their slot unresolved.");
    g.open(&format!("pub fn load(source: {}) -> {}", ARC, LOAD_RESULT));
    g.line("let mut resolver = ::nabi_runtime::Resolver::new(&*source);");
    g.line("resolver.require_all(Self::REQUIRED_SYMBOLS)?;");
    g.open("let bindings = Self");
    for method in &surface.methods {
        let resolve = if method.optional {
            format!("resolver.optional::<ffi::{}>({:?})", method.fn_alias(), method.symbol)
        } else {
            format!("resolver.required::<ffi::{}>({:?})?", method.fn_alias(), method.symbol)
        };
        g.line(&format!("{}: {},", escape_keyword(&method.host_name), resolve));
    }
    g.line("source: ::std::sync::Arc::clone(&source),");
    g.close(";");
    g.line("resolver.finish();");
    g.line("::std::result::Result::Ok(bindings)");
    g.close("");

    g.line("");
    g.line("/// Opens the shared library at `path` and loads from it.");
    g.open(&format!(
        "pub fn open_library(path: impl ::std::convert::AsRef<::std::path::Path>) -> {}",
        LOAD_RESULT
    ));
    g.line("let library = ::nabi_runtime::NativeLibrary::open(path)?;");
    g.line("Self::load(::std::sync::Arc::new(library))");
    g.close("");

    if let Some(library) = &surface.library {
        g.line("");
        g.line(&format!(
            "/// Opens `{}` through the platform's library search path.",
            library
        ));
        g.open(&format!("pub fn open_default() -> {}", LOAD_RESULT));
        g.line(&format!(
            "let library = ::nabi_runtime::NativeLibrary::open_by_name({:?})?;",
            library
        ));
        g.line("Self::load(::std::sync::Arc::new(library))");
        g.close("");
    }
}

fn emit_forwarder(g: &mut RustGenerator, method: &LogicalMethod) {
    let mut params = vec!["&self".to_string()];
    params.extend(
        method
            .params
            .iter()
            .map(|p| format!("{}: {}", escape_keyword(&p.name), p.ty.host_type())),
    );

    let host_ret = method.ret.ty.host_type();
    let signature_ret = match (method.optional, method.ret.ty.is_void()) {
        (false, true) => String::new(),
        (false, false) => format!(" -> {}", host_ret),
        (true, _) => format!(
            " -> ::std::result::Result<{}, ::nabi_runtime::MissingEntryPoint>",
            host_ret
        ),
    };
    let entry = if method.optional {
        format!("(self.{}.get()?)", escape_keyword(&method.host_name))
    } else {
        format!("(self.{}.get())", escape_keyword(&method.host_name))
    };

    g.line("");
    g.doc(method.doc.as_deref());
    if method.doc.is_some() {
        g.line("///");
    }
    let kind = if method.optional { "optional" } else { "required" };
    g.line(&format!("/// Native symbol: `{}` ({}).", method.symbol, kind));
    g.line("///");
    g.line("/// # Safety");
    g.line("///");
    g.line("/// Calls into the native library; the arguments must satisfy its contract.");
    if method.params.len() >= 7 {
        g.line("#[allow(clippy::too_many_arguments)]");
    }
    g.open(&format!(
        "pub unsafe fn {}({}){}",
        escape_keyword(&method.host_name),
        params.join(", "),
        signature_ret
    ));

    let call_prefix = if method.ret.ty.is_void() { "" } else { "let ret = " };
    if method.params.is_empty() {
        g.line(&format!("{}unsafe {{ {}() }};", call_prefix, entry));
    } else {
        g.open(&format!("{}unsafe", call_prefix));
        g.line(&format!("{}(", entry));
        g.indent();
        for param in &method.params {
            g.line(&format!(
                "<{} as ::nabi_runtime::Marshal>::to_abi({}),",
                param.ty.host_type(),
                escape_keyword(&param.name)
            ));
        }
        g.dedent();
        g.line(")");
        g.close(";");
    }

    let converted = format!("<{} as ::nabi_runtime::Marshal>::from_abi(ret)", host_ret);
    match (method.optional, method.ret.ty.is_void()) {
        (false, true) => {}
        (false, false) => g.line(&converted),
        (true, true) => g.line("::std::result::Result::Ok(())"),
        (true, false) => g.line(&format!("::std::result::Result::Ok({})", converted)),
    }
    g.close("");
}

fn emit_trait_impl(g: &mut RustGenerator, surface: &BindingSurface) {
    let name = &surface.type_name;
    g.open(&format!("impl ::nabi_runtime::NativeBindings for {}", name));
    g.line(&format!("const SURFACE: &'static str = {}::SURFACE;", name));
    g.line(&format!(
        "const REQUIRED_SYMBOLS: &'static [&'static str] = {}::REQUIRED_SYMBOLS;",
        name
    ));
    g.line(&format!(
        "const OPTIONAL_SYMBOLS: &'static [&'static str] = {}::OPTIONAL_SYMBOLS;",
        name
    ));
    g.line("");
    g.open(&format!("fn load_from(source: {}) -> {}", ARC, LOAD_RESULT));
    g.line(&format!("{}::load(source)", name));
    g.close("");
    g.line("");
    g.open("fn source(&self) -> &dyn ::nabi_runtime::SymbolSource");
    g.line("&*self.source");
    g.close("");
    g.close("");
    g.line("");
}

fn emit_debug(g: &mut RustGenerator, surface: &BindingSurface) {
    g.open(&format!("impl ::std::fmt::Debug for {}", surface.type_name));
    g.open("fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result");
    g.line(&format!("f.debug_struct({:?})", surface.type_name));
    g.indent();
    g.line(".field(\"library\", &self.source.name())");
    for method in &surface.methods {
        g.line(&format!(
            ".field({:?}, &self.{})",
            method.host_name,
            escape_keyword(&method.host_name)
        ));
    }
    g.line(".finish()");
    g.dedent();
    g.close("");
    g.close("");
    g.line("");
}

/// Release method of `handle`, when it declares one.
fn release_method<'s>(surface: &'s BindingSurface, handle: &HandleInfo) -> Option<&'s LogicalMethod> {
    surface.method(handle.release.as_deref()?)
}

pub fn emit_guards(g: &mut RustGenerator, surface: &BindingSurface) {
    for handle in &surface.handles {
        if let Some(release) = release_method(surface, handle) {
            emit_guard(g, surface, handle, release);
        }
    }
}

fn emit_guard(g: &mut RustGenerator, surface: &BindingSurface, handle: &HandleInfo, release: &LogicalMethod) {
    let guard = format!("{}Guard", handle.name);
    let bindings = &surface.type_name;
    let host = escape_keyword(&release.host_name);

    g.line(&format!(
        "/// Owns a `{}` and releases it through `{}` when dropped.",
        handle.name, release.symbol
    ));
    g.open(&format!("pub struct {}<'a>", guard));
    g.line(&format!("bindings: &'a {},", bindings));
    g.line(&format!("handle: {},", handle.name));
    g.close("");
    g.line("");

    g.open(&format!("impl<'a> {}<'a>", guard));
    g.line("/// # Safety");
    g.line("///");
    g.line("/// `handle` must be owned by the caller and released nowhere else.");
    g.open(&format!(
        "pub unsafe fn new(bindings: &'a {}, handle: {}) -> Self",
        bindings, handle.name
    ));
    g.line("Self { bindings, handle }");
    g.close("");
    g.line("");
    g.open(&format!("pub fn handle(&self) -> {}", handle.name));
    g.line("self.handle");
    g.close("");
    g.line("");
    g.line("/// Gives up ownership without releasing.");
    g.open(&format!("pub fn into_inner(self) -> {}", handle.name));
    g.line("let handle = self.handle;");
    g.line("::std::mem::forget(self);");
    g.line("handle");
    g.close("");
    g.close("");
    g.line("");

    g.open(&format!("impl ::std::ops::Drop for {}<'_>", guard));
    g.open("fn drop(&mut self)");
    g.open("if self.handle.is_null()");
    g.line("return;");
    g.close("");
    let call = format!("unsafe {{ self.bindings.{}(self.handle) }}", host);
    let released = format!("\"released {}\"", handle.name);
    match (release.optional, release.ret.ty == DomainType::Void) {
        (false, true) => {
            g.line(&format!("{};", call));
            g.line(&format!("::tracing::debug!(handle = ?self.handle, {});", released));
        }
        (false, false) => {
            g.line(&format!("let status = {};", call));
            g.line(&format!(
                "::tracing::debug!(handle = ?self.handle, status = ?status, {});",
                released
            ));
        }
        (true, _) => {
            g.open(&format!("match {}", call));
            g.line(&format!(
                "::std::result::Result::Ok(status) => ::tracing::debug!(handle = ?self.handle, status = ?status, {}),",
                released
            ));
            g.line(&format!(
                "::std::result::Result::Err(missing) => ::tracing::warn!(handle = ?self.handle, %missing, \"{} not released\"),",
                handle.name
            ));
            g.close("");
        }
    }
    g.close("");
    g.close("");
    g.line("");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::parse_surface_str;
    use crate::surface::analyze;

    const PLAYER: &str = r#"
[surface]
name = "player"
prefix = "PL_"

[handles.Track]
release = "Track_Free"

[handles.Voice]
release = "Voice_Stop"

[[methods]]
name = "Track_Free"
params = [{ name = "track", type = "Track" }]

[[methods]]
name = "Voice_Stop"
params = [{ name = "voice", type = "Voice" }]
returns = "i32"
optional = true

[[methods]]
name = "Tick"

[[methods]]
name = "Voice_SetPaused"
params = [{ name = "voice", type = "Voice" }, { name = "paused", type = "bool" }]
returns = "i32"
"#;

    fn emit(src: &str) -> String {
        let decl = parse_surface_str(src).expect("Failed to parse surface");
        let surface = analyze(&decl, src).expect("surface is valid");
        let mut g = RustGenerator::new();
        emit_binding(&mut g, &surface);
        emit_guards(&mut g, &surface);
        g.finish()
    }

    #[test]
    fn test_void_forwarders() {
        let out = emit(PLAYER);
        assert!(out.contains("pub unsafe fn tick(&self) {\n        unsafe { (self.tick.get())() };\n    }"));
        assert!(out.contains("pub unsafe fn track_free(&self, track: Track) {"));
    }

    #[test]
    fn test_bool_parameter_is_marshaled() {
        let out = emit(PLAYER);
        assert!(out.contains("pub unsafe fn voice_set_paused(&self, voice: Voice, paused: bool) -> i32 {"));
        assert!(out.contains("<bool as ::nabi_runtime::Marshal>::to_abi(paused),"));
        assert!(out.contains("<Voice as ::nabi_runtime::Marshal>::to_abi(voice),"));
    }

    #[test]
    fn test_load_resolves_every_slot() {
        let out = emit(PLAYER);
        assert!(out.contains("track_free: resolver.required::<ffi::TrackFree>(\"PL_Track_Free\")?,"));
        assert!(out.contains("voice_stop: resolver.optional::<ffi::VoiceStop>(\"PL_Voice_Stop\"),"));
        assert!(out.contains(
            "pub const LIBRARY: ::std::option::Option<&'static str> = ::std::option::Option::None;"
        ));
        assert!(!out.contains("open_default"));
    }

    #[test]
    fn test_guards() {
        let out = emit(PLAYER);
        assert!(out.contains("pub struct TrackGuard<'a> {"));
        assert!(out.contains("unsafe { self.bindings.track_free(self.handle) };"));
        assert!(out.contains("match unsafe { self.bindings.voice_stop(self.handle) } {"));
        assert!(out.contains("\"Voice not released\""));
    }

    #[test]
    fn test_declared_types_may_shadow_prelude_names() {
        let src = r#"
[surface]
name = "shadow"
library = "shadow"

[handles.Option]
release = "Option_Close"

[handles.Drop]
release = "Drop_Close"

[[methods]]
name = "Option_Close"
params = [{ name = "option", type = "Option" }]

[[methods]]
name = "Drop_Close"
params = [{ name = "drop", type = "Drop" }]
"#;
        let out = emit(src);
        assert!(out.contains(
            "pub const LIBRARY: ::std::option::Option<&'static str> = ::std::option::Option::Some(\"shadow\");"
        ));
        assert!(out.contains("impl ::std::ops::Drop for OptionGuard<'_> {"));
        assert!(out.contains("impl ::std::ops::Drop for DropGuard<'_> {"));
        assert!(out.contains("path: impl ::std::convert::AsRef<::std::path::Path>"));
        assert!(!out.contains("impl Drop"));
        assert!(!out.contains(": Option<"));
        assert!(!out.contains("= Some("));
    }
}
