///
/// Type-level items: handles, callback aliases, structs and the `ffi`
/// signature module.
///

use crate::naming::escape_keyword;
use crate::surface::{BindingSurface, CallbackInfo, Parameter, ReturnSlot, StructInfo};
use crate::types::DomainType;

use super::RustGenerator;

/// `unsafe extern "C" fn(..) -> ..` over ABI types.
pub fn fn_pointer_type(params: &[Parameter], ret: &ReturnSlot) -> String {
    let params: Vec<String> = params.iter().map(|p| p.ty.abi_type()).collect();
    let mut ty = format!("unsafe extern \"C\" fn({})", params.join(", "));
    if !ret.ty.is_void() {
        ty.push_str(" -> ");
        ty.push_str(&ret.ty.abi_type());
    }
    ty
}

pub fn emit_handles(g: &mut RustGenerator, surface: &BindingSurface) {
    for handle in &surface.handles {
        g.line("::nabi_runtime::native_handle!(");
        g.indent();
        g.doc(handle.doc.as_deref());
        g.line(&format!("pub struct {};", handle.name));
        g.dedent();
        g.line(");");
        g.line("");
    }
}

pub fn emit_callback_aliases(g: &mut RustGenerator, surface: &BindingSurface) {
    for callback in &surface.callbacks {
        g.doc(callback.doc.as_deref());
        g.line(&format!(
            "pub type {} = {};",
            callback.alias,
            fn_pointer_type(&callback.params, &callback.ret)
        ));
        g.line("");
    }
}

pub fn emit_structs(g: &mut RustGenerator, surface: &BindingSurface) {
    for info in &surface.structs {
        g.doc(info.doc.as_deref());
        g.line("#[repr(C)]");
        g.line("#[derive(Debug, Clone, Copy)]");
        g.open(&format!("pub struct {}", info.name));
        for field in &info.fields {
            g.line(&format!("pub {}: {},", escape_keyword(&field.name), field.ty.repr_type()));
        }
        g.close("");
        g.line("");

        g.open(&format!("impl {}", info.name));
        g.line("/// All-zero value: null pointers, handles and callbacks, zero numbers.");
        g.open("pub fn zeroed() -> Self");
        g.line("// SAFETY: every field type has a valid all-zero representation.");
        g.line("unsafe { ::std::mem::zeroed() }");
        g.close("");
        for field in &info.fields {
            if let DomainType::Callback(name) = &field.ty {
                if let Some(callback) = surface.callbacks.iter().find(|c| &c.name == name) {
                    emit_invoke_helper(g, info, &field.name, callback);
                }
            }
        }
        g.close("");
        g.line("");

        g.line(&format!("::nabi_runtime::blittable!({});", info.name));
        g.line("");
    }
}

/// Receiver a callback binds to when its first parameter points back at
/// the owning struct: `Some(true)` for `&mut self`, `Some(false)` for `&self`.
fn self_binding(owner: &StructInfo, callback: &CallbackInfo) -> Option<bool> {
    let first = callback.params.first()?;
    match &first.ty {
        DomainType::Ref { mutable, target } | DomainType::Ptr { mutable, pointee: target } => {
            match target.as_ref() {
                DomainType::Struct(name) if name == &owner.name => Some(*mutable),
                _ => None,
            }
        }
        _ => None,
    }
}

fn emit_invoke_helper(g: &mut RustGenerator, owner: &StructInfo, field: &str, callback: &CallbackInfo) {
    let bound = self_binding(owner, callback);
    let explicit: &[Parameter] = match bound {
        Some(_) => &callback.params[1..],
        None => &callback.params,
    };
    let needs_lifetime = bound.is_some() || explicit.iter().any(|p| p.ty.is_reference());
    let lifetime = if needs_lifetime { "'a " } else { "" };

    let receiver = match bound {
        Some(true) => format!("&{}mut self", lifetime),
        _ => format!("&{}self", lifetime),
    };
    let mut params = vec![receiver];
    params.extend(
        explicit
            .iter()
            .map(|p| format!("{}: {}", escape_keyword(&p.name), p.ty.call_arg_type("'a"))),
    );

    let mut args: Vec<String> = Vec::new();
    if bound.is_some() {
        args.push("self".to_string());
    }
    args.extend(explicit.iter().map(|p| escape_keyword(&p.name)));
    let tuple = match args.len() {
        1 => format!("({},)", args[0]),
        _ => format!("({})", args.join(", ")),
    };

    g.line("");
    g.line(&format!("/// Calls `{}` through the shared `{}` trampoline.", field, callback.alias));
    g.line("///");
    g.line("/// # Safety");
    g.line("///");
    g.line("/// A non-null pointer stored in the field must still be callable and");
    g.line("/// the arguments must satisfy its contract.");
    g.open(&format!(
        "pub unsafe fn invoke_{}{}({}) -> ::std::result::Result<{}, ::nabi_runtime::TrampolineError>",
        field,
        if needs_lifetime { "<'a>" } else { "" },
        params.join(", "),
        callback.ret.ty.erased_type()
    ));
    g.line(&format!("unsafe {{ self.{}.invoke({}) }}", escape_keyword(field), tuple));
    g.close("");
}

pub fn emit_ffi(g: &mut RustGenerator, surface: &BindingSurface) {
    g.line("/// Native entry-point signatures.");
    g.open("pub mod ffi");
    g.line("#[allow(unused_imports)]");
    g.line("use super::*;");
    for method in &surface.methods {
        g.line("");
        g.line(&format!("/// `{}`", method.symbol));
        g.line(&format!(
            "pub type {} = {};",
            method.fn_alias(),
            fn_pointer_type(&method.params, &method.ret)
        ));
    }
    g.close("");
    g.line("");
}
