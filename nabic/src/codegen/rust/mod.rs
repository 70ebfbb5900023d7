///
/// Rust Binding Emitter
///
/// Output layout, in order:
/// - handle newtypes (`native_handle!`)
/// - callback fn-pointer aliases
/// - `#[repr(C)]` structs with trampoline helpers for their callback fields
/// - `mod ffi` with one fn-pointer alias per native entry point
/// - the binding struct, its forwarders and `NativeBindings` impl
/// - release guards for handles that declare a release method
///

mod bindings;
mod items;

use crate::surface::BindingSurface;

pub struct RustGenerator {
    output: String,
    indent_level: usize,
}

impl Default for RustGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RustGenerator {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
        }
    }

    pub fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    pub fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str("    ");
        }
    }

    /// Writes one indented line; an empty `s` writes a blank line.
    pub fn line(&mut self, s: &str) {
        if !s.is_empty() {
            self.write_indent();
            self.output.push_str(s);
        }
        self.output.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    /// Opens a block: writes `header {` and indents.
    pub fn open(&mut self, header: &str) {
        self.line(&format!("{} {{", header));
        self.indent();
    }

    pub fn close(&mut self, trailer: &str) {
        self.dedent();
        self.line(&format!("}}{}", trailer));
    }

    pub fn doc(&mut self, doc: Option<&str>) {
        if let Some(doc) = doc {
            for line in doc.trim().lines() {
                let line = line.trim_end();
                if line.is_empty() {
                    self.line("///");
                } else {
                    self.line(&format!("/// {}", line));
                }
            }
        }
    }

    pub fn finish(self) -> String {
        self.output
    }
}

pub fn generate(surface: &BindingSurface) -> String {
    let mut g = RustGenerator::new();

    g.line(&format!(
        "// @generated by nabic from surface '{}'. Do not edit.",
        surface.name
    ));
    g.line("");

    items::emit_handles(&mut g, surface);
    items::emit_callback_aliases(&mut g, surface);
    items::emit_structs(&mut g, surface);
    items::emit_ffi(&mut g, surface);
    bindings::emit_binding(&mut g, surface);
    bindings::emit_guards(&mut g, surface);

    g.finish()
}
