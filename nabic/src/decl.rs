///
/// # Surface Declarations
///
/// Serde model of a binding surface file. A surface lists the native types
/// the library exposes and the logical methods to bind, each with domain
/// types written as short type expressions (`i32`, `bool`, `ptr_mut<Sound>`,
/// `array<f32, 3>` ...).
///
/// ## Example
///
/// ```toml
/// [surface]
/// name = "native"
/// prefix = "NATIVE_"
/// library = "native"
///
/// [handles.Stream]
/// release = "Close"
///
/// [structs.Point]
/// fields = [
///     { name = "x", type = "f32" },
///     { name = "y", type = "f32" },
/// ]
///
/// [callbacks.Done]
/// params = [{ name = "point", type = "ref_mut<Point>" }]
/// returns = "i32"
///
/// [[methods]]
/// name = "Open"
/// params = [{ name = "name", type = "ptr<char>" }]
/// returns = "Stream"
///
/// [[methods]]
/// name = "Close"
/// params = [{ name = "stream", type = "Stream" }]
/// returns = "bool"
/// optional = true
/// ```
///
/// Names and type expressions keep their byte spans (`toml::Spanned`) so
/// analysis errors can point back into the file. Table-keyed declarations
/// (handles, structs, callbacks) keep insertion order through `IndexMap`.
///

use std::ops::Range;

use indexmap::IndexMap;
use serde::Deserialize;
use toml::Spanned;

use crate::error::GenError;

#[derive(Debug, Clone, Deserialize)]
pub struct SurfaceDecl {
    pub surface: SurfaceMeta,
    #[serde(default)]
    pub handles: IndexMap<String, HandleDecl>,
    #[serde(default)]
    pub structs: IndexMap<String, StructDecl>,
    #[serde(default)]
    pub callbacks: IndexMap<String, CallbackDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurfaceMeta {
    pub name: Spanned<String>,
    #[serde(default)]
    pub prefix: String,
    /// Base name of the shared library (`audio` → `libaudio.so`).
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandleDecl {
    /// Logical method that releases the native object.
    #[serde(default)]
    pub release: Option<Spanned<String>>,
    #[serde(default)]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StructDecl {
    pub fields: Vec<MemberDecl>,
    #[serde(default)]
    pub doc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackDecl {
    #[serde(default)]
    pub params: Vec<MemberDecl>,
    #[serde(default)]
    pub returns: Option<Spanned<String>>,
    #[serde(default)]
    pub doc: Option<String>,
}

/// A struct field or a parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberDecl {
    pub name: Spanned<String>,
    #[serde(rename = "type")]
    pub ty: Spanned<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodDecl {
    pub name: Spanned<String>,
    #[serde(default)]
    pub params: Vec<MemberDecl>,
    #[serde(default)]
    pub returns: Option<Spanned<String>>,
    /// Exported symbol, when it does not follow `prefix + name`.
    #[serde(default)]
    pub symbol: Option<Spanned<String>>,
    /// The symbol may be absent from older library builds.
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub doc: Option<String>,
}

pub fn parse_surface_str(content: &str) -> Result<SurfaceDecl, GenError> {
    toml::from_str(content).map_err(|err| GenError::Parse {
        message: err.message().to_string(),
        span: err.span(),
    })
}

/// Best-effort span of a table-keyed declaration such as `[structs.Vector]`.
///
/// Table keys carry no span of their own, so this searches the source for
/// the header (or the dotted key) and falls back to the start of the file.
pub fn locate_table(source: &str, section: &str, name: &str) -> Range<usize> {
    let dotted = format!("{}.{}", section, name);
    match source.find(&format!("[{}]", dotted)) {
        Some(start) => start..start + dotted.len() + 2,
        None => match source.find(&dotted) {
            Some(start) => start..start + dotted.len(),
            None => 0..0,
        },
    }
}
