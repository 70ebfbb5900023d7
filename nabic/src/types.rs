///
/// ABI Type Mapper
///
/// Parses domain type expressions and maps them onto the C ABI:
/// - i8..i64, u8..u64, isize, usize, f32, f64, char → same (Direct)
///   aliases: int → i32, uint → u32, float → f32, double → f64, size_t → usize
/// - bool → i32, nonzero = true (BoolAsInt32)
/// - declared handle H → *mut c_void (HandleUnwrap)
/// - declared struct S → S by value, #[repr(C)] (Direct)
/// - declared callback C → nullable fn pointer `Callback<CFn>` (Direct)
/// - ptr<T>, ptr_mut<T> → *const T', *mut T' (Direct)
/// - array<T, N> → [T'; N], struct fields only
/// - ref<T>, ref_mut<T> → callback parameters only (pinned by the trampoline)
/// - string, vec<T> → always rejected
///
/// T' is the in-memory form of a pointee or field: bool → NativeBool
/// (4 bytes), void → c_void, everything else unchanged.
///
/// Every function here is total over `DomainType`; which positions accept
/// which types is decided by `surface::analyze`.
///

use std::fmt;

use nabi_runtime::MarshalKind;

use crate::naming::{is_identifier, pascal_case};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
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
    Char,
}

impl Prim {
    pub fn from_name(name: &str) -> Option<Prim> {
        let prim = match name {
            "i8" => Prim::I8,
            "i16" => Prim::I16,
            "i32" | "int" => Prim::I32,
            "i64" => Prim::I64,
            "isize" => Prim::Isize,
            "u8" => Prim::U8,
            "u16" => Prim::U16,
            "u32" | "uint" => Prim::U32,
            "u64" => Prim::U64,
            "usize" | "size_t" => Prim::Usize,
            "f32" | "float" => Prim::F32,
            "f64" | "double" => Prim::F64,
            "char" => Prim::Char,
            _ => return None,
        };
        Some(prim)
    }

    pub fn name(self) -> &'static str {
        match self {
            Prim::I8 => "i8",
            Prim::I16 => "i16",
            Prim::I32 => "i32",
            Prim::I64 => "i64",
            Prim::Isize => "isize",
            Prim::U8 => "u8",
            Prim::U16 => "u16",
            Prim::U32 => "u32",
            Prim::U64 => "u64",
            Prim::Usize => "usize",
            Prim::F32 => "f32",
            Prim::F64 => "f64",
            Prim::Char => "char",
        }
    }

    fn rust(self) -> &'static str {
        match self {
            Prim::Char => "::std::ffi::c_char",
            other => other.name(),
        }
    }

    fn abi_class(self) -> &'static str {
        match self {
            Prim::Char => "i8",
            other => other.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Handle,
    Struct,
    Callback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainType {
    Void,
    Bool,
    Prim(Prim),
    Handle(String),
    Struct(String),
    Callback(String),
    Ptr { mutable: bool, pointee: Box<DomainType> },
    Ref { mutable: bool, target: Box<DomainType> },
    Array { elem: Box<DomainType>, len: usize },
    String,
    Vec(Box<DomainType>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeParseError {
    Unknown(String),
    Malformed(String),
}

/// Parses a type expression, resolving named types with `lookup`.
pub fn parse_type<L>(text: &str, lookup: L) -> Result<DomainType, TypeParseError>
where
    L: Fn(&str) -> Option<TypeKind>,
{
    let mut parser = TypeParser {
        text,
        pos: 0,
        lookup: &lookup,
    };
    let ty = parser.parse()?;
    parser.skip_ws();
    if parser.pos != text.len() {
        return Err(TypeParseError::Malformed(format!(
            "unexpected '{}'",
            &text[parser.pos..]
        )));
    }
    Ok(ty)
}

struct TypeParser<'t, 'l> {
    text: &'t str,
    pos: usize,
    lookup: &'l dyn Fn(&str) -> Option<TypeKind>,
}

impl<'t> TypeParser<'t, '_> {
    fn skip_ws(&mut self) {
        while self.text[self.pos..].starts_with([' ', '\t']) {
            self.pos += 1;
        }
    }

    fn ident(&mut self) -> Result<&'t str, TypeParseError> {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(TypeParseError::Malformed(if rest.is_empty() {
                "expected a type".to_string()
            } else {
                format!("unexpected '{}'", rest)
            }));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn expect(&mut self, ch: char) -> Result<(), TypeParseError> {
        self.skip_ws();
        if self.text[self.pos..].starts_with(ch) {
            self.pos += ch.len_utf8();
            Ok(())
        } else {
            Err(TypeParseError::Malformed(format!("expected '{}'", ch)))
        }
    }

    fn parse(&mut self) -> Result<DomainType, TypeParseError> {
        let name = self.ident()?;
        let ty = match name {
            "void" => DomainType::Void,
            "bool" => DomainType::Bool,
            "string" => DomainType::String,
            "ptr" | "ptr_mut" | "ref" | "ref_mut" | "vec" => {
                self.expect('<')?;
                let inner = Box::new(self.parse()?);
                self.expect('>')?;
                match name {
                    "ptr" => DomainType::Ptr { mutable: false, pointee: inner },
                    "ptr_mut" => DomainType::Ptr { mutable: true, pointee: inner },
                    "ref" => DomainType::Ref { mutable: false, target: inner },
                    "ref_mut" => DomainType::Ref { mutable: true, target: inner },
                    _ => DomainType::Vec(inner),
                }
            }
            "array" => {
                self.expect('<')?;
                let elem = Box::new(self.parse()?);
                self.expect(',')?;
                let len_text = self.ident()?;
                let len = len_text
                    .parse::<usize>()
                    .ok()
                    .filter(|len| *len > 0)
                    .ok_or_else(|| {
                        TypeParseError::Malformed(format!("invalid array length '{}'", len_text))
                    })?;
                self.expect('>')?;
                DomainType::Array { elem, len }
            }
            other => match Prim::from_name(other) {
                Some(prim) => DomainType::Prim(prim),
                None => match (self.lookup)(other) {
                    Some(TypeKind::Handle) => DomainType::Handle(other.to_string()),
                    Some(TypeKind::Struct) => DomainType::Struct(other.to_string()),
                    Some(TypeKind::Callback) => DomainType::Callback(other.to_string()),
                    None if is_identifier(other) => {
                        return Err(TypeParseError::Unknown(other.to_string()));
                    }
                    None => {
                        return Err(TypeParseError::Malformed(format!("unexpected '{}'", other)));
                    }
                },
            },
        };
        Ok(ty)
    }
}

/// Type names that can never be declared by a surface.
pub fn is_builtin_name(name: &str) -> bool {
    Prim::from_name(name).is_some()
        || matches!(
            name,
            "void" | "bool" | "string" | "ptr" | "ptr_mut" | "ref" | "ref_mut" | "vec" | "array"
        )
}

/// Name of the fn-pointer alias emitted for a callback type.
pub fn callback_alias(name: &str) -> String {
    format!("{}Fn", pascal_case(name))
}

impl DomainType {
    pub fn is_void(&self) -> bool {
        matches!(self, DomainType::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, DomainType::Ref { .. })
    }

    /// The first non-blittable component, if any.
    pub fn non_blittable_part(&self) -> Option<&DomainType> {
        match self {
            DomainType::String | DomainType::Vec(_) => Some(self),
            DomainType::Ptr { pointee: inner, .. }
            | DomainType::Ref { target: inner, .. }
            | DomainType::Array { elem: inner, .. } => inner.non_blittable_part(),
            _ => None,
        }
    }

    /// Struct held by value (directly or as an array element).
    pub fn by_value_struct(&self) -> Option<&str> {
        match self {
            DomainType::Struct(name) => Some(name),
            DomainType::Array { elem, .. } => elem.by_value_struct(),
            _ => None,
        }
    }

    pub fn marshal_kind(&self) -> MarshalKind {
        match self {
            DomainType::Bool => MarshalKind::BoolAsInt32,
            DomainType::Handle(_) => MarshalKind::HandleUnwrap,
            _ => MarshalKind::Direct,
        }
    }

    /// Machine-level class, as the runtime's `AbiType` displays it.
    pub fn abi_class(&self) -> String {
        match self {
            DomainType::Void => "void".to_string(),
            DomainType::Bool => "i32".to_string(),
            DomainType::Prim(prim) => prim.abi_class().to_string(),
            DomainType::Handle(_) => "ptr_mut".to_string(),
            DomainType::Struct(name) => name.clone(),
            DomainType::Callback(_) => "fnptr".to_string(),
            DomainType::Ptr { mutable: true, .. } | DomainType::Ref { mutable: true, .. } => {
                "ptr_mut".to_string()
            }
            DomainType::Ptr { .. } | DomainType::Ref { .. } => "ptr".to_string(),
            DomainType::Array { elem, len } => format!("[{}; {}]", elem.abi_class(), len),
            DomainType::String | DomainType::Vec(_) => "invalid".to_string(),
        }
    }

    /// Type seen by callers of a forwarder.
    pub fn host_type(&self) -> String {
        match self {
            DomainType::Bool => "bool".to_string(),
            DomainType::Handle(name) => name.clone(),
            other => other.abi_type(),
        }
    }

    /// Type in the native fn signature.
    pub fn abi_type(&self) -> String {
        match self {
            DomainType::Void => "()".to_string(),
            DomainType::Bool => "i32".to_string(),
            DomainType::Prim(prim) => prim.rust().to_string(),
            DomainType::Handle(_) => "*mut ::std::ffi::c_void".to_string(),
            DomainType::Struct(name) => name.clone(),
            DomainType::Callback(name) => format!("::nabi_runtime::Callback<{}>", callback_alias(name)),
            DomainType::Ptr { mutable, pointee } => pointer(*mutable, pointee),
            DomainType::Ref { mutable, target } => pointer(*mutable, target),
            DomainType::Array { .. } | DomainType::String | DomainType::Vec(_) => self.repr_type(),
        }
    }

    /// In-memory form inside `#[repr(C)]` structs and behind pointers.
    pub fn repr_type(&self) -> String {
        match self {
            DomainType::Void => "::std::ffi::c_void".to_string(),
            DomainType::Bool => "::nabi_runtime::NativeBool".to_string(),
            DomainType::Handle(name) => name.clone(),
            DomainType::Array { elem, len } => format!("[{}; {}]", elem.repr_type(), len),
            DomainType::String => "String".to_string(),
            DomainType::Vec(inner) => format!("Vec<{}>", inner.repr_type()),
            other => other.abi_type(),
        }
    }

    /// Erased ABI type, the value a trampoline hands back.
    pub fn erased_type(&self) -> String {
        match self {
            DomainType::Handle(_) => "*mut ::std::ffi::c_void".to_string(),
            DomainType::Ptr { mutable, .. } | DomainType::Ref { mutable, .. } => {
                if *mutable {
                    "*mut ::std::ffi::c_void".to_string()
                } else {
                    "*const ::std::ffi::c_void".to_string()
                }
            }
            DomainType::Callback(_) => "::nabi_runtime::RawFnPtr".to_string(),
            other => other.abi_type(),
        }
    }

    /// Argument type accepted by a trampoline call for this parameter.
    pub fn call_arg_type(&self, lifetime: &str) -> String {
        match self {
            DomainType::Bool => "::nabi_runtime::NativeBool".to_string(),
            DomainType::Handle(name) => name.clone(),
            DomainType::Ref { mutable: true, target } => {
                format!("&{} mut {}", lifetime, target.repr_type())
            }
            DomainType::Ref { mutable: false, target } => {
                format!("&{} {}", lifetime, target.repr_type())
            }
            other => other.abi_type(),
        }
    }
}

fn pointer(mutable: bool, pointee: &DomainType) -> String {
    let qualifier = if mutable { "mut" } else { "const" };
    format!("*{} {}", qualifier, pointee.repr_type())
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainType::Void => write!(f, "void"),
            DomainType::Bool => write!(f, "bool"),
            DomainType::Prim(prim) => write!(f, "{}", prim.name()),
            DomainType::Handle(name) | DomainType::Struct(name) | DomainType::Callback(name) => {
                write!(f, "{}", name)
            }
            DomainType::Ptr { mutable: false, pointee } => write!(f, "ptr<{}>", pointee),
            DomainType::Ptr { mutable: true, pointee } => write!(f, "ptr_mut<{}>", pointee),
            DomainType::Ref { mutable: false, target } => write!(f, "ref<{}>", target),
            DomainType::Ref { mutable: true, target } => write!(f, "ref_mut<{}>", target),
            DomainType::Array { elem, len } => write!(f, "array<{}, {}>", elem, len),
            DomainType::String => write!(f, "string"),
            DomainType::Vec(inner) => write!(f, "vec<{}>", inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<TypeKind> {
        match name {
            "Sound" => Some(TypeKind::Handle),
            "Vector" => Some(TypeKind::Struct),
            "ReadDone" => Some(TypeKind::Callback),
            _ => None,
        }
    }

    fn parse(text: &str) -> DomainType {
        parse_type(text, lookup).expect("type should parse")
    }

    #[test]
    fn test_primitives_and_aliases() {
        assert_eq!(parse("int"), DomainType::Prim(Prim::I32));
        assert_eq!(parse("double"), DomainType::Prim(Prim::F64));
        assert_eq!(parse("size_t").abi_type(), "usize");
        assert_eq!(parse("char").abi_type(), "::std::ffi::c_char");
        assert_eq!(parse("u16").marshal_kind(), MarshalKind::Direct);
    }

    #[test]
    fn test_bool_maps_to_i32() {
        let ty = parse("bool");
        assert_eq!(ty.host_type(), "bool");
        assert_eq!(ty.abi_type(), "i32");
        assert_eq!(ty.repr_type(), "::nabi_runtime::NativeBool");
        assert_eq!(ty.marshal_kind(), MarshalKind::BoolAsInt32);
    }

    #[test]
    fn test_handle_unwraps_to_pointer() {
        let ty = parse("Sound");
        assert_eq!(ty.host_type(), "Sound");
        assert_eq!(ty.abi_type(), "*mut ::std::ffi::c_void");
        assert_eq!(ty.abi_class(), "ptr_mut");
        assert_eq!(ty.marshal_kind(), MarshalKind::HandleUnwrap);
    }

    #[test]
    fn test_pointers_use_in_memory_pointee() {
        assert_eq!(parse("ptr_mut<Sound>").abi_type(), "*mut Sound");
        assert_eq!(parse("ptr<void>").abi_type(), "*const ::std::ffi::c_void");
        assert_eq!(
            parse("ptr_mut<bool>").abi_type(),
            "*mut ::nabi_runtime::NativeBool"
        );
        assert_eq!(parse("ptr<ptr<char>>").abi_type(), "*const *const ::std::ffi::c_char");
    }

    #[test]
    fn test_arrays_and_callbacks() {
        let ty = parse("array<f32, 3>");
        assert_eq!(ty, DomainType::Array { elem: Box::new(DomainType::Prim(Prim::F32)), len: 3 });
        assert_eq!(ty.repr_type(), "[f32; 3]");
        assert_eq!(ty.to_string(), "array<f32, 3>");

        let cb = parse("ReadDone");
        assert_eq!(cb.abi_type(), "::nabi_runtime::Callback<ReadDoneFn>");
        assert_eq!(cb.erased_type(), "::nabi_runtime::RawFnPtr");
    }

    #[test]
    fn test_references() {
        let ty = parse("ref_mut<Vector>");
        assert!(ty.is_reference());
        assert_eq!(ty.abi_type(), "*mut Vector");
        assert_eq!(ty.call_arg_type("'a"), "&'a mut Vector");
        assert_eq!(ty.erased_type(), "*mut ::std::ffi::c_void");
    }

    #[test]
    fn test_non_blittable_detection() {
        assert_eq!(parse("string").non_blittable_part(), Some(&DomainType::String));
        assert!(parse("ptr<vec<u8>>").non_blittable_part().is_some());
        assert!(parse("array<Vector, 2>").non_blittable_part().is_none());
        assert_eq!(parse("array<Vector, 2>").by_value_struct(), Some("Vector"));
        assert_eq!(parse("ptr<Vector>").by_value_struct(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_type("Strem", lookup),
            Err(TypeParseError::Unknown("Strem".to_string()))
        );
        assert!(matches!(parse_type("ptr<i32", lookup), Err(TypeParseError::Malformed(_))));
        assert!(matches!(parse_type("array<i32, 0>", lookup), Err(TypeParseError::Malformed(_))));
        assert!(matches!(parse_type("i32 i32", lookup), Err(TypeParseError::Malformed(_))));
        assert!(matches!(parse_type("", lookup), Err(TypeParseError::Malformed(_))));
    }

    #[test]
    fn test_builtin_names() {
        assert!(is_builtin_name("int"));
        assert!(is_builtin_name("ptr_mut"));
        assert!(!is_builtin_name("Sound"));
    }
}
