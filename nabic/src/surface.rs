///
/// Surface Analysis
///
/// Turns a parsed `SurfaceDecl` into a `BindingSurface`: every type
/// expression resolved and mapped, every method given its native symbol,
/// every position checked against what it may hold.
///
/// Position rules:
/// - method parameters: no references, no void, no arrays
/// - method returns: no references, no arrays (void allowed)
/// - callback parameters: references allowed (pinned at call time)
/// - struct fields: arrays allowed; no references, no void
/// - everywhere: no string/vec, no by-value struct that is not blittable
/// - methods and callbacks: at most `MAX_PARAMS` parameters
///
/// All errors of a surface are collected; a surface with any error yields
/// no `BindingSurface`.
///

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use indexmap::IndexMap;
use nabi_runtime::MarshalKind;
use toml::Spanned;
use tracing::debug;

use crate::decl::{locate_table, MemberDecl, SurfaceDecl};
use crate::error::GenError;
use crate::naming::{is_identifier, is_reserved, pascal_case, snake_case};
use crate::symbols::SymbolTable;
use crate::types::{callback_alias, is_builtin_name, parse_type, DomainType, TypeKind, TypeParseError};

/// Widest native signature the runtime can resolve or trampoline.
pub const MAX_PARAMS: usize = 8;

#[derive(Debug, Clone)]
pub struct BindingSurface {
    pub name: String,
    /// Name of the generated binding struct.
    pub type_name: String,
    pub prefix: String,
    pub library: Option<String>,
    pub doc: Option<String>,
    pub handles: Vec<HandleInfo>,
    pub structs: Vec<StructInfo>,
    pub callbacks: Vec<CallbackInfo>,
    pub methods: Vec<LogicalMethod>,
    pub symbols: SymbolTable,
}

#[derive(Debug, Clone)]
pub struct HandleInfo {
    pub name: String,
    pub doc: Option<String>,
    /// Logical name of the method releasing this handle.
    pub release: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: DomainType,
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub doc: Option<String>,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone)]
pub struct CallbackInfo {
    pub name: String,
    pub alias: String,
    pub doc: Option<String>,
    pub params: Vec<Parameter>,
    pub ret: ReturnSlot,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: DomainType,
    pub kind: MarshalKind,
}

#[derive(Debug, Clone)]
pub struct ReturnSlot {
    pub ty: DomainType,
    pub kind: MarshalKind,
}

#[derive(Debug, Clone)]
pub struct LogicalMethod {
    pub name: String,
    pub host_name: String,
    pub symbol: String,
    pub params: Vec<Parameter>,
    pub ret: ReturnSlot,
    pub optional: bool,
    pub doc: Option<String>,
}

impl LogicalMethod {
    /// Name of the native fn-pointer alias in the generated `ffi` module.
    pub fn fn_alias(&self) -> String {
        pascal_case(&self.name)
    }

    /// ABI shape of the native entry point, written the way the runtime's
    /// `Shape` displays it.
    pub fn shape(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.abi_class()).collect();
        format!("({}) -> {}", params.join(", "), self.ret.ty.abi_class())
    }
}

impl BindingSurface {
    pub fn method(&self, logical: &str) -> Option<&LogicalMethod> {
        self.methods.iter().find(|m| m.name == logical)
    }

    pub fn struct_info(&self, name: &str) -> Option<&StructInfo> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn required_symbols(&self) -> Vec<&str> {
        self.symbols.required().map(|e| e.symbol.as_str()).collect()
    }

    pub fn optional_symbols(&self) -> Vec<&str> {
        self.symbols.optional().map(|e| e.symbol.as_str()).collect()
    }
}

/// Inherent items every generated binding struct already defines.
const GENERATED_ITEMS: &[&str] = &["load", "open_library", "open_default", "resolution", "source"];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    MethodParam,
    MethodReturn,
    CallbackParam,
    CallbackReturn,
    Field,
}

struct Analyzer<'d> {
    source: &'d str,
    types: IndexMap<String, (TypeKind, Range<usize>)>,
    fields: HashMap<String, Vec<(String, DomainType, Range<usize>)>>,
    errors: Vec<GenError>,
}

pub fn analyze(decl: &SurfaceDecl, source: &str) -> Result<BindingSurface, Vec<GenError>> {
    let mut analyzer = Analyzer {
        source,
        types: IndexMap::new(),
        fields: HashMap::new(),
        errors: Vec::new(),
    };

    let name = decl.surface.name.get_ref().clone();
    if !is_identifier(&name) {
        analyzer.errors.push(GenError::InvalidName {
            kind: "surface",
            name: name.clone(),
            reason: "must be a Rust identifier".to_string(),
            span: decl.surface.name.span(),
        });
    }

    analyzer.declare_types(decl);
    let structs = analyzer.structs(decl);
    analyzer.check_recursion(&structs);
    let callbacks = analyzer.callbacks(decl);
    let (symbols, symbol_errors) = SymbolTable::build(&decl.surface.prefix, &decl.methods);
    analyzer.errors.extend(symbol_errors);
    let methods = analyzer.methods(decl, &symbols);
    let handles = analyzer.handles(decl, &methods);
    analyzer.check_generated_names(decl, &pascal_case(&name), &handles, &methods);

    if !analyzer.errors.is_empty() {
        debug!(surface = %name, errors = analyzer.errors.len(), "surface rejected");
        return Err(analyzer.errors);
    }

    debug!(
        surface = %name,
        methods = methods.len(),
        structs = structs.len(),
        callbacks = callbacks.len(),
        "analyzed surface"
    );

    Ok(BindingSurface {
        type_name: pascal_case(&name),
        name,
        prefix: decl.surface.prefix.clone(),
        library: decl.surface.library.clone(),
        doc: decl.surface.doc.clone(),
        handles,
        structs,
        callbacks,
        methods,
        symbols,
    })
}

impl Analyzer<'_> {
    fn declare_types(&mut self, decl: &SurfaceDecl) {
        let declared = decl
            .handles
            .keys()
            .map(|name| ("handles", name, TypeKind::Handle))
            .chain(decl.structs.keys().map(|name| ("structs", name, TypeKind::Struct)))
            .chain(decl.callbacks.keys().map(|name| ("callbacks", name, TypeKind::Callback)));

        for (section, name, kind) in declared {
            let span = locate_table(self.source, section, name);
            if !is_identifier(name) || is_reserved(name) {
                self.errors.push(GenError::InvalidName {
                    kind: "type",
                    name: name.clone(),
                    reason: "must be a Rust identifier".to_string(),
                    span,
                });
                continue;
            }
            if is_builtin_name(name) {
                self.errors.push(GenError::InvalidName {
                    kind: "type",
                    name: name.clone(),
                    reason: "reserved for a built-in type".to_string(),
                    span,
                });
                continue;
            }
            if let Some((_, first)) = self.types.get(name) {
                self.errors.push(GenError::DuplicateType {
                    name: name.clone(),
                    span,
                    first: first.clone(),
                });
                continue;
            }
            self.types.insert(name.clone(), (kind, span));
        }
    }

    fn resolve(&mut self, ty: &Spanned<String>) -> Option<DomainType> {
        let types = &self.types;
        match parse_type(ty.get_ref(), |name| types.get(name).map(|(kind, _)| *kind)) {
            Ok(resolved) => Some(resolved),
            Err(TypeParseError::Unknown(name)) => {
                self.errors.push(GenError::UnknownType {
                    name,
                    span: ty.span(),
                });
                None
            }
            Err(TypeParseError::Malformed(reason)) => {
                self.errors.push(GenError::MalformedType {
                    text: ty.get_ref().clone(),
                    reason,
                    span: ty.span(),
                });
                None
            }
        }
    }

    fn member_name(&mut self, owner: &str, member: &MemberDecl, seen: &mut HashSet<String>) -> Option<String> {
        let raw = member.name.get_ref();
        if !is_identifier(raw) || is_reserved(raw) {
            self.errors.push(GenError::InvalidName {
                kind: "member",
                name: raw.clone(),
                reason: "must be a Rust identifier other than self".to_string(),
                span: member.name.span(),
            });
            return None;
        }
        let name = snake_case(raw);
        if !seen.insert(name.clone()) {
            self.errors.push(GenError::DuplicateMember {
                owner: owner.to_string(),
                member: raw.clone(),
                span: member.name.span(),
            });
            return None;
        }
        Some(name)
    }

    /// Checks `ty` for a position; `path` names the member for diagnostics.
    fn check_position(
        &mut self,
        ty: &DomainType,
        position: Position,
        owner: &str,
        member: &str,
        span: Range<usize>,
    ) -> bool {
        let path = format!("{}.{}", owner, member);

        if let Some(part) = ty.non_blittable_part() {
            self.errors.push(GenError::NonBlittable {
                path,
                reason: format!("{} has no C layout", part),
                span,
            });
            return false;
        }

        match (ty, position) {
            (DomainType::Void, Position::MethodReturn | Position::CallbackReturn) => return true,
            (DomainType::Void, Position::Field) => {
                self.errors.push(GenError::NonBlittable {
                    path,
                    reason: "void has no size".to_string(),
                    span,
                });
                return false;
            }
            (DomainType::Void, _) => {
                self.errors.push(GenError::VoidParameter {
                    owner: owner.to_string(),
                    param: member.to_string(),
                    span,
                });
                return false;
            }
            (DomainType::Ref { .. }, Position::MethodParam) => {
                self.errors.push(GenError::ByReferenceParameter {
                    method: owner.to_string(),
                    param: member.to_string(),
                    ty: ty.to_string(),
                    span,
                });
                return false;
            }
            (DomainType::Ref { .. }, Position::MethodReturn | Position::CallbackReturn) => {
                self.errors.push(GenError::ByReferenceReturn {
                    method: owner.to_string(),
                    ty: ty.to_string(),
                    span,
                });
                return false;
            }
            (DomainType::Ref { .. }, Position::Field) => {
                self.errors.push(GenError::NonBlittable {
                    path,
                    reason: "reference members cannot live in native memory".to_string(),
                    span,
                });
                return false;
            }
            (DomainType::Array { .. }, pos) if pos != Position::Field => {
                self.errors.push(GenError::NonBlittable {
                    path,
                    reason: "fixed arrays are only allowed as struct fields".to_string(),
                    span,
                });
                return false;
            }
            _ => {}
        }

        let by_value = match ty {
            DomainType::Ref { target, .. } => target.by_value_struct(),
            other => other.by_value_struct(),
        };
        if position != Position::Field {
            if let Some(name) = by_value {
                if let Some((inner, reason)) = self.non_blittable_member(name, &mut HashSet::new()) {
                    self.errors.push(GenError::NonBlittable {
                        path: format!("{}.{}", name, inner),
                        reason,
                        span,
                    });
                    return false;
                }
            }
        }
        true
    }

    fn structs(&mut self, decl: &SurfaceDecl) -> Vec<StructInfo> {
        let mut out = Vec::new();

        for (name, decl_struct) in &decl.structs {
            if !matches!(self.types.get(name), Some((TypeKind::Struct, _))) {
                continue;
            }
            let mut seen = HashSet::new();
            let mut fields = Vec::new();
            let mut raw = Vec::new();
            for member in &decl_struct.fields {
                let Some(field) = self.member_name(name, member, &mut seen) else {
                    continue;
                };
                let Some(ty) = self.resolve(&member.ty) else {
                    continue;
                };
                raw.push((field.clone(), ty.clone(), member.ty.span()));
                if self.check_position(&ty, Position::Field, name, &field, member.ty.span()) {
                    fields.push(FieldInfo { name: field, ty });
                }
            }
            self.fields.insert(name.clone(), raw);
            out.push(StructInfo {
                name: name.clone(),
                doc: decl_struct.doc.clone(),
                fields,
            });
        }

        // Nested by-value structs are checked once every struct is known.
        for info in &out {
            let nested: Vec<(String, String, Range<usize>)> = self.fields[&info.name]
                .iter()
                .filter_map(|(field, ty, span)| {
                    ty.by_value_struct()
                        .map(|inner| (field.clone(), inner.to_string(), span.clone()))
                })
                .collect();
            for (field, inner, span) in nested {
                let mut visiting = HashSet::from([info.name.clone()]);
                if let Some((path, reason)) = self.non_blittable_member(&inner, &mut visiting) {
                    self.errors.push(GenError::NonBlittable {
                        path: format!("{}.{}.{}", info.name, field, path),
                        reason,
                        span,
                    });
                }
            }
        }

        out
    }

    /// First member (relative path) of struct `name` that is not blittable.
    fn non_blittable_member(&self, name: &str, visiting: &mut HashSet<String>) -> Option<(String, String)> {
        if !visiting.insert(name.to_string()) {
            return None;
        }
        let fields = self.fields.get(name)?;
        for (field, ty, _) in fields {
            if let Some(part) = ty.non_blittable_part() {
                return Some((field.clone(), format!("{} has no C layout", part)));
            }
            match ty {
                DomainType::Ref { .. } => {
                    return Some((
                        field.clone(),
                        "reference members cannot live in native memory".to_string(),
                    ));
                }
                DomainType::Void => return Some((field.clone(), "void has no size".to_string())),
                _ => {}
            }
            if let Some(inner) = ty.by_value_struct() {
                if let Some((path, reason)) = self.non_blittable_member(inner, visiting) {
                    return Some((format!("{}.{}", field, path), reason));
                }
            }
        }
        None
    }

    fn check_recursion(&mut self, structs: &[StructInfo]) {
        let order: HashMap<&str, usize> = structs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        for info in structs {
            let mut path = Vec::new();
            let mut visited = HashSet::new();
            if let Some(cycle) = self.find_cycle(&info.name, &info.name, &mut path, &mut visited) {
                let first_in_cycle = cycle
                    .iter()
                    .filter_map(|(owner, _)| order.get(owner.as_str()))
                    .min()
                    .copied();
                if first_in_cycle != order.get(info.name.as_str()).copied() {
                    continue;
                }
                let rendered = cycle
                    .iter()
                    .map(|(owner, field)| format!("{}.{}", owner, field))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                let span = self
                    .types
                    .get(&info.name)
                    .map(|(_, span)| span.clone())
                    .unwrap_or(0..0);
                self.errors.push(GenError::RecursiveStruct {
                    name: info.name.clone(),
                    cycle: rendered,
                    span,
                });
            }
        }
    }

    fn find_cycle(
        &self,
        start: &str,
        current: &str,
        path: &mut Vec<(String, String)>,
        visited: &mut HashSet<String>,
    ) -> Option<Vec<(String, String)>> {
        if !visited.insert(current.to_string()) {
            return None;
        }
        for (field, ty, _) in self.fields.get(current)? {
            let Some(inner) = ty.by_value_struct() else {
                continue;
            };
            path.push((current.to_string(), field.clone()));
            if inner == start {
                return Some(path.clone());
            }
            if let Some(cycle) = self.find_cycle(start, inner, path, visited) {
                return Some(cycle);
            }
            path.pop();
        }
        None
    }

    fn callbacks(&mut self, decl: &SurfaceDecl) -> Vec<CallbackInfo> {
        let mut out = Vec::new();

        for (name, callback) in &decl.callbacks {
            if !matches!(self.types.get(name), Some((TypeKind::Callback, _))) {
                continue;
            }
            if callback.params.len() > MAX_PARAMS {
                let span = self.types.get(name).map_or(0..0, |(_, span)| span.clone());
                self.errors.push(GenError::TooManyParameters {
                    owner: name.clone(),
                    count: callback.params.len(),
                    max: MAX_PARAMS,
                    span,
                });
            }
            let mut seen = HashSet::new();
            let mut params = Vec::new();
            for member in &callback.params {
                let Some(param) = self.member_name(name, member, &mut seen) else {
                    continue;
                };
                let Some(ty) = self.resolve(&member.ty) else {
                    continue;
                };
                if self.check_position(&ty, Position::CallbackParam, name, &param, member.ty.span()) {
                    params.push(Parameter {
                        name: param,
                        kind: ty.marshal_kind(),
                        ty,
                    });
                }
            }
            let ret = self.return_slot(name, callback.returns.as_ref(), Position::CallbackReturn);
            out.push(CallbackInfo {
                name: name.clone(),
                alias: callback_alias(name),
                doc: callback.doc.clone(),
                params,
                ret,
            });
        }

        out
    }

    fn return_slot(&mut self, owner: &str, returns: Option<&Spanned<String>>, position: Position) -> ReturnSlot {
        let ty = match returns {
            Some(text) => match self.resolve(text) {
                Some(ty) => {
                    if self.check_position(&ty, position, owner, "return", text.span()) {
                        ty
                    } else {
                        DomainType::Void
                    }
                }
                None => DomainType::Void,
            },
            None => DomainType::Void,
        };
        ReturnSlot {
            kind: ty.marshal_kind(),
            ty,
        }
    }

    fn methods(&mut self, decl: &SurfaceDecl, symbols: &SymbolTable) -> Vec<LogicalMethod> {
        let mut out = Vec::new();
        let mut logical_seen: HashMap<String, Range<usize>> = HashMap::new();
        let mut host_seen: HashMap<String, Range<usize>> = HashMap::new();
        let capability_queries: HashSet<String> = decl
            .methods
            .iter()
            .filter(|m| m.optional)
            .map(|m| format!("has_{}", snake_case(m.name.get_ref())))
            .collect();

        for method in &decl.methods {
            let name = method.name.get_ref().clone();
            let span = method.name.span();

            if !is_identifier(&name) || is_reserved(&name) {
                self.errors.push(GenError::InvalidName {
                    kind: "method",
                    name,
                    reason: "must be a Rust identifier".to_string(),
                    span,
                });
                continue;
            }
            if let Some(first) = logical_seen.get(&name) {
                self.errors.push(GenError::DuplicateMethod {
                    name,
                    span,
                    first: first.clone(),
                });
                continue;
            }
            logical_seen.insert(name.clone(), span.clone());

            let host_name = snake_case(&name);
            if let Some(first) = host_seen.get(&host_name) {
                self.errors.push(GenError::DuplicateMethod {
                    name: host_name,
                    span,
                    first: first.clone(),
                });
                continue;
            }
            host_seen.insert(host_name.clone(), span.clone());

            if GENERATED_ITEMS.contains(&host_name.as_str()) || capability_queries.contains(&host_name) {
                self.errors.push(GenError::InvalidName {
                    kind: "method",
                    name,
                    reason: format!("'{}' collides with a generated method", host_name),
                    span,
                });
                continue;
            }

            let mut params_ok = true;
            if method.params.len() > MAX_PARAMS {
                self.errors.push(GenError::TooManyParameters {
                    owner: name.clone(),
                    count: method.params.len(),
                    max: MAX_PARAMS,
                    span: span.clone(),
                });
                params_ok = false;
            }
            let mut seen = HashSet::new();
            let mut params = Vec::new();
            for member in &method.params {
                let Some(param) = self.member_name(&name, member, &mut seen) else {
                    params_ok = false;
                    continue;
                };
                let Some(ty) = self.resolve(&member.ty) else {
                    params_ok = false;
                    continue;
                };
                if self.check_position(&ty, Position::MethodParam, &name, &param, member.ty.span()) {
                    params.push(Parameter {
                        name: param,
                        kind: ty.marshal_kind(),
                        ty,
                    });
                } else {
                    params_ok = false;
                }
            }
            let ret = self.return_slot(&name, method.returns.as_ref(), Position::MethodReturn);

            let Some(entry) = symbols.by_logical(&name) else {
                continue;
            };
            if !params_ok {
                continue;
            }
            out.push(LogicalMethod {
                host_name,
                symbol: entry.symbol.clone(),
                params,
                ret,
                optional: method.optional,
                doc: method.doc.clone(),
                name,
            });
        }

        out
    }

    /// Generated items share the type namespace with declared types, and
    /// `ffi` aliases must not shadow the types their signatures name.
    fn check_generated_names(
        &mut self,
        decl: &SurfaceDecl,
        type_name: &str,
        handles: &[HandleInfo],
        methods: &[LogicalMethod],
    ) {
        let mut generated: HashMap<String, String> = HashMap::new();
        generated.insert("ffi".to_string(), "the ffi module".to_string());
        generated.insert(type_name.to_string(), "the binding struct".to_string());
        for handle in handles.iter().filter(|h| h.release.is_some()) {
            generated.insert(format!("{}Guard", handle.name), format!("the release guard of '{}'", handle.name));
        }
        for callback in decl.callbacks.keys() {
            generated.insert(callback_alias(callback), format!("the fn alias of '{}'", callback));
        }

        for (name, (_, span)) in &self.types {
            if let Some(item) = generated.get(name) {
                self.errors.push(GenError::InvalidName {
                    kind: "type",
                    name: name.clone(),
                    reason: format!("collides with {}", item),
                    span: span.clone(),
                });
            }
        }

        let mut aliases: HashMap<String, Range<usize>> = HashMap::new();
        for method in methods {
            let Some(span) = decl
                .methods
                .iter()
                .find(|m| m.name.get_ref() == &method.name)
                .map(|m| m.name.span())
            else {
                continue;
            };
            let alias = method.fn_alias();
            if let Some(first) = aliases.get(&alias) {
                self.errors.push(GenError::DuplicateMethod {
                    name: alias,
                    span,
                    first: first.clone(),
                });
                continue;
            }
            if self.types.contains_key(&alias) || generated.contains_key(&alias) {
                self.errors.push(GenError::InvalidName {
                    kind: "method",
                    name: method.name.clone(),
                    reason: format!("its signature alias '{}' collides with a type", alias),
                    span: span.clone(),
                });
            }
            aliases.insert(alias, span);
        }
    }

    fn handles(&mut self, decl: &SurfaceDecl, methods: &[LogicalMethod]) -> Vec<HandleInfo> {
        let mut out = Vec::new();

        for (name, handle) in &decl.handles {
            if !matches!(self.types.get(name), Some((TypeKind::Handle, _))) {
                continue;
            }
            let release = handle.release.as_ref().and_then(|release| {
                let method_name = release.get_ref();
                let problem = match methods.iter().find(|m| &m.name == method_name) {
                    None => Some(format!("no method named '{}'", method_name)),
                    Some(method) => {
                        let takes_handle = method.params.len() == 1
                            && method.params[0].ty == DomainType::Handle(name.clone());
                        (!takes_handle)
                            .then(|| format!("'{}' must take exactly one '{}' parameter", method_name, name))
                    }
                };
                match problem {
                    Some(reason) => {
                        self.errors.push(GenError::InvalidRelease {
                            handle: name.clone(),
                            method: method_name.clone(),
                            reason,
                            span: release.span(),
                        });
                        None
                    }
                    None => Some(method_name.clone()),
                }
            });

            out.push(HandleInfo {
                name: name.clone(),
                doc: handle.doc.clone(),
                release,
            });
        }

        out
    }
}
