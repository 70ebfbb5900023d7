///
/// Symbol Table Builder
///
/// Computes the exported native symbol of every logical method:
/// `symbol override` if the declaration has one, `prefix + logical name`
/// otherwise. Symbols must be non-empty, NUL-free and pairwise distinct;
/// a collision is reported with both declaration sites.
///

use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::Range;

use serde::Serialize;

use crate::decl::MethodDecl;
use crate::error::GenError;
use crate::naming::snake_case;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolEntry {
    pub logical: String,
    pub host: String,
    pub symbol: String,
    pub optional: bool,
    #[serde(skip)]
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolTable {
    prefix: String,
    entries: Vec<SymbolEntry>,
    #[serde(skip)]
    by_symbol: HashMap<String, usize>,
    #[serde(skip)]
    by_logical: HashMap<String, usize>,
}

impl SymbolTable {
    /// Builds the table, skipping (and reporting) entries whose symbol is
    /// invalid or already taken.
    pub fn build(prefix: &str, methods: &[MethodDecl]) -> (Self, Vec<GenError>) {
        let mut table = SymbolTable {
            prefix: prefix.to_string(),
            ..Default::default()
        };
        let mut errors = Vec::new();

        for method in methods {
            let logical = method.name.get_ref();
            let (symbol, span) = match &method.symbol {
                Some(explicit) => (explicit.get_ref().clone(), explicit.span()),
                None => (format!("{}{}", prefix, logical), method.name.span()),
            };

            if let Some(reason) = symbol_problem(&symbol) {
                errors.push(GenError::InvalidSymbol {
                    symbol,
                    reason: reason.to_string(),
                    span,
                });
                continue;
            }

            if let Some(&first) = table.by_symbol.get(&symbol) {
                errors.push(GenError::DuplicateSymbol {
                    symbol,
                    span,
                    first: table.entries[first].span.clone(),
                });
                continue;
            }

            let index = table.entries.len();
            table.by_symbol.insert(symbol.clone(), index);
            table.by_logical.entry(logical.clone()).or_insert(index);
            table.entries.push(SymbolEntry {
                logical: logical.clone(),
                host: snake_case(logical),
                symbol,
                optional: method.optional,
                span,
            });
        }

        (table, errors)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&SymbolEntry> {
        self.by_symbol.get(symbol).map(|&i| &self.entries[i])
    }

    pub fn by_logical(&self, logical: &str) -> Option<&SymbolEntry> {
        self.by_logical.get(logical).map(|&i| &self.entries[i])
    }

    pub fn required(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.iter().filter(|entry| !entry.optional)
    }

    pub fn optional(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.iter().filter(|entry| entry.optional)
    }

    /// One line per symbol: `symbol  logical  required|optional`.
    pub fn render(&self) -> String {
        let symbol_width = self.entries.iter().map(|e| e.symbol.len()).max().unwrap_or(0);
        let logical_width = self.entries.iter().map(|e| e.logical.len()).max().unwrap_or(0);

        let mut out = String::new();
        for entry in &self.entries {
            let kind = if entry.optional { "optional" } else { "required" };
            let _ = writeln!(
                out,
                "{:<sw$}  {:<lw$}  {}",
                entry.symbol,
                entry.logical,
                kind,
                sw = symbol_width,
                lw = logical_width
            );
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn symbol_problem(symbol: &str) -> Option<&'static str> {
    if symbol.is_empty() {
        Some("symbol is empty")
    } else if symbol.contains('\0') {
        Some("symbol contains a NUL byte")
    } else if symbol.chars().any(char::is_whitespace) {
        Some("symbol contains whitespace")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::parse_surface_str;

    fn methods(src: &str) -> Vec<MethodDecl> {
        parse_surface_str(src).expect("Failed to parse surface").methods
    }

    const OPEN_CLOSE: &str = r#"
[surface]
name = "native"
prefix = "NATIVE_"

[[methods]]
name = "Open"

[[methods]]
name = "Close"
optional = true

[[methods]]
name = "Close_Legacy"
symbol = "native_close_v1"
"#;

    #[test]
    fn test_prefix_and_override() {
        let (table, errors) = SymbolTable::build("NATIVE_", &methods(OPEN_CLOSE));
        assert!(errors.is_empty());
        assert_eq!(table.len(), 3);
        assert_eq!(table.by_logical("Open").map(|e| e.symbol.as_str()), Some("NATIVE_Open"));
        assert_eq!(table.by_logical("Close").map(|e| e.symbol.as_str()), Some("NATIVE_Close"));
        assert_eq!(
            table.by_symbol("native_close_v1").map(|e| e.host.as_str()),
            Some("close_legacy")
        );
        assert_eq!(table.required().count(), 2);
        assert_eq!(table.optional().count(), 1);
    }

    #[test]
    fn test_render() {
        let (table, _) = SymbolTable::build("NATIVE_", &methods(OPEN_CLOSE));
        insta::assert_snapshot!(table.render().trim_end(), @r"
        NATIVE_Open      Open          required
        NATIVE_Close     Close         optional
        native_close_v1  Close_Legacy  required
        ");
    }

    #[test]
    fn test_duplicate_symbol_names_both_sites() {
        let src = r#"
[surface]
name = "native"
prefix = "NATIVE_"

[[methods]]
name = "Open"

[[methods]]
name = "Reopen"
symbol = "NATIVE_Open"
"#;
        let (table, errors) = SymbolTable::build("NATIVE_", &methods(src));
        assert_eq!(table.len(), 1);
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            GenError::DuplicateSymbol { symbol, span, first } => {
                assert_eq!(symbol, "NATIVE_Open");
                assert_eq!(&src[first.clone()], "\"Open\"");
                assert_eq!(&src[span.clone()], "\"NATIVE_Open\"");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_symbols() {
        let src = r#"
[surface]
name = "native"

[[methods]]
name = "Blank"
symbol = ""

[[methods]]
name = "Spaced"
symbol = "has space"
"#;
        let (table, errors) = SymbolTable::build("", &methods(src));
        assert!(table.is_empty());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, GenError::InvalidSymbol { .. })));
    }

    #[test]
    fn test_json_output() {
        let (table, _) = SymbolTable::build("NATIVE_", &methods(OPEN_CLOSE));
        let json = table.to_json().expect("table serializes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["prefix"], "NATIVE_");
        assert_eq!(value["entries"][1]["symbol"], "NATIVE_Close");
        assert_eq!(value["entries"][1]["optional"], true);
        assert!(value["entries"][0].get("span").is_none());
    }
}
