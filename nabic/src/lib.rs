///
/// nabic - The nabi binding generator library
///
/// Reads a binding surface (a TOML description of a native C-ABI library)
/// and emits the Rust binding module for it. It includes:
///
/// - decl: Serde model of surface files, with source spans
/// - types: Domain type expressions and their ABI mapping
/// - symbols: Logical method → exported native symbol table
/// - surface: Validation and analysis into a `BindingSurface`
/// - codegen: Rust source emission
/// - diagnostic: miette rendering of surface errors
///
/// Entry points:
/// - `analyze_source`: Parse and validate a surface
/// - `generate`: Surface text to Rust source
/// - `generate_file`: Surface file to Rust file, for build scripts
///

pub mod codegen;
pub mod decl;
pub mod diagnostic;
pub mod error;
pub mod naming;
pub mod surface;
pub mod symbols;
pub mod types;

use std::fs;
use std::path::Path;

use tracing::{debug, info};

pub use decl::{parse_surface_str, SurfaceDecl};
pub use diagnostic::DiagnosticReporter;
pub use error::{GenError, GenerateError};
pub use surface::{analyze, BindingSurface};
pub use symbols::SymbolTable;

/// Parses and validates a surface; `name` labels diagnostics.
pub fn analyze_source(name: &str, source: &str) -> Result<BindingSurface, GenerateError> {
    let invalid = |errors: Vec<GenError>| GenerateError::Invalid {
        name: name.to_string(),
        source_text: source.to_string(),
        errors,
    };
    let decl = parse_surface_str(source).map_err(|err| invalid(vec![err]))?;
    analyze(&decl, source).map_err(invalid)
}

pub fn generate(name: &str, source: &str) -> Result<String, GenerateError> {
    let surface = analyze_source(name, source)?;
    Ok(codegen::generate(&surface))
}

/// Generates bindings for `input` into `output`.
///
/// The output file is left untouched when its content would not change, so
/// dependents are not rebuilt needlessly. Returns whether it was written.
pub fn generate_file(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<bool, GenerateError> {
    let input = input.as_ref();
    let output = output.as_ref();

    let source = fs::read_to_string(input).map_err(|source| GenerateError::Io {
        path: input.to_path_buf(),
        source,
    })?;
    let code = generate(&input.display().to_string(), &source)?;

    if fs::read_to_string(output).is_ok_and(|existing| existing == code) {
        debug!(output = %output.display(), "bindings unchanged");
        return Ok(false);
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| GenerateError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(output, &code).map_err(|source| GenerateError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    info!(input = %input.display(), output = %output.display(), "generated bindings");
    Ok(true)
}

/// Renders the diagnostics of a failed generation as plain text.
pub fn render_error(err: &GenerateError) -> String {
    match err {
        GenerateError::Invalid {
            name,
            source_text,
            errors,
        } => DiagnosticReporter::new(name, source_text).render(errors),
        other => other.to_string(),
    }
}

#[test]
fn test_generate_rejects_invalid_surface_without_output() {
    let source = r#"
[surface]
name = "native"

[[methods]]
name = "Read"
params = [{ name = "out", type = "ref_mut<i32>" }]
"#;
    match generate("native.toml", source) {
        Err(GenerateError::Invalid { errors, .. }) => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], GenError::ByReferenceParameter { .. }));
        }
        other => panic!("expected an invalid surface, got {:?}", other.map(|_| ())),
    }
}
