///
/// End-to-end generation tests: surface file in, Rust module out.
///

use std::fs;

use nabic::{generate, generate_file, render_error, GenError, GenerateError};

const NATIVE: &str = r#"
[surface]
name = "native"
prefix = "NATIVE_"
library = "native"
doc = "Open/close streams."

[handles.Stream]
release = "Close"

[[methods]]
name = "Open"
params = [{ name = "name", type = "ptr<char>" }]
returns = "Stream"

[[methods]]
name = "Close"
params = [{ name = "stream", type = "Stream" }]
returns = "bool"
optional = true
"#;

#[test]
fn test_generate_file_writes_once() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("native.toml");
    let output = dir.path().join("out").join("native.rs");
    fs::write(&input, NATIVE).expect("Failed to write surface");

    assert!(generate_file(&input, &output).expect("generation succeeds"));
    assert!(!generate_file(&input, &output).expect("generation succeeds"));

    let code = fs::read_to_string(&output).expect("output exists");
    assert_eq!(code, generate("native.toml", NATIVE).expect("generation succeeds"));
    assert!(code.contains("/// Open/close streams.\npub struct Native {"));
}

#[test]
fn test_generate_file_missing_input() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let err = generate_file(dir.path().join("nope.toml"), dir.path().join("out.rs")).unwrap_err();
    assert!(matches!(err, GenerateError::Io { .. }));
    assert!(!dir.path().join("out.rs").exists());
}

#[test]
fn test_invalid_surface_leaves_output_untouched() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("native.toml");
    let output = dir.path().join("native.rs");
    fs::write(&output, "// previous").expect("Failed to write output");
    fs::write(&input, NATIVE.replace("returns = \"Stream\"", "returns = \"ref<Stream>\""))
        .expect("Failed to write surface");

    let err = generate_file(&input, &output).unwrap_err();
    match &err {
        GenerateError::Invalid { errors, .. } => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], GenError::ByReferenceReturn { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fs::read_to_string(&output).expect("output exists"), "// previous");

    let rendered = render_error(&err);
    assert!(rendered.contains("'Open' returns a reference (ref<Stream>)"));
    assert!(rendered.contains("return ptr<T> or ptr_mut<T> instead"));
}

#[test]
fn test_too_many_parameters_blocks_generation() {
    let params: Vec<String> = (1..=9)
        .map(|i| format!("{{ name = \"a{}\", type = \"i32\" }}", i))
        .collect();
    let src = format!(
        "{}\n[[methods]]\nname = \"Mix\"\nparams = [{}]\nreturns = \"i32\"\n",
        NATIVE,
        params.join(", ")
    );

    let err = generate("native.toml", &src).unwrap_err();
    match &err {
        GenerateError::Invalid { errors, .. } => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(
                &errors[0],
                GenError::TooManyParameters { owner, count: 9, max: 8, .. } if owner == "Mix"
            ));
        }
        other => panic!("unexpected error: {other}"),
    }

    let rendered = render_error(&err);
    assert!(rendered.contains("'Mix' takes 9 parameters, at most 8 are supported"));
    assert!(rendered.contains("pass the rest through a ptr<T> to a struct"));
}

#[test]
fn test_parse_error_is_reported() {
    let err = generate("broken.toml", "[surface]\nname = \n").unwrap_err();
    match err {
        GenerateError::Invalid { errors, .. } => {
            assert!(matches!(errors[0], GenError::Parse { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_generated_module_snapshot() {
    let code = generate("native.toml", NATIVE).expect("generation succeeds");
    let ffi_start = code.find("pub mod ffi").expect("ffi module emitted");
    let ffi_end = ffi_start + code[ffi_start..].find("\n}\n").expect("ffi module closed") + 2;
    insta::assert_snapshot!(&code[ffi_start..ffi_end], @r#"
    pub mod ffi {
        #[allow(unused_imports)]
        use super::*;

        /// `NATIVE_Open`
        pub type Open = unsafe extern "C" fn(*const ::std::ffi::c_char) -> *mut ::std::ffi::c_void;

        /// `NATIVE_Close`
        pub type Close = unsafe extern "C" fn(*mut ::std::ffi::c_void) -> i32;
    }
    "#);
}
