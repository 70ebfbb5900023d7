///
/// Code Generation Module
///
/// Emits the Rust binding module for an analyzed surface. The output is
/// meant to be `include!`d from a crate that depends on `nabi-runtime` and
/// `tracing`; every path in it is fully qualified.
///
/// Pipeline:
/// 1. Parse the surface file (`decl`)
/// 2. Analyze and validate it (`surface`)
/// 3. Emit Rust source (`rust`)
/// 4. Write it to the build output, only when the content changed
///

pub mod rust;

pub use rust::{generate, RustGenerator};
