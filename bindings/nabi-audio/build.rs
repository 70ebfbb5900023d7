///
/// Generates the audio engine bindings into OUT_DIR.
///

use std::path::PathBuf;

const SURFACE: &str = "surfaces/audio_engine.toml";

fn main() {
    println!("cargo:rerun-if-changed={}", SURFACE);

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    if let Err(err) = nabic::generate_file(SURFACE, out_dir.join("audio_engine.rs")) {
        panic!("failed to generate audio engine bindings:\n{}", nabic::render_error(&err));
    }
}
