//! Build script for skbtrace.
//!
//! Selects the probe object to embed at compile time:
//! - `SKBTRACE_BPF_OBJECT=<path>` if set,
//! - otherwise a freshly-built object under `target/bpfel-unknown-none/release/`,
//! - otherwise an empty placeholder, in which case the binary requires
//!   `--bpf-object <PATH>` at runtime.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let dest = out_dir.join("skbtrace.bpf.o");

    let manifest_dir =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set by cargo"));
    let workspace_root = manifest_dir.parent().unwrap_or(&manifest_dir).to_path_buf();
    let fresh_release = workspace_root.join("target/bpfel-unknown-none/release/skbtrace");

    println!("cargo:rerun-if-env-changed=SKBTRACE_BPF_OBJECT");
    println!("cargo:rerun-if-changed={}", fresh_release.display());

    let source = env::var_os("SKBTRACE_BPF_OBJECT")
        .map(PathBuf::from)
        .or_else(|| fresh_release.exists().then_some(fresh_release));

    match source {
        Some(source) => {
            println!("cargo:rerun-if-changed={}", source.display());
            fs::copy(&source, &dest).unwrap_or_else(|e| {
                panic!(
                    "Failed to copy probe object from {} to {}: {}",
                    source.display(),
                    dest.display(),
                    e
                )
            });
            println!("cargo:warning=Embedding probe object: {}", source.display());
        }
        None => {
            fs::write(&dest, b"").unwrap_or_else(|e| {
                panic!("Failed to write placeholder {}: {}", dest.display(), e)
            });
        }
    }
}
