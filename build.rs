use std::env;
use std::path::{Path, PathBuf};

fn main() {
    let header_src = "include/entity_csv_export.h";
    println!("cargo:rerun-if-changed={}", header_src);
    println!("cargo:rerun-if-changed=migrations/");

    // For iOS/macOS targets, link against system frameworks
    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("apple") {
        println!("cargo:rustc-link-lib=framework=Foundation");
        println!("cargo:rustc-link-lib=framework=Security");
    }

    // Copy the C header next to the built library: OUT_DIR is target/<profile>/build/<pkg>/out
    let Ok(out_dir) = env::var("OUT_DIR") else {
        return;
    };
    let Some(target_dir) = PathBuf::from(out_dir).ancestors().nth(3).map(Path::to_path_buf) else {
        return;
    };

    if Path::new(header_src).exists() {
        if let Err(e) = std::fs::copy(header_src, target_dir.join("entity_csv_export.h")) {
            println!("cargo:warning=Failed to copy header file: {}", e);
        }
    }
}
