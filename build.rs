use std::path::{Path, PathBuf};

const SDK_ROOT: &str = "magic-wand_inferencing";
const SHIM_SOURCE: &str = "ffi/ei_shim.cpp";

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "espidf" {
        embuild::espidf::sysenv::output();
    }

    if std::env::var("CARGO_FEATURE_EDGE_IMPULSE").is_ok() {
        // On the device we need the RISC-V cross compiler from the embuild
        // toolchain directory; on the host cc picks the system compiler.
        let compiler = if target_os == "espidf" {
            Some(find_compiler().unwrap_or_else(|| "riscv32-esp-elf-g++".into()))
        } else {
            None
        };
        build_ei(compiler.as_deref());
    }
}

fn find_compiler() -> Option<PathBuf> {
    // Check local .embuild first, then global ~/.espressif
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").ok()?;
    let search_dirs = vec![
        PathBuf::from(manifest_dir).join(".embuild"),
        dirs::home_dir().map(|h| h.join(".espressif")).unwrap_or_default(),
    ];

    for root in search_dirs {
        let tools_dir = root.join("espressif/tools/riscv32-esp-elf");
        let Ok(entries) = std::fs::read_dir(&tools_dir) else {
            continue;
        };
        // Versioned directory, e.g. esp-13.2.0_20240530
        for entry in entries.flatten() {
            let candidate = entry.path().join("riscv32-esp-elf/bin/riscv32-esp-elf-g++");
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

fn build_ei(compiler: Option<&Path>) {
    let sdk_root = PathBuf::from(SDK_ROOT);

    let mut build = cc::Build::new();
    if let Some(compiler) = compiler {
        build.compiler(compiler);
    }

    build
        .cpp(true)
        .flag("-std=c++14")
        .flag("-O3")
        .define("EI_CLASSIFIER_ENABLE_DETECTION_3D", "0")
        .define("EI_CLASSIFIER_TFLITE_ENABLE_CMSIS_NN", "0")
        .define("EI_NATIVE_ARCH", "1")
        .include(&sdk_root)
        .include(sdk_root.join("src"))
        .include(sdk_root.join("src/edge-impulse-sdk"))
        .include(sdk_root.join("src/model-parameters"))
        .include(sdk_root.join("src/tflite-model"))
        .file(SHIM_SOURCE);

    add_source_files(&mut build, &sdk_root.join("src"));

    build.compile("edge-impulse-sdk");

    println!("cargo:rerun-if-changed={}", SDK_ROOT);
    println!("cargo:rerun-if-changed={}", SHIM_SOURCE);
}

fn add_source_files(build: &mut cc::Build, dir: &Path) {
    let entries = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", dir.display(), e));

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            add_source_files(build, &path);
        } else if let Some(ext) = path.extension() {
            if ext == "c" || ext == "cpp" || ext == "cc" {
                build.file(&path);
            }
        }
    }
}
