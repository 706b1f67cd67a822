// Build script compiling the triangle shaders to SPIR-V
//
// Each source compiles to `<stage>.spv` (vert.spv, frag.spv) under the
// workspace `target/shaders` directory, where the default shader
// configuration looks first.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_STAGES: [&str; 2] = ["vert", "frag"];

fn compile_shader(glslc: &str, source: &Path, output: &Path) -> Result<bool, String> {
    let up_to_date = match (std::fs::metadata(source), std::fs::metadata(output)) {
        (Ok(src_meta), Ok(dst_meta)) => match (src_meta.modified(), dst_meta.modified()) {
            (Ok(src), Ok(dst)) => src <= dst,
            _ => false,
        },
        _ => false,
    };
    if up_to_date {
        eprintln!("info: Shader {:?} is up to date", source);
        return Ok(false);
    }

    let status = Command::new(glslc)
        .arg(source)
        .arg("-o")
        .arg(output)
        .status()
        .map_err(|e| format!("failed to run glslc for {:?}: {}", source, e))?;

    if status.success() {
        eprintln!("info: Compiled {:?} -> {:?}", source, output);
        Ok(true)
    } else {
        Err(format!(
            "glslc failed for {:?} with exit code: {}",
            source,
            status.code().unwrap_or(-1)
        ))
    }
}

fn main() {
    println!("cargo:rerun-if-changed=shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: Install Vulkan SDK and set VULKAN_SDK environment variable");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        format!("{}\\Bin\\glslc.exe", vulkan_sdk)
    } else {
        format!("{}/bin/glslc", vulkan_sdk)
    };
    if !Path::new(&glslc).exists() {
        panic!("Shader compiler not found at {}", glslc);
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string()));
    let target_dir = manifest_dir.join("../target/shaders");
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create {:?}: {}", target_dir, e);
        return;
    }

    let mut compiled = 0;
    for stage in SHADER_STAGES {
        let source = manifest_dir.join("shaders").join(format!("shader.{}", stage));
        let output = target_dir.join(format!("{}.spv", stage));
        match compile_shader(&glslc, &source, &output) {
            Ok(true) => compiled += 1,
            Ok(false) => {}
            Err(e) => panic!("Shader compilation failed: {}", e),
        }
    }

    eprintln!("info: {} shader(s) compiled", compiled);
}
