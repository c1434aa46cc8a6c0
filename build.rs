fn main() {
    // libopus_sys builds opus through opus-static-sys, but the static library's
    // search path is not always propagated to this crate's link step.
    let Ok(out_dir) = std::env::var("OUT_DIR") else {
        return;
    };

    // out_dir: target/{profile}/build/relaycam-xxx/out
    // wanted:  target/{profile}/build/opus-static-sys-xxx/out/lib
    let build_dir = std::path::Path::new(&out_dir)
        .parent()
        .and_then(|p| p.parent());

    if let Some(build_dir) = build_dir {
        if let Ok(entries) = std::fs::read_dir(build_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if !name.to_string_lossy().starts_with("opus-static-sys-") {
                    continue;
                }
                let opus_lib_dir = entry.path().join("out").join("lib");
                if opus_lib_dir.exists() {
                    println!("cargo:rustc-link-search=native={}", opus_lib_dir.display());
                    println!("cargo:rustc-link-lib=static=opus");
                    println!("cargo:rerun-if-changed={}", opus_lib_dir.display());
                    return;
                }
            }
        }
    }

    if let Ok(lib_path) = std::env::var("DEP_OPUS_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", lib_path);
        println!("cargo:rustc-link-lib=static=opus");
    }
}
