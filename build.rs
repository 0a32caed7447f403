use std::{env, fs, path::PathBuf};

fn main() {
    // put memory.x where the linker can find it, only the firmware target uses it
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::copy("memory.x", out.join("memory.x")).unwrap_or_else(|e| panic!("{}", e));
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}
