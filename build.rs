use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");
    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR");
    let header_dir = PathBuf::from(&crate_dir).join("include");
    if let Err(err) = std::fs::create_dir_all(&header_dir) {
        println!("cargo:warning=cannot create include dir: {err}");
        return;
    }
    let header_path = header_dir.join("frameshm.h");

    let config_path = PathBuf::from(&crate_dir).join("cbindgen.toml");
    let config = match cbindgen::Config::from_file(config_path) {
        Ok(config) => config,
        Err(err) => {
            println!("cargo:warning=cbindgen.toml unreadable: {err}");
            return;
        }
    };

    // header generation is best effort
    match cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(header_path);
        }
        Err(err) => println!("cargo:warning=unable to generate frameshm.h: {err}"),
    }
}
