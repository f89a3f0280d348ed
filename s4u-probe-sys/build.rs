use std::{env, path::PathBuf};

// (pkg-config name, library to link when pkg-config can't find it)
const LIBRARIES: [(&str, &str); 2] = [("krb5-gssapi", "gssapi_krb5"), ("krb5", "krb5")];

fn main() {
    println!("cargo:rerun-if-changed=wrapper.h");
    let mut include_paths = Vec::new();
    for (pc, lib) in LIBRARIES {
        // pkg-config emits the link lines itself when it finds the library
        match pkg_config::probe_library(pc) {
            Ok(found) => include_paths.extend(found.include_paths),
            Err(_) => println!("cargo:rustc-link-lib={}", lib),
        }
    }
    let bindings = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_args(include_paths.iter().map(|p| format!("-I{}", p.display())))
        .allowlist_function("gss_.*")
        .allowlist_function("krb5_.*")
        .allowlist_type("gss_.*")
        .allowlist_type("krb5_.*")
        .allowlist_type("OM_uint32")
        .allowlist_var("GSS_.*")
        .generate()
        .expect("failed to generate gssapi/krb5 bindings");
    let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("failed to write bindings")
}
