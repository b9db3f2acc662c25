use color_eyre::eyre::{eyre, Result, WrapErr};
use std::{env, path::PathBuf};

fn main() -> Result<()> {
    color_eyre::install()?;

    println!("cargo:rerun-if-changed=wrapper.hpp");
    println!("cargo:rerun-if-changed=wrapper.cpp");

    // The vendor SDK ships only for the device target. Off-device builds
    // compile this crate to an empty surface, keeping the workspace testable
    // on any host.
    if env::var("TARGET").unwrap().as_str() != "aarch64-unknown-linux-gnu" {
        return Ok(());
    }

    let sdk_path = env::var_os("ZED_SDK_PATH")
        .map(PathBuf::from)
        .ok_or_else(|| eyre!("$ZED_SDK_PATH env var is not set"))?
        .canonicalize()
        .wrap_err("failed to canonicalize `ZED_SDK_PATH`. Does the folder exist?")?;

    cc::Build::new()
        .file("wrapper.cpp")
        .include(sdk_path.join("include"))
        .flag("-O2")
        .cpp(true)
        .compile("zed_wrapper");
    println!("cargo:rustc-link-lib=sl_zed");
    println!("cargo:rustc-link-search={}", sdk_path.join("lib").display());
    println!("cargo:rustc-link-lib=static=zed_wrapper");

    Ok(())
}
