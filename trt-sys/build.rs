use color_eyre::eyre::{eyre, Result, WrapErr};
use std::{env, path::PathBuf};

fn main() -> Result<()> {
    color_eyre::install()?;

    println!("cargo:rerun-if-changed=wrapper.hpp");
    println!("cargo:rerun-if-changed=wrapper.cpp");

    // TensorRT is only present on the device image. Off-device builds compile
    // this crate to an empty surface.
    if env::var("TARGET").unwrap().as_str() != "aarch64-unknown-linux-gnu" {
        return Ok(());
    }

    let sdk_path = env::var_os("TENSORRT_PATH")
        .map(PathBuf::from)
        .ok_or_else(|| eyre!("$TENSORRT_PATH env var is not set"))?
        .canonicalize()
        .wrap_err("failed to canonicalize `TENSORRT_PATH`. Does the folder exist?")?;

    cc::Build::new()
        .file("wrapper.cpp")
        .include(sdk_path.join("include"))
        .flag("-O2")
        .cpp(true)
        .compile("trt_wrapper");
    println!("cargo:rustc-link-lib=nvinfer");
    println!("cargo:rustc-link-lib=cudart");
    println!("cargo:rustc-link-search={}", sdk_path.join("lib").display());
    println!("cargo:rustc-link-lib=static=trt_wrapper");

    Ok(())
}
