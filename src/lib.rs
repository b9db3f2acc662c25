//! The rust main program running on the talon tracking sensor, responsible
//! for the real-time stereo-vision inference pipeline: stereo frame
//! acquisition, on-device target detection and per-target depth ranging.
//!
//! # Architecture
//!
//! See the [`pipeline`] module documentation for the description of the
//! chosen architecture.
//!
//! # Guidelines
//!
//! The code should be formatted with Rustfmt using the project-level
//! `rustfmt.toml`. E.g. run from the command line: `cargo fmt`.
//!
//! The code should pass clippy lints in pedantic mode. E.g. run from the
//! command line: `cargo clippy`. It's fine to suppress some lint locally
//! with `#[allow(clippy:<lint>)]` attribute.
//!
//! The code should be properly documented and should pass the
//! `#[warn(missing_docs)]` lint.

#![warn(missing_docs, unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown, clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub mod artifacts;
pub mod camera;
pub mod cli;
pub mod config;
pub mod consts;
pub mod control;
pub mod depth;
pub mod detector;
pub mod logger;
pub mod pipeline;
pub mod schedule;
pub mod stats;
pub mod telemetry;
pub mod timing;
pub mod window;

use eyre::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::future::Future;

/// A wrapper for the main function, which runs common initialization
/// routines and takes a future to execute as the main function.
#[allow(clippy::missing_panics_doc)]
pub fn async_main<F: Future<Output = Result<()>>>(f: F) -> Result<()> {
    color_eyre::install()?;
    logger::init();
    let future = async {
        let result = f.await;
        match result {
            Ok(()) => {
                // If we return from this function, other async tasks in this
                // tokio runtime will keep running. We are completely done by
                // now, it's safe to forcefully kill them.
                std::process::exit(0);
            }
            Err(err) => {
                tracing::error!("Fatal error: {err:?}");
                std::process::exit(1);
            }
        }
    };
    tokio::runtime::Builder::new_multi_thread()
        .thread_name_fn(|| {
            static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
            let id = ATOMIC_ID.fetch_add(1, Ordering::Relaxed);
            format!("talon-worker-{id}")
        })
        .enable_all()
        .build()
        .expect("failed to initialize async runtime")
        .block_on(future)
}
