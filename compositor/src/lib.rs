//! xrpane compositor library: a floating 2-D UI surface inside an XR
//! session, driven by tracked controllers.
//!
//! This library crate exposes the compositor's core modules for integration
//! testing. The binary entry point lives in `main.rs`.

pub mod backend;
pub mod clock;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod input_source;
pub mod runtime;
pub mod vr;
