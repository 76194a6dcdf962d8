//! VR core: geometry, frame handoff, pointer hit-testing, input, background,
//! and composition layers. Everything here is independent of any concrete
//! XR runtime, GPU, or UI engine.

pub mod background;
pub mod geometry;
pub mod handoff;
pub mod input;
pub mod layers;
pub mod pointer;
pub mod texture;
