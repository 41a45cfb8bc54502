// src/data/mod.rs
//! Data handling modules for the foot-scan viewer.
//!
//! This module provides:
//! - The per-point record shared with the decoder (`VertexRecord`, from `scanply`).
//! - The per-frame uniform block uploaded to the GPU.

pub mod types;

// Re-export commonly used types for convenience.
pub use self::types::FrameUniforms;
pub use scanply::VertexRecord;
