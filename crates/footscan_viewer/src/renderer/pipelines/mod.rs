//! Render pipelines used by the viewer.

pub mod points;
