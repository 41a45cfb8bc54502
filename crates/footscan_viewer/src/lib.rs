// src/lib.rs
//! Foot-scan point cloud viewer library.
//!
//! Renders a scan as coloured points under an orbit camera, and can send the
//! scan to the processing service and show the cloud and measurements it
//! returns.

pub mod app;
pub mod camera;
pub mod config;
pub mod data;
pub mod net;
pub mod renderer;
pub mod ui;
