//! Entry point for the foot-scan viewer.

use anyhow::{Context, Result};
use clap::Parser;
use footscan_viewer::{
    app::App,
    config::Config,
    net::{self, TransferEvent},
    renderer::{DrawOutcome, RenderPhase},
    ui::{self, TransferStatus},
};
use scan_transfer::{TransferClient, UploadResult};
use std::{sync::Arc, time::Instant};
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

fn main() -> Result<()> {
    // Initialize logging; default to "info" if RUST_LOG is unset.
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = Config::parse();
    log::info!("footscan_viewer starting with configuration: {:?}", config);

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("No display available ({}); running without a window", err);
            return run_headless(&config);
        }
    };
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Foot Scan Viewer")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720))
            .build(&event_loop)?,
    );

    let (transfer_tx, transfer_rx) = crossbeam_channel::unbounded();

    // Initialise the application (async → sync).
    let mut app = match pollster::block_on(App::new(
        window.clone(),
        config.render_config(),
        transfer_rx,
    )) {
        Ok(app) => app,
        Err(err) => {
            log::error!("Renderer {:?}: {}; continuing without 3D view", RenderPhase::Failed, err);
            drop(window);
            return run_headless(&config);
        }
    };
    log::info!("Renderer {:?}", app.renderer.phase());

    if let (true, Some(scan)) = (config.upload, &config.scan) {
        let client = TransferClient::new(config.transfer_config())?;
        app.hud.status = TransferStatus::Uploading {
            file: scan.clone(),
            started: Instant::now(),
        };
        net::spawn_upload(client, config.endpoint.clone(), scan.clone(), transfer_tx);
    } else if let Some(scan) = &config.scan {
        match scanply::read_file(scan) {
            Ok(points) => app.show_points(&points),
            Err(err) => {
                log::error!("Failed to load {}: {}", scan.display(), err);
                app.hud.decode_error = Some(format!("{}: {}", scan.display(), err));
            }
        }
    }

    // Run the winit event loop.
    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => {
                // Forward events to the app; handle unconsumed window events.
                if !app.handle_event(&window, &event) {
                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                                elwt.exit();
                            }
                        }
                        WindowEvent::RedrawRequested => match app.render(&window) {
                            Ok(DrawOutcome::Presented { .. }) => {}
                            Ok(DrawOutcome::Skipped(reason)) => {
                                log::trace!("Frame skipped: {:?}", reason);
                            }
                            Err(wgpu::SurfaceError::OutOfMemory) => {
                                log::error!("WGPU out of memory – exiting.");
                                elwt.exit();
                            }
                            Err(e) => log::error!("Render error: {:?}", e),
                        },
                        _ => {}
                    }
                }
            }
            Event::AboutToWait => {
                // Request a redraw each frame.
                window.request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}

/// Text-only mode: performs the requested work and prints what the HUD would show.
fn run_headless(config: &Config) -> Result<()> {
    let Some(scan) = &config.scan else {
        log::warn!("Nothing to do without a window: no --scan given");
        return Ok(());
    };

    if !config.upload {
        let points = scanply::read_file(scan)
            .with_context(|| format!("failed to load {}", scan.display()))?;
        println!("{}: {} points", scan.display(), points.len());
        if let Some(b) = scanply::bounds(&points) {
            println!("Bounds: min {:?} max {:?}", b.min, b.max);
        }
        return Ok(());
    }

    let client = TransferClient::new(config.transfer_config())?;
    match net::run_transfer(&client, &config.endpoint, scan) {
        TransferEvent::Completed { result, points } => {
            print_result(&result);
            println!("Decoded points: {}", points.len());
        }
        TransferEvent::Undecodable { result, error } => {
            print_result(&result);
            log::error!("Processed file could not be decoded: {}", error);
        }
        TransferEvent::Failed(e) => {
            return Err(e.context(format!("processing {} failed", scan.display())));
        }
    }
    Ok(())
}

fn print_result(result: &UploadResult) {
    for (label, value) in result.measurements.labelled() {
        println!("{}: {}", label, ui::format_measurement(value));
    }
    println!("Points (service): {}", result.point_count);
    if let Some(overview) = &result.overview_text {
        println!("Overview:\n{}", overview);
    }
    if let Some(source) = &result.analysis_source {
        println!("Source: {}", source);
    }
    println!("Saved to {}", result.saved_file_path.display());
}
