//! Window surface, adapter, device and queue.

use super::RenderInitError;
use std::sync::Arc;
use winit::{dpi::PhysicalSize, window::Window};

pub struct GfxContext {
    pub surface: wgpu::Surface<'static>,
    /// Shared with [`super::frame_buffers::WgpuBackend`], which may upload from other threads.
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
}

impl GfxContext {
    /// Every step that can fail maps onto a [`RenderInitError`]; nothing here panics.
    pub async fn new(window: Arc<Window>) -> Result<Self, RenderInitError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderInitError::NoAdapter)?;
        log::info!("GPU adapter: {:?}", adapter.get_info());

        // Points and one uniform block fit downlevel limits, so integrated GPUs qualify.
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Scan Viewer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await?;

        let config = surface_config(&surface.get_capabilities(&adapter), size)?;
        surface.configure(&device, &config);
        log::info!(
            "Surface {}x{} {:?}, {:?}",
            config.width,
            config.height,
            config.format,
            config.present_mode
        );

        Ok(Self {
            surface,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config,
            size,
        })
    }

    /// Zero-area sizes are ignored; the old configuration stays valid.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.reconfigure();
    }

    /// Re-applies the current configuration, e.g. after the surface was lost.
    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }
}

/// Picks an sRGB format when offered, Fifo presentation (display-paced, always
/// available) and an opaque alpha mode when offered.
pub fn surface_config(
    caps: &wgpu::SurfaceCapabilities,
    size: PhysicalSize<u32>,
) -> Result<wgpu::SurfaceConfiguration, RenderInitError> {
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .or_else(|| caps.formats.first().copied())
        .ok_or(RenderInitError::NoSurfaceFormat)?;

    let alpha_mode = if caps.alpha_modes.contains(&wgpu::CompositeAlphaMode::Opaque) {
        wgpu::CompositeAlphaMode::Opaque
    } else {
        caps.alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto)
    };

    Ok(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::{CompositeAlphaMode, TextureFormat};

    fn caps(formats: Vec<TextureFormat>, alpha_modes: Vec<CompositeAlphaMode>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            present_modes: vec![wgpu::PresentMode::Fifo],
            alpha_modes,
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn prefers_srgb_and_opaque() {
        let c = surface_config(
            &caps(
                vec![TextureFormat::Bgra8Unorm, TextureFormat::Bgra8UnormSrgb],
                vec![CompositeAlphaMode::PreMultiplied, CompositeAlphaMode::Opaque],
            ),
            PhysicalSize::new(1280, 720),
        )
        .unwrap();
        assert_eq!(c.format, TextureFormat::Bgra8UnormSrgb);
        assert_eq!(c.alpha_mode, CompositeAlphaMode::Opaque);
        assert_eq!(c.present_mode, wgpu::PresentMode::Fifo);
        assert_eq!((c.width, c.height), (1280, 720));
    }

    #[test]
    fn falls_back_to_first_offer_and_non_zero_size() {
        let c = surface_config(
            &caps(vec![TextureFormat::Rgba16Float], vec![]),
            PhysicalSize::new(0, 0),
        )
        .unwrap();
        assert_eq!(c.format, TextureFormat::Rgba16Float);
        assert_eq!(c.alpha_mode, CompositeAlphaMode::Auto);
        assert_eq!((c.width, c.height), (1, 1));
    }

    #[test]
    fn no_formats_is_an_init_error() {
        let err = surface_config(&caps(vec![], vec![]), PhysicalSize::new(10, 10)).unwrap_err();
        assert!(matches!(err, RenderInitError::NoSurfaceFormat));
    }
}
