//! Compute adapter and device setup.

use super::layout::ROW_TEXELS;
use crate::util::{Error, Result};

/// Selected adapter plus the device and queue every kernel call goes through.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    max_rows: u32,
}

impl GpuContext {
    /// Pick the default high-performance adapter and open a device on it.
    ///
    /// There is no software fallback: a missing or under-powered adapter is
    /// an error.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        check_capabilities(&adapter.get_downlevel_capabilities(), &limits)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("voxtrace_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: limits.max_texture_dimension_2d,
                    ..wgpu::Limits::downlevel_defaults()
                },
                ..Default::default()
            })
            .await
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            max_rows = limits.max_texture_dimension_2d,
            "compute device ready"
        );

        Ok(Self { device, queue, info, max_rows: limits.max_texture_dimension_2d })
    }

    #[inline]
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    /// Largest row count a packed scene image may use.
    #[inline]
    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    /// One-line adapter description for logs and the CLI.
    pub fn describe(&self) -> String {
        format!(
            "{} ({:?}, {:?}, driver {} {})",
            self.info.name, self.info.backend, self.info.device_type, self.info.driver, self.info.driver_info
        )
    }
}

/// Reject adapters that cannot run the kernels.
fn check_capabilities(caps: &wgpu::DownlevelCapabilities, limits: &wgpu::Limits) -> Result<()> {
    if !caps.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
        return Err(Error::UnsupportedDevice("adapter has no compute shader support".into()));
    }
    if limits.max_texture_dimension_2d < ROW_TEXELS {
        return Err(Error::UnsupportedDevice(format!(
            "max 2D texture size {} is below the {} texel row width",
            limits.max_texture_dimension_2d, ROW_TEXELS
        )));
    }
    Ok(())
}

/// Compile a WGSL module, collecting the full compiler log on failure.
pub(crate) fn build_shader(device: &wgpu::Device, label: &str, source: &str) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let info = pollster::block_on(module.get_compilation_info());
    let scope_error = pollster::block_on(device.pop_error_scope());

    let failed = info
        .messages
        .iter()
        .any(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error));
    if !failed && scope_error.is_none() {
        return Ok(module);
    }

    let mut log = info
        .messages
        .iter()
        .map(|m| match &m.location {
            Some(loc) => format!("{:?} at {}:{}: {}", m.message_type, loc.line_number, loc.line_position, m.message),
            None => format!("{:?}: {}", m.message_type, m.message),
        })
        .collect::<Vec<_>>()
        .join("\n");
    if let Some(e) = scope_error {
        if !log.is_empty() {
            log.push('\n');
        }
        log.push_str(&e.to_string());
    }
    tracing::error!(label, "kernel build failed:\n{log}");
    Err(Error::ShaderBuild { label: label.to_string(), log })
}
