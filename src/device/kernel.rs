//! Compute pipelines, per-call buffers, dispatch and readback.
//!
//! Two bind groups are used by both kernels:
//!
//! | group | binding | resource |
//! |---|---|---|
//! | 0 | 0 | octree image (`Rgba32Sint`) |
//! | 0 | 1 | texture atlas (`Rgba32Uint`) |
//! | 0 | 2 | block metadata (`Rgba32Sint`) |
//! | 0 | 3 | transparent block ids (storage) |
//! | 0 | 4 | [`SceneInfo`](super::SceneInfo) (uniform) |
//! | 1 | 0 | [`TraceParams`] (uniform) |
//! | 1 | 1 | per-call input (storage, read) |
//! | 1 | 2 | per-call output (storage, read-write) |
//!
//! Group 0 lives as long as the resident scene; group 1 and its buffers are
//! created for one call and destroyed after readback.

use bytemuck::Pod;
use wgpu::util::DeviceExt;

use super::context::{build_shader, GpuContext};
use super::gpu_types::TraceParams;
use crate::util::{Error, Result};

/// WGSL sources embedded at compile time; the octree module is shared.
const INTERSECT_WGSL: &str = concat!(include_str!("wgsl/octree.wgsl"), include_str!("wgsl/intersect.wgsl"));
const DEPTH_WGSL: &str = concat!(include_str!("wgsl/octree.wgsl"), include_str!("wgsl/depth.wgsl"));

/// Workgroup size (must match @workgroup_size in WGSL).
pub const WG_SIZE: u32 = 64;

pub const SCENE_GROUP: u32 = 0;
pub const CALL_GROUP: u32 = 1;

pub const OCTREE_BINDING: u32 = 0;
pub const ATLAS_BINDING: u32 = 1;
pub const META_BINDING: u32 = 2;
pub const TRANSPARENT_BINDING: u32 = 3;
pub const SCENE_INFO_BINDING: u32 = 4;

pub const PARAMS_BINDING: u32 = 0;
pub const INPUT_BINDING: u32 = 1;
pub const OUTPUT_BINDING: u32 = 2;

/// Which entry point a dispatch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    /// One [`GpuRayQuery`](super::GpuRayQuery) in, one [`GpuHit`](super::GpuHit) out.
    Intersect,
    /// Three direction floats in, three result floats out.
    Depth,
}

/// Both pipelines plus the layouts their bind groups are built against.
pub struct Kernels {
    scene_layout: wgpu::BindGroupLayout,
    call_layout: wgpu::BindGroupLayout,
    intersect: wgpu::ComputePipeline,
    depth: wgpu::ComputePipeline,
    max_groups: u32,
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type,
        },
        count: None,
    }
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Kernels {
    /// Build both kernels; a validation failure returns the compiler log.
    pub fn new(ctx: &GpuContext) -> Result<Self> {
        let device = &ctx.device;

        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vt_scene_layout"),
            entries: &[
                texture_entry(OCTREE_BINDING, wgpu::TextureSampleType::Sint),
                texture_entry(ATLAS_BINDING, wgpu::TextureSampleType::Uint),
                texture_entry(META_BINDING, wgpu::TextureSampleType::Sint),
                buffer_entry(TRANSPARENT_BINDING, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(SCENE_INFO_BINDING, wgpu::BufferBindingType::Uniform),
            ],
        });

        let call_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vt_call_layout"),
            entries: &[
                buffer_entry(PARAMS_BINDING, wgpu::BufferBindingType::Uniform),
                buffer_entry(INPUT_BINDING, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(OUTPUT_BINDING, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("vt_pipeline_layout"),
            bind_group_layouts: &[&scene_layout, &call_layout],
            push_constant_ranges: &[],
        });

        let intersect = Self::pipeline(device, &pipeline_layout, "vt_intersect", INTERSECT_WGSL, "intersect_main")?;
        let depth = Self::pipeline(device, &pipeline_layout, "vt_depth", DEPTH_WGSL, "depth_main")?;

        tracing::debug!("compute kernels built");
        Ok(Self {
            scene_layout,
            call_layout,
            intersect,
            depth,
            max_groups: device.limits().max_compute_workgroups_per_dimension,
        })
    }

    fn pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        label: &str,
        source: &str,
        entry_point: &str,
    ) -> Result<wgpu::ComputePipeline> {
        let module = build_shader(device, label, source)?;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(layout),
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            let log = e.to_string();
            tracing::error!(label, "pipeline creation failed:\n{log}");
            return Err(Error::ShaderBuild { label: label.to_string(), log });
        }
        Ok(pipeline)
    }

    /// Layout resident scene bind groups are created against.
    #[inline]
    pub fn scene_layout(&self) -> &wgpu::BindGroupLayout {
        &self.scene_layout
    }

    /// Workgroup grid covering `count` invocations: 1-D while it fits, 2-D beyond.
    pub fn workgroups(&self, count: u32) -> (u32, u32) {
        let groups = count.div_ceil(WG_SIZE).max(1);
        if groups <= self.max_groups {
            (groups, 1)
        } else {
            (self.max_groups, groups.div_ceil(self.max_groups))
        }
    }

    /// Run one kernel over `params.ray_count` invocations and read back
    /// `output_len` values.
    ///
    /// Blocks until results are mapped. Transient buffers are destroyed
    /// before returning, on success and on failure.
    pub fn dispatch<I: Pod, O: Pod>(
        &self,
        ctx: &GpuContext,
        kind: KernelKind,
        scene: &wgpu::BindGroup,
        params: &TraceParams,
        input: &[I],
        output_len: usize,
    ) -> Result<Vec<O>> {
        let device = &ctx.device;
        let input_bytes: &[u8] = bytemuck::cast_slice(input);
        let output_size = (output_len * std::mem::size_of::<O>()).max(16) as u64;

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vt_params"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        // Ensure non-empty buffers (wgpu requires >0 size)
        let input_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("vt_input"),
            contents: if input_bytes.is_empty() { &[0u8; 32] } else { input_bytes },
            usage: wgpu::BufferUsages::STORAGE,
        });
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vt_output"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vt_readback"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let call_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vt_call_group"),
            layout: &self.call_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: PARAMS_BINDING, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: INPUT_BINDING, resource: input_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: OUTPUT_BINDING, resource: output_buffer.as_entire_binding() },
            ],
        });

        let (wg_x, wg_y) = self.workgroups(params.ray_count);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("vt_dispatch") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("vt_compute_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(match kind {
                KernelKind::Intersect => &self.intersect,
                KernelKind::Depth => &self.depth,
            });
            pass.set_bind_group(SCENE_GROUP, scene, &[]);
            pass.set_bind_group(CALL_GROUP, &call_group, &[]);
            pass.dispatch_workgroups(wg_x, wg_y, 1);
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging, 0, output_size);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let result = read_back::<O>(device, &staging, output_len);

        params_buffer.destroy();
        input_buffer.destroy();
        output_buffer.destroy();
        staging.destroy();

        tracing::trace!(?kind, rays = params.ray_count, wg_x, wg_y, ok = result.is_ok(), "dispatch");
        result
    }
}

/// Map `staging`, wait for the device, and copy out `len` values.
fn read_back<T: Pod>(device: &wgpu::Device, staging: &wgpu::Buffer, len: usize) -> Result<Vec<T>> {
    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // Receiver may be gone if polling failed
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| Error::readback(format!("device poll failed: {e}")))?;
    rx.recv()
        .map_err(|e| Error::readback(format!("map callback dropped: {e}")))?
        .map_err(|e| Error::readback(format!("buffer map failed: {e}")))?;

    let values = {
        let data = slice.get_mapped_range();
        let byte_len = len * std::mem::size_of::<T>();
        if data.len() < byte_len {
            return Err(Error::readback(format!("mapped {} bytes, expected {}", data.len(), byte_len)));
        }
        bytemuck::pod_collect_to_vec::<u8, T>(&data[..byte_len])
    };
    staging.unmap();
    Ok(values)
}
