//! wgpu implementation of [`ComputeBackend`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::backend::{BackendKind, ComputeBackend, ResourceHandle, check_dispatch};
use crate::error::ComputeError;
use crate::params::{DispatchParams, PipelineId};

const NOISE_WGSL: &str = include_str!("shaders/noise.wgsl");
const DENSITY_WGSL: &str = include_str!("shaders/density.wgsl");
const PLACEMENT_WGSL: &str = include_str!("shaders/placement.wgsl");

enum Resource {
    Buffer {
        buffer: wgpu::Buffer,
        size: u64,
        /// Submit time of the dispatch that writes this buffer, until read back.
        pending: Option<Instant>,
    },
    Texture {
        view: wgpu::TextureView,
        _texture: wgpu::Texture,
    },
}

/// Runs the pipelines on a GPU through wgpu.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    density_pipeline: wgpu::ComputePipeline,
    placement_pipeline: wgpu::ComputePipeline,
    /// Created once and shared by every placement dispatch.
    biome_sampler: wgpu::Sampler,
    resources: Mutex<FxHashMap<u64, Resource>>,
    next_handle: AtomicU64,
    last_dispatch_ms: AtomicU32,
}

impl GpuBackend {
    /// Request an adapter and device and build both pipelines.
    pub async fn new() -> Result<Self, ComputeError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(_) => return Err(ComputeError::NoAdapter),
        };

        let adapter_info = adapter.get_info();
        tracing::info!(
            "Selected compute GPU: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("strata-compute-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let density_pipeline = create_pipeline(&device, "density", DENSITY_WGSL);
        let placement_pipeline = create_pipeline(&device, "placement", PLACEMENT_WGSL);

        let biome_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("biome-map-sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            adapter_info,
            density_pipeline,
            placement_pipeline,
            biome_sampler,
            resources: Mutex::new(FxHashMap::default()),
            next_handle: AtomicU64::new(1),
            last_dispatch_ms: AtomicU32::new(0f32.to_bits()),
        })
    }

    /// Initialize synchronously using `pollster`.
    pub fn new_blocking() -> Result<Self, ComputeError> {
        pollster::block_on(Self::new())
    }

    fn next_id(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn record_time(&self, started: Instant) {
        let ms = started.elapsed().as_secs_f32() * 1000.0;
        self.last_dispatch_ms.store(ms.to_bits(), Ordering::Relaxed);
    }
}

fn create_pipeline(device: &wgpu::Device, name: &str, body: &str) -> wgpu::ComputePipeline {
    let source = format!("{NOISE_WGSL}\n{body}");
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(name),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(name),
        layout: None,
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

fn storage_buffer(
    resources: &FxHashMap<u64, Resource>,
    handle: ResourceHandle,
) -> Result<&wgpu::Buffer, ComputeError> {
    match resources.get(&handle.0) {
        Some(Resource::Buffer { buffer, .. }) => Ok(buffer),
        Some(_) => Err(ComputeError::WrongResource {
            handle,
            expected: "buffer",
        }),
        None => Err(ComputeError::UnknownHandle(handle)),
    }
}

impl ComputeBackend for GpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn is_available(&self) -> bool {
        true
    }

    fn status(&self) -> String {
        format!(
            "gpu {} ({:?})",
            self.adapter_info.name, self.adapter_info.backend
        )
    }

    fn upload_buffer(&self, bytes: &[u8]) -> Result<ResourceHandle, ComputeError> {
        // Storage bindings need a non-empty, 4-byte aligned size.
        let mut contents = bytes.to_vec();
        contents.resize(bytes.len().max(4).next_multiple_of(4), 0);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("strata-upload"),
                contents: &contents,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            });
        let id = self.next_id();
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Resource::Buffer {
                    buffer,
                    size: bytes.len() as u64,
                    pending: None,
                },
            );
        Ok(ResourceHandle(id))
    }

    fn upload_biome_map(
        &self,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<ResourceHandle, ComputeError> {
        let expected = width as usize * height as usize;
        if pixels.len() < expected || expected == 0 {
            return Err(ComputeError::InputTooSmall {
                expected: expected.max(1),
                got: pixels.len(),
            });
        }
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("biome-map"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels[..expected],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.next_id();
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Resource::Texture {
                    view,
                    _texture: texture,
                },
            );
        Ok(ResourceHandle(id))
    }

    fn dispatch(
        &self,
        pipeline: PipelineId,
        params: &DispatchParams,
        inputs: &[ResourceHandle],
    ) -> Result<ResourceHandle, ComputeError> {
        check_dispatch(pipeline, params, inputs)?;
        let started = Instant::now();

        // Held through encode and submit so dispatches reach the queue one at a time.
        let mut resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);

        let uniform = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("strata-params"),
                contents: params.as_bytes(),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let (output_size, workgroups) = match params {
            DispatchParams::Density(p) => {
                let groups = p.chunk_size.div_ceil(4);
                (p.output_bytes() as u64, (groups, groups, groups))
            }
            DispatchParams::Placement(p) => {
                let groups = p.grid_steps.div_ceil(8);
                (p.output_bytes() as u64, (groups, groups, 1))
            }
        };
        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata-output"),
            size: output_size.max(4),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let bind_group = match params {
            DispatchParams::Density(_) => {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("density-bind-group"),
                    layout: &self.density_pipeline.get_bind_group_layout(0),
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: uniform.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: output.as_entire_binding(),
                        },
                    ],
                })
            }
            DispatchParams::Placement(p) => {
                let sdf = storage_buffer(&resources, inputs[0])?;
                if (sdf.size() as usize) < p.sdf_bytes() {
                    return Err(ComputeError::InputTooSmall {
                        expected: p.sdf_bytes(),
                        got: sdf.size() as usize,
                    });
                }
                let map = match resources.get(&inputs[1].0) {
                    Some(Resource::Texture { view, .. }) => view,
                    Some(_) => {
                        return Err(ComputeError::WrongResource {
                            handle: inputs[1],
                            expected: "biome map",
                        });
                    }
                    None => return Err(ComputeError::UnknownHandle(inputs[1])),
                };
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("placement-bind-group"),
                    layout: &self.placement_pipeline.get_bind_group_layout(0),
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: uniform.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: sdf.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(map),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::Sampler(&self.biome_sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: output.as_entire_binding(),
                        },
                    ],
                })
            }
        };

        let compute_pipeline = match pipeline {
            PipelineId::Density => &self.density_pipeline,
            PipelineId::Placement => &self.placement_pipeline,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strata-dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("strata-compute-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(compute_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        self.queue.submit(Some(encoder.finish()));

        let id = self.next_id();
        resources.insert(
            id,
            Resource::Buffer {
                buffer: output,
                size: output_size,
                pending: Some(started),
            },
        );
        Ok(ResourceHandle(id))
    }

    fn read_back(&self, handle: ResourceHandle) -> Result<Vec<u8>, ComputeError> {
        let (source, size, pending) = {
            let mut resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
            match resources.get_mut(&handle.0) {
                Some(Resource::Buffer {
                    buffer,
                    size,
                    pending,
                }) => (buffer.clone(), *size, pending.take()),
                Some(_) => {
                    return Err(ComputeError::WrongResource {
                        handle,
                        expected: "buffer",
                    });
                }
                None => return Err(ComputeError::UnknownHandle(handle)),
            }
        };
        let padded = size.max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata-readback"),
            size: padded,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strata-readback"),
            });
        encoder.copy_buffer_to_buffer(&source, 0, &staging, 0, padded);
        let copy = self.queue.submit(Some(encoder.finish()));

        // The device lock is not held here, so other workers keep dispatching.
        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(copy),
            timeout: None,
        })?;

        match rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                return Err(ComputeError::MalformedOutput(
                    "read-back callback dropped".to_string(),
                ));
            }
        }

        let data = slice.get_mapped_range()[..size as usize].to_vec();
        staging.unmap();

        // The copy was queued after the dispatch, so both have finished.
        if let Some(submitted_at) = pending {
            self.record_time(submitted_at);
        }
        Ok(data)
    }

    fn release(&self, handle: ResourceHandle) {
        let removed = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);
        if let Some(Resource::Buffer { buffer, .. }) = removed {
            buffer.destroy();
        }
    }

    fn last_dispatch_time_ms(&self) -> f32 {
        f32::from_bits(self.last_dispatch_ms.load(Ordering::Relaxed))
    }
}
