//! Host implementation of [`ComputeBackend`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::backend::{BackendKind, ComputeBackend, ResourceHandle, check_dispatch};
use crate::error::ComputeError;
use crate::kernels::{BiomeMapView, density_field, placements};
use crate::params::{DispatchParams, PipelineId, encode_placements};

enum Resource {
    Buffer(Vec<u8>),
    BiomeMap {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

/// Runs every pipeline on the calling thread.
///
/// Dispatch does the work immediately, so `read_back` never waits.
pub struct CpuBackend {
    resources: Mutex<FxHashMap<u64, Resource>>,
    next_handle: AtomicU64,
    last_dispatch_ms: AtomicU32,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(FxHashMap::default()),
            next_handle: AtomicU64::new(1),
            last_dispatch_ms: AtomicU32::new(0f32.to_bits()),
        }
    }

    /// Number of live resources.
    pub fn resource_count(&self) -> usize {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn insert(&self, resource: Resource) -> ResourceHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, resource);
        ResourceHandle(id)
    }

    fn run(&self, params: &DispatchParams, inputs: &[ResourceHandle]) -> Result<Vec<u8>, ComputeError> {
        match params {
            DispatchParams::Density(p) => Ok(bytemuck::cast_slice(&density_field(p)).to_vec()),
            DispatchParams::Placement(p) => {
                let resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);

                let sdf_bytes = match resources.get(&inputs[0].0) {
                    Some(Resource::Buffer(bytes)) => bytes,
                    Some(_) => {
                        return Err(ComputeError::WrongResource {
                            handle: inputs[0],
                            expected: "buffer",
                        });
                    }
                    None => return Err(ComputeError::UnknownHandle(inputs[0])),
                };
                if sdf_bytes.len() < p.sdf_bytes() {
                    return Err(ComputeError::InputTooSmall {
                        expected: p.sdf_bytes(),
                        got: sdf_bytes.len(),
                    });
                }
                let sdf: Vec<f32> = bytemuck::pod_collect_to_vec(&sdf_bytes[..p.sdf_bytes()]);

                let map = match resources.get(&inputs[1].0) {
                    Some(Resource::BiomeMap {
                        width,
                        height,
                        pixels,
                    }) => BiomeMapView {
                        width: *width,
                        height: *height,
                        data: pixels,
                    },
                    Some(_) => {
                        return Err(ComputeError::WrongResource {
                            handle: inputs[1],
                            expected: "biome map",
                        });
                    }
                    None => return Err(ComputeError::UnknownHandle(inputs[1])),
                };

                let records = placements(p, &sdf, map);
                Ok(encode_placements(&records, p.capacity()))
            }
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }

    fn is_available(&self) -> bool {
        true
    }

    fn status(&self) -> String {
        "cpu (software kernels)".to_string()
    }

    fn upload_buffer(&self, bytes: &[u8]) -> Result<ResourceHandle, ComputeError> {
        Ok(self.insert(Resource::Buffer(bytes.to_vec())))
    }

    fn upload_biome_map(
        &self,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<ResourceHandle, ComputeError> {
        let expected = width as usize * height as usize;
        if pixels.len() < expected {
            return Err(ComputeError::InputTooSmall {
                expected,
                got: pixels.len(),
            });
        }
        Ok(self.insert(Resource::BiomeMap {
            width,
            height,
            pixels: pixels[..expected].to_vec(),
        }))
    }

    fn dispatch(
        &self,
        pipeline: PipelineId,
        params: &DispatchParams,
        inputs: &[ResourceHandle],
    ) -> Result<ResourceHandle, ComputeError> {
        check_dispatch(pipeline, params, inputs)?;
        let start = Instant::now();
        let output = self.run(params, inputs)?;
        let elapsed = start.elapsed().as_secs_f32() * 1000.0;
        self.last_dispatch_ms
            .store(elapsed.to_bits(), Ordering::Relaxed);
        Ok(self.insert(Resource::Buffer(output)))
    }

    fn read_back(&self, handle: ResourceHandle) -> Result<Vec<u8>, ComputeError> {
        let resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
        match resources.get(&handle.0) {
            Some(Resource::Buffer(bytes)) => Ok(bytes.clone()),
            Some(Resource::BiomeMap { pixels, .. }) => Ok(pixels.clone()),
            None => Err(ComputeError::UnknownHandle(handle)),
        }
    }

    fn release(&self, handle: ResourceHandle) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);
    }

    fn last_dispatch_time_ms(&self) -> f32 {
        f32::from_bits(self.last_dispatch_ms.load(Ordering::Relaxed))
    }
}
