//! Scheduler counters and the snapshot handed to callers.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use strata_compute::BackendKind;

/// Assumed cost of one dispatch before any has been measured.
pub const DEFAULT_DISPATCH_ESTIMATE_MS: f32 = 2.0;

/// Point-in-time view of generation activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub queue_size: usize,
    pub in_flight: usize,
    pub cached_count: usize,
    pub average_gpu_time_ms: f32,
    pub total_generated: u64,
    pub dispatched_this_frame: u32,
    pub completed_this_frame: u32,
    pub failed: u64,
    pub current_frame_gpu_time_ms: f32,
    pub frame_budget_ms: f32,
    pub backend: &'static str,
}

/// Lock-free counters shared between the scheduler and readers.
#[derive(Debug)]
pub struct TelemetryCollector {
    backend: BackendKind,
    frame_budget_ms: f32,
    queue_size: AtomicUsize,
    in_flight: AtomicUsize,
    total_generated: AtomicU64,
    failed: AtomicU64,
    gpu_time_total_us: AtomicU64,
    gpu_samples: AtomicU64,
    dispatched_this_frame: AtomicU32,
    completed_this_frame: AtomicU32,
    frame_gpu_ms_bits: AtomicU32,
}

impl TelemetryCollector {
    pub fn new(backend: BackendKind, frame_budget_ms: f32) -> Self {
        Self {
            backend,
            frame_budget_ms,
            queue_size: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            total_generated: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            gpu_time_total_us: AtomicU64::new(0),
            gpu_samples: AtomicU64::new(0),
            dispatched_this_frame: AtomicU32::new(0),
            completed_this_frame: AtomicU32::new(0),
            frame_gpu_ms_bits: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    pub fn frame_budget_ms(&self) -> f32 {
        self.frame_budget_ms
    }

    /// Reset the per-frame counters.
    pub fn begin_frame(&self) {
        self.dispatched_this_frame.store(0, Ordering::Relaxed);
        self.completed_this_frame.store(0, Ordering::Relaxed);
        self.frame_gpu_ms_bits
            .store(0.0f32.to_bits(), Ordering::Relaxed);
    }

    /// Count one dispatch and add its estimated cost to this frame.
    pub fn record_dispatch(&self, estimate_ms: f32) {
        self.dispatched_this_frame.fetch_add(1, Ordering::Relaxed);
        let current = f32::from_bits(self.frame_gpu_ms_bits.load(Ordering::Relaxed));
        self.frame_gpu_ms_bits
            .store((current + estimate_ms).to_bits(), Ordering::Relaxed);
    }

    /// Count a finished region and fold its GPU time into the average.
    pub fn record_completion(&self, gpu_time_ms: f32) {
        self.total_generated.fetch_add(1, Ordering::Relaxed);
        self.completed_this_frame.fetch_add(1, Ordering::Relaxed);
        let us = (gpu_time_ms.max(0.0) * 1000.0) as u64;
        self.gpu_time_total_us.fetch_add(us, Ordering::Relaxed);
        self.gpu_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_size(&self, n: usize) {
        self.queue_size.store(n, Ordering::Relaxed);
    }

    pub fn set_in_flight(&self, n: usize) {
        self.in_flight.store(n, Ordering::Relaxed);
    }

    pub fn total_generated(&self) -> u64 {
        self.total_generated.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Mean GPU time per generated region, 0 before the first one.
    pub fn average_gpu_time_ms(&self) -> f32 {
        let samples = self.gpu_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        self.gpu_time_total_us.load(Ordering::Relaxed) as f32 / samples as f32 / 1000.0
    }

    /// Expected cost of the next dispatch.
    pub fn estimated_dispatch_ms(&self) -> f32 {
        if self.gpu_samples.load(Ordering::Relaxed) == 0 {
            DEFAULT_DISPATCH_ESTIMATE_MS
        } else {
            self.average_gpu_time_ms()
        }
    }

    /// Estimated GPU time committed this frame.
    pub fn current_frame_gpu_time_ms(&self) -> f32 {
        f32::from_bits(self.frame_gpu_ms_bits.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self, cached_count: usize) -> TelemetrySnapshot {
        TelemetrySnapshot {
            queue_size: self.queue_size.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            cached_count,
            average_gpu_time_ms: self.average_gpu_time_ms(),
            total_generated: self.total_generated(),
            dispatched_this_frame: self.dispatched_this_frame.load(Ordering::Relaxed),
            completed_this_frame: self.completed_this_frame.load(Ordering::Relaxed),
            failed: self.failed(),
            current_frame_gpu_time_ms: self.current_frame_gpu_time_ms(),
            frame_budget_ms: self.frame_budget_ms,
            backend: self.backend.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_defaults_until_measured() {
        let t = TelemetryCollector::new(BackendKind::Cpu, 8.0);
        assert_eq!(t.estimated_dispatch_ms(), DEFAULT_DISPATCH_ESTIMATE_MS);
        assert_eq!(t.average_gpu_time_ms(), 0.0);
        t.record_completion(1.0);
        t.record_completion(3.0);
        assert!((t.average_gpu_time_ms() - 2.0).abs() < 1e-3);
        assert!((t.estimated_dispatch_ms() - 2.0).abs() < 1e-3);
        assert_eq!(t.total_generated(), 2);
    }

    #[test]
    fn test_begin_frame_resets_frame_counters_only() {
        let t = TelemetryCollector::new(BackendKind::Gpu, 8.0);
        t.record_dispatch(2.0);
        t.record_dispatch(2.0);
        t.record_completion(0.5);
        t.record_failure();
        assert_eq!(t.current_frame_gpu_time_ms(), 4.0);

        t.begin_frame();
        let snap = t.snapshot(7);
        assert_eq!(snap.dispatched_this_frame, 0);
        assert_eq!(snap.completed_this_frame, 0);
        assert_eq!(snap.current_frame_gpu_time_ms, 0.0);
        assert_eq!(snap.total_generated, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.cached_count, 7);
        assert_eq!(snap.backend, "gpu");
        assert_eq!(snap.frame_budget_ms, 8.0);
    }
}
