//! Region request scheduling.
//!
//! Requests are deduplicated, ordered by distance from a focus point and
//! dispatched a few per frame to a pool of generation workers. Finished
//! regions land in the region cache and are announced on the event channel.
//! Attempts that run past the stage timeout are abandoned and retried with a
//! shifted seed until `max_attempts` is reached.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use glam::Vec3;
use hashbrown::HashMap;
use strata_config::SchedulerConfig;

use crate::biome::BiomeId;
use crate::cache::RegionCache;
use crate::error::{SchedulerError, TerrainError};
use crate::events::RegionEvent;
use crate::generator::{GeneratedRegion, RegionGenerator};
use crate::region::{RegionBuffer, RegionKey};
use crate::telemetry::TelemetryCollector;

/// Shared cache of finished regions.
pub type RegionBufferCache = RegionCache<RegionKey, Arc<RegionBuffer>>;

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Already cached; a `Generated` event was sent right away.
    Cached,
    /// Added to the queue.
    Queued,
    /// Merged with a queued or in-flight request for the same key.
    Merged,
}

/// Per-tick summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: u32,
    pub completed: u32,
    pub retried: u32,
    pub failed: u32,
}

/// Queue entry. Greater = dispatched first.
#[derive(Debug, Clone, Copy)]
struct QueuedRequest {
    key: RegionKey,
    distance: f32,
    generation: u64,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

/// Queue bookkeeping for one key: its live heap generation and next attempt.
#[derive(Debug, Clone, Copy)]
struct QueueSlot {
    generation: u64,
    attempt: u32,
}

struct InFlight {
    ticket: u64,
    attempt: u32,
    dispatched_at: Instant,
    cancelled: Arc<AtomicBool>,
}

struct Job {
    key: RegionKey,
    attempt: u32,
    ticket: u64,
    cancelled: Arc<AtomicBool>,
}

struct Completion {
    key: RegionKey,
    ticket: u64,
    result: Result<GeneratedRegion, TerrainError>,
}

/// Accepts region requests and drives them to completion one frame at a time.
pub struct RegionRequestScheduler {
    config: SchedulerConfig,
    chunk_size: u32,
    generator: Arc<RegionGenerator>,
    cache: Arc<RegionBufferCache>,
    telemetry: Arc<TelemetryCollector>,
    events: Sender<RegionEvent>,

    heap: BinaryHeap<QueuedRequest>,
    queued: HashMap<RegionKey, QueueSlot>,
    in_flight: HashMap<RegionKey, InFlight>,
    next_generation: u64,
    next_ticket: u64,
    pending: usize,
    callbacks: u32,
    focus: Vec3,

    job_tx: Option<Sender<Job>>,
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
}

impl RegionRequestScheduler {
    /// Create the scheduler and start its workers.
    pub fn new(
        config: SchedulerConfig,
        generator: Arc<RegionGenerator>,
        cache: Arc<RegionBufferCache>,
        telemetry: Arc<TelemetryCollector>,
        events: Sender<RegionEvent>,
    ) -> Result<Self, SchedulerError> {
        let threads = config
            .worker_threads
            .unwrap_or_else(|| num_cpus::get().saturating_sub(2).max(1));
        let (done_tx, done_rx) = unbounded::<Completion>();

        let mut job_tx = None;
        let mut workers = Vec::with_capacity(threads);
        if threads > 0 {
            let capacity = (config.max_dispatch_per_frame as usize).max(1) * threads * 2;
            let (tx, rx) = bounded::<Job>(capacity);
            for index in 0..threads {
                let rx = rx.clone();
                let done = done_tx.clone();
                let generator = Arc::clone(&generator);
                let handle = std::thread::Builder::new()
                    .name(format!("strata-gen-{index}"))
                    .spawn(move || worker_loop(&rx, &done, &generator))
                    .map_err(SchedulerError::WorkerSpawn)?;
                workers.push(handle);
            }
            job_tx = Some(tx);
            tracing::info!("Region scheduler started with {threads} worker threads");
        } else {
            tracing::info!("Region scheduler generating inline");
        }

        Ok(Self {
            chunk_size: generator.config().chunk_size,
            config,
            generator,
            cache,
            telemetry,
            events,
            heap: BinaryHeap::new(),
            queued: HashMap::new(),
            in_flight: HashMap::new(),
            next_generation: 0,
            next_ticket: 0,
            pending: 0,
            callbacks: 0,
            focus: Vec3::ZERO,
            job_tx,
            done_tx,
            done_rx,
            workers,
        })
    }

    /// Request a region. Cached full-resolution regions are answered
    /// immediately and count as a callback of the current pass.
    pub fn request(&mut self, key: RegionKey) -> Result<RequestOutcome, SchedulerError> {
        if !key.is_addressable(self.chunk_size) {
            return Err(SchedulerError::UnaddressableRegion {
                key,
                chunk_size: self.chunk_size,
            });
        }
        if self.cache.contains(&key) {
            if key.detail_level == 0 {
                let biome_id = self.generator.sampler().biome_for_region(key);
                self.announce(key, biome_id)?;
            }
            return Ok(RequestOutcome::Cached);
        }
        if self.queued.contains_key(&key) || self.in_flight.contains_key(&key) {
            return Ok(RequestOutcome::Merged);
        }
        self.enqueue(key, 0);
        self.pending += 1;
        self.publish_counts();
        Ok(RequestOutcome::Queued)
    }

    /// Move the focus point; queued requests are re-ordered by distance to it.
    pub fn set_focus(&mut self, focus: Vec3) {
        self.focus = focus;
        let mut slots: Vec<(RegionKey, QueueSlot)> = self.queued.drain().collect();
        slots.sort_by_key(|(_, slot)| slot.generation);
        self.heap.clear();
        for (key, slot) in slots {
            self.enqueue(key, slot.attempt);
        }
    }

    pub fn focus(&self) -> Vec3 {
        self.focus
    }

    /// Run one frame: collect finished work, expire timed-out attempts and
    /// dispatch new work within the frame budget.
    pub fn tick(&mut self) -> Result<TickReport, SchedulerError> {
        self.telemetry.begin_frame();
        let mut report = TickReport::default();

        self.drain_completions(&mut report)?;
        self.expire_timeouts(&mut report);
        self.dispatch(&mut report);
        if self.job_tx.is_none() {
            self.drain_completions(&mut report)?;
        }

        self.publish_counts();
        self.callbacks = 0;
        Ok(report)
    }

    /// Drop queued and in-flight work, e.g. on world reload.
    pub fn reset(&mut self) {
        self.heap.clear();
        self.queued.clear();
        for (_, flight) in self.in_flight.drain() {
            flight.cancelled.store(true, Ordering::Relaxed);
        }
        while self.done_rx.try_recv().is_ok() {}
        self.pending = 0;
        self.callbacks = 0;
        self.publish_counts();
    }

    /// Requests not yet answered.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn queue_len(&self) -> usize {
        self.queued.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_pending(&self, key: &RegionKey) -> bool {
        self.queued.contains_key(key) || self.in_flight.contains_key(key)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn enqueue(&mut self, key: RegionKey, attempt: u32) {
        let generation = self.next_generation;
        self.next_generation += 1;
        let distance = key.center(self.chunk_size).distance(self.focus);
        self.queued.insert(
            key,
            QueueSlot {
                generation,
                attempt,
            },
        );
        self.heap.push(QueuedRequest {
            key,
            distance,
            generation,
        });
    }

    fn pop_queued(&mut self) -> Option<(RegionKey, QueueSlot)> {
        while let Some(entry) = self.heap.pop() {
            if let Some(slot) = self.queued.get(&entry.key)
                && slot.generation == entry.generation
            {
                let slot = *slot;
                self.queued.remove(&entry.key);
                return Some((entry.key, slot));
            }
        }
        None
    }

    fn dispatch(&mut self, report: &mut TickReport) {
        let budget = self.config.frame_budget_ms;
        let estimate = self.telemetry.estimated_dispatch_ms();
        while report.dispatched < self.config.max_dispatch_per_frame
            && self.telemetry.current_frame_gpu_time_ms() < budget
        {
            let Some((key, slot)) = self.pop_queued() else {
                break;
            };
            let ticket = self.next_ticket;
            self.next_ticket += 1;
            let cancelled = Arc::new(AtomicBool::new(false));
            let job = Job {
                key,
                attempt: slot.attempt,
                ticket,
                cancelled: Arc::clone(&cancelled),
            };

            let dispatched_at = Instant::now();
            let sent = match &self.job_tx {
                Some(tx) => tx.try_send(job).map_err(TrySendError::into_inner),
                None => {
                    let result = self.generator.generate(key, slot.attempt);
                    let _ = self.done_tx.send(Completion {
                        key,
                        ticket,
                        result,
                    });
                    Ok(())
                }
            };
            if let Err(job) = sent {
                // Workers are saturated; try again next frame.
                self.enqueue(job.key, job.attempt);
                break;
            }

            self.in_flight.insert(
                key,
                InFlight {
                    ticket,
                    attempt: slot.attempt,
                    dispatched_at,
                    cancelled,
                },
            );
            self.telemetry.record_dispatch(estimate);
            report.dispatched += 1;
            tracing::debug!("Dispatched region {key} attempt {}", slot.attempt);
        }
    }

    fn drain_completions(&mut self, report: &mut TickReport) -> Result<(), SchedulerError> {
        while let Ok(completion) = self.done_rx.try_recv() {
            self.complete(completion, report)?;
        }
        Ok(())
    }

    fn complete(&mut self, completion: Completion, report: &mut TickReport) -> Result<(), SchedulerError> {
        let Completion {
            key,
            ticket,
            result,
        } = completion;
        match self.in_flight.get(&key) {
            Some(flight) if flight.ticket == ticket => {}
            _ => {
                tracing::debug!("Dropping stale completion for region {key}");
                return Ok(());
            }
        }
        let Some(flight) = self.in_flight.remove(&key) else {
            return Ok(());
        };

        let timeout = Duration::from_millis(self.config.stage_timeout_ms);
        if flight.dispatched_at.elapsed() > timeout {
            flight.cancelled.store(true, Ordering::Relaxed);
            self.retry_or_fail(key, flight.attempt, self.timeout_error(key), report);
            return Ok(());
        }

        match result {
            Ok(generated) => {
                self.cache.put(key, Arc::new(generated.buffer));
                self.telemetry.record_completion(generated.gpu_time_ms);
                self.pending = self.pending.saturating_sub(1);
                report.completed += 1;
                if key.detail_level == 0 {
                    self.announce(key, generated.biome_id)
                } else {
                    Ok(())
                }
            }
            Err(e) => {
                tracing::warn!("Region {key} attempt {} failed: {e}", flight.attempt);
                self.retry_or_fail(key, flight.attempt, e, report);
                Ok(())
            }
        }
    }

    fn expire_timeouts(&mut self, report: &mut TickReport) {
        let timeout = Duration::from_millis(self.config.stage_timeout_ms);
        let expired: Vec<RegionKey> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.dispatched_at.elapsed() > timeout)
            .map(|(k, _)| *k)
            .collect();
        for key in expired {
            if let Some(flight) = self.in_flight.remove(&key) {
                flight.cancelled.store(true, Ordering::Relaxed);
                tracing::warn!(
                    "Region {key} attempt {} exceeded {} ms",
                    flight.attempt,
                    self.config.stage_timeout_ms
                );
                let error = self.timeout_error(key);
                self.retry_or_fail(key, flight.attempt, error, report);
            }
        }
    }

    fn timeout_error(&self, key: RegionKey) -> TerrainError {
        TerrainError::StageTimeout {
            key,
            timeout_ms: self.config.stage_timeout_ms,
        }
    }

    fn retry_or_fail(&mut self, key: RegionKey, attempt: u32, error: TerrainError, report: &mut TickReport) {
        let attempts = attempt + 1;
        if attempts < self.config.max_attempts {
            self.enqueue(key, attempts);
            report.retried += 1;
            return;
        }
        tracing::error!("Region {key} failed after {attempts} attempts: {error}");
        self.telemetry.record_failure();
        self.pending = self.pending.saturating_sub(1);
        report.failed += 1;
        self.emit(RegionEvent::Failed {
            key,
            error: TerrainError::RetriesExhausted {
                key,
                attempts,
                last_error: error.to_string(),
            },
        });
    }

    /// Send `Generated` for a full-resolution region and count the callback.
    fn announce(&mut self, key: RegionKey, biome_id: BiomeId) -> Result<(), SchedulerError> {
        self.emit(RegionEvent::Generated {
            origin: key.origin,
            detail_level: key.detail_level,
            biome_id,
        });
        self.count_callback()
    }

    fn count_callback(&mut self) -> Result<(), SchedulerError> {
        self.callbacks += 1;
        if self.callbacks <= self.config.callback_ceiling {
            return Ok(());
        }
        let callbacks = self.callbacks;
        tracing::error!(
            "Aborting generation pass after {callbacks} callbacks (ceiling {})",
            self.config.callback_ceiling
        );
        self.reset();
        self.emit(RegionEvent::PassAborted { callbacks });
        Err(SchedulerError::RunawayCallbacks {
            callbacks,
            ceiling: self.config.callback_ceiling,
        })
    }

    fn emit(&self, event: RegionEvent) {
        // The receiver lives as long as the world; a send can only fail during teardown.
        let _ = self.events.send(event);
    }

    fn publish_counts(&self) {
        self.telemetry.set_queue_size(self.queued.len());
        self.telemetry.set_in_flight(self.in_flight.len());
    }
}

impl Drop for RegionRequestScheduler {
    fn drop(&mut self) {
        for flight in self.in_flight.values() {
            flight.cancelled.store(true, Ordering::Relaxed);
        }
        self.job_tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(jobs: &Receiver<Job>, done: &Sender<Completion>, generator: &RegionGenerator) {
    while let Ok(job) = jobs.recv() {
        if job.cancelled.load(Ordering::Relaxed) {
            continue;
        }
        let result = generator.generate(job.key, job.attempt);
        if job.cancelled.load(Ordering::Relaxed) {
            continue;
        }
        if done
            .send(Completion {
                key: job.key,
                ticket: job.ticket,
                result,
            })
            .is_err()
        {
            break;
        }
    }
}
