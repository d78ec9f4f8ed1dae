//! Processing context for the filtering backend.
//!
//! The context is created once by the caller and handed to the stages that
//! need backend operations. It owns the worker pool and the backend; every
//! operation goes through a [`BackendLease`] that holds the backend
//! exclusively and releases it when dropped, including on early returns.


use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use common::{BitBuffer3, Buffer3};

use crate::error::ServiceError;
use crate::median_filter;
use crate::threshold::{self, ThresholdMethod};

/// Volume filtering operations needed by cell-body segmentation.
pub trait FilterBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Median filter each z-plane independently with a disk of `radius`.
    fn median_filter_slice_wise(
        &self,
        volume: &Buffer3<f32>,
        radius: f32,
    ) -> Result<Buffer3<f32>, ServiceError>;

    /// Global histogram threshold of the whole volume.
    fn auto_threshold(
        &self,
        volume: &Buffer3<f32>,
        method: ThresholdMethod,
    ) -> Result<BitBuffer3, ServiceError>;
}

/// Multi-threaded CPU implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl FilterBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn median_filter_slice_wise(
        &self,
        volume: &Buffer3<f32>,
        radius: f32,
    ) -> Result<Buffer3<f32>, ServiceError> {
        Ok(median_filter::median_filter_slice_wise(volume, radius))
    }

    fn auto_threshold(
        &self,
        volume: &Buffer3<f32>,
        method: ThresholdMethod,
    ) -> Result<BitBuffer3, ServiceError> {
        Ok(threshold::auto_threshold(volume, method))
    }
}

pub struct ProcessingContext {
    pool: rayon::ThreadPool,
    backend: Box<dyn FilterBackend>,
    lock: Mutex<()>,
    active_leases: AtomicUsize,
}

impl fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("threads", &self.pool.current_num_threads())
            .field("backend", &self.backend.name())
            .field("active_leases", &self.active_leases())
            .finish()
    }
}

impl ProcessingContext {
    /// CPU context with `threads` workers (all cores when `None`).
    pub fn new(threads: Option<usize>) -> Result<Self, ServiceError> {
        Self::with_backend(threads, Box::new(CpuBackend))
    }

    pub fn with_backend(
        threads: Option<usize>,
        backend: Box<dyn FilterBackend>,
    ) -> Result<Self, ServiceError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.unwrap_or(0))
            .thread_name(|i| format!("microglia-worker-{i}"))
            .build()
            .map_err(|e| ServiceError::Unavailable {
                backend: backend.name().to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(
            threads = pool.current_num_threads(),
            backend = backend.name(),
            "Processing context created"
        );
        Ok(Self {
            pool,
            backend,
            lock: Mutex::new(()),
            active_leases: AtomicUsize::new(0),
        })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` on the context's worker pool.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Acquire the backend for one operation.
    pub fn lease(&self) -> Result<BackendLease<'_>, ServiceError> {
        let guard = self.lock.lock().map_err(|_| ServiceError::Unavailable {
            backend: self.backend.name().to_string(),
            reason: "backend lock poisoned by an earlier panic".to_string(),
        })?;
        self.active_leases.fetch_add(1, Ordering::AcqRel);
        Ok(BackendLease {
            ctx: self,
            _guard: guard,
        })
    }

    /// Leases currently held. Zero whenever no operation is running.
    pub fn active_leases(&self) -> usize {
        self.active_leases.load(Ordering::Acquire)
    }

    pub fn median_filter_slice_wise(
        &self,
        volume: &Buffer3<f32>,
        radius: f32,
    ) -> Result<Buffer3<f32>, ServiceError> {
        self.lease()?.median_filter_slice_wise(volume, radius)
    }

    pub fn auto_threshold(
        &self,
        volume: &Buffer3<f32>,
        method: ThresholdMethod,
    ) -> Result<BitBuffer3, ServiceError> {
        self.lease()?.auto_threshold(volume, method)
    }
}

/// Exclusive use of the backend; released on drop.
pub struct BackendLease<'a> {
    ctx: &'a ProcessingContext,
    _guard: MutexGuard<'a, ()>,
}

impl BackendLease<'_> {
    pub fn median_filter_slice_wise(
        &self,
        volume: &Buffer3<f32>,
        radius: f32,
    ) -> Result<Buffer3<f32>, ServiceError> {
        let backend = &self.ctx.backend;
        self.ctx
            .pool
            .install(|| backend.median_filter_slice_wise(volume, radius))
    }

    pub fn auto_threshold(
        &self,
        volume: &Buffer3<f32>,
        method: ThresholdMethod,
    ) -> Result<BitBuffer3, ServiceError> {
        let backend = &self.ctx.backend;
        self.ctx
            .pool
            .install(|| backend.auto_threshold(volume, method))
    }
}

impl Drop for BackendLease<'_> {
    fn drop(&mut self) {
        self.ctx.active_leases.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for BackendLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendLease")
            .field("backend", &self.ctx.backend.name())
            .finish()
    }
}
