use super::TransportRequest;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Pool of reusable requests.
///
/// `acquire` hands out a guard; dropping the guard resets the request and
/// returns it to the pool, so every exit path releases it.
#[derive(Debug)]
pub struct RequestPool {
    free: Mutex<Vec<TransportRequest>>,
    capacity: usize,
    outstanding: AtomicUsize,
}

impl RequestPool {
    /// Create a pool that keeps at most `capacity` idle requests
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Take a request from the pool, allocating one if the pool is empty
    pub fn acquire(&self) -> PooledRequest<'_> {
        let request = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        self.outstanding.fetch_add(1, Ordering::AcqRel);

        PooledRequest {
            pool: self,
            request,
        }
    }

    /// Requests currently acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Idle requests ready for reuse
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, mut request: TransportRequest) {
        request.reset();
        self.outstanding.fetch_sub(1, Ordering::AcqRel);

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(request);
        } else {
            trace!(capacity = self.capacity, "Request pool full, dropping request");
        }
    }
}

impl Default for RequestPool {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A request on loan from a [`RequestPool`]
#[derive(Debug)]
pub struct PooledRequest<'a> {
    pool: &'a RequestPool,
    request: TransportRequest,
}

impl Deref for PooledRequest<'_> {
    type Target = TransportRequest;

    fn deref(&self) -> &TransportRequest {
        &self.request
    }
}

impl DerefMut for PooledRequest<'_> {
    fn deref_mut(&mut self) -> &mut TransportRequest {
        &mut self.request
    }
}

impl Drop for PooledRequest<'_> {
    fn drop(&mut self) {
        let request = std::mem::take(&mut self.request);
        self.pool.release(request);
    }
}
