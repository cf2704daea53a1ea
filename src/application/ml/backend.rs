//! Process-wide accounting of numeric buffers and the per-request scope that owns them.
//!
//! The backend is initialized once at process start. Every tensor, parameter block, gradient
//! buffer and optimizer state allocated for a request is registered through its
//! [`RequestScope`] and released when the owning value drops, whichever way the request ends.

use crate::domain::errors::PipelineError;
use crate::domain::ml::RequestState;
use ndarray::{Array, Dimension};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

static GLOBAL_BACKEND: OnceLock<Arc<NumericBackend>> = OnceLock::new();

const ELEMENT_BYTES: usize = std::mem::size_of::<f64>();

#[derive(Debug, Default)]
pub struct NumericBackend {
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    total_leases: AtomicU64,
}

impl NumericBackend {
    /// Initializes the process-wide backend. Later calls return the same instance.
    pub fn init() -> Arc<Self> {
        GLOBAL_BACKEND
            .get_or_init(|| {
                info!("Numeric backend initialized (f64, CPU)");
                Arc::new(Self::default())
            })
            .clone()
    }

    /// The process-wide backend, if [`NumericBackend::init`] has run.
    pub fn global() -> Result<Arc<Self>, PipelineError> {
        GLOBAL_BACKEND
            .get()
            .cloned()
            .ok_or(PipelineError::BackendUninitialized)
    }

    /// An unregistered backend with its own counters (tests, embedded use).
    pub fn standalone() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::SeqCst)
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes.load(Ordering::SeqCst)
    }

    pub fn total_leases(&self) -> u64 {
        self.total_leases.load(Ordering::SeqCst)
    }

    pub fn open_scope(self: &Arc<Self>, request_id: Uuid) -> RequestScope {
        debug!("Request {}: scope opened", request_id);
        RequestScope {
            id: request_id,
            state: RequestState::Idle,
            backend: Arc::clone(self),
            ledger: Arc::new(ScopeLedger::default()),
        }
    }

    fn acquire(&self, bytes: usize) {
        self.live_buffers.fetch_add(1, Ordering::SeqCst);
        let now = self.live_bytes.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak_bytes.fetch_max(now, Ordering::SeqCst);
        self.total_leases.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, bytes: usize) {
        self.live_buffers.fetch_sub(1, Ordering::SeqCst);
        self.live_bytes.fetch_sub(bytes, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct ScopeLedger {
    live: AtomicUsize,
    bytes: AtomicUsize,
}

/// Accounting token for one live buffer. Dropping it releases the buffer.
#[derive(Debug)]
pub struct BufferLease {
    label: &'static str,
    bytes: usize,
    backend: Arc<NumericBackend>,
    ledger: Arc<ScopeLedger>,
}

impl BufferLease {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        self.backend.release(self.bytes);
        self.ledger.live.fetch_sub(1, Ordering::SeqCst);
        self.ledger.bytes.fetch_sub(self.bytes, Ordering::SeqCst);
    }
}

/// Number of `f64` elements a value keeps alive.
pub trait Footprint {
    fn elements(&self) -> usize;
}

impl<D: Dimension> Footprint for Array<f64, D> {
    fn elements(&self) -> usize {
        self.len()
    }
}

/// A value whose numeric storage is accounted to a request scope.
#[derive(Debug)]
pub struct Leased<T> {
    value: T,
    lease: BufferLease,
}

impl<T> Leased<T> {
    pub fn lease(&self) -> &BufferLease {
        &self.lease
    }
}

impl<T> Deref for Leased<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Leased<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Lifetime of one prediction request: its state machine and the buffers it owns.
#[derive(Debug)]
pub struct RequestScope {
    id: Uuid,
    state: RequestState,
    backend: Arc<NumericBackend>,
    ledger: Arc<ScopeLedger>,
}

impl RequestScope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Buffers leased through this scope that are still alive.
    pub fn outstanding(&self) -> usize {
        self.ledger.live.load(Ordering::SeqCst)
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.ledger.bytes.load(Ordering::SeqCst)
    }

    pub fn advance(&mut self, next: RequestState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Request {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Moves a live request to `Failed`. Terminal states are left untouched.
    pub fn fail(&mut self, reason: &PipelineError) {
        if self.state.is_terminal() {
            return;
        }
        debug!(
            "Request {}: {} -> Failed ({})",
            self.id, self.state, reason
        );
        self.state = RequestState::Failed;
    }

    pub fn lease(&self, label: &'static str, elements: usize) -> BufferLease {
        let bytes = elements * ELEMENT_BYTES;
        self.backend.acquire(bytes);
        self.ledger.live.fetch_add(1, Ordering::SeqCst);
        self.ledger.bytes.fetch_add(bytes, Ordering::SeqCst);
        BufferLease {
            label,
            bytes,
            backend: Arc::clone(&self.backend),
            ledger: Arc::clone(&self.ledger),
        }
    }

    pub fn track<T: Footprint>(&self, label: &'static str, value: T) -> Leased<T> {
        let lease = self.lease(label, value.elements());
        Leased { value, lease }
    }

    /// Ends the request and reports its final state.
    pub fn close(self) -> RequestState {
        self.state
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(
                "Request {}: scope dropped in state {}, marking Failed",
                self.id, self.state
            );
            self.state = RequestState::Failed;
        }

        let outstanding = self.outstanding();
        if outstanding > 0 {
            warn!(
                "Request {}: {} buffers ({} bytes) still alive after the request ended",
                self.id,
                outstanding,
                self.outstanding_bytes()
            );
        } else {
            debug!("Request {}: scope closed in state {}", self.id, self.state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_leases_release_on_drop() {
        let backend = NumericBackend::standalone();
        let scope = backend.open_scope(Uuid::new_v4());

        let tensor = scope.track("inputs", Array2::<f64>::zeros((6, 5)));
        let lease = scope.lease("gradients", 10);

        assert_eq!(backend.live_buffers(), 2);
        assert_eq!(backend.live_bytes(), (30 + 10) * 8);
        assert_eq!(scope.outstanding(), 2);
        assert_eq!(tensor.lease().label(), "inputs");
        assert_eq!(tensor.dim(), (6, 5));

        drop(tensor);
        drop(lease);

        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_bytes(), 0);
        assert_eq!(backend.peak_bytes(), 320);
        assert_eq!(backend.total_leases(), 2);
        assert_eq!(scope.outstanding(), 0);
    }

    #[test]
    fn test_scope_state_machine() {
        let backend = NumericBackend::standalone();
        let mut scope = backend.open_scope(Uuid::new_v4());

        assert_eq!(scope.state(), RequestState::Idle);
        scope.advance(RequestState::Normalizing).unwrap();

        let err = scope.advance(RequestState::Predicting).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidTransition {
                from: RequestState::Normalizing,
                to: RequestState::Predicting
            }
        );

        scope.fail(&PipelineError::SessionBusy);
        assert_eq!(scope.state(), RequestState::Failed);
        assert!(scope.advance(RequestState::Windowing).is_err());
        assert_eq!(scope.close(), RequestState::Failed);
    }

    #[test]
    fn test_fail_does_not_override_done() {
        let backend = NumericBackend::standalone();
        let mut scope = backend.open_scope(Uuid::new_v4());
        for next in [
            RequestState::Normalizing,
            RequestState::Windowing,
            RequestState::Training,
            RequestState::Predicting,
            RequestState::Done,
        ] {
            scope.advance(next).unwrap();
        }

        scope.fail(&PipelineError::SessionBusy);
        assert_eq!(scope.close(), RequestState::Done);
    }

    #[test]
    fn test_lease_outliving_scope_still_releases() {
        let backend = NumericBackend::standalone();
        let scope = backend.open_scope(Uuid::new_v4());
        let lease = scope.lease("orphan", 4);
        drop(scope);

        assert_eq!(backend.live_buffers(), 1);
        drop(lease);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_global_backend_is_shared() {
        let first = NumericBackend::init();
        let second = NumericBackend::global().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
