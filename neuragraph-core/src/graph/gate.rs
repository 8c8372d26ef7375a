use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts gradient contributions arriving at a node and opens exactly once.
///
/// Every consumer calls [`ContributionGate::arrive`] after it has accumulated its
/// gradient; only the call that completes the required count gets `true`, so
/// only that caller schedules the node. Arrivals past the required count are
/// ignored.
#[derive(Debug, Default)]
pub struct ContributionGate {
    required: AtomicUsize,
    arrived: AtomicUsize,
}

impl ContributionGate {
    pub fn new(required: usize) -> Self {
        ContributionGate {
            required: AtomicUsize::new(required),
            arrived: AtomicUsize::new(0),
        }
    }

    /// Re-arms the gate for a new pass.
    pub fn reset(&self, required: usize) {
        self.required.store(required, Ordering::Release);
        self.arrived.store(0, Ordering::Release);
    }

    /// Records one arrival. Returns `true` for the arrival that completes the count.
    pub fn arrive(&self) -> bool {
        let previous = self.arrived.fetch_add(1, Ordering::AcqRel);
        previous + 1 == self.required.load(Ordering::Acquire)
    }

    pub fn required(&self) -> usize {
        self.required.load(Ordering::Acquire)
    }

    pub fn arrived(&self) -> usize {
        self.arrived.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.arrived() >= self.required()
    }
}
