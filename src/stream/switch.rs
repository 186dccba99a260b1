//! Switch-to-latest bookkeeping
//!
//! Every trigger starts a new generation. A result is only current if it was
//! produced for the latest generation and nothing has been accepted for that
//! generation yet. Stale work is not cancelled, its result is just refused.

/// Generation counter for switch-to-latest coalescing
#[derive(Debug, Default, Clone)]
pub struct SwitchLatest {
    generation: u64,
    pending: bool,
}

impl SwitchLatest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, superseding any pending one
    #[inline]
    pub fn trigger(&mut self) -> u64 {
        self.generation += 1;
        self.pending = true;
        self.generation
    }

    /// Accept the result for `generation` if it is still current
    #[inline]
    pub fn resolve(&mut self, generation: u64) -> bool {
        if self.pending && generation == self.generation {
            self.pending = false;
            true
        } else {
            false
        }
    }

    /// Waiting on the result of the latest trigger
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
