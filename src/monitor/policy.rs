//! Promotion policies
//!
//! A policy decides which ring member becomes primary once the current one is
//! declared down. It is a pure function of [`FailoverState`]: it does not
//! probe candidates, so the promoted node's own health is untested at
//! promotion time.

/// Input to a promotion decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverState {
    /// Ring index of the primary being demoted
    pub current: usize,
    /// Number of nodes in the ring
    pub ring_len: usize,
}

pub trait PromotionPolicy: Send + Sync {
    /// Ring index of the next primary. Must be `< state.ring_len`.
    fn next_primary(&self, state: &FailoverState) -> usize;

    fn name(&self) -> &'static str;
}

/// Strict forward walk over the ring: `(current + 1) mod N`.
///
/// Roles (origin, intermediary, terminal) are ignored, and a recovered former
/// primary is only reached again by wrapping around.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl PromotionPolicy for RoundRobin {
    fn next_primary(&self, state: &FailoverState) -> usize {
        (state.current + 1) % state.ring_len.max(1)
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}
