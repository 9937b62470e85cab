use serde::{Deserialize, Serialize};

/// Ticket handed out when a request starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

/// Monotonic counter used to discard out-of-order responses.
///
/// Only the most recently issued ticket is current; a response carrying
/// any older ticket must be dropped on arrival.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    latest: u64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new ticket, superseding every earlier one
    pub fn advance(&mut self) -> Generation {
        self.latest += 1;
        Generation(self.latest)
    }

    pub fn is_current(&self, ticket: Generation) -> bool {
        ticket.0 == self.latest
    }
}
