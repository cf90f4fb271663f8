//! Batch accounting

use super::IngestOutcome;

/// Tally of one successfully ingested batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Transport events received
    pub events: usize,
    /// Messages decoded from those events
    pub messages: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Created { .. } => self.created += 1,
            IngestOutcome::Updated { .. } => self.updated += 1,
            IngestOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    /// Messages that reached a twin
    pub fn written(&self) -> usize {
        self.created + self.updated
    }
}
