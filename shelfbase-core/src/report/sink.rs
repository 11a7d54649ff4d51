// shelfbase-core/src/report/sink.rs
// Destinations for report outcomes

use super::ReportOutcome;

/// Receives each outcome as soon as its report finishes
pub trait ReportSink {
    fn emit(&mut self, outcome: &ReportOutcome);
}

/// Keeps every outcome in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub outcomes: Vec<ReportOutcome>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.name.as_str()).collect()
    }
}

impl ReportSink for CollectingSink {
    fn emit(&mut self, outcome: &ReportOutcome) {
        self.outcomes.push(outcome.clone());
    }
}

impl<F: FnMut(&ReportOutcome)> ReportSink for F {
    fn emit(&mut self, outcome: &ReportOutcome) {
        self(outcome)
    }
}
