//! In-memory source and sink for replays driven from tests or other code.

use std::collections::VecDeque;

use autoisf_traits::{CycleSource, DecisionSink};

use crate::decision::Decision;
use crate::replay::ReplayCase;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Yields prepared cycles in order.
#[derive(Debug, Default)]
pub struct VecSource {
    items: VecDeque<Result<ReplayCase, BoxError>>,
}

impl VecSource {
    pub fn new(items: Vec<Result<ReplayCase, BoxError>>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl CycleSource for VecSource {
    type Cycle = ReplayCase;

    fn next_cycle(&mut self) -> Option<Result<ReplayCase, BoxError>> {
        self.items.pop_front()
    }
}

/// Keeps every decision it is handed.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub decisions: Vec<(Option<String>, Decision)>,
}

impl DecisionSink<ReplayCase, Decision> for CollectSink {
    fn accept(&mut self, cycle: &ReplayCase, decision: &Decision) -> Result<(), BoxError> {
        self.decisions.push((cycle.label.clone(), decision.clone()));
        Ok(())
    }
}
