pub mod clock;

pub use clock::{Clock, FixedClock, SystemClock};

/// Upstream adapter producing one cycle's inputs at a time.
///
/// `None` ends the stream. An `Err` item is a cycle that could not be
/// adapted; callers count it and keep pulling.
pub trait CycleSource {
    type Cycle;

    fn next_cycle(
        &mut self,
    ) -> Option<Result<Self::Cycle, Box<dyn std::error::Error + Send + Sync>>>;
}

/// Downstream consumer of decisions, e.g. a report writer.
pub trait DecisionSink<C, D> {
    fn accept(
        &mut self,
        cycle: &C,
        decision: &D,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
