pub mod block;
pub mod outcome;
pub mod stimulus;

pub use block::{Block, TrialSpec};
pub use outcome::{round2, BlockSummary, LogRow, TrialOutcome};
pub use stimulus::{Modality, StimulusKind};
