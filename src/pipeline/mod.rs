pub mod compiler;
pub mod extraction;
pub mod intent;
pub mod ir;
pub mod processor;
pub mod references;
pub mod router;
pub mod selection;
pub mod synthesis;

pub use processor::{Pipeline, PipelineError};
pub use router::{AbortReason, AnswerResult};
