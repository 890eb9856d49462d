//! Domain vocabulary: stage contracts and the error taxonomy.

pub mod contract;
pub mod error;

pub use contract::{
    Critique, GuardrailVerdict, ResearchReport, ResearchRequest, SearchItem, SearchPlan,
    StageKind, SummarizeRequest, Summary, Topic,
};
pub use error::{ErrorKind, StageError, StageErrorKind, StageResult};
