//! Prompt assembly under a token budget.
//!
//! | Segment | Source | Trim Strategy |
//! |---------|--------|---------------|
//! | System prompt | Persona, profile, memories, protocols | Never trimmed |
//! | Current turn | Incoming message | Never trimmed |
//! | History | Recent messages | Oldest dropped first, whole messages only |

pub mod assembler;
pub mod budget;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyError, AssemblyInput, AssemblyMetadata, ContextAssembler,
};
pub use budget::{HistoryWindow, TokenBudget, select_history};
pub use token::TokenEstimator;
