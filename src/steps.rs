//! Step functions of the conversation graph
//!
//! Each step reads and writes only `ConversationState` plus the capability it
//! is handed. None of them persist anything; the executor owns that.

mod enrich;
mod extract;
mod predict;
mod validate;

pub use enrich::{enrichment_query, run_enrich, ADVICE_UNAVAILABLE};
pub use extract::{compose_reply, run_extract, ExtractOutcome, RESTATE_MESSAGE};
pub use predict::run_predict;
pub use validate::run_validate;
