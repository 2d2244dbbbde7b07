//! Conversation data model and routing
//!
//! Steps communicate only through `ConversationState`; the router decides
//! which step runs next.

pub mod metrics;
pub mod router;
pub mod state;


pub use metrics::{FeatureVector, MetricField, Metrics, RangeBound, RangeViolation, ValidationRanges};
pub use router::{route_after_extract, route_after_validate, AfterExtract, AfterValidate};
pub use state::{
    ConversationState, Phase, Prediction, RiskBand, RiskLabel, Role, StepName, Turn,
    ValidationStatus,
};
