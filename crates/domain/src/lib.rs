//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod case;
mod retention;

pub use case::{Case, Document};
pub use retention::{
    ANONYMIZED_ACTOR, REDACTED_DETAILS, RetentionLogAction, RetentionPolicy, RetentionTrigger,
};
