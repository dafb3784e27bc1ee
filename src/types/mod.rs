//! Type definitions for the fraud triage pipeline

pub mod outcome;
pub mod transaction;

pub use outcome::{Disposition, TriageOutcome};
pub use transaction::{PaymentMethod, Transaction};
