//! The three phases of one iteration: coder, validator, auditor.
//!
//! Each phase turns every problem into a value. Nothing here returns `Err`;
//! a failure is text that the loop feeds into the next coder prompt.

pub mod auditor;
pub mod coder;
pub mod validator;

pub use auditor::{parse_verdict, AuditVerdict, AuditorPhase};
pub use coder::{CoderOutcome, CoderPhase};
pub use validator::ShellValidator;
