//! Prompt generation for the coder and auditor agents.
//!
//! - [`templates`] - template files, `{{marker}}` substitution and built-in defaults
//! - [`builder`] - the text that goes into each marker
//!
//! The coder prompt is rebuilt on every iteration so the previous failure can
//! be fed back verbatim. The auditor prompt is built from the story and
//! the diff alone.

pub mod builder;
pub mod templates;

pub use builder::{build_audit_prompt, build_coder_prompt, CoderPromptInput, SectionBuilder};
pub use templates::{PromptTemplate, TemplateMarker, WriteStatus};
