//! Script-level validation
//!
//! Classification of locking scripts into lease templates and the ownership
//! rules deciding who may unlock each template.

pub mod script_pattern;
pub mod spend_authorizer;

pub use script_pattern::{classify, classify_bytes, ClassifiedScript, ScriptPattern};
pub use spend_authorizer::{authorize_spend, SpendPurpose};
