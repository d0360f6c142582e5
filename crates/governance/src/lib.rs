//! Message model, constitutional validation, and role-separation
//! enforcement for the Enhanced Agent Bus.
//!
//! This crate has no async runtime dependency and no knowledge of the
//! bus's queueing or dispatch machinery; it is the stable contract
//! that `agent-bus-core` and `agent-bus-policy` build on.

pub mod decision;
pub mod error;
pub mod message;
pub mod role;
pub mod validation;

pub use decision::{Decision, DecisionLog};
pub use error::{ConfigError, ErrorKind};
pub use message::{Message, MessagePriority, MessageStatus, MessageType, RoutingContext, CONSTITUTIONAL_HASH};
pub use role::{Action, EnforcementMode, Role, RoleCheckOutcome, RoleEnforcer};
pub use validation::{
    hashes_match, sanitize_hash, CompositeValidationStrategy, ConstitutionalHashStrategy,
    StructuralValidationStrategy, ValidationResult, ValidationStrategy,
};
