//! Condition trees, the fluent request builder and the executor that
//! runs requests against a [`crate::Schema`].

pub mod condition;
pub mod executor;
pub mod operator;
pub mod request;

pub use condition::{Condition, ConditionBuilder, Connector};
pub use executor::Query;
pub use operator::{Operand, Operator};
pub use request::{Direction, JoinKind, Request, UnionKind};
