//! Evaluation errors. Every one of them aborts the whole run.

use thiserror::Error;

use crate::ast::{Ident, Pattern};
use crate::env::ScopeId;
use crate::operators::BinOp;
use crate::runtime::{ChannelId, StuckChannel};
use crate::value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unbound variable: {name}")]
    UnboundVariable { name: Ident, scope: ScopeId },

    #[error("variable {name} already defined")]
    AlreadyBound { name: Ident, scope: ScopeId },

    #[error("variable {name} not defined")]
    NotBound { name: Ident, scope: ScopeId },

    #[error("pattern {pattern} does not match {value}")]
    PatternMismatch { pattern: Pattern, value: Value },

    #[error("if condition must be a Bool, got {} {found}", .found.type_name())]
    NonBooleanGuard { found: Value },

    #[error("operator {op} expects [left, right, result], got {found}")]
    OperatorArity { op: BinOp, found: Value },

    #[error("operator {op} expects numbers, got {} and {}", .left.type_name(), .right.type_name())]
    OperandType { op: BinOp, left: Value, right: Value },

    #[error("operator {op} cannot send its result to {found}")]
    ResultNotChannel { op: BinOp, found: Value },

    #[error("arithmetic fault: {left} {op} {right}")]
    Arithmetic { op: BinOp, left: i64, right: i64 },

    #[error("cannot {op} on {} {found}", .found.type_name())]
    NotAChannel { op: &'static str, found: Value },

    #[error("unknown channel {id}")]
    UnknownChannel { id: ChannelId },

    #[error("step limit of {limit} exceeded")]
    StepLimit { limit: u64 },

    #[error("deadlock: {} channel(s) still hold unmatched communications", .stuck.len())]
    Deadlock { stuck: Vec<StuckChannel> },
}
