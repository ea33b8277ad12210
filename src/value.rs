//! Runtime values

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::write_seq;
use crate::operators::BinOp;
use crate::runtime::ChannelId;

/// Values that flow over channels and live in scopes
///
/// Equality is structural through tuples; channels compare by identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Num(i64),
    Bool(bool),
    Channel(ChannelId),
    /// A pre-bound operator port such as `+`
    Builtin(BinOp),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "Number",
            Value::Bool(_) => "Bool",
            Value::Channel(_) => "Channel",
            Value::Builtin(_) => "Builtin",
            Value::Tuple(_) => "Tuple",
        }
    }

    /// Whether a send on this value can be attempted
    pub fn can_send(&self) -> bool {
        matches!(self, Value::Channel(_) | Value::Builtin(_))
    }

    pub fn as_num(&self) -> Option<i64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<ChannelId> {
        match self {
            Value::Channel(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Num(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ChannelId> for Value {
    fn from(id: ChannelId) -> Self {
        Value::Channel(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Channel(id) => write!(f, "{}", id),
            Value::Builtin(op) => write!(f, "({})", op),
            Value::Tuple(items) => write_seq(f, items),
        }
    }
}
