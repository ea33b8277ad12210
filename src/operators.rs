//! Built-in binary operators.
//!
//! Each operator is bound in the root scope as a send-only port. Sending
//! `[left, right, result]` to it computes `left op right` and sends the answer
//! on `result`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
}

impl BinOp {
    pub const ALL: [BinOp; 11] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Mod,
        BinOp::Lt,
        BinOp::Gt,
        BinOp::Lte,
        BinOp::Gte,
        BinOp::Eq,
        BinOp::Neq,
    ];

    /// The name the operator is bound under in the root scope
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Lte => "<=",
            BinOp::Gte => ">=",
            BinOp::Eq => "==",
            BinOp::Neq => "/=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<BinOp> {
        BinOp::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    /// Split a message sent to this operator into its operands and the result port.
    pub fn unpack(self, message: Value) -> Result<(Value, Value, Value), EvalError> {
        match message {
            Value::Tuple(items) => match <[Value; 3]>::try_from(items) {
                Ok([left, right, result]) => Ok((left, right, result)),
                Err(items) => Err(EvalError::OperatorArity {
                    op: self,
                    found: Value::Tuple(items),
                }),
            },
            found => Err(EvalError::OperatorArity { op: self, found }),
        }
    }

    pub fn apply(self, left: &Value, right: &Value) -> Result<Value, EvalError> {
        let (a, b) = match (self, left, right) {
            (BinOp::Eq, _, _) => return Ok(Value::Bool(left == right)),
            (BinOp::Neq, _, _) => return Ok(Value::Bool(left != right)),
            (_, Value::Num(a), Value::Num(b)) => (*a, *b),
            _ => {
                return Err(EvalError::OperandType {
                    op: self,
                    left: left.clone(),
                    right: right.clone(),
                })
            }
        };

        let checked = match self {
            BinOp::Add => a.checked_add(b).map(Value::Num),
            BinOp::Sub => a.checked_sub(b).map(Value::Num),
            BinOp::Mul => a.checked_mul(b).map(Value::Num),
            BinOp::Div => a.checked_div(b).map(Value::Num),
            BinOp::Mod => a.checked_rem(b).map(Value::Num),
            BinOp::Lt => Some(Value::Bool(a < b)),
            BinOp::Gt => Some(Value::Bool(a > b)),
            BinOp::Lte => Some(Value::Bool(a <= b)),
            BinOp::Gte => Some(Value::Bool(a >= b)),
            BinOp::Eq => Some(Value::Bool(a == b)),
            BinOp::Neq => Some(Value::Bool(a != b)),
        };

        checked.ok_or(EvalError::Arithmetic {
            op: self,
            left: a,
            right: b,
        })
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
