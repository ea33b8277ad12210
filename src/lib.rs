//! Pike - a cooperative interpreter for a small pi-calculus with rendezvous channels

pub mod ast;
pub mod config;
pub mod cont;
pub mod env;
pub mod error;
pub mod eval;
pub mod json;
pub mod operators;
pub mod runtime;
pub mod test_support;
pub mod value;

pub use ast::{Definition, Expr, Ident, Pattern, Process};
pub use config::Config;
pub use cont::{trampoline, Bounce, Cont, Frame, Machine, Step};
pub use env::{Environment, ScopeId};
pub use error::EvalError;
pub use eval::{run, Interpreter, Quiescence, RunSummary};
pub use operators::BinOp;
pub use runtime::{Backlog, Channel, ChannelId, Port, Runtime, StuckChannel};
pub use value::Value;
