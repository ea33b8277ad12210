//! Defunctionalized continuations and the trampoline that drives them.
//!
//! A [`Step`] is a unit of work the scheduler can run later. Anything that
//! would have been a closure ("when the channel value is ready, evaluate the
//! payload") is a [`Frame`] on an explicit [`Cont`] stack instead, so pending
//! work is plain data and never occupies the host call stack.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::{Expr, Pattern, Process};
use crate::env::ScopeId;
use crate::value::Value;

/// A runnable unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Step {
    /// Execute one process node in a scope
    Run { process: Rc<Process>, scope: ScopeId },
    /// Resolve an expression and hand the value to `cont`
    Eval { expr: Expr, scope: ScopeId, cont: Cont },
    /// Hand an already computed value to `cont`
    Resume { cont: Cont, value: Value },
}

impl Step {
    pub fn run(process: Rc<Process>, scope: ScopeId) -> Self {
        Step::Run { process, scope }
    }

    pub fn resume(cont: Cont, value: Value) -> Self {
        Step::Resume { cont, value }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Step::Run { process, .. } => process.tag(),
            Step::Eval { .. } => "eval",
            Step::Resume { .. } => "resume",
        }
    }
}

/// What to do with a value once it is available
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    /// Collecting tuple elements left to right. `remaining` is stored reversed.
    Tuple {
        remaining: Vec<Expr>,
        done: Vec<Value>,
        scope: ScopeId,
    },
    /// Channel of a send resolved, resolve the payload next
    SendChannel {
        value: Expr,
        next: Rc<Process>,
        scope: ScopeId,
    },
    /// Payload resolved, perform the send
    SendValue {
        channel: Value,
        next: Rc<Process>,
        scope: ScopeId,
    },
    /// Channel of a receive resolved, start listening
    ReceiveChannel {
        pattern: Pattern,
        next: Rc<Process>,
        scope: ScopeId,
        relisten: Option<Rc<Process>>,
    },
    /// A message arrived: destructure it and continue. With `relisten`,
    /// the replicated receive node is scheduled again in `scope`.
    Bind {
        pattern: Pattern,
        next: Rc<Process>,
        scope: ScopeId,
        relisten: Option<Rc<Process>>,
    },
    /// Guard of an `if` resolved
    Branch {
        when_true: Rc<Process>,
        when_false: Rc<Process>,
        scope: ScopeId,
    },
}

/// The continuation stack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cont {
    frames: Vec<Frame>,
}

impl Cont {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn with(frame: Frame) -> Self {
        Self {
            frames: vec![frame],
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether this continuation is the listener of a replicated receive
    pub fn is_replicated(&self) -> bool {
        matches!(
            self.frames.last(),
            Some(Frame::Bind {
                relisten: Some(_),
                ..
            })
        )
    }
}

/// Result of invoking one deferred call
#[derive(Debug)]
pub enum Bounce<C, T> {
    /// More work: invoke this call next
    Call(C),
    /// Terminal value
    Done(T),
}

impl<C, T> Bounce<C, T> {
    pub fn schedule(call: C) -> Self {
        Bounce::Call(call)
    }

    pub fn complete(value: T) -> Self {
        Bounce::Done(value)
    }
}

/// Something that can invoke deferred calls
pub trait Machine {
    type Call;
    type Output;
    type Error;

    fn invoke(&mut self, call: Self::Call) -> Result<Bounce<Self::Call, Self::Output>, Self::Error>;
}

/// Invoke `call` and every call it bounces to until one completes.
/// Errors propagate immediately.
pub fn trampoline<M: Machine>(machine: &mut M, call: M::Call) -> Result<M::Output, M::Error> {
    let mut current = Bounce::Call(call);
    loop {
        match current {
            Bounce::Done(value) => return Ok(value),
            Bounce::Call(call) => current = machine.invoke(call)?,
        }
    }
}
