//! Test doubles for driving processes from the outside.
//!
//! - [`Sensor`] records every value sent to it
//! - [`Injector`] answers every receive with the next integer
//! - [`Probe`] wires both into an interpreter the way most tests want it:
//!   `x` is a sensor, `z` an injector, and `y` is bound to `2`

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::ast::Process;
use crate::config::Config;
use crate::cont::{Cont, Step};
use crate::error::EvalError;
use crate::eval::{Interpreter, RunSummary};
use crate::runtime::{Backlog, Port};
use crate::value::Value;

/// Shared log of values a sensor has seen
pub type Recording = Rc<RefCell<Vec<Value>>>;

/// A send-only port that records values
#[derive(Debug)]
pub struct Sensor {
    name: String,
    values: Recording,
    /// How many senders get resumed; the rest stay blocked
    resume_limit: Option<usize>,
    resumed: usize,
    blocked: Vec<Step>,
    waiting: Vec<Cont>,
}

impl Sensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Rc::new(RefCell::new(Vec::new())),
            resume_limit: None,
            resumed: 0,
            blocked: Vec::new(),
            waiting: Vec::new(),
        }
    }

    /// Accept every value but only let the first `n` senders continue
    pub fn resuming_at_most(mut self, n: usize) -> Self {
        self.resume_limit = Some(n);
        self
    }

    pub fn recording(&self) -> Recording {
        self.values.clone()
    }
}

impl Port for Sensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, value: Value, resume: Step) -> Vec<Step> {
        self.values.borrow_mut().push(value);
        match self.resume_limit {
            Some(limit) if self.resumed >= limit => {
                self.blocked.push(resume);
                Vec::new()
            }
            _ => {
                self.resumed += 1;
                vec![resume]
            }
        }
    }

    fn receive(&mut self, receiver: Cont) -> Vec<Step> {
        self.waiting.push(receiver);
        Vec::new()
    }

    fn backlog(&self) -> Backlog {
        let listeners = self.waiting.iter().filter(|c| c.is_replicated()).count();
        Backlog {
            sends: self.blocked.len(),
            receives: self.waiting.len() - listeners,
            listeners,
        }
    }

    fn reset(&mut self) {
        self.blocked.clear();
        self.waiting.clear();
    }
}

/// A receive-only port producing 0, 1, 2, ...
#[derive(Debug)]
pub struct Injector {
    name: String,
    next: i64,
    limit: Option<i64>,
    issued: Rc<Cell<i64>>,
    parked: Vec<Cont>,
    refused: Vec<(Value, Step)>,
}

impl Injector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next: 0,
            limit: None,
            issued: Rc::new(Cell::new(0)),
            parked: Vec::new(),
            refused: Vec::new(),
        }
    }

    /// Hand out values below `limit` only; later receivers wait forever
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// How many values have been handed out
    pub fn counter(&self) -> Rc<Cell<i64>> {
        self.issued.clone()
    }
}

impl Port for Injector {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, value: Value, resume: Step) -> Vec<Step> {
        self.refused.push((value, resume));
        Vec::new()
    }

    fn receive(&mut self, receiver: Cont) -> Vec<Step> {
        if self.limit.is_some_and(|limit| self.next >= limit) {
            self.parked.push(receiver);
            return Vec::new();
        }
        let value = Value::Num(self.next);
        self.next += 1;
        self.issued.set(self.next);
        vec![Step::resume(receiver, value)]
    }

    fn backlog(&self) -> Backlog {
        let listeners = self.parked.iter().filter(|c| c.is_replicated()).count();
        Backlog {
            sends: self.refused.len(),
            receives: self.parked.len() - listeners,
            listeners,
        }
    }

    fn reset(&mut self) {
        self.parked.clear();
        self.refused.clear();
    }
}

/// An interpreter with `x` (sensor), `z` (injector) and `y = 2` in scope
pub struct Probe {
    pub interp: Interpreter,
    pub sensor: Recording,
    pub injected: Rc<Cell<i64>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::from_parts(Config::default(), Sensor::new("x"), Injector::new("z"))
    }

    pub fn from_parts(config: Config, sensor: Sensor, injector: Injector) -> Self {
        let mut interp = Interpreter::with_config(config);
        let recording = sensor.recording();
        let injected = injector.counter();

        let x = interp.register_port(sensor);
        let z = interp.register_port(injector);
        interp.bind("x", x).expect("x is free in a fresh interpreter");
        interp.bind("z", z).expect("z is free in a fresh interpreter");
        interp
            .bind("y", Value::Num(2))
            .expect("y is free in a fresh interpreter");

        Self {
            interp,
            sensor: recording,
            injected,
        }
    }

    pub fn run(&mut self, process: Process) -> Result<RunSummary, EvalError> {
        self.interp.run(process, None)
    }

    /// Everything sent to `x` so far
    pub fn values(&self) -> Vec<Value> {
        self.sensor.borrow().clone()
    }

    /// Numbers sent to `x`, panicking on anything else
    pub fn numbers(&self) -> Vec<i64> {
        self.sensor
            .borrow()
            .iter()
            .map(|v| match v {
                Value::Num(n) => *n,
                other => panic!("expected a number on x, got {}", other),
            })
            .collect()
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `process` under a fresh [`Probe`] and return what reached `x`
pub fn run_probe(process: Process) -> Result<Vec<Value>, EvalError> {
    let mut probe = Probe::new();
    probe.run(process)?;
    Ok(probe.values())
}

/// Like [`run_probe`], panicking on error
pub fn run_probe_ok(process: Process) -> Vec<Value> {
    match run_probe(process) {
        Ok(values) => values,
        Err(e) => panic!("process failed: {}", e),
    }
}

/// Like [`run_probe`], panicking on success
pub fn run_probe_err(process: Process) -> EvalError {
    match run_probe(process) {
        Ok(values) => panic!("expected failure, process sent {:?}", values),
        Err(e) => e,
    }
}
