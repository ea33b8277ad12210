//! Process evaluator and cooperative scheduler
//!
//! Every scheduler tick pops one [`Step`] off the ready queue and drives it
//! through the trampoline until it settles into a list of newly runnable
//! steps, which go to the back of the queue. Expression resolution bounces
//! inside a tick; process nodes, rendezvous and branch choices always hand
//! their continuations back to the scheduler.

use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::ast::{Expr, Pattern, Process};
use crate::config::Config;
use crate::cont::{trampoline, Bounce, Cont, Frame, Machine, Step};
use crate::env::{Environment, ScopeId};
use crate::error::EvalError;
use crate::json;
use crate::operators::BinOp;
use crate::runtime::{Port, Runtime, StuckChannel};
use crate::value::Value;

type Settled = Bounce<Step, Vec<Step>>;

/// How a run went quiet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quiescence {
    /// Nothing is left waiting except persistent listeners
    Terminated,
    /// The queue drained while these channels still held blocked communications
    Blocked(Vec<StuckChannel>),
}

impl Quiescence {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Quiescence::Terminated)
    }
}

/// Outcome of running to quiescence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Scheduler ticks taken
    pub steps: u64,
    pub quiescence: Quiescence,
}

/// The interpreter
pub struct Interpreter {
    env: Environment,
    /// Ports and the ready queue
    pub runtime: Runtime,
    config: Config,
    root: ScopeId,
    ticks: u64,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut env = Environment::new();
        let root = env.push_scope(None);
        for op in BinOp::ALL {
            env.define(root, op.symbol(), Value::Builtin(op));
        }

        Self {
            env,
            runtime: Runtime::new(),
            config,
            root,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The scope holding the built-in operators
    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Bind `name` in the root scope
    pub fn bind(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        let root = self.root;
        self.env.bind(root, name, value)
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        self.env.lookup(scope, name)
    }

    /// A fresh scope nested in `parent`, for building custom initial environments
    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.env.push_scope(Some(parent))
    }

    pub fn new_channel(&mut self, binder: &str) -> Value {
        Value::Channel(self.runtime.new_channel(binder))
    }

    /// Make a custom port addressable from processes
    pub fn register_port(&mut self, port: impl Port + 'static) -> Value {
        Value::Channel(self.runtime.register(Box::new(port)))
    }

    /// Render a value with channel display names
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Channel(id) => match self.runtime.port(*id) {
                Some(port) => port.name().to_string(),
                None => id.to_string(),
            },
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|v| self.describe(v)).collect();
                format!("[{}]", parts.join(", "))
            }
            other => other.to_string(),
        }
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    /// Run `process` in `scope` (the root scope when `None`) until the ready queue drains
    pub fn run(
        &mut self,
        process: impl Into<Rc<Process>>,
        scope: Option<ScopeId>,
    ) -> Result<RunSummary, EvalError> {
        self.start(process, scope);
        self.run_to_quiescence()
    }

    /// Queue `process` without running it. Starting on an idle interpreter begins a new run.
    pub fn start(&mut self, process: impl Into<Rc<Process>>, scope: Option<ScopeId>) {
        let process = process.into();
        if self.runtime.ready_count() == 0 {
            self.ticks = 0;
            self.runtime.reset_serial();
        }
        debug!(tag = process.tag(), "process started");
        let scope = scope.unwrap_or(self.root);
        self.runtime.spawn(Step::run(process, scope));
    }

    /// Run one scheduler tick. Returns whether runnable work remains.
    pub fn step(&mut self) -> Result<bool, EvalError> {
        if let Some(limit) = self.config.step_limit {
            if self.ticks >= limit && self.runtime.ready_count() > 0 {
                return Err(self.abort(EvalError::StepLimit { limit }));
            }
        }

        let step = match self.runtime.next_ready() {
            Some(step) => step,
            None => return Ok(false),
        };

        self.ticks += 1;
        trace!(
            tick = self.ticks,
            step = step.label(),
            queued = self.runtime.ready_count(),
            "tick"
        );

        match trampoline(self, step) {
            Ok(spawned) => {
                self.runtime.spawn_all(spawned);
                Ok(self.runtime.ready_count() > 0)
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Tick until the ready queue is empty
    pub fn run_to_quiescence(&mut self) -> Result<RunSummary, EvalError> {
        while self.step()? {}

        let quiescence = self.quiescence();
        debug!(steps = self.ticks, ?quiescence, "run reached quiescence");

        if let Quiescence::Blocked(stuck) = &quiescence {
            if self.config.fail_on_deadlock {
                return Err(EvalError::Deadlock {
                    stuck: stuck.clone(),
                });
            }
        }

        Ok(RunSummary {
            steps: self.ticks,
            quiescence,
        })
    }

    /// Steps waiting in the ready queue, head first
    pub fn pending(&self) -> impl Iterator<Item = &Step> {
        self.runtime.pending()
    }

    /// Encode the ready queue, head first
    pub fn snapshot(&self) -> serde_json::Result<String> {
        let pending: Vec<&Step> = self.runtime.pending().collect();
        json::to_string(&pending)
    }

    /// Queue the steps of a [`snapshot`](Self::snapshot) behind any existing work.
    /// Returns how many were queued.
    pub fn restore(&mut self, snapshot: &str) -> serde_json::Result<usize> {
        let steps: Vec<Step> = json::from_str(snapshot)?;
        let count = steps.len();
        debug!(count, "restored ready queue");
        self.runtime.spawn_all(steps);
        Ok(count)
    }

    /// Ticks taken by the current run
    pub fn steps(&self) -> u64 {
        self.ticks
    }

    pub fn quiescence(&self) -> Quiescence {
        let stuck = self.runtime.stuck_channels();
        if stuck.is_empty() {
            Quiescence::Terminated
        } else {
            Quiescence::Blocked(stuck)
        }
    }

    /// Errors are fatal to every branch, not just the one that raised them,
    /// including branches parked on a port
    fn abort(&mut self, err: EvalError) -> EvalError {
        warn!(%err, tick = self.ticks, dropped = self.runtime.ready_count(), "run aborted");
        self.runtime.clear_ready();
        self.runtime.reset_ports();
        err
    }

    // ========================================================================
    // Process evaluator
    // ========================================================================

    fn eval_process(&mut self, process: Rc<Process>, scope: ScopeId) -> Result<Settled, EvalError> {
        match &*process {
            Process::Nil => Ok(Bounce::complete(Vec::new())),

            Process::Send {
                channel,
                value,
                next,
            } => Ok(Bounce::schedule(Step::Eval {
                expr: channel.clone(),
                scope,
                cont: Cont::with(Frame::SendChannel {
                    value: value.clone(),
                    next: next.clone(),
                    scope,
                }),
            })),

            Process::Receive {
                channel,
                pattern,
                next,
            } => Ok(self.listen(channel, pattern, next, scope, None)),

            Process::Replicate {
                channel,
                pattern,
                next,
            } => Ok(self.listen(channel, pattern, next, scope, Some(process.clone()))),

            Process::New { name, next } => {
                let channel = self.new_channel(name);
                let inner = self.env.push_scope(Some(scope));
                self.env.declare(inner, name, channel)?;
                Ok(Bounce::complete(vec![Step::run(next.clone(), inner)]))
            }

            Process::Par { left, right } => Ok(Bounce::complete(vec![
                Step::run(left.clone(), scope),
                Step::run(right.clone(), scope),
            ])),

            Process::Run { process: first, next } => Ok(Bounce::complete(vec![
                Step::run(first.clone(), scope),
                Step::run(next.clone(), scope),
            ])),

            Process::Def { definitions, next } => {
                let inner = self.env.push_scope(Some(scope));
                for definition in definitions {
                    let channel = self.new_channel(&definition.name);
                    self.env.declare(inner, &definition.name, channel)?;
                }

                let mut steps: Vec<Step> = definitions
                    .iter()
                    .map(|definition| {
                        let listener = Process::Replicate {
                            channel: Expr::Var(definition.name.clone()),
                            pattern: definition.pattern.clone(),
                            next: definition.body.clone(),
                        };
                        Step::run(Rc::new(listener), inner)
                    })
                    .collect();
                steps.push(Step::run(next.clone(), inner));
                Ok(Bounce::complete(steps))
            }

            Process::If {
                condition,
                when_true,
                when_false,
            } => Ok(Bounce::schedule(Step::Eval {
                expr: condition.clone(),
                scope,
                cont: Cont::with(Frame::Branch {
                    when_true: when_true.clone(),
                    when_false: when_false.clone(),
                    scope,
                }),
            })),
        }
    }

    fn listen(
        &self,
        channel: &Expr,
        pattern: &Pattern,
        next: &Rc<Process>,
        scope: ScopeId,
        relisten: Option<Rc<Process>>,
    ) -> Settled {
        Bounce::schedule(Step::Eval {
            expr: channel.clone(),
            scope,
            cont: Cont::with(Frame::ReceiveChannel {
                pattern: pattern.clone(),
                next: next.clone(),
                scope,
                relisten,
            }),
        })
    }

    // ========================================================================
    // Expression evaluator
    // ========================================================================

    fn eval_expr(&mut self, expr: Expr, scope: ScopeId, mut cont: Cont) -> Result<Settled, EvalError> {
        let value = match expr {
            Expr::Num(n) => Value::Num(n),
            Expr::Bool(b) => Value::Bool(b),
            Expr::Var(name) => match self.env.lookup(scope, &name) {
                Some(value) => value.clone(),
                None => return Err(EvalError::UnboundVariable { name, scope }),
            },
            Expr::Tuple(mut remaining) => {
                remaining.reverse();
                match remaining.pop() {
                    Some(first) => {
                        let done = Vec::with_capacity(remaining.len() + 1);
                        cont.push(Frame::Tuple {
                            remaining,
                            done,
                            scope,
                        });
                        return Ok(Bounce::schedule(Step::Eval {
                            expr: first,
                            scope,
                            cont,
                        }));
                    }
                    None => Value::Tuple(Vec::new()),
                }
            }
        };
        Ok(Bounce::schedule(Step::resume(cont, value)))
    }

    fn apply_cont(&mut self, mut cont: Cont, value: Value) -> Result<Settled, EvalError> {
        let frame = match cont.pop() {
            Some(frame) => frame,
            None => return Ok(Bounce::complete(Vec::new())),
        };

        match frame {
            Frame::Tuple {
                mut remaining,
                mut done,
                scope,
            } => {
                done.push(value);
                match remaining.pop() {
                    Some(expr) => {
                        cont.push(Frame::Tuple {
                            remaining,
                            done,
                            scope,
                        });
                        Ok(Bounce::schedule(Step::Eval { expr, scope, cont }))
                    }
                    None => Ok(Bounce::schedule(Step::resume(cont, Value::Tuple(done)))),
                }
            }

            Frame::SendChannel {
                value: payload,
                next,
                scope,
            } => {
                cont.push(Frame::SendValue {
                    channel: value,
                    next,
                    scope,
                });
                Ok(Bounce::schedule(Step::Eval {
                    expr: payload,
                    scope,
                    cont,
                }))
            }

            Frame::SendValue {
                channel,
                next,
                scope,
            } => {
                let steps = self.send_to(channel, value, Step::run(next, scope))?;
                Ok(Bounce::complete(steps))
            }

            Frame::ReceiveChannel {
                pattern,
                next,
                scope,
                relisten,
            } => {
                let receiver = Cont::with(Frame::Bind {
                    pattern,
                    next,
                    scope,
                    relisten,
                });
                let steps = self.receive_from(value, receiver)?;
                Ok(Bounce::complete(steps))
            }

            Frame::Bind {
                pattern,
                next,
                scope,
                relisten,
            } => {
                let inner = self.env.push_scope(Some(scope));
                self.bind_pattern(inner, &pattern, value)?;
                let mut steps = vec![Step::run(next, inner)];
                if let Some(listener) = relisten {
                    steps.push(Step::run(listener, scope));
                }
                Ok(Bounce::complete(steps))
            }

            Frame::Branch {
                when_true,
                when_false,
                scope,
            } => match value {
                Value::Bool(true) => Ok(Bounce::complete(vec![Step::run(when_true, scope)])),
                Value::Bool(false) => Ok(Bounce::complete(vec![Step::run(when_false, scope)])),
                found => Err(EvalError::NonBooleanGuard { found }),
            },
        }
    }

    fn send_to(&mut self, target: Value, value: Value, resume: Step) -> Result<Vec<Step>, EvalError> {
        match target {
            Value::Channel(id) => {
                let port = self
                    .runtime
                    .port_mut(id)
                    .ok_or(EvalError::UnknownChannel { id })?;
                Ok(port.send(value, resume))
            }
            Value::Builtin(op) => {
                let (left, right, result) = op.unpack(value)?;
                let answer = op.apply(&left, &right)?;
                if !result.can_send() {
                    return Err(EvalError::ResultNotChannel { op, found: result });
                }
                trace!(%op, %left, %right, %answer, "operator applied");
                self.send_to(result, answer, resume)
            }
            found => Err(EvalError::NotAChannel { op: "send", found }),
        }
    }

    fn receive_from(&mut self, source: Value, receiver: Cont) -> Result<Vec<Step>, EvalError> {
        match source {
            Value::Channel(id) => {
                let port = self
                    .runtime
                    .port_mut(id)
                    .ok_or(EvalError::UnknownChannel { id })?;
                Ok(port.receive(receiver))
            }
            found => Err(EvalError::NotAChannel {
                op: "receive",
                found,
            }),
        }
    }

    /// Destructure `value` against `pattern`, declaring names in `scope`
    fn bind_pattern(&mut self, scope: ScopeId, pattern: &Pattern, value: Value) -> Result<(), EvalError> {
        match (pattern, value) {
            (Pattern::Bind(name), value) => self.env.declare(scope, name, value),
            (Pattern::Tuple(patterns), Value::Tuple(values)) if patterns.len() == values.len() => {
                for (pattern, value) in patterns.iter().zip(values) {
                    self.bind_pattern(scope, pattern, value)?;
                }
                Ok(())
            }
            (pattern, value) => Err(EvalError::PatternMismatch {
                pattern: pattern.clone(),
                value,
            }),
        }
    }
}

impl Machine for Interpreter {
    type Call = Step;
    type Output = Vec<Step>;
    type Error = EvalError;

    fn invoke(&mut self, step: Step) -> Result<Settled, EvalError> {
        match step {
            Step::Run { process, scope } => self.eval_process(process, scope),
            Step::Eval { expr, scope, cont } => self.eval_expr(expr, scope, cont),
            Step::Resume { cont, value } => self.apply_cont(cont, value),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `process` on a fresh interpreter
pub fn run(process: Process) -> Result<RunSummary, EvalError> {
    Interpreter::new().run(process, None)
}
