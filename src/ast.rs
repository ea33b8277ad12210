//! Abstract Syntax Tree for pike processes
//!
//! The tree is what the external parser hands us. It mirrors that parser's
//! JSON output: processes are objects tagged by `"tag"`, expressions are
//! plain JSON values, and binding patterns are strings or arrays.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub type Ident = String;

/// A process-calculus term
///
/// Child processes are encoded and decoded through a serde adapter that grows
/// the stack on demand. Equality and drop walk the tree iteratively.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum Process {
    /// The terminated process
    #[serde(rename = "nil")]
    Nil,

    /// `channel!value.next`
    #[serde(rename = "!")]
    Send {
        channel: Expr,
        value: Expr,
        #[serde(with = "nested")]
        next: Rc<Process>,
    },

    /// `channel?pattern.next`, fires at most once
    #[serde(rename = "?")]
    Receive {
        channel: Expr,
        #[serde(rename = "value")]
        pattern: Pattern,
        #[serde(with = "nested")]
        next: Rc<Process>,
    },

    /// `channel?*pattern.next`, re-listens after every message
    #[serde(rename = "?*")]
    Replicate {
        channel: Expr,
        #[serde(rename = "value")]
        pattern: Pattern,
        #[serde(with = "nested")]
        next: Rc<Process>,
    },

    /// `new(name).next`
    #[serde(rename = "new")]
    New {
        #[serde(rename = "channel")]
        name: Ident,
        #[serde(with = "nested")]
        next: Rc<Process>,
    },

    /// `left | right`
    #[serde(rename = "|")]
    Par {
        #[serde(with = "nested")]
        left: Rc<Process>,
        #[serde(with = "nested")]
        right: Rc<Process>,
    },

    /// Start `process` alongside `next`
    #[serde(rename = "run")]
    Run {
        #[serde(with = "nested")]
        process: Rc<Process>,
        #[serde(with = "nested")]
        next: Rc<Process>,
    },

    /// Mutually recursive persistent receivers, visible to each other and to `next`
    #[serde(rename = "def")]
    Def {
        definitions: Vec<Definition>,
        #[serde(with = "nested")]
        next: Rc<Process>,
    },

    /// `if condition then when_true else when_false`
    #[serde(rename = "if")]
    If {
        condition: Expr,
        #[serde(rename = "then")]
        #[serde(with = "nested")]
        when_true: Rc<Process>,
        #[serde(rename = "else")]
        #[serde(with = "nested")]
        when_false: Rc<Process>,
    },
}

/// One `name[pattern] = body` clause of a `def` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: Ident,
    pub pattern: Pattern,
    #[serde(with = "nested")]
    pub body: Rc<Process>,
}

impl Definition {
    pub fn new(name: impl Into<Ident>, pattern: impl Into<Pattern>, body: Process) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            body: Rc::new(body),
        }
    }
}

impl Process {
    pub fn nil() -> Self {
        Process::Nil
    }

    pub fn send(channel: impl Into<Expr>, value: impl Into<Expr>, next: Process) -> Self {
        Process::Send {
            channel: channel.into(),
            value: value.into(),
            next: Rc::new(next),
        }
    }

    pub fn receive(channel: impl Into<Expr>, pattern: impl Into<Pattern>, next: Process) -> Self {
        Process::Receive {
            channel: channel.into(),
            pattern: pattern.into(),
            next: Rc::new(next),
        }
    }

    pub fn replicate(channel: impl Into<Expr>, pattern: impl Into<Pattern>, next: Process) -> Self {
        Process::Replicate {
            channel: channel.into(),
            pattern: pattern.into(),
            next: Rc::new(next),
        }
    }

    pub fn new_channel(name: impl Into<Ident>, next: Process) -> Self {
        Process::New {
            name: name.into(),
            next: Rc::new(next),
        }
    }

    pub fn par(left: Process, right: Process) -> Self {
        Process::Par {
            left: Rc::new(left),
            right: Rc::new(right),
        }
    }

    /// Right-nested parallel composition of every process, `nil` when empty
    pub fn parallel(processes: impl IntoIterator<Item = Process>) -> Self {
        let mut all: Vec<Process> = processes.into_iter().collect();
        let mut acc = match all.pop() {
            Some(last) => last,
            None => return Process::Nil,
        };
        while let Some(prev) = all.pop() {
            acc = Process::par(prev, acc);
        }
        acc
    }

    pub fn run(process: Process, next: Process) -> Self {
        Process::Run {
            process: Rc::new(process),
            next: Rc::new(next),
        }
    }

    pub fn def(definitions: Vec<Definition>, next: Process) -> Self {
        Process::Def {
            definitions,
            next: Rc::new(next),
        }
    }

    pub fn cond(condition: impl Into<Expr>, when_true: Process, when_false: Process) -> Self {
        Process::If {
            condition: condition.into(),
            when_true: Rc::new(when_true),
            when_false: Rc::new(when_false),
        }
    }

    /// Decode a process from the parser's JSON form, at any nesting depth
    pub fn from_json(source: &str) -> serde_json::Result<Process> {
        crate::json::from_str(source)
    }

    /// Encode in the parser's JSON form
    pub fn to_json(&self) -> serde_json::Result<String> {
        crate::json::to_string(self)
    }

    /// The surface tag of this node, as it appears in the JSON form
    pub fn tag(&self) -> &'static str {
        match self {
            Process::Nil => "nil",
            Process::Send { .. } => "!",
            Process::Receive { .. } => "?",
            Process::Replicate { .. } => "?*",
            Process::New { .. } => "new",
            Process::Par { .. } => "|",
            Process::Run { .. } => "run",
            Process::Def { .. } => "def",
            Process::If { .. } => "if",
        }
    }

    /// Unlink owned children so the caller can drop them one level at a time
    fn take_children(&mut self) -> Vec<Rc<Process>> {
        match self {
            Process::Nil => Vec::new(),
            Process::Send { next, .. }
            | Process::Receive { next, .. }
            | Process::Replicate { next, .. }
            | Process::New { next, .. } => vec![detach(next)],
            Process::Par { left, right } => vec![detach(left), detach(right)],
            Process::Run { process, next } => vec![detach(process), detach(next)],
            Process::Def { definitions, next } => {
                let mut children: Vec<_> = definitions
                    .iter_mut()
                    .map(|definition| detach(&mut definition.body))
                    .collect();
                children.push(detach(next));
                children
            }
            Process::If {
                when_true,
                when_false,
                ..
            } => vec![detach(when_true), detach(when_false)],
        }
    }
}

fn detach(slot: &mut Rc<Process>) -> Rc<Process> {
    std::mem::replace(slot, Rc::new(Process::Nil))
}

// Long `a!x.b!y...` chains would otherwise be freed recursively.
impl Drop for Process {
    fn drop(&mut self) {
        let mut orphans = self.take_children();
        while let Some(child) = orphans.pop() {
            if let Ok(mut process) = Rc::try_unwrap(child) {
                orphans.extend(process.take_children());
            }
        }
    }
}

impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        let mut pending: Vec<(&Process, &Process)> = vec![(self, other)];
        while let Some(pair) = pending.pop() {
            if std::ptr::eq(pair.0, pair.1) {
                continue;
            }
            match pair {
                (Process::Nil, Process::Nil) => {}
                (
                    Process::Send { channel: c1, value: v1, next: n1 },
                    Process::Send { channel: c2, value: v2, next: n2 },
                ) => {
                    if c1 != c2 || v1 != v2 {
                        return false;
                    }
                    pending.push((&**n1, &**n2));
                }
                (
                    Process::Receive { channel: c1, pattern: p1, next: n1 },
                    Process::Receive { channel: c2, pattern: p2, next: n2 },
                )
                | (
                    Process::Replicate { channel: c1, pattern: p1, next: n1 },
                    Process::Replicate { channel: c2, pattern: p2, next: n2 },
                ) => {
                    if c1 != c2 || p1 != p2 {
                        return false;
                    }
                    pending.push((&**n1, &**n2));
                }
                (Process::New { name: a, next: n1 }, Process::New { name: b, next: n2 }) => {
                    if a != b {
                        return false;
                    }
                    pending.push((&**n1, &**n2));
                }
                (Process::Par { left: l1, right: r1 }, Process::Par { left: l2, right: r2 }) => {
                    pending.push((&**l1, &**l2));
                    pending.push((&**r1, &**r2));
                }
                (Process::Run { process: p1, next: n1 }, Process::Run { process: p2, next: n2 }) => {
                    pending.push((&**p1, &**p2));
                    pending.push((&**n1, &**n2));
                }
                (
                    Process::Def { definitions: d1, next: n1 },
                    Process::Def { definitions: d2, next: n2 },
                ) => {
                    if d1.len() != d2.len() {
                        return false;
                    }
                    for (a, b) in d1.iter().zip(d2) {
                        if a.name != b.name || a.pattern != b.pattern {
                            return false;
                        }
                        pending.push((&*a.body, &*b.body));
                    }
                    pending.push((&**n1, &**n2));
                }
                (
                    Process::If { condition: c1, when_true: t1, when_false: f1 },
                    Process::If { condition: c2, when_true: t2, when_false: f2 },
                ) => {
                    if c1 != c2 {
                        return false;
                    }
                    pending.push((&**t1, &**t2));
                    pending.push((&**f1, &**f2));
                }
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Nil => f.write_str("Nil"),
            Process::Send { channel, value, next } => f
                .debug_struct("Send")
                .field("channel", channel)
                .field("value", value)
                .field("next", &Child(next))
                .finish(),
            Process::Receive { channel, pattern, next } => f
                .debug_struct("Receive")
                .field("channel", channel)
                .field("pattern", pattern)
                .field("next", &Child(next))
                .finish(),
            Process::Replicate { channel, pattern, next } => f
                .debug_struct("Replicate")
                .field("channel", channel)
                .field("pattern", pattern)
                .field("next", &Child(next))
                .finish(),
            Process::New { name, next } => f
                .debug_struct("New")
                .field("name", name)
                .field("next", &Child(next))
                .finish(),
            Process::Par { left, right } => f
                .debug_struct("Par")
                .field("left", &Child(left))
                .field("right", &Child(right))
                .finish(),
            Process::Run { process, next } => f
                .debug_struct("Run")
                .field("process", &Child(process))
                .field("next", &Child(next))
                .finish(),
            Process::Def { definitions, next } => f
                .debug_struct("Def")
                .field("definitions", definitions)
                .field("next", &Child(next))
                .finish(),
            Process::If {
                condition,
                when_true,
                when_false,
            } => f
                .debug_struct("If")
                .field("condition", condition)
                .field("when_true", &Child(when_true))
                .field("when_false", &Child(when_false))
                .finish(),
        }
    }
}

/// Debug-formats a child on a stack with room to spare
struct Child<'a>(&'a Process);

impl fmt::Debug for Child<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::json::with_stack(|| fmt::Debug::fmt(self.0, f))
    }
}

/// Serde adapter for child processes
mod nested {
    use std::rc::Rc;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Process;
    use crate::json::with_stack;

    pub fn serialize<S: Serializer>(child: &Rc<Process>, serializer: S) -> Result<S::Ok, S::Error> {
        with_stack(|| (**child).serialize(serializer))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Rc<Process>, D::Error> {
        with_stack(|| Process::deserialize(deserializer).map(Rc::new))
    }
}

/// Operand expressions. Numbers are whole and must fit in an `i64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    untagged,
    expecting = "an expression: true/false, a whole number in the i64 range, a variable name, or an array of expressions"
)]
pub enum Expr {
    Bool(bool),
    Num(i64),
    Var(Ident),
    Tuple(Vec<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<Ident>) -> Self {
        Expr::Var(name.into())
    }

    pub fn tuple(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Tuple(items.into_iter().collect())
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Num(n)
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Num(i64::from(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Bool(b)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::Var(name.to_string())
    }
}

impl From<String> for Expr {
    fn from(name: String) -> Self {
        Expr::Var(name)
    }
}

impl From<Vec<Expr>> for Expr {
    fn from(items: Vec<Expr>) -> Self {
        Expr::Tuple(items)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Num(n) => write!(f, "{}", n),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Tuple(items) => write_seq(f, items),
        }
    }
}

/// Receive binding patterns. Tuples must match arity exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, expecting = "a pattern: a variable name or an array of patterns")]
pub enum Pattern {
    Bind(Ident),
    Tuple(Vec<Pattern>),
}

impl Pattern {
    pub fn tuple(items: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::Tuple(items.into_iter().collect())
    }
}

impl From<&str> for Pattern {
    fn from(name: &str) -> Self {
        Pattern::Bind(name.to_string())
    }
}

impl From<String> for Pattern {
    fn from(name: String) -> Self {
        Pattern::Bind(name)
    }
}

impl From<Vec<Pattern>> for Pattern {
    fn from(items: Vec<Pattern>) -> Self {
        Pattern::Tuple(items)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Bind(name) => write!(f, "{}", name),
            Pattern::Tuple(items) => write_seq(f, items),
        }
    }
}

pub(crate) fn write_seq<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "]")
}
