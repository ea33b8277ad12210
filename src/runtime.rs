//! Runtime: channels, ports, and the ready queue

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cont::{Cont, Step};
use crate::value::Value;

/// Identity of a port owned by a [`Runtime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub usize);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<chan {}>", self.0)
    }
}

/// Anything a process can send to or receive from.
///
/// Both operations return the steps that became runnable. Returning nothing
/// blocks the caller; the port keeps whatever it needs to resume it later.
pub trait Port: fmt::Debug {
    /// Display name, not used for matching
    fn name(&self) -> &str;

    /// Offer `value`; `resume` continues the sender once the value is taken
    fn send(&mut self, value: Value, resume: Step) -> Vec<Step>;

    /// Ask for a value; `receiver` is resumed with it
    fn receive(&mut self, receiver: Cont) -> Vec<Step>;

    /// Communications buffered on this port
    fn backlog(&self) -> Backlog {
        Backlog::default()
    }

    /// Forget every buffered sender and receiver. Called when a run aborts.
    fn reset(&mut self) {}
}

/// Buffered, unmatched communications on a port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Backlog {
    pub sends: usize,
    /// Single-shot receivers
    pub receives: usize,
    /// Replicated receivers waiting for their next message
    pub listeners: usize,
}

impl Backlog {
    /// Anything here besides persistent listeners means someone is blocked for good
    pub fn is_stuck(&self) -> bool {
        self.sends > 0 || self.receives > 0
    }
}

/// A channel that still held blocked communications when the run went quiet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckChannel {
    pub id: ChannelId,
    pub name: String,
    pub pending_sends: usize,
    pub pending_receives: usize,
}

/// Synchronous rendezvous channel.
///
/// At most one of the two queues is non-empty: a send that finds a waiting
/// receive (or the reverse) is matched on the spot.
#[derive(Debug)]
pub struct Channel {
    pub name: String,
    pending_sends: VecDeque<(Value, Step)>,
    pending_receives: VecDeque<Cont>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending_sends: VecDeque::new(),
            pending_receives: VecDeque::new(),
        }
    }
}

impl Port for Channel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, value: Value, resume: Step) -> Vec<Step> {
        match self.pending_receives.pop_front() {
            Some(receiver) => {
                trace!(channel = %self.name, "rendezvous on send");
                vec![Step::resume(receiver, value), resume]
            }
            None => {
                self.pending_sends.push_back((value, resume));
                Vec::new()
            }
        }
    }

    fn receive(&mut self, receiver: Cont) -> Vec<Step> {
        match self.pending_sends.pop_front() {
            Some((value, sender)) => {
                trace!(channel = %self.name, "rendezvous on receive");
                vec![sender, Step::resume(receiver, value)]
            }
            None => {
                self.pending_receives.push_back(receiver);
                Vec::new()
            }
        }
    }

    fn backlog(&self) -> Backlog {
        let listeners = self
            .pending_receives
            .iter()
            .filter(|cont| cont.is_replicated())
            .count();
        Backlog {
            sends: self.pending_sends.len(),
            receives: self.pending_receives.len() - listeners,
            listeners,
        }
    }

    fn reset(&mut self) {
        self.pending_sends.clear();
        self.pending_receives.clear();
    }
}

/// Ready queue plus every port the interpreter knows about
#[derive(Debug, Default)]
pub struct Runtime {
    ready_queue: VecDeque<Step>,
    ports: Vec<Box<dyn Port>>,
    /// Suffix for the next channel's display name
    next_serial: u64,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a step behind everything already runnable
    pub fn spawn(&mut self, step: Step) {
        self.ready_queue.push_back(step);
    }

    pub fn spawn_all(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.ready_queue.extend(steps);
    }

    pub fn next_ready(&mut self) -> Option<Step> {
        self.ready_queue.pop_front()
    }

    pub fn ready_count(&self) -> usize {
        self.ready_queue.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Step> {
        self.ready_queue.iter()
    }

    pub fn clear_ready(&mut self) {
        self.ready_queue.clear();
    }

    /// Create a channel named after its binder, e.g. `c#3`
    pub fn new_channel(&mut self, binder: &str) -> ChannelId {
        self.next_serial += 1;
        let name = format!("{}#{}", binder, self.next_serial);
        trace!(channel = %name, "channel created");
        self.register(Box::new(Channel::new(name)))
    }

    pub fn register(&mut self, port: Box<dyn Port>) -> ChannelId {
        let id = ChannelId(self.ports.len());
        self.ports.push(port);
        id
    }

    pub fn port(&self, id: ChannelId) -> Option<&dyn Port> {
        self.ports.get(id.0).map(|p| p.as_ref())
    }

    pub fn port_mut(&mut self, id: ChannelId) -> Option<&mut (dyn Port + 'static)> {
        self.ports.get_mut(id.0).map(|p| p.as_mut())
    }

    pub fn channel_count(&self) -> usize {
        self.ports.len()
    }

    /// Drop every continuation parked on a port
    pub fn reset_ports(&mut self) {
        for port in &mut self.ports {
            port.reset();
        }
    }

    pub fn reset_serial(&mut self) {
        self.next_serial = 0;
    }

    /// Ports still holding sends or single-shot receives
    pub fn stuck_channels(&self) -> Vec<StuckChannel> {
        self.ports
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                let backlog = port.backlog();
                backlog.is_stuck().then(|| StuckChannel {
                    id: ChannelId(index),
                    name: port.name().to_string(),
                    pending_sends: backlog.sends,
                    pending_receives: backlog.receives,
                })
            })
            .collect()
    }
}
