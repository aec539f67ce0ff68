//! Recording launcher for orchestrator and supervisor tests

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ProcessHandle, ProcessLauncher};
use crate::core::error::ProcessError;
use crate::core::types::Port;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Launch(u32),
    Terminate(u32),
    ForceKill(u32),
    Sweep,
    LaunchFailed,
}

#[derive(Default)]
struct Shared {
    events: Vec<Event>,
    alive: BTreeSet<u32>,
    next_id: u32,
    /// Set if a launch ever happened while another instance was alive
    overlapped: bool,
    ignore_sigterm: bool,
    fail_launches: u32,
    listening: bool,
    closed_ports: BTreeSet<Port>,
}

/// Clones share one event log
#[derive(Clone)]
pub struct FakeLauncher {
    shared: Arc<Mutex<Shared>>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLauncher {
    pub fn new() -> Self {
        let shared = Shared {
            next_id: 1000,
            listening: true,
            ..Shared::default()
        };
        Self {
            shared: Arc::new(Mutex::new(shared)),
        }
    }

    /// Handles will not exit on a graceful request
    pub fn ignoring_sigterm(self) -> Self {
        self.shared.lock().ignore_sigterm = true;
        self
    }

    /// The next `count` launches fail
    pub fn failing_launches(self, count: u32) -> Self {
        self.shared.lock().fail_launches = count;
        self
    }

    pub fn set_listening(&self, listening: bool) {
        self.shared.lock().listening = listening;
    }

    /// Only `port` stays unbound after a launch
    pub fn close_port(&self, port: Port) {
        self.shared.lock().closed_ports.insert(port);
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.lock().events.clone()
    }

    pub fn launches(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Launch(_)))
            .count()
    }

    pub fn alive(&self) -> usize {
        self.shared.lock().alive.len()
    }

    pub fn overlapped(&self) -> bool {
        self.shared.lock().overlapped
    }
}

struct FakeHandle {
    id: u32,
    shared: Arc<Mutex<Shared>>,
    exited: bool,
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn id(&self) -> Option<u32> {
        (!self.exited).then_some(self.id)
    }

    async fn terminate(&mut self, _grace: Duration) -> bool {
        let mut shared = self.shared.lock();
        shared.events.push(Event::Terminate(self.id));
        if shared.ignore_sigterm {
            return false;
        }
        shared.alive.remove(&self.id);
        self.exited = true;
        true
    }

    async fn force_kill(&mut self) {
        let mut shared = self.shared.lock();
        shared.events.push(Event::ForceKill(self.id));
        shared.alive.remove(&self.id);
        self.exited = true;
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        let mut shared = self.shared.lock();
        if shared.fail_launches > 0 {
            shared.fail_launches -= 1;
            shared.events.push(Event::LaunchFailed);
            return Err(ProcessError::LaunchFailed {
                program: "fake-proxy".to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        if !shared.alive.is_empty() {
            shared.overlapped = true;
        }
        shared.next_id += 1;
        let id = shared.next_id;
        shared.alive.insert(id);
        shared.events.push(Event::Launch(id));
        Ok(Box::new(FakeHandle {
            id,
            shared: Arc::clone(&self.shared),
            exited: false,
        }))
    }

    async fn sweep_orphans(&self) -> usize {
        let mut shared = self.shared.lock();
        shared.events.push(Event::Sweep);
        let swept = shared.alive.len();
        shared.alive.clear();
        swept
    }

    async fn is_listening(&self, port: Port) -> bool {
        let shared = self.shared.lock();
        shared.listening && !shared.closed_ports.contains(&port)
    }
}
