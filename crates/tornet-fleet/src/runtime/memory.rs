//! In-memory runtime used by the unit tests.
//!
//! Records every call in a journal and keeps a running flag per unit so that
//! stopping an already stopped unit fails the way a real daemon does.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::allocator::Subnet;
use crate::error::{FleetError, Result};
use crate::runtime::r#trait::{ExecOutput, UnitRuntime, UnitSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
    Exec(String, String),
    ResetVolume(String),
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    units: HashMap<String, Unit>,
    journal: Vec<Call>,
    exec_results: HashMap<String, ExecOutput>,
    failing_exec: Option<String>,
    failing_start: Option<String>,
    failing_next_start: bool,
}

#[derive(Debug, Clone)]
struct Unit {
    spec: UnitSpec,
    running: bool,
}

pub(crate) struct MemoryRuntime {
    subnet: Subnet,
    state: Mutex<State>,
}

impl MemoryRuntime {
    pub(crate) fn new(subnet: &str) -> Self {
        Self {
            subnet: subnet.parse().expect("valid test subnet"),
            state: Mutex::new(State::default()),
        }
    }

    /// Scripts the output of a command, matched on the space-joined command.
    pub(crate) fn script_exec(&self, cmd: &str, output: ExecOutput) {
        let mut state = self.state.lock().unwrap();
        state.exec_results.insert(cmd.to_string(), output);
    }

    /// Makes every exec of this command fail at the transport level.
    pub(crate) fn fail_exec(&self, cmd: &str) {
        self.state.lock().unwrap().failing_exec = Some(cmd.to_string());
    }

    /// Makes starting this unit fail.
    pub(crate) fn fail_start(&self, runtime_id: &str) {
        self.state.lock().unwrap().failing_start = Some(runtime_id.to_string());
    }

    /// Makes the next start fail, whichever unit it targets.
    pub(crate) fn fail_next_start(&self) {
        self.state.lock().unwrap().failing_next_start = true;
    }

    pub(crate) fn journal(&self) -> Vec<Call> {
        self.state.lock().unwrap().journal.clone()
    }

    pub(crate) fn clear_journal(&self) {
        self.state.lock().unwrap().journal.clear();
    }

    pub(crate) fn spec(&self, runtime_id: &str) -> Option<UnitSpec> {
        let state = self.state.lock().unwrap();
        state.units.get(runtime_id).map(|u| u.spec.clone())
    }

    pub(crate) fn is_running(&self, runtime_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.units.get(runtime_id).is_some_and(|u| u.running)
    }

    pub(crate) fn unit_count(&self) -> usize {
        self.state.lock().unwrap().units.len()
    }
}

#[async_trait]
impl UnitRuntime for MemoryRuntime {
    async fn create(&self, spec: &UnitSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("{:012x}{:052x}", state.next_id, 0);
        state.units.insert(
            id.clone(),
            Unit {
                spec: spec.clone(),
                running: false,
            },
        );
        state.journal.push(Call::Create(spec.name.clone()));
        Ok(id)
    }

    async fn start(&self, runtime_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(Call::Start(runtime_id.to_string()));
        if std::mem::take(&mut state.failing_next_start)
            || state.failing_start.as_deref() == Some(runtime_id)
        {
            return Err(FleetError::unit_start_failed(runtime_id, "scripted failure"));
        }
        let unit = state
            .units
            .get_mut(runtime_id)
            .ok_or_else(|| FleetError::unit_start_failed(runtime_id, "no such unit"))?;
        unit.running = true;
        Ok(())
    }

    async fn stop(&self, runtime_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(Call::Stop(runtime_id.to_string()));
        let unit = state
            .units
            .get_mut(runtime_id)
            .ok_or_else(|| FleetError::unit_stop_failed(runtime_id, "no such unit"))?;
        if !unit.running {
            return Err(FleetError::unit_stop_failed(runtime_id, "already stopped"));
        }
        unit.running = false;
        Ok(())
    }

    async fn remove(&self, runtime_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(Call::Remove(runtime_id.to_string()));
        state
            .units
            .remove(runtime_id)
            .map(|_| ())
            .ok_or_else(|| FleetError::unit_removal_failed(runtime_id, "no such unit"))
    }

    async fn exec(&self, runtime_id: &str, cmd: &[&str]) -> Result<ExecOutput> {
        let joined = cmd.join(" ");
        let mut state = self.state.lock().unwrap();
        state
            .journal
            .push(Call::Exec(runtime_id.to_string(), joined.clone()));
        if state.failing_exec.as_deref() == Some(joined.as_str()) {
            return Err(FleetError::exec_failed(runtime_id, "scripted failure"));
        }
        Ok(state
            .exec_results
            .get(&joined)
            .cloned()
            .unwrap_or_else(|| ExecOutput::new("", "", 0)))
    }

    async fn subnet(&self, _network: &str) -> Result<Subnet> {
        Ok(self.subnet)
    }

    async fn reset_volume(&self, volume: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push(Call::ResetVolume(volume.to_string()));
        Ok(())
    }
}
