//! Simulation Engine
//! Step-based, event-driven interpreter for hierarchical FSM models
//!
//! The engine keeps the active configuration as a path of states from the
//! outermost state to the innermost active leaf. Each [`FsmSimulator::step`]
//! runs the leaf's during action, then drains a FIFO of events (the external
//! event first, then whatever actions post with `sm.send`) until it is empty,
//! a breakpoint pauses the run, or a fatal error halts it.

use std::collections::{BTreeSet, VecDeque};
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fsm::{Action, Condition, FsmModel, State};
use crate::safety::{check_code_safety, SafetyViolation};
use crate::script::{self, ScriptError, ScriptHost, Value, Variables};

mod trace;


pub use trace::{Sample, VariableTrace};

/// Default cap on events drained in a single step
pub const DEFAULT_MAX_EVENTS_PER_STEP: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FsmError {
    #[error("No states found in FSM model '{0}'")]
    NoStates(String),
    #[error("Target state '{target}' not found (transition from '{from}')")]
    TargetNotFound { from: String, target: String },
    #[error("Unsafe code blocked: {reason} in '{code}'")]
    ActionBlocked {
        code: String,
        reason: SafetyViolation,
    },
    #[error("Action failed: {error} in '{code}'")]
    ActionFailed { code: String, error: ScriptError },
    #[error("More than {limit} events processed in one step; aborting the event cascade")]
    EventCascade { limit: usize },
}

pub type FsmResult<T> = Result<T, FsmError>;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Halt the engine (and return an error) when an action is blocked or fails
    pub halt_on_action_error: bool,
    /// Events drained per step before the run is halted as a runaway cascade
    pub max_events_per_step: usize,
    /// Halt once the tick counter reaches this value
    pub stop_at_tick: Option<u64>,
    /// State breakpoints installed at construction
    pub breakpoints: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            halt_on_action_error: false,
            max_events_per_step: DEFAULT_MAX_EVENTS_PER_STEP,
            stop_at_tick: None,
            breakpoints: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    /// Defaults overlaid with `FSMKIT_HALT_ON_ERROR`, `FSMKIT_MAX_EVENTS_PER_STEP`
    /// and `FSMKIT_STOP_AT_TICK`. Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("FSMKIT_HALT_ON_ERROR") {
            config.halt_on_action_error = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(limit) = env_number("FSMKIT_MAX_EVENTS_PER_STEP") {
            config.max_events_per_step = limit;
        }
        if let Some(tick) = env_number::<u64>("FSMKIT_STOP_AT_TICK") {
            config.stop_at_tick = Some(tick).filter(|t| *t > 0);
        }

        config
    }
}

fn env_number<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}

/// Lifecycle of the engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// Constructed or reset, no step taken yet
    Initialized,
    Running,
    PausedOnBreakpoint,
    /// Terminal until [`FsmSimulator::reset`]
    Halted,
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum QueuedEvent {
    Named(String),
    /// The sub-machine of the named superstate reached a final state
    Completion(String),
}

impl QueuedEvent {
    /// Named events match their own name. Completion events match only
    /// eventless transitions leaving the superstate that completed.
    fn matches(&self, source: &str, transition_event: Option<&str>) -> bool {
        match self {
            QueuedEvent::Named(name) => transition_event == Some(name.as_str()),
            QueuedEvent::Completion(owner) => transition_event.is_none() && owner == source,
        }
    }

    fn label(&self) -> &str {
        match self {
            QueuedEvent::Named(name) => name,
            QueuedEvent::Completion(_) => "completion",
        }
    }
}

/// `(source, target, event)` identifying a transition breakpoint
pub type TransitionKey = (String, String, Option<String>);

enum Dispatch {
    Unhandled,
    Taken,
    Paused,
}

// ============================================================================
// SIMULATOR
// ============================================================================

pub struct FsmSimulator {
    model: FsmModel,
    config: SimulatorConfig,
    variables: Variables,
    /// Index of each active state within the model that owns it, outermost first
    path: Vec<usize>,
    queue: VecDeque<QueuedEvent>,
    log: Vec<String>,
    state_breakpoints: BTreeSet<String>,
    transition_breakpoints: BTreeSet<TransitionKey>,
    /// Transition breakpoint that paused the run; it lets the transition
    /// through once after [`FsmSimulator::continue_simulation`]
    paused_transition: Option<TransitionKey>,
    resumed_transition: Option<TransitionKey>,
    tick: u64,
    paused: bool,
    halted: bool,
}

impl FsmSimulator {
    /// Build a simulator and enter the model's initial configuration.
    /// Fails with [`FsmError::NoStates`] for an empty model.
    pub fn new(model: FsmModel, config: SimulatorConfig) -> FsmResult<Self> {
        let state_breakpoints = config.breakpoints.iter().cloned().collect();
        let mut simulator = Self {
            model,
            config,
            variables: Variables::new(),
            path: Vec::new(),
            queue: VecDeque::new(),
            log: Vec::new(),
            state_breakpoints,
            transition_breakpoints: BTreeSet::new(),
            paused_transition: None,
            resumed_transition: None,
            tick: 0,
            paused: false,
            halted: false,
        };
        simulator.reset()?;
        Ok(simulator)
    }

    /// Parse raw diagram data and build a simulator for it
    pub fn from_diagram(raw: &serde_json::Value, name: &str, config: SimulatorConfig) -> FsmResult<Self> {
        Self::new(crate::parser::parse_diagram(raw, name), config)
    }

    /// Clear variables, log, queue and flags, then re-enter the initial
    /// configuration. Breakpoints are kept.
    pub fn reset(&mut self) -> FsmResult<()> {
        self.log.clear();
        self.variables.clear();
        self.queue.clear();
        self.path.clear();
        self.tick = 0;
        self.paused = false;
        self.halted = false;
        self.paused_transition = None;
        self.resumed_transition = None;
        self.log_action("Simulation variables reset.");

        let Some(initial) = initial_index(&self.model) else {
            self.halted = true;
            return Err(FsmError::NoStates(self.model.name.clone()));
        };
        info!("Starting simulation of '{}'", self.model.name);
        self.enter_state(0, initial)
    }

    /// Advance one tick, optionally delivering an external event.
    ///
    /// Returns the rendered current state and the log of this step. While
    /// halted or paused this changes nothing and returns whatever log is still
    /// buffered (empty on repeated calls). On error the step's log stays
    /// buffered for [`FsmSimulator::take_log`].
    pub fn step(&mut self, event: Option<&str>) -> FsmResult<(String, Vec<String>)> {
        if let Some(stop) = self.config.stop_at_tick {
            if self.tick >= stop && !self.halted {
                self.halted = true;
                info!("Simulation of '{}' reached stop tick {}", self.model.name, stop);
                self.log_action(format!("[HALT] Reached configured stop tick: {}", stop));
            }
        }
        if self.halted || self.paused {
            return Ok((self.get_current_state_name(), self.take_log()));
        }

        self.tick += 1;
        self.log.clear();
        self.queue.clear();

        let during = self.leaf_state().and_then(|s| s.during_action.clone());
        self.execute_action(during.as_ref())?;

        if let Some(event) = event.filter(|e| !e.is_empty()) {
            self.queue.push_front(QueuedEvent::Named(event.to_string()));
        }

        let limit = self.config.max_events_per_step;
        let mut processed = 0;
        while let Some(event) = self.queue.pop_front() {
            processed += 1;
            if processed > limit {
                self.halted = true;
                self.queue.clear();
                warn!("Event cascade in '{}' exceeded {} events", self.model.name, limit);
                self.log_action(format!(
                    "[HALT] More than {} events in one step; possible event cascade",
                    limit
                ));
                return Err(FsmError::EventCascade { limit });
            }
            if let Dispatch::Paused = self.dispatch(&event)? {
                break;
            }
        }
        self.resumed_transition = None;

        Ok((self.get_current_state_name(), self.take_log()))
    }

    /// Queue an internal event for the current step's drain
    pub fn send(&mut self, event: &str) {
        if event.is_empty() {
            return;
        }
        self.log_action(format!("Internal event '{}' sent.", event));
        self.queue.push_back(QueuedEvent::Named(event.to_string()));
    }

    /// Find and fire the first enabled transition for `event`, innermost level first
    fn dispatch(&mut self, event: &QueuedEvent) -> FsmResult<Dispatch> {
        for level in (0..self.path.len()).rev() {
            let (source, candidates) = {
                let model = self.owning_model(level);
                let source = model.states[self.path[level]].name.clone();
                let candidates: Vec<usize> = model
                    .transitions
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.source == source && event.matches(&source, t.event.as_deref()))
                    .map(|(index, _)| index)
                    .collect();
                (source, candidates)
            };

            for index in candidates {
                let condition = self.owning_model(level).transitions[index].condition.clone();
                if self.evaluate_condition(condition.as_ref()) {
                    return self.fire(level, index, event);
                }
            }
            debug!("No transition for '{}' from '{}'", event.label(), source);
        }
        Ok(Dispatch::Unhandled)
    }

    fn fire(&mut self, level: usize, index: usize, event: &QueuedEvent) -> FsmResult<Dispatch> {
        let transition = self.owning_model(level).transitions[index].clone();
        let key: TransitionKey = (
            transition.source.clone(),
            transition.target.clone(),
            transition.event.clone(),
        );

        if self.transition_breakpoints.contains(&key) && self.resumed_transition.as_ref() != Some(&key) {
            self.paused = true;
            self.log_action(format!(
                "BREAKPOINT HIT on transition from '{}' to '{}'",
                transition.source, transition.target
            ));
            self.paused_transition = Some(key);
            return Ok(Dispatch::Paused);
        }

        let Some(target) = self
            .owning_model(level)
            .states
            .iter()
            .position(|s| s.name == transition.target)
        else {
            self.halted = true;
            self.log_action(format!("[HALT] Target state '{}' not found.", transition.target));
            return Err(FsmError::TargetNotFound {
                from: transition.source,
                target: transition.target,
            });
        };

        self.log_action(format!(
            "Transition on '{}' from '{}' to '{}'",
            event.label(),
            transition.source,
            transition.target
        ));
        debug!(
            "Tick {}: {} --{}--> {}",
            self.tick,
            transition.source,
            event.label(),
            transition.target
        );

        while self.path.len() > level + 1 {
            self.exit_leaf()?;
        }
        self.run_exit_action()?;
        self.execute_action(transition.action.as_ref())?;
        self.path.pop();

        self.enter_state(level, target)?;

        let leaf = self.get_current_leaf_state_name();
        let hit = [transition.target.as_str(), leaf.as_str()]
            .into_iter()
            .find(|name| self.state_breakpoints.contains(*name))
            .map(str::to_string);
        if let Some(name) = hit {
            self.paused = true;
            self.log_action(format!("BREAKPOINT HIT at state {}", name));
            return Ok(Dispatch::Paused);
        }
        Ok(Dispatch::Taken)
    }

    /// Log, run the exit action of, and pop the innermost active state
    fn exit_leaf(&mut self) -> FsmResult<()> {
        self.run_exit_action()?;
        self.path.pop();
        Ok(())
    }

    fn run_exit_action(&mut self) -> FsmResult<()> {
        let Some(state) = self.leaf_state() else {
            return Ok(());
        };
        let (name, exit) = (state.name.clone(), state.exit_action.clone());
        self.log_action(format!("Exiting state: {}", name));
        self.execute_action(exit.as_ref())
    }

    /// Push the state at `index` of the model owning `level`, run its entry
    /// action and descend into its sub-machine's initial state
    fn enter_state(&mut self, level: usize, index: usize) -> FsmResult<()> {
        self.path.truncate(level);
        self.path.push(index);

        let (name, entry, is_final, sub_initial) = {
            let state = &self.owning_model(level).states[index];
            (
                state.name.clone(),
                state.entry_action.clone(),
                state.is_final,
                state.sub_model().and_then(initial_index),
            )
        };

        self.log_action(format!("Entering state: {}", name));
        self.execute_action(entry.as_ref())?;

        if is_final && level > 0 {
            let parent = self.owning_model(level - 1).states[self.path[level - 1]].name.clone();
            self.log_action(format!(
                "Sub-machine in '{}' reached final state. Queued completion event.",
                parent
            ));
            self.queue.push_back(QueuedEvent::Completion(parent));
        }

        if let Some(sub_index) = sub_initial {
            self.enter_state(level + 1, sub_index)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Snippet execution
    // ------------------------------------------------------------------------

    fn execute_action(&mut self, action: Option<&Action>) -> FsmResult<()> {
        let Some(action) = action.filter(|a| !a.is_empty()) else {
            return Ok(());
        };

        if !action.is_simulatable() {
            self.log_action(format!(
                "[SKIPPED] Action with language '{}' cannot be executed by the simulator.",
                action.language
            ));
            return Ok(());
        }

        if let Err(reason) = check_code_safety(&action.code) {
            warn!("Blocked unsafe action '{}': {}", action.code, reason);
            self.log_action(format!("[ACTION BLOCKED] {} in '{}'", reason, action.code));
            if self.config.halt_on_action_error {
                self.halted = true;
                return Err(FsmError::ActionBlocked {
                    code: action.code.clone(),
                    reason,
                });
            }
            return Ok(());
        }

        let result = script::execute(&action.code, &mut self.scope());
        if let Err(error) = result {
            warn!("Action '{}' failed: {}", action.code, error);
            self.log_action(format!("[CODE ERROR] {} in action '{}'", error, action.code));
            if self.config.halt_on_action_error {
                self.halted = true;
                return Err(FsmError::ActionFailed {
                    code: action.code.clone(),
                    error,
                });
            }
        }
        Ok(())
    }

    /// Guards never halt: blocked, skipped or failing guards are false
    fn evaluate_condition(&mut self, condition: Option<&Condition>) -> bool {
        let Some(condition) = condition.filter(|c| !c.is_empty()) else {
            return true;
        };

        if !condition.is_simulatable() {
            self.log_action(format!(
                "[SKIPPED] Condition with language '{}' cannot be evaluated by the simulator. Assuming False.",
                condition.language
            ));
            return false;
        }

        if let Err(reason) = check_code_safety(&condition.code) {
            warn!("Blocked unsafe condition '{}': {}", condition.code, reason);
            self.log_action(format!("[ACTION BLOCKED] {} in '{}'", reason, condition.code));
            return false;
        }

        match script::evaluate(&condition.code, &mut self.scope()) {
            Ok(value) => {
                let result = value.is_truthy();
                self.log_action(format!(
                    "Condition '{}' -> {}",
                    condition.code,
                    Value::Bool(result)
                ));
                result
            }
            Err(error) => {
                self.log_action(format!(
                    "[CODE ERROR] {} in condition '{}'",
                    error, condition.code
                ));
                false
            }
        }
    }

    fn scope(&mut self) -> ActionScope<'_> {
        ActionScope {
            variables: &mut self.variables,
            queue: &mut self.queue,
            log: &mut self.log,
            depth: self.path.len(),
            tick: self.tick,
        }
    }

    fn log_action(&mut self, message: impl AsRef<str>) {
        let line = format_log_line(self.path.len(), self.tick, message.as_ref());
        self.log.push(line);
    }

    // ------------------------------------------------------------------------
    // Model navigation
    // ------------------------------------------------------------------------

    /// The model whose `states` hold the active state at `level`
    fn owning_model(&self, level: usize) -> &FsmModel {
        let mut model = &self.model;
        for &index in &self.path[..level.min(self.path.len())] {
            match model.states[index].sub_model() {
                Some(sub) => model = sub,
                None => break,
            }
        }
        model
    }

    fn state_at(&self, level: usize) -> Option<&State> {
        let index = *self.path.get(level)?;
        self.owning_model(level).states.get(index)
    }

    fn leaf_state(&self) -> Option<&State> {
        self.state_at(self.path.len().checked_sub(1)?)
    }

    fn active_states(&self) -> impl Iterator<Item = (usize, &State)> {
        (0..self.path.len()).filter_map(move |level| self.state_at(level).map(|s| (level, s)))
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// The active path rendered as `"Outer (Inner (Leaf))"`
    pub fn get_current_state_name(&self) -> String {
        let names: Vec<&str> = self.active_states().map(|(_, s)| s.name.as_str()).collect();
        if names.is_empty() {
            return "Halted".to_string();
        }
        format!("{}{}", names.join(" ("), ")".repeat(names.len() - 1))
    }

    pub fn get_current_leaf_state_name(&self) -> String {
        self.leaf_state()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "Halted".to_string())
    }

    /// A copy of the variable environment
    pub fn get_variables(&self) -> Variables {
        self.variables.clone()
    }

    /// Events of transitions leaving the leaf state, in declaration order.
    /// Guards are not evaluated.
    pub fn get_possible_events_from_current_state(&self) -> Vec<String> {
        let Some(leaf) = self.leaf_state() else {
            return Vec::new();
        };
        let model = self.owning_model(self.path.len() - 1);
        let mut events: Vec<String> = Vec::new();
        for transition in model.transitions_from(&leaf.name) {
            if let Some(event) = &transition.event {
                if !events.contains(event) {
                    events.push(event.clone());
                }
            }
        }
        events
    }

    /// Events of transitions leaving any state on the active path, sorted
    pub fn get_active_events(&self) -> Vec<String> {
        let events: BTreeSet<String> = self
            .active_states()
            .flat_map(|(level, state)| {
                self.owning_model(level)
                    .transitions_from(&state.name)
                    .filter_map(|t| t.event.clone())
            })
            .collect();
        events.into_iter().collect()
    }

    pub fn status(&self) -> EngineState {
        if self.halted {
            EngineState::Halted
        } else if self.paused {
            EngineState::PausedOnBreakpoint
        } else if self.tick == 0 {
            EngineState::Initialized
        } else {
            EngineState::Running
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn model(&self) -> &FsmModel {
        &self.model
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Drain the buffered log
    pub fn take_log(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log)
    }

    // ------------------------------------------------------------------------
    // Host controls
    // ------------------------------------------------------------------------

    /// Replace the variable environment
    pub fn set_initial_variables(&mut self, variables: Variables) {
        self.variables = variables;
        let rendered: Vec<String> = self
            .variables
            .iter()
            .map(|(name, value)| format!("'{}': {}", name, value.repr()))
            .collect();
        self.log_action(format!("Initial variables set: {{{}}}", rendered.join(", ")));
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    /// `None` or `Some(0)` disables the stop tick
    pub fn set_stop_tick(&mut self, tick: Option<u64>) {
        self.config.stop_at_tick = tick.filter(|t| *t > 0);
    }

    pub fn add_state_breakpoint(&mut self, state: impl Into<String>) {
        self.state_breakpoints.insert(state.into());
    }

    pub fn remove_state_breakpoint(&mut self, state: &str) -> bool {
        self.state_breakpoints.remove(state)
    }

    pub fn add_transition_breakpoint(&mut self, source: &str, target: &str, event: Option<&str>) {
        self.transition_breakpoints
            .insert(transition_key(source, target, event));
    }

    pub fn remove_transition_breakpoint(&mut self, source: &str, target: &str, event: Option<&str>) -> bool {
        self.transition_breakpoints
            .remove(&transition_key(source, target, event))
    }

    /// Resume after a breakpoint. Returns false if the run was not paused.
    pub fn continue_simulation(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        self.paused = false;
        self.resumed_transition = self.paused_transition.take();
        true
    }
}

fn transition_key(source: &str, target: &str, event: Option<&str>) -> TransitionKey {
    (source.to_string(), target.to_string(), event.map(str::to_string))
}

/// First state flagged initial, else the first declared state
fn initial_index(model: &FsmModel) -> Option<usize> {
    model
        .states
        .iter()
        .position(|s| s.is_initial)
        .or_else(|| (!model.states.is_empty()).then_some(0))
}

fn format_log_line(depth: usize, tick: u64, message: &str) -> String {
    format!(
        "{}[Tick {}] {}",
        "[SUB] ".repeat(depth.saturating_sub(1)),
        tick,
        message
    )
}

/// What snippets see of a running simulator
struct ActionScope<'a> {
    variables: &'a mut Variables,
    queue: &'a mut VecDeque<QueuedEvent>,
    log: &'a mut Vec<String>,
    depth: usize,
    tick: u64,
}

impl ScriptHost for ActionScope<'_> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn send(&mut self, event: &str) {
        if event.is_empty() {
            return;
        }
        self.log.push(format_log_line(
            self.depth,
            self.tick,
            &format!("Internal event '{}' sent.", event),
        ));
        self.queue.push_back(QueuedEvent::Named(event.to_string()));
    }

    fn print(&mut self, text: &str) {
        self.log
            .push(format_log_line(self.depth, self.tick, &format!("[PRINT] {}", text)));
    }
}
