//! FSM Data Structures
//! Language-agnostic intermediate representation shared by the simulator and the code generators

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(test)]
mod tests;

/// Language tag of snippets the built-in simulator executes.
/// Snippets tagged with anything else are carried through for code generators only.
pub const GENERIC_SIMULATION_LANGUAGE: &str = "Python (Generic Simulation)";

/// Extra diagram fields (position, color, ...) preserved losslessly
pub type Properties = Map<String, Value>;

/// A complete FSM model, possibly owning nested sub-machines through its states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsmModel {
    /// Name of the FSM
    pub name: String,
    /// All states, in declaration order. Names are unique.
    pub states: Vec<State>,
    /// All transitions, in declaration order (first match wins)
    pub transitions: Vec<Transition>,
    /// Diagram notes
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl FsmModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            transitions: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Look up a state by name
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    /// The state the machine starts in: the first state flagged initial,
    /// otherwise the first declared state.
    pub fn initial_state(&self) -> Option<&State> {
        self.states
            .iter()
            .find(|s| s.is_initial)
            .or_else(|| self.states.first())
    }

    /// Insert a state, replacing an existing one of the same name in place.
    /// Returns the replaced state.
    pub fn add_state(&mut self, state: State) -> Option<State> {
        match self.states.iter_mut().find(|s| s.name == state.name) {
            Some(existing) => Some(std::mem::replace(existing, state)),
            None => {
                self.states.push(state);
                None
            }
        }
    }

    /// Transitions leaving `source`, in declaration order
    pub fn transitions_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Transition> {
        self.transitions.iter().filter(move |t| t.source == source)
    }

    /// Get all unique event names from transitions, sorted
    pub fn collect_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self
            .transitions
            .iter()
            .filter_map(|t| t.event.clone())
            .collect();

        events.sort();
        events.dedup();
        events
    }

    /// Structural diagnostics. The parser never rejects a model; hosts call this
    /// to surface problems before a simulation run trips over them.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.states.is_empty() {
            errors.push(format!("FSM '{}' has no states", self.name));
        }

        for (i, state) in self.states.iter().enumerate() {
            if self.states[..i].iter().any(|s| s.name == state.name) {
                errors.push(format!("Duplicate state name '{}'", state.name));
            }
            if state.is_superstate && state.sub_fsm.is_none() {
                errors.push(format!("Superstate '{}' has no sub-machine", state.name));
            }
        }

        for transition in &self.transitions {
            if self.state(&transition.source).is_none() {
                errors.push(format!(
                    "Transition source state '{}' not found",
                    transition.source
                ));
            }
            if self.state(&transition.target).is_none() {
                errors.push(format!(
                    "Transition target state '{}' not found",
                    transition.target
                ));
            }
        }

        for state in &self.states {
            if let Some(sub) = &state.sub_fsm {
                if let Err(sub_errors) = sub.validate() {
                    errors.extend(
                        sub_errors
                            .into_iter()
                            .map(|e| format!("{}: {}", state.name, e)),
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for FsmModel {
    fn default() -> Self {
        Self::new("UntitledFSM")
    }
}

/// A state in the FSM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// State name, unique within the owning model
    pub name: String,
    #[serde(default)]
    pub is_initial: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_superstate: bool,
    #[serde(default)]
    pub description: String,
    /// Runs once when the state is entered
    pub entry_action: Option<Action>,
    /// Runs on every step while this is the active leaf
    pub during_action: Option<Action>,
    /// Runs once when the state is left
    pub exit_action: Option<Action>,
    #[serde(default)]
    pub properties: Properties,
    /// For hierarchical states: the owned nested FSM
    pub sub_fsm: Option<Box<FsmModel>>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_initial: false,
            is_final: false,
            is_superstate: false,
            description: String::new(),
            entry_action: None,
            during_action: None,
            exit_action: None,
            properties: Properties::new(),
            sub_fsm: None,
        }
    }

    pub fn initial(mut self) -> Self {
        self.is_initial = true;
        self
    }

    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn with_entry(mut self, action: Action) -> Self {
        self.entry_action = Some(action);
        self
    }

    pub fn with_during(mut self, action: Action) -> Self {
        self.during_action = Some(action);
        self
    }

    pub fn with_exit(mut self, action: Action) -> Self {
        self.exit_action = Some(action);
        self
    }

    /// Turn this state into a superstate owning `sub_fsm`
    pub fn with_sub_fsm(mut self, sub_fsm: FsmModel) -> Self {
        self.is_superstate = true;
        self.sub_fsm = Some(Box::new(sub_fsm));
        self
    }

    /// The nested model, if this is a superstate that has one
    pub fn sub_model(&self) -> Option<&FsmModel> {
        if self.is_superstate {
            self.sub_fsm.as_deref()
        } else {
            None
        }
    }

    /// Entry, during and exit actions in that order, with their kind label
    pub fn actions(&self) -> impl Iterator<Item = (ActionKind, &Action)> {
        [
            (ActionKind::Entry, self.entry_action.as_ref()),
            (ActionKind::During, self.during_action.as_ref()),
            (ActionKind::Exit, self.exit_action.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, action)| action.map(|a| (kind, a)))
    }
}

/// Which state hook an action is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Entry,
    During,
    Exit,
}

impl ActionKind {
    /// Diagram field name of this hook
    pub fn field_name(self) -> &'static str {
        match self {
            ActionKind::Entry => "entry_action",
            ActionKind::During => "during_action",
            ActionKind::Exit => "exit_action",
        }
    }
}

/// A transition between states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Source state name
    pub source: String,
    /// Target state name
    pub target: String,
    /// Triggering event; `None` for completion transitions
    pub event: Option<String>,
    /// Guard condition
    pub condition: Option<Condition>,
    /// Action to execute
    pub action: Option<Action>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Transition {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            event: None,
            condition: None,
            action: None,
            description: String::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Format transition label for display
    pub fn label(&self) -> String {
        let mut parts = Vec::new();

        if let Some(ref event) = self.event {
            parts.push(event.clone());
        }

        if let Some(ref condition) = self.condition {
            parts.push(format!("[{}]", condition.code));
        }

        if let Some(ref action) = self.action {
            parts.push(format!("/ {}", action.code));
        }

        parts.join(" ")
    }
}

/// A piece of code tagged with the language it is written in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub language: String,
    pub code: String,
}

impl Action {
    /// An action in the generic simulation language
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            language: GENERIC_SIMULATION_LANGUAGE.to_string(),
            code: code.into(),
        }
    }

    pub fn with_language(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }

    /// Whether the built-in simulator can run this snippet
    pub fn is_simulatable(&self) -> bool {
        self.language == GENERIC_SIMULATION_LANGUAGE
    }

    pub fn is_empty(&self) -> bool {
        self.code.trim().is_empty()
    }

    /// Non-blank lines of the snippet, trimmed
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.code.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// A guard expression. Structurally identical to [`Action`]; evaluated as a boolean.
pub type Condition = Action;

/// A note on the diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            properties: Properties::new(),
        }
    }
}
