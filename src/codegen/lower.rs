//! Language-independent lowering of a model into the shape every emitter renders:
//! sanitized state and event names, transitions grouped by source state and
//! resolved to state indices.

use log::warn;

use super::ident::IdentStyle;
use super::{CodegenError, CodegenResult};
use crate::fsm::{FsmModel, State, Transition};

#[derive(Debug)]
pub struct LoweredFsm<'m> {
    /// Name as passed by the caller
    pub name: String,
    /// `name` sanitized for the target language
    pub ident: String,
    pub states: Vec<LoweredState<'m>>,
    /// Sanitized event names, sorted and unique
    pub events: Vec<String>,
    /// Index into `states`
    pub initial: usize,
}

#[derive(Debug)]
pub struct LoweredState<'m> {
    pub state: &'m State,
    pub ident: String,
    /// Outgoing transitions in declaration order
    pub transitions: Vec<LoweredTransition<'m>>,
}

#[derive(Debug)]
pub struct LoweredTransition<'m> {
    pub transition: &'m Transition,
    /// Raw event name
    pub event: &'m str,
    /// Sanitized event name, one of `LoweredFsm::events`
    pub event_ident: String,
    /// Index into `LoweredFsm::states`
    pub target: usize,
}

impl<'m> LoweredFsm<'m> {
    pub fn initial_state(&self) -> &LoweredState<'m> {
        &self.states[self.initial]
    }

    /// Number of bits needed to encode every state, at least one
    pub fn state_bits(&self) -> u32 {
        let max_code = self.states.len().saturating_sub(1);
        (usize::BITS - max_code.leading_zeros()).max(1)
    }
}

/// Lower the top level of `model`. Transitions without an event, or whose
/// source or target is unknown, are skipped with a warning.
pub fn lower<'m>(model: &'m FsmModel, name: &str, style: &IdentStyle) -> CodegenResult<LoweredFsm<'m>> {
    if model.states.is_empty() {
        return Err(CodegenError::NoStates);
    }

    let mut states: Vec<LoweredState<'m>> = model
        .states
        .iter()
        .map(|state| LoweredState {
            state,
            ident: style.sanitize(&state.name),
            transitions: Vec::new(),
        })
        .collect();

    let initial = model
        .states
        .iter()
        .position(|s| s.is_initial)
        .unwrap_or(0);

    let index_of = |name: &str| model.states.iter().position(|s| s.name == name);

    let mut events = Vec::new();
    for transition in &model.transitions {
        let event = match transition.event.as_deref().map(str::trim) {
            Some(event) if !event.is_empty() => event,
            _ => {
                warn!(
                    "Skipping transition '{}' -> '{}': no triggering event",
                    transition.source, transition.target
                );
                continue;
            }
        };
        let (Some(source), Some(target)) = (index_of(&transition.source), index_of(&transition.target)) else {
            warn!(
                "Skipping transition '{}' -> '{}': unknown state",
                transition.source, transition.target
            );
            continue;
        };

        let event_ident = style.sanitize(event);
        events.push(event_ident.clone());
        states[source].transitions.push(LoweredTransition {
            transition,
            event,
            event_ident,
            target,
        });
    }
    events.sort();
    events.dedup();

    Ok(LoweredFsm {
        name: name.to_string(),
        ident: style.sanitize(name),
        states,
        events,
        initial,
    })
}
