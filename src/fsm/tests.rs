//! Unit tests for the FSM data structures

use crate::fsm::{Action, ActionKind, Comment, FsmModel, State, Transition, GENERIC_SIMULATION_LANGUAGE};

#[test]
fn test_fsm_model_new() {
    let fsm = FsmModel::new("TestMachine");
    assert_eq!(fsm.name, "TestMachine");
    assert!(fsm.states.is_empty());
    assert!(fsm.transitions.is_empty());
    assert!(fsm.comments.is_empty());
    assert!(fsm.initial_state().is_none());
}

#[test]
fn test_default_model_name() {
    assert_eq!(FsmModel::default().name, "UntitledFSM");
}

#[test]
fn test_state_new() {
    let state = State::new("Idle");
    assert_eq!(state.name, "Idle");
    assert!(!state.is_initial);
    assert!(!state.is_superstate);
    assert!(state.entry_action.is_none());
    assert!(state.sub_model().is_none());
}

#[test]
fn test_initial_state_prefers_flagged() {
    let mut fsm = FsmModel::new("Test");
    fsm.add_state(State::new("A"));
    fsm.add_state(State::new("B").initial());
    fsm.add_state(State::new("C").initial());
    assert_eq!(fsm.initial_state().unwrap().name, "B");
}

#[test]
fn test_initial_state_falls_back_to_first() {
    let mut fsm = FsmModel::new("Test");
    fsm.add_state(State::new("First"));
    fsm.add_state(State::new("Second"));
    assert_eq!(fsm.initial_state().unwrap().name, "First");
}

#[test]
fn test_add_state_replaces_in_place() {
    let mut fsm = FsmModel::new("Test");
    fsm.add_state(State::new("A"));
    fsm.add_state(State::new("B"));
    let old = fsm.add_state(State::new("A").initial());
    assert!(old.is_some());
    assert_eq!(fsm.states.len(), 2);
    assert_eq!(fsm.states[0].name, "A");
    assert!(fsm.states[0].is_initial);
}

#[test]
fn test_sub_model_requires_superstate_flag() {
    let mut state = State::new("Outer").with_sub_fsm(FsmModel::new("Inner"));
    assert!(state.sub_model().is_some());
    state.is_superstate = false;
    assert!(state.sub_model().is_none());
}

#[test]
fn test_state_actions_order() {
    let state = State::new("S")
        .with_exit(Action::new("c = 3"))
        .with_entry(Action::new("a = 1"))
        .with_during(Action::new("b = 2"));
    let kinds: Vec<ActionKind> = state.actions().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec![ActionKind::Entry, ActionKind::During, ActionKind::Exit]);
    assert_eq!(ActionKind::During.field_name(), "during_action");
}

#[test]
fn test_transition_label() {
    let t1 = Transition::new("A", "B").with_event("Click");
    assert_eq!(t1.label(), "Click");

    let t2 = Transition::new("A", "B")
        .with_event("Submit")
        .with_condition(Action::new("is_valid"));
    assert_eq!(t2.label(), "Submit [is_valid]");

    let t3 = Transition::new("A", "B")
        .with_event("Go")
        .with_action(Action::new("count += 1"));
    assert_eq!(t3.label(), "Go / count += 1");
}

#[test]
fn test_transitions_from_keeps_order() {
    let mut fsm = FsmModel::new("Test");
    fsm.transitions.push(Transition::new("A", "B").with_event("x"));
    fsm.transitions.push(Transition::new("B", "A").with_event("y"));
    fsm.transitions.push(Transition::new("A", "C").with_event("x"));
    let targets: Vec<&str> = fsm.transitions_from("A").map(|t| t.target.as_str()).collect();
    assert_eq!(targets, vec!["B", "C"]);
}

#[test]
fn test_collect_events_sorted_and_deduplicated() {
    let mut fsm = FsmModel::new("Test");
    fsm.transitions.push(Transition::new("A", "B").with_event("Event2"));
    fsm.transitions.push(Transition::new("B", "C").with_event("Event1"));
    fsm.transitions.push(Transition::new("C", "A").with_event("Event2"));
    fsm.transitions.push(Transition::new("C", "A"));
    assert_eq!(fsm.collect_events(), vec!["Event1", "Event2"]);
}

#[test]
fn test_validation_reports_missing_states() {
    let mut fsm = FsmModel::new("Test");
    fsm.add_state(State::new("Idle"));
    fsm.transitions.push(Transition::new("Idle", "Nowhere").with_event("go"));
    let errors = fsm.validate().unwrap_err();
    assert!(errors.iter().any(|e| e.contains("Nowhere")));
}

#[test]
fn test_validation_recurses_into_sub_fsm() {
    let mut inner = FsmModel::new("Inner");
    inner.add_state(State::new("X"));
    inner.transitions.push(Transition::new("X", "Ghost").with_event("e"));
    let mut fsm = FsmModel::new("Outer");
    fsm.add_state(State::new("Parent").with_sub_fsm(inner));
    let errors = fsm.validate().unwrap_err();
    assert!(errors.iter().any(|e| e.starts_with("Parent:") && e.contains("Ghost")));
}

#[test]
fn test_validation_valid() {
    let mut fsm = FsmModel::new("Test");
    fsm.add_state(State::new("Idle").initial());
    fsm.add_state(State::new("Active"));
    fsm.transitions.push(Transition::new("Idle", "Active").with_event("Start"));
    assert!(fsm.validate().is_ok());
}

#[test]
fn test_action_language_and_lines() {
    let action = Action::new("a = 1\n\n   b = 2  ");
    assert_eq!(action.language, GENERIC_SIMULATION_LANGUAGE);
    assert!(action.is_simulatable());
    assert_eq!(action.lines().collect::<Vec<_>>(), vec!["a = 1", "b = 2"]);

    let c_action = Action::with_language("C", "led_on();");
    assert!(!c_action.is_simulatable());
    assert!(Action::new("   ").is_empty());
}

#[test]
fn test_comment_new() {
    let comment = Comment::new("remember the watchdog");
    assert_eq!(comment.text, "remember the watchdog");
    assert!(comment.properties.is_empty());
}
