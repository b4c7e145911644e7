//! End-to-end simulation scenarios driven from raw diagram data

use serde_json::json;

use fsmkit::safety::is_code_safe;
use fsmkit::{
    check_code_safety, parse_diagram, EngineState, FsmError, FsmSimulator, SimulatorConfig, Value,
};

fn simulator(raw: serde_json::Value) -> FsmSimulator {
    FsmSimulator::from_diagram(&raw, "Scenario", SimulatorConfig::default()).unwrap()
}

fn toggle() -> serde_json::Value {
    json!({
        "states": [
            {"name": "Off", "is_initial": true, "entry_action": "is_on = False"},
            {"name": "On", "entry_action": "is_on = True"}
        ],
        "transitions": [
            {"source": "Off", "target": "On", "event": "toggle"},
            {"source": "On", "target": "Off", "event": "toggle"}
        ]
    })
}

fn hierarchical() -> serde_json::Value {
    json!({
        "states": [
            {"name": "Idle", "is_initial": true},
            {"name": "Processing", "is_superstate": true, "sub_fsm_data": {
                "states": [
                    {"name": "SubIdle", "is_initial": true},
                    {"name": "SubActive"}
                ],
                "transitions": [
                    {"source": "SubIdle", "target": "SubActive", "event": "work"}
                ]
            }}
        ],
        "transitions": [
            {"source": "Idle", "target": "Processing", "event": "start"}
        ]
    })
}

#[test]
fn toggle_switch_round_trip() {
    let mut sim = simulator(toggle());

    let (state, _) = sim.step(Some("toggle")).unwrap();
    assert_eq!(state, "On");
    assert_eq!(sim.get_variables()["is_on"], Value::Bool(true));

    let (state, _) = sim.step(Some("toggle")).unwrap();
    assert_eq!(state, "Off");
    assert_eq!(sim.get_variables()["is_on"], Value::Bool(false));
}

#[test]
fn guarded_transition_waits_for_condition() {
    let mut sim = simulator(json!({
        "states": [{"name": "A", "is_initial": true}, {"name": "B"}],
        "transitions": [
            {"source": "A", "target": "B", "event": "go", "condition": "x > 5", "action": "y = 10"}
        ]
    }));

    sim.set_variable("x", Value::Int(3));
    let (state, _) = sim.step(Some("go")).unwrap();
    assert_eq!(state, "A");
    assert!(!sim.get_variables().contains_key("y"));

    sim.set_variable("x", Value::Int(10));
    let (state, _) = sim.step(Some("go")).unwrap();
    assert_eq!(state, "B");
    assert_eq!(sim.get_variables()["y"], Value::Int(10));
}

#[test]
fn hierarchical_states_render_their_path() {
    let mut sim = simulator(hierarchical());
    assert_eq!(sim.get_current_state_name(), "Idle");

    let (state, _) = sim.step(Some("start")).unwrap();
    assert_eq!(state, "Processing (SubIdle)");

    let (state, _) = sim.step(Some("work")).unwrap();
    assert_eq!(state, "Processing (SubActive)");
    assert_eq!(sim.get_current_leaf_state_name(), "SubActive");
}

#[test]
fn first_declared_state_is_initial_at_every_level() {
    let mut sim = simulator(json!({
        "states": [
            {"name": "Outer", "is_superstate": true, "sub_fsm_data": {
                "states": [{"name": "First"}, {"name": "Second"}]
            }},
            {"name": "Other"}
        ]
    }));
    assert_eq!(sim.get_current_state_name(), "Outer (First)");
    assert_eq!(sim.step(None).unwrap().0, "Outer (First)");
}

#[test]
fn first_matching_transition_wins() {
    let mut sim = simulator(json!({
        "states": [{"name": "A", "is_initial": true}, {"name": "B"}, {"name": "C"}],
        "transitions": [
            {"source": "A", "target": "B", "event": "go", "condition": "level > 10"},
            {"source": "A", "target": "C", "event": "go", "condition": "level > 0"}
        ]
    }));
    sim.set_variable("level", Value::Int(50));
    assert_eq!(sim.step(Some("go")).unwrap().0, "B");

    let mut sim = simulator(json!({
        "states": [{"name": "A", "is_initial": true}, {"name": "B"}, {"name": "C"}],
        "transitions": [
            {"source": "A", "target": "B", "event": "go", "condition": "level > 10"},
            {"source": "A", "target": "C", "event": "go", "condition": "level > 0"}
        ]
    }));
    sim.set_variable("level", Value::Int(5));
    assert_eq!(sim.step(Some("go")).unwrap().0, "C");
}

#[test]
fn identical_runs_produce_identical_logs() {
    let run = || {
        let mut sim = simulator(toggle());
        let mut logs = sim.take_log();
        for event in ["toggle", "noise", "toggle", "toggle"] {
            let (state, log) = sim.step(Some(event)).unwrap();
            logs.push(state);
            logs.extend(log);
        }
        (logs, sim.get_variables())
    };
    assert_eq!(run(), run());
}

#[test]
fn halted_engine_ignores_steps() {
    let config = SimulatorConfig {
        halt_on_action_error: true,
        ..SimulatorConfig::default()
    };
    let raw = json!({
        "states": [
            {"name": "A", "is_initial": true},
            {"name": "B", "entry_action": "value = 1 / 0"}
        ],
        "transitions": [{"source": "A", "target": "B", "event": "go"}]
    });
    let mut sim = FsmSimulator::from_diagram(&raw, "Halting", config).unwrap();

    let err = sim.step(Some("go")).unwrap_err();
    assert!(matches!(err, FsmError::ActionFailed { .. }));
    assert_eq!(sim.status(), EngineState::Halted);
    assert!(sim.take_log().iter().any(|line| line.contains("[CODE ERROR] ZeroDivisionError")));

    let first = sim.step(Some("go")).unwrap();
    assert!(first.1.is_empty());
    assert_eq!(sim.step(Some("go")).unwrap(), first);
}

#[test]
fn missing_target_is_fatal() {
    let mut sim = simulator(json!({
        "states": [{"name": "A", "is_initial": true}],
        "transitions": [{"source": "A", "target": "Ghost", "event": "go"}]
    }));
    let err = sim.step(Some("go")).unwrap_err();
    assert!(matches!(err, FsmError::TargetNotFound { .. }));
    assert!(sim.is_halted());
    assert_eq!(sim.get_current_state_name(), "A");
}

#[test]
fn empty_diagram_cannot_be_simulated() {
    let model = parse_diagram(&json!({"states": []}), "Empty");
    assert!(matches!(
        FsmSimulator::new(model, SimulatorConfig::default()),
        Err(FsmError::NoStates(_))
    ));
}

#[test]
fn safety_checker_deny_list() {
    for code in [
        "open('x')",
        "eval('1')",
        "__import__('os')",
        "x.__class__",
        "import os",
    ] {
        assert!(check_code_safety(code).is_err(), "{code} should be rejected");
    }
    for code in ["count = count + 1", "print(count * 2)", "y = max(a, b)"] {
        assert!(is_code_safe(code), "{code} should be accepted");
    }
}
