//! Unit tests for the code generators

use crate::codegen::ident::{self, pascal_case, unique_name};
use crate::codegen::lower::lower;
use crate::codegen::{
    generate, generate_c, generate_json, generate_mermaid, generate_plantuml, generate_python,
    generate_verilog, generate_vhdl, CodegenError, CodegenTarget,
};
use crate::fsm::{Action, FsmModel, State, Transition};
use crate::parser::parse_diagram_str;

fn toggle_model() -> FsmModel {
    let mut model = FsmModel::new("ToggleSwitch");
    model.states.push(State::new("Off").initial().with_entry(Action::new("is_on = False")));
    model.states.push(State::new("On").with_entry(Action::new("is_on = True")));
    model.transitions.push(Transition::new("Off", "On").with_event("toggle"));
    model.transitions.push(Transition::new("On", "Off").with_event("toggle"));
    model
}

fn c_model() -> FsmModel {
    let mut model = FsmModel::new("Heater");
    model.states.push(
        State::new("Idle")
            .initial()
            .with_exit(Action::with_language("C", "led_off();")),
    );
    model.states.push(
        State::new("Heating")
            .with_entry(Action::with_language("C", "heater_on();\nled_on();"))
            .with_during(Action::with_language("C", "read_temp();")),
    );
    model.transitions.push(
        Transition::new("Idle", "Heating")
            .with_event("start")
            .with_condition(Action::with_language("C", "temp < 20")),
    );
    model.transitions.push(
        Transition::new("Idle", "Heating")
            .with_event("force")
            .with_action(Action::with_language("C", "log_force();")),
    );
    model.transitions.push(Transition::new("Heating", "Idle").with_event("stop"));
    model.transitions.push(Transition::new("Heating", "Idle"));
    model
}

#[test]
fn test_c_identifiers() {
    assert_eq!(ident::C.sanitize("State Name 1"), "State_Name_1");
    assert_eq!(ident::C.sanitize("1_State"), "s_1_State");
    assert_eq!(ident::C.sanitize("My-State.Name"), "My_State_Name");
    assert_eq!(ident::C.sanitize("if"), "fsm_if");
    assert_eq!(ident::C.sanitize("class"), "fsm_class");
    assert_eq!(ident::C.sanitize("some_var(copy)"), "some_var_copy");
    assert_eq!(ident::C.sanitize(""), "s_Unnamed");
    assert_eq!(ident::C.sanitize("____"), "s_SanitizedEmpty");
}

#[test]
fn test_hdl_identifiers() {
    assert_eq!(ident::VHDL.sanitize("Motor On"), "motor_on");
    assert_eq!(ident::VHDL.sanitize("On"), "fsm_on");
    assert_eq!(ident::VHDL.sanitize("3phase"), "fsm_3phase");
    assert_eq!(ident::VHDL.sanitize(""), "fsm_unnamed");

    assert_eq!(ident::VERILOG.sanitize("Motor On"), "Motor_On");
    assert_eq!(ident::VERILOG.sanitize("a$b"), "a$b");
    assert_eq!(ident::VERILOG.sanitize("$a"), "fsm_$a");
    assert_eq!(ident::VERILOG.sanitize("module"), "fsm_module");
}

#[test]
fn test_python_identifiers() {
    assert_eq!(ident::PYTHON.sanitize("class"), "class_");
    assert_eq!(ident::PYTHON.sanitize("None"), "None_");
    assert_eq!(ident::PYTHON.sanitize("2nd"), "s_2nd");
    assert_eq!(ident::PYTHON.sanitize("a  b"), "a_b");
    assert_eq!(ident::PYTHON.sanitize("___"), "s_sanitized_empty");

    let hashed = ident::PYTHON.sanitize("ÄÖÜ");
    assert!(hashed.starts_with("s_id_"));
    assert_eq!(hashed.len(), "s_id_".len() + 6);
    assert_eq!(hashed, ident::PYTHON.sanitize("ÄÖÜ"));
}

#[test]
fn test_pascal_case_and_unique_names() {
    assert_eq!(pascal_case("toggle_switch"), "ToggleSwitch");
    assert_eq!(pascal_case("traffic light"), "TrafficLight");
    assert_eq!(pascal_case("2way"), "S2way");

    let mut taken = Vec::new();
    assert_eq!(unique_name("go".into(), &mut taken), "go");
    assert_eq!(unique_name("go".into(), &mut taken), "go_2");
    assert_eq!(unique_name("go".into(), &mut taken), "go_3");
}

#[test]
fn test_lower_sorts_events_and_skips_eventless() {
    let model = c_model();
    let fsm = lower(&model, "Heater", &ident::C).unwrap();

    assert_eq!(fsm.events, vec!["force", "start", "stop"]);
    assert_eq!(fsm.initial, 0);
    assert_eq!(fsm.states[0].transitions.len(), 2);
    assert_eq!(fsm.states[1].transitions.len(), 1);
    assert_eq!(fsm.state_bits(), 1);
}

#[test]
fn test_lower_initial_falls_back_to_first_state() {
    let mut model = FsmModel::new("NoInitial");
    model.states.push(State::new("A"));
    model.states.push(State::new("B"));
    let fsm = lower(&model, "NoInitial", &ident::C).unwrap();
    assert_eq!(fsm.initial_state().ident, "A");

    model.states[1].is_initial = true;
    let fsm = lower(&model, "NoInitial", &ident::C).unwrap();
    assert_eq!(fsm.initial_state().ident, "B");
}

#[test]
fn test_lower_skips_unknown_states() {
    let mut model = toggle_model();
    model.transitions.push(Transition::new("Off", "Nowhere").with_event("lost"));
    let fsm = lower(&model, "t", &ident::C).unwrap();
    assert_eq!(fsm.events, vec!["toggle"]);
}

#[test]
fn test_state_bits() {
    let mut model = FsmModel::new("Bits");
    for i in 0..5 {
        model.states.push(State::new(format!("S{i}")));
    }
    assert_eq!(lower(&model, "b", &ident::VHDL).unwrap().state_bits(), 3);
}

#[test]
fn test_empty_model_is_an_error() {
    let model = FsmModel::new("Empty");
    for target in [
        CodegenTarget::C,
        CodegenTarget::Vhdl,
        CodegenTarget::Verilog,
        CodegenTarget::Python,
    ] {
        let err = generate(&model, "empty", target).unwrap_err();
        assert!(matches!(err, CodegenError::NoStates));
        assert_eq!(err.to_string(), "Cannot generate code: No states defined");
    }
}

#[test]
fn test_target_from_str() {
    assert_eq!("C".parse::<CodegenTarget>().unwrap(), CodegenTarget::C);
    assert_eq!("vhd".parse::<CodegenTarget>().unwrap(), CodegenTarget::Vhdl);
    assert_eq!("Verilog".parse::<CodegenTarget>().unwrap(), CodegenTarget::Verilog);
    assert_eq!("py".parse::<CodegenTarget>().unwrap(), CodegenTarget::Python);
    assert_eq!("mermaid".parse::<CodegenTarget>().unwrap(), CodegenTarget::Mermaid);
    assert!(matches!(
        "rust".parse::<CodegenTarget>(),
        Err(CodegenError::UnknownTarget(t)) if t == "rust"
    ));
    for target in CodegenTarget::ALL {
        assert_eq!(target.as_str().parse::<CodegenTarget>().unwrap(), target);
    }
}

#[test]
fn test_native_languages() {
    assert!(CodegenTarget::C.is_native("C"));
    assert!(CodegenTarget::C.is_native("Arduino (C++)"));
    assert!(!CodegenTarget::C.is_native("Python (Generic Simulation)"));
    assert!(CodegenTarget::Python.is_native("Python (Generic Simulation)"));
    assert!(CodegenTarget::Vhdl.is_native("VHDL"));
    assert!(!CodegenTarget::Verilog.is_native("VHDL"));
}

#[test]
fn test_c_file_names_and_guard() {
    let files = generate_c(&toggle_model(), "My Blinker").unwrap();
    let names: Vec<&String> = files.keys().collect();
    assert_eq!(names, vec!["My_Blinker.c", "My_Blinker.h", "My_Blinker_tb.c"]);

    let header = &files["My_Blinker.h"];
    assert!(header.contains("#ifndef FSM_MY_BLINKER_H"));
    assert!(header.contains("void My_Blinker_init(void);"));
    assert!(header.contains("    STATE_OFF,\n    STATE_ON,\n    FSM_STATE_COUNT"));
    assert!(header.contains("    EVENT_TOGGLE,\n    FSM_EVENT_COUNT"));
}

#[test]
fn test_c_native_actions_and_guards() {
    let files = generate_c(&c_model(), "heater").unwrap();
    let header = &files["heater.h"];
    let source = &files["heater.c"];

    assert!(header.contains(
        "void action_trans_Idle_to_Heating_force(void);\n\
         void during_action_Heating(void);\n\
         void entry_action_Heating(void);\n\
         void exit_action_Idle(void);\n"
    ));

    assert!(source.contains("        if ((event_id == EVENT_START) && (temp < 20)) {\n"));
    assert!(source.contains(
        "        } else if (event_id == EVENT_FORCE) {\n\
         \x20           exit_action_Idle();\n\
         \x20           action_trans_Idle_to_Heating_force();\n\
         \x20           next_state = STATE_HEATING;\n"
    ));
    assert!(source.contains("    case STATE_HEATING:\n        during_action_Heating();\n"));
    assert!(source.contains("void entry_action_Heating(void)\n{\n    heater_on();\n    led_on();\n}\n"));
    assert!(!source.contains("not translated"));
}

#[test]
fn test_c_foreign_actions_become_comments() {
    let mut model = toggle_model();
    model.states[1].entry_action = Some(Action::with_language("Verilog", "led <= 1'b1;"));
    let files = generate_c(&model, "toggle").unwrap();
    let source = &files["toggle.c"];
    assert!(source.contains("    // Verilog (not translated):\n    // led <= 1'b1;\n"));
}

#[test]
fn test_c_stubs_for_python_actions() {
    let mut model = toggle_model();
    model.states[1].entry_action = Some(Action::new(
        "is_on = True\ncount = -3\n# note\nbeep()\nint = 1\nprint(f'on at {current_tick}')",
    ));
    let files = generate_c(&model, "toggle").unwrap();
    let source = &files["toggle.c"];
    assert!(source.contains(
        "void entry_action_On(void)\n{\n\
         \x20   is_on = 1; // TODO: Declare variable\n\
         \x20   count = -3; // TODO: Declare variable\n\
         \x20   beep(); // TODO: Implement function\n\
         \x20   fsm_int = 1; // TODO: Declare variable\n\
         \x20   // TODO: Manually translate this action: print(f'on at {current_tick}')\n}\n"
    ));
    assert!(source.contains("void entry_action_Off(void)\n{\n    is_on = 0; // TODO: Declare variable\n}\n"));
    assert!(!source.contains("# note"));
}

#[test]
fn test_c_testbench() {
    let mut model = toggle_model();
    model.states[0].name = "Off \"idle\"".to_string();
    model.transitions[0].source = model.states[0].name.clone();
    model.transitions[1].target = model.states[0].name.clone();
    let files = generate_c(&model, "lamp").unwrap();
    let testbench = &files["lamp_tb.c"];

    assert!(testbench.contains("#include <stdio.h>\n#include \"lamp.h\"\n"));
    assert!(testbench.contains("    \"Off \\\"idle\\\"\",\n    \"On\",\n};"));
    assert!(testbench.contains("static const char *const event_names[FSM_EVENT_COUNT] = {\n    \"toggle\",\n};"));
    assert!(testbench.contains("    if (lamp_get_current_state() != STATE_OFF_IDLE) {\n"));
    assert!(testbench.contains("        lamp_dispatch((FSM_Event_t)event);\n"));
    assert!(testbench.ends_with("    printf(\"PASS\\n\");\n    return 0;\n}\n"));

    let mut silent = FsmModel::new("Still");
    silent.states.push(State::new("Only"));
    let files = generate_c(&silent, "still").unwrap();
    let testbench = &files["still_tb.c"];
    assert!(!testbench.contains("event_names"));
    assert!(!testbench.contains("still_dispatch"));
}

#[test]
fn test_vhdl_structure() {
    let files = generate_vhdl(&c_model(), "Heater Ctl").unwrap();
    let vhdl = &files["heater_ctl.vhd"];

    assert!(vhdl.contains("entity heater_ctl is"));
    assert!(vhdl.contains(
        "        force : in std_logic;\n        start : in std_logic;\n        stop : in std_logic;\n"
    ));
    assert!(vhdl.contains("    type state_t is (idle, heating);"));
    assert!(vhdl.contains("                        elsif force = '1' then\n"));
    assert!(vhdl.contains("                            -- guard not translated: temp < 20\n"));
    assert!(vhdl.ends_with("end architecture behavioral;\n"));
}

#[test]
fn test_vhdl_native_condition_is_inlined() {
    let mut model = toggle_model();
    model.transitions[0].condition = Some(Action::with_language("VHDL", "enable = '1'"));
    let files = generate_vhdl(&model, "t").unwrap();
    assert!(files["t.vhd"].contains("if toggle = '1' and (enable = '1') then"));
}

fn reset_model() -> FsmModel {
    let mut model = FsmModel::new("Runner");
    model.states.push(State::new("Idle").initial());
    model.states.push(State::new("Run"));
    model.transitions.push(Transition::new("Idle", "Run").with_event("start"));
    model.transitions.push(Transition::new("Run", "Idle").with_event("reset"));
    model
}

#[test]
fn test_hdl_event_named_like_a_fixed_port_is_renamed() {
    let files = generate_vhdl(&reset_model(), "runner").unwrap();
    let vhdl = &files["runner.vhd"];
    assert_eq!(vhdl.matches("reset : in std_logic").count(), 1);
    assert!(vhdl.contains("        reset_in : in std_logic;\n        start : in std_logic;\n"));
    assert!(vhdl.contains("                        if reset_in = '1' then\n"));

    let files = generate_verilog(&reset_model(), "runner").unwrap();
    let verilog = &files["runner.v"];
    assert_eq!(verilog.matches("input wire reset,").count(), 1);
    assert!(verilog.contains("    input wire reset_in,\n    input wire start,\n"));
    assert!(verilog.contains("                    if (reset_in) begin\n"));
}

#[test]
fn test_vhdl_event_named_like_a_state_is_renamed() {
    let mut model = FsmModel::new("Door");
    model.states.push(State::new("Closed").initial());
    model.states.push(State::new("Open_Door"));
    model.transitions.push(Transition::new("Closed", "Open_Door").with_event("open_door"));
    model.transitions.push(Transition::new("Open_Door", "Closed").with_event("closed"));

    let files = generate_vhdl(&model, "door").unwrap();
    let vhdl = &files["door.vhd"];
    assert!(vhdl.contains("    type state_t is (closed, open_door);"));
    assert!(vhdl.contains("        closed_in : in std_logic;\n        open_door_in : in std_logic;\n"));
    assert!(vhdl.contains("if open_door_in = '1' then"));
}

#[test]
fn test_hdl_native_guard_signals_become_ports() {
    let mut model = toggle_model();
    model.transitions[0].condition = Some(Action::with_language(
        "VHDL",
        "Sensor = '1' and not (enable = '0') and rising_edge(clk)",
    ));
    model.transitions[1].condition = Some(Action::with_language("Python", "level > 3"));
    let files = generate_vhdl(&model, "t").unwrap();
    let vhdl = &files["t.vhd"];
    assert!(vhdl.contains(
        "        reset : in std_logic;\n        enable : in std_logic;\n        sensor : in std_logic;\n        toggle : in std_logic;\n"
    ));
    assert!(!vhdl.contains("level : in"));
    assert!(!vhdl.contains("rising_edge : in"));

    let mut model = toggle_model();
    model.transitions[0].condition =
        Some(Action::with_language("Verilog", "door_closed && count == 8'hFF && !reset"));
    let files = generate_verilog(&model, "t").unwrap();
    let verilog = &files["t.v"];
    assert!(verilog.contains(
        "    input wire reset,\n    input wire count,\n    input wire door_closed,\n    input wire toggle,\n"
    ));
    assert!(!verilog.contains("input wire hFF"));
    assert!(verilog.contains("if (toggle && (door_closed && count == 8'hFF && !reset)) begin"));
}

#[test]
fn test_verilog_state_encoding() {
    let mut model = FsmModel::new("Seq");
    for name in ["A", "B", "C"] {
        model.states.push(State::new(name));
    }
    model.transitions.push(Transition::new("A", "B").with_event("next"));
    let files = generate_verilog(&model, "seq").unwrap();
    let verilog = &files["seq.v"];

    assert!(verilog.contains("    output reg [1:0] state_code\n"));
    assert!(verilog.contains("    localparam [1:0] STATE_C = 2'd2;\n"));
    assert!(verilog.contains("                STATE_B: begin\n                end\n"));
    assert!(verilog.contains("                default: state_code <= STATE_A;\n"));
}

#[test]
fn test_python_guards_and_actions() {
    let mut model = toggle_model();
    model.transitions[0].condition = Some(Action::new("power > 0"));
    model.transitions[0].action = Some(Action::new("count = count + 1"));
    model.states[1].exit_action = Some(Action::with_language("C", "beep();"));

    let files = generate_python(&model, "Toggle Switch").unwrap();
    let py = &files["toggle_switch.py"];

    assert!(py.contains("class ToggleSwitch:\n"));
    assert!(py.contains(
        "            if event == \"toggle\" and self._check(\"power > 0\"):\n\
         \x20               self._fire(self.STATE_ON, self.do_off_to_on_toggle)\n"
    ));
    assert!(py.contains("    def do_off_to_on_toggle(self):\n        self._run(\"count = count + 1\")\n"));
    assert!(py.contains(
        "    def on_exit_on(self):\n        # C (not translated):\n        # beep();\n        pass\n"
    ));
}

#[test]
fn test_python_escapes_strings() {
    let mut model = FsmModel::new("Quote");
    model
        .states
        .push(State::new("Say \"hi\"").with_entry(Action::new("msg = 'a'\nprint(msg)")));
    let files = generate_python(&model, "quote").unwrap();
    let py = &files["quote.py"];
    assert!(py.contains("    STATE_SAY_HI = \"Say \\\"hi\\\"\"\n"));
    assert!(py.contains("self._run(\"msg = 'a'\\nprint(msg)\")"));
}

#[test]
fn test_plantuml_output() {
    let mut model = toggle_model();
    model.transitions[0].condition = Some(Action::new("ready"));
    model.transitions[0].action = Some(Action::new("a = 1\nb = 2"));
    model.states[1].during_action = Some(Action::new("tick = tick + 1"));

    let text = generate_plantuml(&model).unwrap();
    assert_eq!(
        text,
        "@startuml\n\
         hide empty description\n\
         [*] --> Off\n\
         state Off\n\
         Off : entry / is_on = False\n\
         state On\n\
         On : entry / is_on = True\n\
         On : during / tick = tick + 1\n\
         Off --> On : toggle [ready] / a = 1; b = 2\n\
         On --> Off : toggle\n\
         @enduml\n"
    );
}

#[test]
fn test_mermaid_output() {
    let mut model = toggle_model();
    model.states[1].exit_action = Some(Action::new("x = 1\ny = 2"));
    model.transitions[1].action = Some(Action::new("count += 1"));
    model.states.push(State::new("Spare"));

    let text = generate_mermaid(&model).unwrap();
    assert_eq!(
        text,
        "stateDiagram-v2\n\
         \x20   [*] --> Off\n\
         \x20   Off : entry: is_on = False\n\
         \x20   On : entry: is_on = True<br>exit: x = 1; y = 2\n\
         \x20   Spare\n\
         \x20   Off --> On : toggle\n\
         \x20   On --> Off : toggle /count += 1\n"
    );
}

#[test]
fn test_text_exporters_nest_sub_machines() {
    let mut sub = FsmModel::new("Inner");
    sub.states.push(State::new("A").initial());
    sub.states.push(State::new("B").final_state());
    sub.transitions.push(Transition::new("A", "B").with_event("go"));

    let mut model = FsmModel::new("Outer");
    model.states.push(State::new("Top").initial().with_sub_fsm(sub));

    let puml = generate_plantuml(&model).unwrap();
    assert!(puml.contains("state Top {\n  [*] --> A\n  state A\n  state B\n  B --> [*]\n  A --> B : go\n}\n"));

    let mermaid = generate_mermaid(&model).unwrap();
    assert!(mermaid.contains(
        "    state Top {\n        [*] --> A\n        A\n        B\n        B --> [*]\n        A --> B : go\n    }\n"
    ));
}

#[test]
fn test_json_round_trips_through_parser() {
    let model = toggle_model();
    let text = generate_json(&model).unwrap();
    assert!(text.ends_with("}\n"));

    let parsed = parse_diagram_str(&text, "ToggleSwitch").unwrap();
    assert_eq!(parsed.to_diagram_data(), model.to_diagram_data());
    assert_eq!(parsed.states[0].entry_action, model.states[0].entry_action);
}

#[test]
fn test_generate_names_single_file_outputs() {
    let model = toggle_model();
    let files = generate(&model, "toggle switch", CodegenTarget::Mermaid).unwrap();
    assert!(files.contains_key("toggle_switch.mmd"));
    let files = generate(&model, "toggle switch", CodegenTarget::Json).unwrap();
    assert!(files.contains_key("toggle_switch.json"));
}

#[test]
fn test_output_is_deterministic() {
    let model = c_model();
    for target in CodegenTarget::ALL {
        let first = generate(&model, "heater", target).unwrap();
        let second = generate(&model, "heater", target).unwrap();
        assert_eq!(first, second);
    }
}
