//! Text exporters: PlantUML, Mermaid and JSON diagram data
//!
//! These print names as they are; only multi-line snippets are rewritten,
//! with each line break becoming `"; "`.

use std::fmt::{self, Write};

use super::CodegenResult;
use crate::fsm::{Action, ActionKind, FsmModel, Transition};

const LINE_SEPARATOR: &str = "; ";

fn one_line(action: &Action) -> String {
    action.lines().collect::<Vec<_>>().join(LINE_SEPARATOR)
}

fn kind_label(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Entry => "entry",
        ActionKind::During => "during",
        ActionKind::Exit => "exit",
    }
}

/// `event [condition] <action_sep>action`, omitting absent parts
fn transition_label(t: &Transition, action_sep: &str) -> String {
    let mut parts = Vec::new();
    if let Some(event) = t.event.as_deref().filter(|e| !e.trim().is_empty()) {
        parts.push(event.to_string());
    }
    if let Some(condition) = t.condition.as_ref().filter(|c| !c.is_empty()) {
        parts.push(format!("[{}]", one_line(condition)));
    }
    if let Some(action) = t.action.as_ref().filter(|a| !a.is_empty()) {
        parts.push(format!("{action_sep}{}", one_line(action)));
    }
    parts.join(" ")
}

pub fn generate_plantuml(model: &FsmModel) -> CodegenResult<String> {
    let mut out = String::new();
    writeln!(out, "@startuml")?;
    writeln!(out, "hide empty description")?;
    plantuml_body(&mut out, model, "")?;
    writeln!(out, "@enduml")?;
    Ok(out)
}

fn plantuml_body(out: &mut String, model: &FsmModel, indent: &str) -> fmt::Result {
    if let Some(initial) = model.initial_state() {
        writeln!(out, "{indent}[*] --> {}", initial.name)?;
    }

    for state in &model.states {
        match state.sub_model() {
            Some(sub) => {
                writeln!(out, "{indent}state {} {{", state.name)?;
                plantuml_body(out, sub, &format!("{indent}  "))?;
                writeln!(out, "{indent}}}")?;
            }
            None => writeln!(out, "{indent}state {}", state.name)?,
        }
        for (kind, action) in state.actions().filter(|(_, a)| !a.is_empty()) {
            writeln!(
                out,
                "{indent}{} : {} / {}",
                state.name,
                kind_label(kind),
                one_line(action)
            )?;
        }
        if state.is_final {
            writeln!(out, "{indent}{} --> [*]", state.name)?;
        }
    }

    for t in &model.transitions {
        let label = transition_label(t, "/ ");
        if label.is_empty() {
            writeln!(out, "{indent}{} --> {}", t.source, t.target)?;
        } else {
            writeln!(out, "{indent}{} --> {} : {label}", t.source, t.target)?;
        }
    }
    Ok(())
}

pub fn generate_mermaid(model: &FsmModel) -> CodegenResult<String> {
    let mut out = String::new();
    writeln!(out, "stateDiagram-v2")?;
    mermaid_body(&mut out, model, "    ")?;
    Ok(out)
}

fn mermaid_body(out: &mut String, model: &FsmModel, indent: &str) -> fmt::Result {
    if let Some(initial) = model.initial_state() {
        writeln!(out, "{indent}[*] --> {}", initial.name)?;
    }

    for state in &model.states {
        if let Some(sub) = state.sub_model() {
            writeln!(out, "{indent}state {} {{", state.name)?;
            mermaid_body(out, sub, &format!("{indent}    "))?;
            writeln!(out, "{indent}}}")?;
        }
        let actions: Vec<String> = state
            .actions()
            .filter(|(_, a)| !a.is_empty())
            .map(|(kind, a)| format!("{}: {}", kind_label(kind), one_line(a)))
            .collect();
        if !actions.is_empty() {
            writeln!(out, "{indent}{} : {}", state.name, actions.join("<br>"))?;
        } else if state.sub_model().is_none() {
            writeln!(out, "{indent}{}", state.name)?;
        }
        if state.is_final {
            writeln!(out, "{indent}{} --> [*]", state.name)?;
        }
    }

    for t in &model.transitions {
        let label = transition_label(t, "/");
        if label.is_empty() {
            writeln!(out, "{indent}{} --> {}", t.source, t.target)?;
        } else {
            writeln!(out, "{indent}{} --> {} : {label}", t.source, t.target)?;
        }
    }
    Ok(())
}

/// Pretty-printed diagram data, readable back with `parse_diagram_str`
pub fn generate_json(model: &FsmModel) -> CodegenResult<String> {
    let mut text = serde_json::to_string_pretty(&model.to_diagram_data())?;
    text.push('\n');
    Ok(text)
}
