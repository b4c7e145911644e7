//! Diagram Parser Module
//! Converts loosely-typed diagram data (nested JSON maps and arrays) into the FSM IR

use log::warn;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::fsm::{
    Action, Comment, Condition, FsmModel, Properties, State, Transition,
    GENERIC_SIMULATION_LANGUAGE,
};


/// Name given to a top-level model when the caller has none
pub const DEFAULT_FSM_NAME: &str = "UntitledFSM";

/// Sub-machines nested deeper than this are dropped with a warning
pub const MAX_SUB_FSM_DEPTH: usize = 64;

const STATE_FIELDS: &[&str] = &[
    "name",
    "is_initial",
    "is_final",
    "is_superstate",
    "description",
    "entry_action",
    "during_action",
    "exit_action",
    "sub_fsm_data",
    "action_language",
];

const TRANSITION_FIELDS: &[&str] = &[
    "source",
    "target",
    "event",
    "condition",
    "action",
    "description",
    "action_language",
];

const COMMENT_FIELDS: &[&str] = &["text"];

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid diagram JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Diagram data must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse raw diagram data into an FSM model.
///
/// Never fails: entries that are not objects or lack their key fields are
/// skipped with a warning. Transition endpoints are not checked against the
/// declared states; the simulator reports a missing target when it needs it.
pub fn parse_diagram(raw: &Value, name: &str) -> FsmModel {
    parse_at_depth(raw, name, 0)
}

/// Parse JSON text holding diagram data
pub fn parse_diagram_str(source: &str, name: &str) -> ParseResult<FsmModel> {
    let raw: Value = serde_json::from_str(source)?;
    if !raw.is_object() {
        return Err(ParseError::NotAnObject(json_kind(&raw)));
    }
    Ok(parse_diagram(&raw, name))
}

fn parse_at_depth(raw: &Value, name: &str, depth: usize) -> FsmModel {
    let mut fsm = FsmModel::new(name);

    let Some(diagram) = raw.as_object() else {
        warn!(
            "Diagram data for '{}' is a {}, not an object; producing an empty model",
            name,
            json_kind(raw)
        );
        return fsm;
    };

    for entry in entries(diagram, "states", name) {
        if let Some(state) = parse_state(entry, depth) {
            let state_name = state.name.clone();
            if fsm.add_state(state).is_some() {
                warn!("Duplicate state '{}' in '{}'; keeping the last definition", state_name, name);
            }
        }
    }

    for entry in entries(diagram, "transitions", name) {
        if let Some(transition) = parse_transition(entry) {
            fsm.transitions.push(transition);
        }
    }

    for entry in entries(diagram, "comments", name) {
        if let Some(comment) = parse_comment(entry) {
            fsm.comments.push(comment);
        }
    }

    fsm
}

fn entries<'a>(diagram: &'a Map<String, Value>, key: &str, fsm_name: &str) -> &'a [Value] {
    match diagram.get(key) {
        None | Some(Value::Null) => &[],
        Some(Value::Array(items)) => items,
        Some(other) => {
            warn!(
                "'{}' of '{}' should be an array, found {}; ignoring it",
                key,
                fsm_name,
                json_kind(other)
            );
            &[]
        }
    }
}

fn parse_state(entry: &Value, depth: usize) -> Option<State> {
    let Some(data) = entry.as_object() else {
        warn!("Skipping invalid state data entry: {}", entry);
        return None;
    };
    let Some(name) = data.get("name").and_then(Value::as_str) else {
        warn!("Skipping state data entry without a name: {}", entry);
        return None;
    };

    let mut state = State::new(name);
    state.is_initial = flag(data, "is_initial", name);
    state.is_final = flag(data, "is_final", name);
    state.is_superstate = flag(data, "is_superstate", name);
    state.description = text(data, "description", name);
    state.properties = extra_properties(data, STATE_FIELDS);

    let language = action_language(data, name);
    state.entry_action = snippet(data, "entry_action", &language, name);
    state.during_action = snippet(data, "during_action", &language, name);
    state.exit_action = snippet(data, "exit_action", &language, name);

    if state.is_superstate {
        if let Some(sub_data) = data.get("sub_fsm_data").filter(|v| is_non_empty(v)) {
            if depth + 1 > MAX_SUB_FSM_DEPTH {
                warn!(
                    "Sub-machine of '{}' exceeds the nesting limit of {}; it is not parsed",
                    name, MAX_SUB_FSM_DEPTH
                );
            } else {
                let sub_name = format!("SubFSM_{}", name);
                let sub_fsm = parse_at_depth(sub_data, &sub_name, depth + 1);
                state.sub_fsm = Some(Box::new(sub_fsm));
            }
        }
    }

    Some(state)
}

fn parse_transition(entry: &Value) -> Option<Transition> {
    let Some(data) = entry.as_object() else {
        warn!("Skipping invalid transition data entry: {}", entry);
        return None;
    };
    let source = data.get("source").and_then(Value::as_str);
    let target = data.get("target").and_then(Value::as_str);
    let (Some(source), Some(target)) = (source, target) else {
        warn!("Skipping transition data entry without source/target: {}", entry);
        return None;
    };

    let context = format!("{} -> {}", source, target);
    let mut transition = Transition::new(source, target);
    transition.event = match data.get("event") {
        None | Some(Value::Null) => None,
        Some(Value::String(event)) if event.trim().is_empty() => None,
        Some(Value::String(event)) => Some(event.clone()),
        Some(other) => {
            warn!("Ignoring non-string event {} on transition {}", other, context);
            None
        }
    };
    transition.description = text(data, "description", &context);
    transition.properties = extra_properties(data, TRANSITION_FIELDS);

    let language = action_language(data, &context);
    transition.condition = snippet(data, "condition", &language, &context);
    transition.action = snippet(data, "action", &language, &context);

    Some(transition)
}

fn parse_comment(entry: &Value) -> Option<Comment> {
    let Some(data) = entry.as_object() else {
        warn!("Skipping invalid comment data entry: {}", entry);
        return None;
    };
    let Some(text) = data.get("text").and_then(Value::as_str) else {
        warn!("Skipping comment data entry without text: {}", entry);
        return None;
    };

    let mut comment = Comment::new(text);
    comment.properties = extra_properties(data, COMMENT_FIELDS);
    Some(comment)
}

fn flag(data: &Map<String, Value>, key: &str, context: &str) -> bool {
    match data.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(value)) => *value,
        Some(other) => {
            warn!("'{}' of '{}' is not a boolean ({}); treating as false", key, context, other);
            false
        }
    }
}

fn text(data: &Map<String, Value>, key: &str, context: &str) -> String {
    match data.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(value)) => value.clone(),
        Some(other) => {
            warn!("'{}' of '{}' is not a string ({}); ignoring it", key, context, other);
            String::new()
        }
    }
}

fn action_language(data: &Map<String, Value>, context: &str) -> String {
    let language = text(data, "action_language", context);
    if language.is_empty() {
        GENERIC_SIMULATION_LANGUAGE.to_string()
    } else {
        language
    }
}

fn snippet(data: &Map<String, Value>, key: &str, language: &str, context: &str) -> Option<Condition> {
    let code = text(data, key, context);
    if code.is_empty() {
        None
    } else {
        Some(Action::with_language(language, code))
    }
}

fn extra_properties(data: &Map<String, Value>, schema: &[&str]) -> Properties {
    data.iter()
        .filter(|(key, _)| !schema.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// IR -> DIAGRAM DATA
// ============================================================================

impl FsmModel {
    /// Serialize the model back into the raw diagram shape accepted by [`parse_diagram`].
    /// Unknown fields kept in `properties` are written back alongside the schema fields.
    pub fn to_diagram_data(&self) -> Value {
        let states: Vec<Value> = self.states.iter().map(state_to_value).collect();
        let transitions: Vec<Value> = self.transitions.iter().map(transition_to_value).collect();
        let comments: Vec<Value> = self.comments.iter().map(comment_to_value).collect();

        json!({
            "states": states,
            "transitions": transitions,
            "comments": comments,
        })
    }
}

fn state_to_value(state: &State) -> Value {
    let mut data = Map::new();
    data.insert("name".into(), Value::from(state.name.as_str()));
    data.insert("is_initial".into(), Value::Bool(state.is_initial));
    data.insert("is_final".into(), Value::Bool(state.is_final));
    data.insert("is_superstate".into(), Value::Bool(state.is_superstate));
    if !state.description.is_empty() {
        data.insert("description".into(), Value::from(state.description.as_str()));
    }

    let mut language = None;
    for (kind, action) in state.actions() {
        data.insert(kind.field_name().into(), Value::from(action.code.as_str()));
        language.get_or_insert(action.language.as_str());
    }
    if let Some(language) = language {
        data.insert("action_language".into(), Value::from(language));
    }

    if let Some(sub_fsm) = &state.sub_fsm {
        data.insert("sub_fsm_data".into(), sub_fsm.to_diagram_data());
    }

    merge_properties(&mut data, &state.properties);
    Value::Object(data)
}

fn transition_to_value(transition: &Transition) -> Value {
    let mut data = Map::new();
    data.insert("source".into(), Value::from(transition.source.as_str()));
    data.insert("target".into(), Value::from(transition.target.as_str()));
    if let Some(event) = &transition.event {
        data.insert("event".into(), Value::from(event.as_str()));
    }
    if let Some(condition) = &transition.condition {
        data.insert("condition".into(), Value::from(condition.code.as_str()));
    }
    if let Some(action) = &transition.action {
        data.insert("action".into(), Value::from(action.code.as_str()));
    }
    if !transition.description.is_empty() {
        data.insert("description".into(), Value::from(transition.description.as_str()));
    }
    let language = transition
        .condition
        .as_ref()
        .or(transition.action.as_ref())
        .map(|snippet| snippet.language.as_str());
    if let Some(language) = language {
        data.insert("action_language".into(), Value::from(language));
    }

    merge_properties(&mut data, &transition.properties);
    Value::Object(data)
}

fn comment_to_value(comment: &Comment) -> Value {
    let mut data = Map::new();
    data.insert("text".into(), Value::from(comment.text.as_str()));
    merge_properties(&mut data, &comment.properties);
    Value::Object(data)
}

fn merge_properties(data: &mut Map<String, Value>, properties: &Properties) {
    for (key, value) in properties {
        data.entry(key.clone()).or_insert_with(|| value.clone());
    }
}
