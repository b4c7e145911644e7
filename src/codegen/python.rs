//! Python class generation
//!
//! The generated class keeps action variables in `self.variables` and runs
//! Python snippets through `exec`/`eval` against that namespace, so snippets
//! behave as they do in the simulator.

use std::fmt::{self, Write};

use super::ident::{self, pascal_case, unique_name};
use super::lower::{lower, LoweredFsm};
use super::{non_empty, write_snippet, CodegenResult, CodegenTarget, GeneratedFiles};
use crate::fsm::{Action, FsmModel, State};

pub fn generate_python(model: &FsmModel, name: &str) -> CodegenResult<GeneratedFiles> {
    let fsm = lower(model, name, &ident::PYTHON)?;
    let module = ident::PYTHON.sanitize(&name.to_ascii_lowercase());

    let mut files = GeneratedFiles::new();
    files.insert(format!("{module}.py"), render(&fsm, &pascal_case(name))?);
    Ok(files)
}

/// Python string literal for `text`
fn py_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct Method<'m> {
    name: String,
    action: &'m Action,
}

fn state_const(ident: &str) -> String {
    format!("STATE_{}", ident.to_ascii_uppercase())
}

/// `def <method>(self, state)` calling one hook per state
fn write_state_switch(
    out: &mut String,
    method: &str,
    fsm: &LoweredFsm,
    hooks: &[Option<String>],
) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "    def {method}(self, state):")?;
    let mut first = true;
    for (state, hook) in fsm.states.iter().zip(hooks) {
        let Some(hook) = hook else { continue };
        let keyword = if first { "if" } else { "elif" };
        first = false;
        writeln!(out, "        {keyword} state == self.{}:", state_const(&state.ident))?;
        writeln!(out, "            self.{hook}()")?;
    }
    if first {
        writeln!(out, "        pass")?;
    }
    Ok(())
}

fn render(fsm: &LoweredFsm, class_name: &str) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let mut taken = Vec::new();
    let mut methods = Vec::new();

    let mut hook_names = |kind: &str, pick: fn(&State) -> Option<&Action>| -> Vec<Option<String>> {
        fsm.states
            .iter()
            .map(|s| {
                let action = non_empty(pick(s.state))?;
                let name = unique_name(
                    format!("on_{kind}_{}", s.ident.to_ascii_lowercase()),
                    &mut taken,
                );
                methods.push(Method { name: name.clone(), action });
                Some(name)
            })
            .collect()
    };
    let entry = hook_names("enter", |s| s.entry_action.as_ref());
    let during = hook_names("during", |s| s.during_action.as_ref());
    let exit = hook_names("exit", |s| s.exit_action.as_ref());

    writeln!(out, "\"\"\"Finite state machine {}, generated by fsmkit.", py_str(&fsm.name))?;
    writeln!(out)?;
    writeln!(out, "Do not edit by hand.")?;
    writeln!(out, "\"\"\"")?;
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "class {class_name}:")?;
    for state in &fsm.states {
        writeln!(out, "    {} = {}", state_const(&state.ident), py_str(&state.state.name))?;
    }
    writeln!(out)?;

    writeln!(out, "    def __init__(self):")?;
    writeln!(out, "        self.variables = {{}}")?;
    writeln!(out, "        self._pending = []")?;
    writeln!(out, "        self.state = self.{}", state_const(&fsm.initial_state().ident))?;
    writeln!(out, "        self._enter(self.state)")?;
    writeln!(out)?;

    writeln!(out, "    def send(self, event):")?;
    writeln!(out, "        \"\"\"Queue an event raised from inside an action.\"\"\"")?;
    writeln!(out, "        self._pending.append(event)")?;
    writeln!(out)?;

    writeln!(out, "    def dispatch(self, event):")?;
    writeln!(
        out,
        "        \"\"\"Run the during action, then handle `event` and every event it raises.\"\"\""
    )?;
    writeln!(out, "        self._during(self.state)")?;
    writeln!(out, "        self._pending.append(event)")?;
    writeln!(out, "        while self._pending:")?;
    writeln!(out, "            self._handle(self._pending.pop(0))")?;
    writeln!(out)?;

    writeln!(out, "    def _handle(self, event):")?;
    let mut first_state = true;
    for state in fsm.states.iter().filter(|s| !s.transitions.is_empty()) {
        let keyword = if first_state { "if" } else { "elif" };
        first_state = false;
        writeln!(out, "        {keyword} self.state == self.{}:", state_const(&state.ident))?;
        for (n, t) in state.transitions.iter().enumerate() {
            let target = &fsm.states[t.target];
            let mut test = format!("event == {}", py_str(t.event));
            let mut untranslated = None;
            if let Some(condition) = non_empty(t.transition.condition.as_ref()) {
                if CodegenTarget::Python.is_native(&condition.language) {
                    test = format!("{test} and self._check({})", py_str(condition.code.trim()));
                } else {
                    untranslated = Some(condition);
                }
            }
            let keyword = if n == 0 { "if" } else { "elif" };
            writeln!(out, "            {keyword} {test}:")?;
            if let Some(condition) = untranslated {
                writeln!(
                    out,
                    "                # guard not translated: {}",
                    condition.lines().collect::<Vec<_>>().join(" ")
                )?;
            }
            let action = match non_empty(t.transition.action.as_ref()) {
                Some(action) => {
                    let name = unique_name(
                        format!(
                            "do_{}_to_{}_{}",
                            state.ident.to_ascii_lowercase(),
                            target.ident.to_ascii_lowercase(),
                            t.event_ident.to_ascii_lowercase()
                        ),
                        &mut taken,
                    );
                    methods.push(Method { name: name.clone(), action });
                    format!(", self.{name}")
                }
                None => String::new(),
            };
            writeln!(
                out,
                "                self._fire(self.{}{action})",
                state_const(&target.ident)
            )?;
        }
    }
    if first_state {
        writeln!(out, "        pass")?;
    }
    writeln!(out)?;

    writeln!(out, "    def _fire(self, target, action=None):")?;
    writeln!(out, "        self._exit(self.state)")?;
    writeln!(out, "        if action is not None:")?;
    writeln!(out, "            action()")?;
    writeln!(out, "        self.state = target")?;
    writeln!(out, "        self._enter(self.state)")?;

    write_state_switch(&mut out, "_enter", fsm, &entry)?;
    write_state_switch(&mut out, "_during", fsm, &during)?;
    write_state_switch(&mut out, "_exit", fsm, &exit)?;

    writeln!(out)?;
    writeln!(out, "    def _run(self, code):")?;
    writeln!(out, "        exec(code, {{\"sm\": self}}, self.variables)")?;
    writeln!(out)?;
    writeln!(out, "    def _check(self, code):")?;
    writeln!(out, "        return bool(eval(code, {{\"sm\": self}}, self.variables))")?;

    for method in &methods {
        writeln!(out)?;
        writeln!(out, "    def {}(self):", method.name)?;
        if CodegenTarget::Python.is_native(&method.action.language) {
            writeln!(out, "        self._run({})", py_str(method.action.code.trim()))?;
        } else {
            write_snippet(&mut out, method.action, CodegenTarget::Python, "        ", "#")?;
            writeln!(out, "        pass")?;
        }
    }

    Ok(out)
}
