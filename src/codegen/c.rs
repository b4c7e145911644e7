//! C header, source and testbench generation

use std::fmt::{self, Write};
use std::sync::LazyLock;

use regex::Regex;

use super::ident::{self, unique_name};
use super::lower::{lower, LoweredFsm};
use super::{inline_code, non_empty, write_snippet, CodegenResult, CodegenTarget, GeneratedFiles};
use crate::fsm::{Action, FsmModel};

static ASSIGN_CONSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(-?\d+|True|False)$")
        .expect("assignment pattern is valid")
});

static BARE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\)$").expect("call pattern is valid")
});

/// Generate `<name>.h` and `<name>.c` implementing the top-level machine as a
/// switch over the current state, plus a `<name>_tb.c` smoke testbench
pub fn generate_c(model: &FsmModel, name: &str) -> CodegenResult<GeneratedFiles> {
    let fsm = lower(model, name, &ident::C)?;
    let hooks = ActionHooks::collect(&fsm);

    let mut files = GeneratedFiles::new();
    files.insert(format!("{}.h", fsm.ident), render_header(&fsm, &hooks)?);
    files.insert(format!("{}.c", fsm.ident), render_source(&fsm, &hooks)?);
    files.insert(format!("{}_tb.c", fsm.ident), render_testbench(&fsm)?);
    Ok(files)
}

/// One Python-flavoured statement as C. Constant assignments and bare calls
/// translate; anything else becomes a TODO comment carrying the line.
fn stub_line(line: &str) -> String {
    if let Some(caps) = ASSIGN_CONSTANT.captures(line) {
        let value = match &caps[2] {
            "True" => "1",
            "False" => "0",
            number => number,
        };
        return format!("{} = {value}; // TODO: Declare variable", ident::C.sanitize(&caps[1]));
    }
    if let Some(caps) = BARE_CALL.captures(line) {
        return format!("{}(); // TODO: Implement function", ident::C.sanitize(&caps[1]));
    }
    format!("// TODO: Manually translate this action: {line}")
}

/// Hook body: C verbatim, Python-flavoured code as stubs, anything else commented out
fn write_hook_body(out: &mut String, action: &Action) -> fmt::Result {
    if CodegenTarget::Python.is_native(&action.language) {
        for line in action.lines().filter(|l| !l.starts_with('#')) {
            writeln!(out, "    {}", stub_line(line))?;
        }
        Ok(())
    } else {
        write_snippet(out, action, CodegenTarget::C, "    ", "//")
    }
}

/// C string literal for `text`
fn c_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// One generated `void f(void)` wrapping a snippet
struct HookFn<'m> {
    name: String,
    description: String,
    action: &'m Action,
}

/// Hook function names per state and per transition
struct ActionHooks<'m> {
    entry: Vec<Option<String>>,
    during: Vec<Option<String>>,
    exit: Vec<Option<String>>,
    /// Indexed like `LoweredState::transitions`
    transition: Vec<Vec<Option<String>>>,
    functions: Vec<HookFn<'m>>,
}

impl<'m> ActionHooks<'m> {
    fn collect(fsm: &LoweredFsm<'m>) -> Self {
        let mut taken = Vec::new();
        let mut hooks = ActionHooks {
            entry: Vec::new(),
            during: Vec::new(),
            exit: Vec::new(),
            transition: Vec::new(),
            functions: Vec::new(),
        };

        for lowered in &fsm.states {
            let state = lowered.state;
            let mut hook = |prefix: &str, action: Option<&'m Action>| {
                let action = non_empty(action)?;
                let name = unique_name(format!("{prefix}_{}", lowered.ident), &mut taken);
                hooks.functions.push(HookFn {
                    name: name.clone(),
                    description: format!("{prefix} of state '{}'", state.name),
                    action,
                });
                Some(name)
            };
            let entry = hook("entry_action", state.entry_action.as_ref());
            let during = hook("during_action", state.during_action.as_ref());
            let exit = hook("exit_action", state.exit_action.as_ref());
            hooks.entry.push(entry);
            hooks.during.push(during);
            hooks.exit.push(exit);
        }

        for lowered in &fsm.states {
            let mut names = Vec::new();
            for t in &lowered.transitions {
                let name = non_empty(t.transition.action.as_ref()).map(|action| {
                    let target = &fsm.states[t.target];
                    let name = unique_name(
                        format!(
                            "action_trans_{}_to_{}_{}",
                            lowered.ident, target.ident, t.event_ident
                        ),
                        &mut taken,
                    );
                    hooks.functions.push(HookFn {
                        name: name.clone(),
                        description: format!(
                            "action of transition '{}' -> '{}' on '{}'",
                            lowered.state.name, target.state.name, t.event
                        ),
                        action,
                    });
                    name
                });
                names.push(name);
            }
            hooks.transition.push(names);
        }

        hooks
    }
}

fn state_const(ident: &str) -> String {
    format!("STATE_{}", ident.to_ascii_uppercase())
}

fn event_const(ident: &str) -> String {
    format!("EVENT_{}", ident.to_ascii_uppercase())
}

fn write_banner(out: &mut String, file_name: &str, fsm: &LoweredFsm) -> fmt::Result {
    writeln!(out, "/*")?;
    writeln!(out, " * {file_name}")?;
    writeln!(out, " * Finite state machine \"{}\", generated by fsmkit.", fsm.name)?;
    writeln!(out, " * Do not edit by hand.")?;
    writeln!(out, " */")?;
    writeln!(out)
}

fn render_header(fsm: &LoweredFsm, hooks: &ActionHooks) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let guard = format!("FSM_{}_H", fsm.ident.to_ascii_uppercase());

    write_banner(&mut out, &format!("{}.h", fsm.ident), fsm)?;
    writeln!(out, "#ifndef {guard}")?;
    writeln!(out, "#define {guard}")?;
    writeln!(out)?;

    writeln!(out, "typedef enum {{")?;
    for state in &fsm.states {
        writeln!(out, "    {},", state_const(&state.ident))?;
    }
    writeln!(out, "    FSM_STATE_COUNT")?;
    writeln!(out, "}} FSM_State_t;")?;
    writeln!(out)?;

    writeln!(out, "typedef enum {{")?;
    for event in &fsm.events {
        writeln!(out, "    {},", event_const(event))?;
    }
    writeln!(out, "    FSM_EVENT_COUNT")?;
    writeln!(out, "}} FSM_Event_t;")?;
    writeln!(out)?;

    writeln!(out, "void {}_init(void);", fsm.ident)?;
    writeln!(out, "void {}_dispatch(FSM_Event_t event_id);", fsm.ident)?;
    writeln!(out, "FSM_State_t {}_get_current_state(void);", fsm.ident)?;

    if !hooks.functions.is_empty() {
        let mut names: Vec<&str> = hooks.functions.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        writeln!(out)?;
        writeln!(out, "/* Action hooks */")?;
        for name in names {
            writeln!(out, "void {name}(void);")?;
        }
    }

    writeln!(out)?;
    writeln!(out, "#endif /* {guard} */")?;
    Ok(out)
}

/// `switch (current_fsm_state)` calling one hook per state, skipped when no state has one
fn write_hook_switch(out: &mut String, fsm: &LoweredFsm, hooks: &[Option<String>]) -> fmt::Result {
    writeln!(out, "    switch (current_fsm_state) {{")?;
    for (state, hook) in fsm.states.iter().zip(hooks) {
        if let Some(hook) = hook {
            writeln!(out, "    case {}:", state_const(&state.ident))?;
            writeln!(out, "        {hook}();")?;
            writeln!(out, "        break;")?;
        }
    }
    writeln!(out, "    default:")?;
    writeln!(out, "        break;")?;
    writeln!(out, "    }}")
}

fn render_source(fsm: &LoweredFsm, hooks: &ActionHooks) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let initial = fsm.initial_state();

    write_banner(&mut out, &format!("{}.c", fsm.ident), fsm)?;
    writeln!(out, "#include \"{}.h\"", fsm.ident)?;
    writeln!(out)?;
    writeln!(out, "static FSM_State_t current_fsm_state;")?;
    writeln!(out)?;

    writeln!(out, "void {}_init(void)", fsm.ident)?;
    writeln!(out, "{{")?;
    writeln!(out, "    current_fsm_state = {};", state_const(&initial.ident))?;
    if let Some(entry) = &hooks.entry[fsm.initial] {
        writeln!(out, "    {entry}();")?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "FSM_State_t {}_get_current_state(void)", fsm.ident)?;
    writeln!(out, "{{")?;
    writeln!(out, "    return current_fsm_state;")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "void {}_dispatch(FSM_Event_t event_id)", fsm.ident)?;
    writeln!(out, "{{")?;
    writeln!(out, "    FSM_State_t next_state = current_fsm_state;")?;
    writeln!(out, "    int transition_taken = 0;")?;
    writeln!(out)?;

    if hooks.during.iter().any(Option::is_some) {
        write_hook_switch(&mut out, fsm, &hooks.during)?;
        writeln!(out)?;
    }

    writeln!(out, "    switch (current_fsm_state) {{")?;
    for (index, state) in fsm.states.iter().enumerate() {
        if state.transitions.is_empty() {
            continue;
        }
        writeln!(out, "    case {}:", state_const(&state.ident))?;
        for (n, t) in state.transitions.iter().enumerate() {
            let event_check = format!("event_id == {}", event_const(&t.event_ident));
            let guard = match non_empty(t.transition.condition.as_ref()) {
                Some(condition) => format!("({event_check}) && ({})", inline_code(condition)),
                None => event_check,
            };
            if n == 0 {
                writeln!(out, "        if ({guard}) {{")?;
            } else {
                writeln!(out, "        }} else if ({guard}) {{")?;
            }
            if let Some(exit) = &hooks.exit[index] {
                writeln!(out, "            {exit}();")?;
            }
            if let Some(action) = &hooks.transition[index][n] {
                writeln!(out, "            {action}();")?;
            }
            writeln!(out, "            next_state = {};", state_const(&fsm.states[t.target].ident))?;
            writeln!(out, "            transition_taken = 1;")?;
        }
        writeln!(out, "        }}")?;
        writeln!(out, "        break;")?;
    }
    writeln!(out, "    default:")?;
    writeln!(out, "        break;")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;

    writeln!(out, "    if (!transition_taken) {{")?;
    writeln!(out, "        return;")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    current_fsm_state = next_state;")?;
    if hooks.entry.iter().any(Option::is_some) {
        writeln!(out)?;
        write_hook_switch(&mut out, fsm, &hooks.entry)?;
    }
    writeln!(out, "}}")?;

    for function in &hooks.functions {
        writeln!(out)?;
        writeln!(out, "/* {} */", function.description)?;
        writeln!(out, "void {}(void)", function.name)?;
        writeln!(out, "{{")?;
        write_hook_body(&mut out, function.action)?;
        writeln!(out, "}}")?;
    }

    Ok(out)
}

/// `main` that checks the initial state, then dispatches every event once
/// and prints where the machine ends up
fn render_testbench(fsm: &LoweredFsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let prefix = &fsm.ident;
    let initial = state_const(&fsm.initial_state().ident);

    write_banner(&mut out, &format!("{prefix}_tb.c"), fsm)?;
    writeln!(out, "#include <stdio.h>")?;
    writeln!(out, "#include \"{prefix}.h\"")?;
    writeln!(out)?;

    writeln!(out, "static const char *const state_names[FSM_STATE_COUNT] = {{")?;
    for state in &fsm.states {
        writeln!(out, "    {},", c_str(&state.state.name))?;
    }
    writeln!(out, "}};")?;
    writeln!(out)?;

    if !fsm.events.is_empty() {
        writeln!(out, "static const char *const event_names[FSM_EVENT_COUNT] = {{")?;
        for event in &fsm.events {
            writeln!(out, "    {},", c_str(event))?;
        }
        writeln!(out, "}};")?;
        writeln!(out)?;
    }

    writeln!(out, "int main(void)")?;
    writeln!(out, "{{")?;
    writeln!(out, "    {prefix}_init();")?;
    writeln!(out, "    if ({prefix}_get_current_state() != {initial}) {{")?;
    writeln!(out, "        printf(\"FAIL: initial state is %s, expected %s\\n\",")?;
    writeln!(
        out,
        "               state_names[{prefix}_get_current_state()], state_names[{initial}]);"
    )?;
    writeln!(out, "        return 1;")?;
    writeln!(out, "    }}")?;
    writeln!(out, "    printf(\"Initial state: %s\\n\", state_names[{initial}]);")?;

    if !fsm.events.is_empty() {
        writeln!(out)?;
        writeln!(out, "    for (int event = 0; event < FSM_EVENT_COUNT; ++event) {{")?;
        writeln!(out, "        {prefix}_dispatch((FSM_Event_t)event);")?;
        writeln!(
            out,
            "        printf(\"%s -> %s\\n\", event_names[event], state_names[{prefix}_get_current_state()]);"
        )?;
        writeln!(out, "    }}")?;
    }

    writeln!(out)?;
    writeln!(out, "    printf(\"PASS\\n\");")?;
    writeln!(out, "    return 0;")?;
    writeln!(out, "}}")?;
    Ok(out)
}
