//! VHDL and Verilog generation
//!
//! Both emit one clocked process with synchronous reset into the initial
//! state. Every event, and every signal a native guard reads, becomes a
//! one-bit input port; the current state is exposed as a binary-encoded output.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};
use std::sync::LazyLock;

use regex::Regex;

use super::ident::{self, IdentStyle};
use super::lower::{lower, LoweredFsm, LoweredTransition};
use super::{inline_code, non_empty, write_snippet, CodegenResult, CodegenTarget, GeneratedFiles};
use crate::fsm::FsmModel;

static GUARD_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_$]*").expect("identifier pattern is valid"));

/// Names in guards that are library functions or literals rather than signals
const GUARD_BUILTINS: &[&str] = &[
    "true", "false", "high", "low", "std_logic", "std_logic_vector", "unsigned", "signed",
    "others", "to_unsigned", "to_integer", "resize", "rising_edge", "falling_edge", "reg", "wire",
];

/// Names the generated design declares itself
const VHDL_RESERVED: &[&str] = &["clk", "reset", "state_code", "current_state", "state_t", "behavioral"];
const VERILOG_RESERVED: &[&str] = &["clk", "reset", "state_code"];

/// Event suffix used when an event name is already taken
const EVENT_PORT_SUFFIX: &str = "_in";

/// Input ports besides `clk` and `reset`
struct InputPorts {
    /// Sorted, unique
    names: Vec<String>,
    /// Sanitized event name -> the port that carries it, when they differ
    renamed: BTreeMap<String, String>,
}

impl InputPorts {
    /// `reserved` holds every name the design declares itself (fixed ports,
    /// internal signals, state names). Events that clash with one are moved
    /// to `<event>_in`; guard identifiers that match one refer to it and add
    /// no port.
    fn collect(fsm: &LoweredFsm, target: CodegenTarget, style: &IdentStyle, reserved: &[String]) -> Self {
        let reserved: BTreeSet<&str> = reserved.iter().map(String::as_str).collect();
        let mut names = BTreeSet::new();
        let mut renamed = BTreeMap::new();

        for event in &fsm.events {
            if !reserved.contains(event.as_str()) {
                names.insert(event.clone());
            }
        }
        for event in fsm.events.iter().filter(|e| reserved.contains(e.as_str())) {
            let mut port = format!("{event}{EVENT_PORT_SUFFIX}");
            let mut n = 2;
            while reserved.contains(port.as_str()) || names.contains(&port) || fsm.events.contains(&port) {
                port = format!("{event}{EVENT_PORT_SUFFIX}_{n}");
                n += 1;
            }
            names.insert(port.clone());
            renamed.insert(event.clone(), port);
        }

        for state in &fsm.states {
            for t in &state.transitions {
                let Some(condition) = non_empty(t.transition.condition.as_ref()) else {
                    continue;
                };
                if !target.is_native(&condition.language) {
                    continue;
                }
                for signal in guard_identifiers(&condition.code, style) {
                    if !reserved.contains(signal.as_str()) {
                        names.insert(signal);
                    }
                }
            }
        }

        InputPorts {
            names: names.into_iter().collect(),
            renamed,
        }
    }

    fn event<'a>(&'a self, event_ident: &'a str) -> &'a str {
        self.renamed.get(event_ident).map_or(event_ident, String::as_str)
    }
}

/// Signal names read by a guard written in the target HDL. Keywords, library
/// names, string contents, based literals (`8'hFF`), attributes (`x'event`)
/// and system tasks are skipped.
fn guard_identifiers(code: &str, style: &IdentStyle) -> Vec<String> {
    let mut signals = Vec::new();
    let mut in_string = false;
    let mut last_end = 0;

    for found in GUARD_IDENTIFIER.find_iter(code) {
        in_string ^= code[last_end..found.start()].matches('"').count() % 2 == 1;
        last_end = found.end();
        if in_string {
            continue;
        }
        let preceding = code[..found.start()].chars().next_back();
        if matches!(preceding, Some('\'' | '$' | '`' | '.' | '0'..='9')) {
            continue;
        }

        let name = found.as_str();
        let folded = name.to_ascii_lowercase();
        let normalized = if style.lowercase { folded.as_str() } else { name };
        if style.is_keyword(normalized) || GUARD_BUILTINS.contains(&folded.as_str()) {
            continue;
        }
        let signal = style.sanitize(name);
        if !signals.contains(&signal) {
            signals.push(signal);
        }
    }
    signals
}

pub fn generate_vhdl(model: &FsmModel, name: &str) -> CodegenResult<GeneratedFiles> {
    let fsm = lower(model, name, &ident::VHDL)?;
    let mut files = GeneratedFiles::new();
    files.insert(format!("{}.vhd", fsm.ident), render_vhdl(&fsm)?);
    Ok(files)
}

pub fn generate_verilog(model: &FsmModel, name: &str) -> CodegenResult<GeneratedFiles> {
    let fsm = lower(model, name, &ident::VERILOG)?;
    let mut files = GeneratedFiles::new();
    files.insert(format!("{}.v", fsm.ident), render_verilog(&fsm)?);
    Ok(files)
}

fn write_banner(out: &mut String, comment: &str, file_name: &str, fsm: &LoweredFsm) -> fmt::Result {
    writeln!(out, "{comment} {file_name}")?;
    writeln!(out, "{comment} Finite state machine \"{}\", generated by fsmkit.", fsm.name)?;
    writeln!(out, "{comment} Do not edit by hand.")?;
    writeln!(out)
}

/// Body of a taken transition before the state register update: untranslated
/// guard note, then source exit, transition action and target entry
fn write_transition_body(
    out: &mut String,
    fsm: &LoweredFsm,
    source: usize,
    t: &LoweredTransition,
    target_lang: CodegenTarget,
    indent: &str,
    comment: &str,
) -> fmt::Result {
    if let Some(condition) = non_empty(t.transition.condition.as_ref()) {
        if !target_lang.is_native(&condition.language) {
            writeln!(out, "{indent}{comment} guard not translated: {}", inline_code(condition))?;
        }
    }
    let snippets = [
        fsm.states[source].state.exit_action.as_ref(),
        t.transition.action.as_ref(),
        fsm.states[t.target].state.entry_action.as_ref(),
    ];
    for action in snippets.into_iter().filter_map(non_empty) {
        write_snippet(out, action, target_lang, indent, comment)?;
    }
    Ok(())
}

/// Guard expression: the event input, and the condition when it is native HDL
fn guard(t: &LoweredTransition, target_lang: CodegenTarget, event_test: String, and: &str) -> String {
    match non_empty(t.transition.condition.as_ref()) {
        Some(condition) if target_lang.is_native(&condition.language) => {
            format!("{event_test} {and} ({})", inline_code(condition))
        }
        _ => event_test,
    }
}

fn render_vhdl(fsm: &LoweredFsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let entity = &fsm.ident;
    let initial = &fsm.initial_state().ident;

    let reserved: Vec<String> = VHDL_RESERVED
        .iter()
        .map(|name| name.to_string())
        .chain([entity.clone()])
        .chain(fsm.states.iter().map(|s| s.ident.clone()))
        .collect();
    let ports = InputPorts::collect(fsm, CodegenTarget::Vhdl, &ident::VHDL, &reserved);

    write_banner(&mut out, "--", &format!("{entity}.vhd"), fsm)?;
    writeln!(out, "library ieee;")?;
    writeln!(out, "use ieee.std_logic_1164.all;")?;
    writeln!(out, "use ieee.numeric_std.all;")?;
    writeln!(out)?;

    writeln!(out, "entity {entity} is")?;
    writeln!(out, "    port (")?;
    writeln!(out, "        clk : in std_logic;")?;
    writeln!(out, "        reset : in std_logic;")?;
    for port in &ports.names {
        writeln!(out, "        {port} : in std_logic;")?;
    }
    writeln!(
        out,
        "        state_code : out std_logic_vector({} downto 0)",
        fsm.state_bits() - 1
    )?;
    writeln!(out, "    );")?;
    writeln!(out, "end entity {entity};")?;
    writeln!(out)?;

    let names: Vec<&str> = fsm.states.iter().map(|s| s.ident.as_str()).collect();
    writeln!(out, "architecture behavioral of {entity} is")?;
    writeln!(out, "    type state_t is ({});", names.join(", "))?;
    writeln!(out, "    signal current_state : state_t := {initial};")?;
    writeln!(out, "begin")?;
    writeln!(out)?;
    writeln!(out, "    process (clk)")?;
    writeln!(out, "    begin")?;
    writeln!(out, "        if rising_edge(clk) then")?;
    writeln!(out, "            if reset = '1' then")?;
    writeln!(out, "                current_state <= {initial};")?;
    writeln!(out, "            else")?;
    writeln!(out, "                case current_state is")?;

    let body_indent = " ".repeat(28);
    for (index, state) in fsm.states.iter().enumerate() {
        writeln!(out, "                    when {} =>", state.ident)?;
        if state.transitions.is_empty() {
            writeln!(out, "                        null;")?;
            continue;
        }
        for (n, t) in state.transitions.iter().enumerate() {
            let event_port = ports.event(&t.event_ident);
            let test = guard(t, CodegenTarget::Vhdl, format!("{event_port} = '1'"), "and");
            let keyword = if n == 0 { "if" } else { "elsif" };
            writeln!(out, "                        {keyword} {test} then")?;
            write_transition_body(&mut out, fsm, index, t, CodegenTarget::Vhdl, &body_indent, "--")?;
            writeln!(
                out,
                "{body_indent}current_state <= {};",
                fsm.states[t.target].ident
            )?;
        }
        writeln!(out, "                        end if;")?;
    }

    writeln!(out, "                end case;")?;
    writeln!(out, "            end if;")?;
    writeln!(out, "        end if;")?;
    writeln!(out, "    end process;")?;
    writeln!(out)?;
    writeln!(
        out,
        "    state_code <= std_logic_vector(to_unsigned(state_t'pos(current_state), state_code'length));"
    )?;
    writeln!(out)?;
    writeln!(out, "end architecture behavioral;")?;
    Ok(out)
}

fn render_verilog(fsm: &LoweredFsm) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let bits = fsm.state_bits();
    let param = |index: usize| format!("STATE_{}", fsm.states[index].ident.to_ascii_uppercase());

    let reserved: Vec<String> = VERILOG_RESERVED
        .iter()
        .map(|name| name.to_string())
        .chain([fsm.ident.clone()])
        .chain((0..fsm.states.len()).map(param))
        .collect();
    let ports = InputPorts::collect(fsm, CodegenTarget::Verilog, &ident::VERILOG, &reserved);

    write_banner(&mut out, "//", &format!("{}.v", fsm.ident), fsm)?;
    writeln!(out, "module {} (", fsm.ident)?;
    writeln!(out, "    input wire clk,")?;
    writeln!(out, "    input wire reset,")?;
    for port in &ports.names {
        writeln!(out, "    input wire {port},")?;
    }
    writeln!(out, "    output reg [{}:0] state_code", bits - 1)?;
    writeln!(out, ");")?;
    writeln!(out)?;

    for index in 0..fsm.states.len() {
        writeln!(out, "    localparam [{}:0] {} = {bits}'d{index};", bits - 1, param(index))?;
    }
    writeln!(out)?;

    writeln!(out, "    always @(posedge clk) begin")?;
    writeln!(out, "        if (reset) begin")?;
    writeln!(out, "            state_code <= {};", param(fsm.initial))?;
    writeln!(out, "        end else begin")?;
    writeln!(out, "            case (state_code)")?;

    let body_indent = " ".repeat(24);
    for (index, state) in fsm.states.iter().enumerate() {
        writeln!(out, "                {}: begin", param(index))?;
        for (n, t) in state.transitions.iter().enumerate() {
            let test = guard(t, CodegenTarget::Verilog, ports.event(&t.event_ident).to_string(), "&&");
            if n == 0 {
                writeln!(out, "                    if ({test}) begin")?;
            } else {
                writeln!(out, "                    end else if ({test}) begin")?;
            }
            write_transition_body(&mut out, fsm, index, t, CodegenTarget::Verilog, &body_indent, "//")?;
            writeln!(out, "{body_indent}state_code <= {};", param(t.target))?;
        }
        if !state.transitions.is_empty() {
            writeln!(out, "                    end")?;
        }
        writeln!(out, "                end")?;
    }

    writeln!(out, "                default: state_code <= {};", param(fsm.initial))?;
    writeln!(out, "            endcase")?;
    writeln!(out, "        end")?;
    writeln!(out, "    end")?;
    writeln!(out)?;
    writeln!(out, "endmodule")?;
    Ok(out)
}
