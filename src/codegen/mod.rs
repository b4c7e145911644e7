//! Code generators
//! Renders an FSM model as C, VHDL, Verilog, Python, PlantUML, Mermaid or JSON

mod c;
mod diagram;
mod hdl;
pub mod ident;
pub mod lower;
mod python;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::str::FromStr;

use log::info;
use thiserror::Error;

use crate::fsm::{Action, FsmModel};

pub use c::generate_c;
pub use diagram::{generate_json, generate_mermaid, generate_plantuml};
pub use hdl::{generate_verilog, generate_vhdl};
pub use python::generate_python;

/// Suggested file name -> file content
pub type GeneratedFiles = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Cannot generate code: No states defined")]
    NoStates,
    #[error("Unknown code generation target '{0}'")]
    UnknownTarget(String),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Formatting failed")]
    Fmt(#[from] fmt::Error),
}

pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenTarget {
    C,
    Vhdl,
    Verilog,
    Python,
    PlantUml,
    Mermaid,
    Json,
}

impl CodegenTarget {
    pub const ALL: [CodegenTarget; 7] = [
        CodegenTarget::C,
        CodegenTarget::Vhdl,
        CodegenTarget::Verilog,
        CodegenTarget::Python,
        CodegenTarget::PlantUml,
        CodegenTarget::Mermaid,
        CodegenTarget::Json,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CodegenTarget::C => "c",
            CodegenTarget::Vhdl => "vhdl",
            CodegenTarget::Verilog => "verilog",
            CodegenTarget::Python => "python",
            CodegenTarget::PlantUml => "plantuml",
            CodegenTarget::Mermaid => "mermaid",
            CodegenTarget::Json => "json",
        }
    }

    /// Whether a snippet tagged `language` can be emitted verbatim for this target
    pub fn is_native(self, language: &str) -> bool {
        let lang = language.trim().to_ascii_lowercase();
        match self {
            CodegenTarget::C => {
                lang == "c"
                    || lang == "c++"
                    || lang.ends_with("(c)")
                    || lang.ends_with("(c++)")
                    || lang.starts_with("arduino")
            }
            CodegenTarget::Vhdl => lang == "vhdl",
            CodegenTarget::Verilog => lang == "verilog",
            CodegenTarget::Python => lang.starts_with("python") || lang == "micropython",
            CodegenTarget::PlantUml | CodegenTarget::Mermaid | CodegenTarget::Json => false,
        }
    }
}

impl fmt::Display for CodegenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodegenTarget {
    type Err = CodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" => Ok(CodegenTarget::C),
            "vhdl" | "vhd" => Ok(CodegenTarget::Vhdl),
            "verilog" | "v" => Ok(CodegenTarget::Verilog),
            "python" | "py" => Ok(CodegenTarget::Python),
            "plantuml" | "puml" => Ok(CodegenTarget::PlantUml),
            "mermaid" | "mmd" => Ok(CodegenTarget::Mermaid),
            "json" => Ok(CodegenTarget::Json),
            _ => Err(CodegenError::UnknownTarget(s.to_string())),
        }
    }
}

/// Generate every artifact of `target` for `model`, keyed by suggested file name
pub fn generate(model: &FsmModel, name: &str, target: CodegenTarget) -> CodegenResult<GeneratedFiles> {
    let files = match target {
        CodegenTarget::C => generate_c(model, name)?,
        CodegenTarget::Vhdl => generate_vhdl(model, name)?,
        CodegenTarget::Verilog => generate_verilog(model, name)?,
        CodegenTarget::Python => generate_python(model, name)?,
        CodegenTarget::PlantUml => {
            single_file(ident::C.sanitize(name), "puml", generate_plantuml(model)?)
        }
        CodegenTarget::Mermaid => {
            single_file(ident::C.sanitize(name), "mmd", generate_mermaid(model)?)
        }
        CodegenTarget::Json => single_file(ident::C.sanitize(name), "json", generate_json(model)?),
    };

    for (file_name, content) in &files {
        info!("Generated {} ({} bytes) for '{}'", file_name, content.len(), name);
    }
    Ok(files)
}

fn single_file(stem: String, extension: &str, content: String) -> GeneratedFiles {
    let mut files = GeneratedFiles::new();
    files.insert(format!("{stem}.{extension}"), content);
    files
}

/// A snippet that has code in it
fn non_empty(action: Option<&Action>) -> Option<&Action> {
    action.filter(|a| !a.is_empty())
}

/// Condition code on one line, for inlining into a guard expression
fn inline_code(action: &Action) -> String {
    action.lines().collect::<Vec<_>>().join(" ")
}

/// Write `action` at `indent`: verbatim when native to `target`, otherwise as
/// `comment`-prefixed lines under a header naming its language
fn write_snippet(
    out: &mut String,
    action: &Action,
    target: CodegenTarget,
    indent: &str,
    comment: &str,
) -> fmt::Result {
    if target.is_native(&action.language) {
        for line in action.code.lines().filter(|l| !l.trim().is_empty()) {
            writeln!(out, "{indent}{}", line.trim_end())?;
        }
    } else {
        writeln!(out, "{indent}{comment} {} (not translated):", action.language)?;
        for line in action.lines() {
            writeln!(out, "{indent}{comment} {line}")?;
        }
    }
    Ok(())
}
