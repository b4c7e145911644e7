//! fsmkit - hierarchical finite state machine toolkit
//! Diagram IR, sandboxed simulator and C/HDL/Python/diagram code generators

pub mod codegen;
pub mod fsm;
pub mod parser;
pub mod safety;
pub mod script;
pub mod simulator;

pub use codegen::{generate, CodegenError, CodegenTarget, GeneratedFiles};
pub use fsm::*;
pub use parser::{parse_diagram, parse_diagram_str, ParseError};
pub use safety::check_code_safety;
pub use script::{Value, Variables};
pub use simulator::{EngineState, FsmError, FsmSimulator, SimulatorConfig};
