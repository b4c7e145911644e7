//! fsmkit CLI - run events through a diagram or print generated code

use std::env;
use std::fs;
use std::process::ExitCode;

use fsmkit::{generate, parse_diagram_str, CodegenTarget, FsmSimulator, SimulatorConfig};

fn usage() {
    println!("fsmkit CLI - FSM simulator and code generator");
    println!("Usage:");
    println!("  fsmkit-cli <diagram.json> sim [event]...");
    println!("  fsmkit-cli <diagram.json> gen <target> [name]");
    println!();
    println!("Targets: c, vhdl, verilog, python, plantuml, mermaid, json");
    println!("Use '-' as an event to run a tick without one.");
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        usage();
        return ExitCode::FAILURE;
    }

    let filename = &args[1];
    let content = match fs::read_to_string(filename) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Could not read file '{}': {}", filename, e);
            return ExitCode::FAILURE;
        }
    };

    let name = std::path::Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| fsmkit::parser::DEFAULT_FSM_NAME.to_string());

    let model = match parse_diagram_str(&content, &name) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(problems) = model.validate() {
        for problem in problems {
            eprintln!("warning: {}", problem);
        }
    }

    match args[2].as_str() {
        "sim" => simulate(model, &args[3..]),
        "gen" => match args.get(3) {
            Some(target) => generate_code(&model, args.get(4).unwrap_or(&name), target),
            None => {
                usage();
                ExitCode::FAILURE
            }
        },
        _ => {
            usage();
            ExitCode::FAILURE
        }
    }
}

fn simulate(model: fsmkit::FsmModel, events: &[String]) -> ExitCode {
    let mut simulator = match FsmSimulator::new(model, SimulatorConfig::from_env()) {
        Ok(simulator) => simulator,
        Err(e) => {
            eprintln!("Simulation error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for line in simulator.take_log() {
        println!("{}", line);
    }
    println!("State: {}", simulator.get_current_state_name());

    for event in events {
        let event = (event != "-").then_some(event.as_str());
        match simulator.step(event) {
            Ok((state, log)) => {
                for line in log {
                    println!("{}", line);
                }
                println!("State: {}", state);
            }
            Err(e) => {
                for line in simulator.take_log() {
                    println!("{}", line);
                }
                eprintln!("Simulation halted: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!("Variables:");
    for (name, value) in simulator.get_variables() {
        println!("  {} = {}", name, value.repr());
    }
    ExitCode::SUCCESS
}

fn generate_code(model: &fsmkit::FsmModel, name: &str, target: &str) -> ExitCode {
    let target: CodegenTarget = match target.parse() {
        Ok(target) => target,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match generate(model, name, target) {
        Ok(files) => {
            for (file_name, content) in files {
                println!("// ===== {} =====", file_name);
                print!("{}", content);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Code generation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
