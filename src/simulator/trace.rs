//! Per-tick capture of numeric variables, for hosts that plot a run

use std::collections::BTreeMap;

use log::info;

use crate::script::{Value, Variables};

/// One sample: the tick and the variable's value at the end of that tick
pub type Sample = (u64, f64);

#[derive(Debug, Clone, Default)]
pub struct VariableTrace {
    recording: bool,
    series: BTreeMap<String, Vec<Sample>>,
}

impl VariableTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop earlier samples and begin recording
    pub fn start(&mut self) {
        self.series.clear();
        self.recording = true;
        info!("Variable trace started");
    }

    pub fn stop(&mut self) {
        self.recording = false;
        info!("Variable trace stopped");
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Record every numeric (int, float or bool) variable. Ignored while stopped.
    pub fn record(&mut self, tick: u64, variables: &Variables) {
        if !self.recording {
            return;
        }
        for (name, value) in variables {
            let sample = match value {
                Value::Int(i) => *i as f64,
                Value::Float(f) => *f,
                Value::Bool(b) => f64::from(u8::from(*b)),
                Value::None | Value::Str(_) => continue,
            };
            self.series.entry(name.clone()).or_default().push((tick, sample));
        }
    }

    /// Samples of one variable, oldest first. Empty if it was never numeric.
    pub fn series(&self, name: &str) -> &[Sample] {
        self.series.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of all traced variables, sorted
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}
