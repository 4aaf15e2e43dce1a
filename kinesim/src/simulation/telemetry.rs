//! Per-tick telemetry sinks
//!
//! The engine core never depends on what happens to this data; sinks are
//! handed the clock and the bodies once per tick by [`Scenario::run`](crate::simulation::scenario::Scenario::run).

use crate::simulation::states::{Body, NVec3};

pub trait TelemetrySink {
    fn record(&mut self, time: f64, bodies: &[Body]);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&mut self, _time: f64, _bodies: &[Body]) {}
}

/// Prints one line per body every `every` ticks
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    every: usize,
    ticks: usize,
}

impl ConsoleSink {
    pub fn new(every: usize) -> Self {
        Self { every: every.max(1), ticks: 0 }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(1)
    }
}

impl TelemetrySink for ConsoleSink {
    fn record(&mut self, time: f64, bodies: &[Body]) {
        self.ticks += 1;
        if self.ticks % self.every != 0 {
            return;
        }
        for (i, body) in bodies.iter().enumerate() {
            let x = body.position();
            let v = body.velocity();
            println!(
                "t = {time:10.5}  body {i:3}  x = ({:9.4}, {:9.4}, {:9.4})  v = ({:9.4}, {:9.4}, {:9.4})",
                x.x, x.y, x.z, v.x, v.y, v.z
            );
        }
    }
}

/// Keeps every position it is handed, indexed by tick
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub times: Vec<f64>,
    pub positions: Vec<Vec<NVec3>>,
}

impl TelemetrySink for RecordingSink {
    fn record(&mut self, time: f64, bodies: &[Body]) {
        self.times.push(time);
        self.positions.push(bodies.iter().map(Body::position).collect());
    }
}
