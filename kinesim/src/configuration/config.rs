//! Configuration types for loading simulation scenarios from YAML.
//!
//! A scenario consists of:
//!
//! - [`EngineConfig`]     – engine options (adaptive stepping, parallelism, tolerances)
//! - [`ParametersConfig`] – run length, step size and seed
//! - [`BodyConfig`]       – initial state of each body, tagged by `kind`
//! - [`ForceConfig`]      – force laws, tagged by `type`
//! - [`SurfaceConfig`]    – triangulated surfaces with their coefficients
//! - [`StopConfig`]       – stop conditions, tagged by `type`
//! - [`ScenarioConfig`]   – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//!
//! ```yaml
//! engine:
//!   adaptive: true          # subdivide steps to keep the error below `tolerance`
//!   parallel: false
//!   contain_body_failures: true
//!   tolerance: 0.001
//!   time_tolerance: 0.001
//!
//! parameters:
//!   t_end: 5.0              # total simulation time
//!   h0: 0.01                # step size
//!   seed: 42                # seed for the surface fallback search
//!
//! bodies:
//!   - kind: point
//!     x: [0.0, 0.0, 1.0]
//!     v: [0.5, 0.0, 0.0]
//!     m: 0.01
//!   - kind: sphere
//!     x: [1.0, 0.0, 2.0]
//!     m: 1.0
//!     radius: 0.1
//!
//! forces:
//!   - type: gravity
//!     field: [0.0, 0.0, -9.8]
//!   - type: drag
//!     coefficient: 0.001
//!
//! surfaces:
//!   - elasticity: 0.8
//!     friction: 0.3
//!     quads:
//!       - [[-2, -2, 0], [2, -2, 0], [2, 2, 0], [-2, 2, 0]]
//!
//! stop:
//!   - type: time
//!     end: 5.0
//! ```
//!
//! The scenario builder maps this into engine types, validating as it goes.

use serde::Deserialize;

/// High-level engine configuration
#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub adaptive: bool, // `true` - wrap the engine in the adaptive stepper
    #[serde(default)]
    pub parallel: bool, // run accumulating forces and body updates on the rayon pool
    #[serde(default = "default_true")]
    pub contain_body_failures: bool, // log and skip failing bodies instead of aborting
    pub tolerance: Option<f64>, // adaptive position tolerance
    pub time_tolerance: Option<f64>, // adaptive stop-event tolerance
    pub min_step: Option<f64>, // adaptive smallest step
}

/// Run length, step size and seed
#[derive(Deserialize, Debug, Clone)]
pub struct ParametersConfig {
    pub t_end: f64, // time end
    pub h0: f64, // time step size
    #[serde(default)]
    pub seed: u64, // deterministic seed to make runs reproducible
}

/// Initial state of one body
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyConfig {
    Point {
        x: [f64; 3], // position
        #[serde(default)]
        v: [f64; 3], // velocity
        m: f64, // mass
    },
    Frozen {
        x: [f64; 3],
        m: f64,
    },
    Sphere {
        x: [f64; 3],
        #[serde(default)]
        v: [f64; 3],
        #[serde(default)]
        omega: [f64; 3], // angular velocity
        m: f64,
        radius: f64,
    },
    Box {
        x: [f64; 3],
        #[serde(default)]
        v: [f64; 3],
        #[serde(default)]
        omega: [f64; 3],
        m: f64,
        half_extents: [f64; 3],
    },
    Aggregate {
        #[serde(default)]
        omega: [f64; 3],
        points: Vec<PointMassConfig>, // constituents, rigidly joined
    },
    Line {
        x: [f64; 3],
        #[serde(default)]
        v: [f64; 3],
        m: f64,
        start: [f64; 3], // path from `start` to `end`
        end: [f64; 3],
    },
    Circle {
        x: [f64; 3],
        #[serde(default)]
        v: [f64; 3],
        m: f64,
        center: [f64; 3],
        radius: f64,
        axis: [f64; 3], // normal of the circle's plane
    },
}

#[derive(Deserialize, Debug, Clone)]
pub struct PointMassConfig {
    pub x: [f64; 3],
    #[serde(default)]
    pub v: [f64; 3],
    pub m: f64,
}

/// Force laws; bodies are referenced by their index in `bodies`
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForceConfig {
    Gravity {
        field: [f64; 3], // m/s²
    },
    Drag {
        coefficient: f64,
    },
    Constant {
        body: usize,
        force: [f64; 3],
    },
    Spring {
        body: usize,
        k: f64,
        anchor: [f64; 3],
        #[serde(default)]
        rest_length: f64,
        #[serde(default)]
        attachment: [f64; 3], // body-frame point the spring holds, rigid bodies only
    },
    BoundSpring {
        body: usize,
        other: usize,
        k: f64,
        #[serde(default)]
        rest_length: f64,
    },
    UniversalGravitation {
        #[serde(rename = "G")]
        big_g: f64, // gravitational constant
        #[serde(default)]
        eps2: f64, // softening
    },
}

/// One surface: coefficients plus its triangles and quads
#[derive(Deserialize, Debug, Clone)]
pub struct SurfaceConfig {
    pub elasticity: f64, // clamped into [0, 1]
    #[serde(default)]
    pub friction: f64, // clamped into [0, 2]
    #[serde(default)]
    pub triangles: Vec<[[f64; 3]; 3]>,
    #[serde(default)]
    pub quads: Vec<[[f64; 3]; 4]>, // corners in order around the boundary
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopConfig {
    Time { end: f64 },
    HitGround,
    CubeExit { max: f64 },
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    pub engine: EngineConfig, // engine-level configuration
    pub parameters: ParametersConfig, // run length and step
    pub bodies: Vec<BodyConfig>, // initial state of every body
    #[serde(default)]
    pub forces: Vec<ForceConfig>,
    #[serde(default)]
    pub surfaces: Vec<SurfaceConfig>,
    #[serde(default)]
    pub stop: Vec<StopConfig>,
}

fn default_true() -> bool {
    true
}
