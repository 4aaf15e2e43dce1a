//! Error type shared by the whole crate
//!
//! Construction errors (bad mass, degenerate geometry, singular inertia) are
//! returned to the caller and never clamped. Per-body update failures are
//! either contained by the engine or propagated, depending on
//! [`EngineParams::contain_body_failures`](crate::simulation::params::EngineParams).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid mass {0}: mass must be positive and finite")]
    InvalidMass(f64),

    #[error("invalid time step {0}: must be finite and non-negative")]
    InvalidTimestep(f64),

    #[error("degenerate triangle: vertices are coincident or collinear")]
    DegenerateTriangle,

    #[error("inertia tensor is not invertible")]
    SingularInertia,

    #[error("discrete body needs at least one constituent")]
    EmptyAggregate,

    #[error("degenerate path: {0}")]
    DegeneratePath(&'static str),

    #[error("non-finite {quantity} produced by update")]
    NonFinite { quantity: &'static str },

    #[error("body {body}: surface contact unresolved after {attempts} attempts")]
    CollisionUnresolved { body: usize, attempts: usize },

    #[error("no body with index {0}")]
    UnknownBody(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("trajectory format: {0}")]
    TrajectoryFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
