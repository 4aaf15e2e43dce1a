pub mod error;
pub mod simulation;
pub mod collision;
pub mod configuration;
pub mod benchmark;

pub use error::{Result, SimError};

pub use simulation::states::{Body, BodyId, BodyState, NMat3, NVec3, Rotation};
pub use simulation::projectile::Projectile;
pub use simulation::extended::{ExtendedProjectile, MassDistribution, SolidBox, SolidShape, SolidSphere};
pub use simulation::constrained::{CirclePath, ConstrainedProjectile, LinePath, Path};
pub use simulation::forces::{
    AirResistanceForce, ConstantForce, ConstantGravitationForce, FixedSpringForce, Force, ForceContext, ForceStage,
    ProjectileBoundSpringForce, UniversalGravitationForce,
};
pub use simulation::stop::{CubeExitStopCondition, HitGroundStopCondition, StopCondition, TimeStopCondition};
pub use simulation::engine::{EngineSnapshot, KinematicsEngine, Stepper};
pub use simulation::adaptive::{AdaptiveEngine, PlainIncrement, StepHook};
pub use simulation::params::{AdaptiveParams, EngineParams, Parameters};
pub use simulation::trajectory::{Playback, TrajectoryReader, TrajectoryWriter};
pub use simulation::telemetry::{ConsoleSink, NullSink, RecordingSink, TelemetrySink};
pub use simulation::scenario::{RunSummary, Scenario};

pub use collision::triangle::{SurfaceTag, Triangle};
pub use collision::surface::Surface;
pub use collision::surface_force::SurfaceForce;

pub use configuration::config::{BodyConfig, EngineConfig, ForceConfig, ParametersConfig, ScenarioConfig, StopConfig, SurfaceConfig};

pub use benchmark::benchmark::{bench_adaptive, bench_surface_force};
