pub mod states;
pub mod params;
pub mod projectile;
pub mod extended;
pub mod constrained;
pub mod forces;
pub mod stop;
pub mod engine;
pub mod adaptive;
pub mod trajectory;
pub mod telemetry;
pub mod scenario;
