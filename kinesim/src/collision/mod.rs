pub mod triangle;
pub mod surface;
pub mod surface_force;
