//! A surface is a set of triangles sharing one elasticity and one friction
//! coefficient.

use crate::collision::triangle::{SurfaceTag, Triangle};
use crate::error::Result;
use crate::simulation::states::NVec3;

pub const MAX_FRICTION: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct Surface {
    elasticity: f64, // 0 = perfectly inelastic, 1 = perfectly elastic
    friction_coefficient: f64, // kinetic, in [0, MAX_FRICTION]
    triangles: Vec<Triangle>,
}

impl Surface {
    /// Coefficients are clamped into their valid ranges
    pub fn new(elasticity: f64, friction_coefficient: f64) -> Self {
        Self {
            elasticity: clamp_or_zero(elasticity, 1.0),
            friction_coefficient: clamp_or_zero(friction_coefficient, MAX_FRICTION),
            triangles: Vec::new(),
        }
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }

    pub fn friction_coefficient(&self) -> f64 {
        self.friction_coefficient
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn with_triangle(mut self, triangle: Triangle) -> Self {
        self.add_triangle(triangle);
        self
    }

    /// Quad p1 p2 p3 p4 (in order around its boundary) as the triangles
    /// (p1, p2, p4) and (p4, p2, p3)
    pub fn add_quad(&mut self, p1: NVec3, p2: NVec3, p3: NVec3, p4: NVec3, tag: SurfaceTag) -> Result<()> {
        let first = Triangle::new(p1, p2, p4)?.with_tag(tag);
        let second = Triangle::new(p4, p2, p3)?.with_tag(tag);
        self.triangles.push(first);
        self.triangles.push(second);
        Ok(())
    }

    /// Horizontal square of half-width `half` at height `z`, normal up
    pub fn floor(elasticity: f64, friction_coefficient: f64, z: f64, half: f64) -> Result<Self> {
        let mut surface = Self::new(elasticity, friction_coefficient);
        surface.add_quad(
            NVec3::new(-half, -half, z),
            NVec3::new(half, -half, z),
            NVec3::new(half, half, z),
            NVec3::new(-half, half, z),
            SurfaceTag::default(),
        )?;
        Ok(surface)
    }
}

fn clamp_or_zero(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}
