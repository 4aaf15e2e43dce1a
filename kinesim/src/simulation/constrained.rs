//! Projectiles constrained to a parametric path
//!
//! The path is a curve `x(q)` over `[initial_parameter, final_parameter]`.
//! On each update the body's acceleration and velocity are projected onto the
//! local tangent and the parameter is advanced by the chain rule
//! `dq/dt = v·x'(q) / |x'(q)|²`.

use std::f64::consts::TAU;
use std::fmt;

use tracing::warn;

use crate::error::{Result, SimError};
use crate::simulation::projectile::{ensure_finite, Projectile};
use crate::simulation::states::NVec3;

/// Parameter steps tried before a body is stopped in place
const MAX_CORRECTION_TRIES: usize = 10;

pub trait Path: Send + Sync + fmt::Debug {
    fn position(&self, parameter: f64) -> NVec3;
    fn initial_parameter(&self) -> f64;
    fn final_parameter(&self) -> f64;

    fn tolerance(&self) -> f64 {
        0.001
    }

    fn minimum_step(&self) -> f64 {
        1e-4
    }

    /// Central difference over one minimum step
    fn dx(&self, parameter: f64) -> NVec3 {
        let h = 0.5 * self.minimum_step();
        self.position(parameter + h) - self.position(parameter - h)
    }

    /// dx/dq
    fn derivative(&self, parameter: f64) -> NVec3 {
        self.dx(parameter) / self.minimum_step()
    }

    /// Component of `input` along the tangent at `parameter`
    fn project(&self, input: &NVec3, parameter: f64) -> NVec3 {
        let tangent = self.dx(parameter);
        let length_squared = tangent.norm_squared();
        if length_squared == 0.0 {
            return NVec3::zeros();
        }
        tangent * (input.dot(&tangent) / length_squared)
    }

    /// Next sample parameter for a closest-point scan; the step grows while
    /// the chord stays within tolerance of the curve
    fn next_parameter(&self, current: f64, last: f64) -> f64 {
        let mut step = self.minimum_step();
        while good_guess(self, current, step) {
            step *= 2.0;
            if current + step > last {
                return last;
            }
        }
        current + step / 2.0
    }

    /// Parameter of the point nearest to `position`: the nearest sample of an
    /// adaptive scan, refined between its neighbouring samples
    fn closest_parameter(&self, position: &NVec3) -> f64 {
        let last = self.final_parameter();
        let mut samples = vec![self.initial_parameter()];
        while let Some(&current) = samples.last() {
            if current >= last {
                break;
            }
            samples.push(self.next_parameter(current, last));
        }

        let distance = |q: f64| (self.position(q) - position).norm_squared();
        let nearest = samples
            .iter()
            .enumerate()
            .min_by(|a, b| distance(*a.1).total_cmp(&distance(*b.1)))
            .map_or(0, |(i, _)| i);

        let lo = samples[nearest.saturating_sub(1)];
        let hi = samples[(nearest + 1).min(samples.len() - 1)];
        refine_minimum(lo, hi, distance)
    }
}

/// Ternary search for the minimum of `f` on `[lo, hi]`
fn refine_minimum(mut lo: f64, mut hi: f64, f: impl Fn(f64) -> f64) -> f64 {
    const ITERATIONS: usize = 100;
    for _ in 0..ITERATIONS {
        let third = (hi - lo) / 3.0;
        let (a, b) = (lo + third, hi - third);
        if f(a) <= f(b) {
            hi = b;
        } else {
            lo = a;
        }
    }
    0.5 * (lo + hi)
}

/// Whether the midpoint of the chord from `current` to `current + step`
/// lies within tolerance of the curve
fn good_guess<P: Path + ?Sized>(path: &P, current: f64, step: f64) -> bool {
    let start = path.position(current);
    let end = path.position(current + step);
    let chord_mid = (start + end) * 0.5;
    let curve_mid = path.position(current + step * 0.5);
    (chord_mid - curve_mid).norm() < path.tolerance()
}

/// Straight segment from `start` (q = 0) to `end` (q = 1)
#[derive(Debug, Clone)]
pub struct LinePath {
    start: NVec3,
    end: NVec3,
}

impl LinePath {
    pub fn new(start: NVec3, end: NVec3) -> Result<Self> {
        if (end - start).norm_squared() == 0.0 {
            return Err(SimError::DegeneratePath("line endpoints coincide"));
        }
        Ok(Self { start, end })
    }
}

impl Path for LinePath {
    fn position(&self, parameter: f64) -> NVec3 {
        self.start + (self.end - self.start) * parameter
    }

    fn initial_parameter(&self) -> f64 {
        0.0
    }

    fn final_parameter(&self) -> f64 {
        1.0
    }
}

/// Circle around `center` in the plane normal to `axis`, q in [0, 2π]
#[derive(Debug, Clone)]
pub struct CirclePath {
    center: NVec3,
    radius: f64,
    u: NVec3, // in-plane basis
    v: NVec3,
}

impl CirclePath {
    pub fn new(center: NVec3, radius: f64, axis: NVec3) -> Result<Self> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(SimError::DegeneratePath("circle radius must be positive"));
        }
        let normal = axis.try_normalize(f64::EPSILON).ok_or(SimError::DegeneratePath("circle axis has zero length"))?;
        // any vector not parallel to the normal seeds the basis
        let seed = if normal.x.abs() < 0.9 { NVec3::x() } else { NVec3::y() };
        let u = normal.cross(&seed).normalize();
        let v = normal.cross(&u);
        Ok(Self { center, radius, u, v })
    }
}

impl Path for CirclePath {
    fn position(&self, parameter: f64) -> NVec3 {
        self.center + (self.u * parameter.cos() + self.v * parameter.sin()) * self.radius
    }

    fn initial_parameter(&self) -> f64 {
        0.0
    }

    fn final_parameter(&self) -> f64 {
        TAU
    }
}

#[derive(Debug)]
pub struct ConstrainedProjectile {
    linear: Projectile,
    path: Box<dyn Path>,
    parameter: f64, // current position on the path
}

impl ConstrainedProjectile {
    /// Snaps the body onto the closest sampled point of `path` and keeps
    /// only the tangential part of `velocity`
    pub fn new<P: Path + 'static>(position: NVec3, velocity: NVec3, mass: f64, path: P) -> Result<Self> {
        let parameter = path.closest_parameter(&position);
        let snapped = path.position(parameter);
        let tangential = path.project(&velocity, parameter);
        Ok(Self {
            linear: Projectile::new(snapped, tangential, mass)?,
            path: Box::new(path),
            parameter,
        })
    }

    pub fn linear(&self) -> &Projectile {
        &self.linear
    }

    pub(crate) fn linear_mut(&mut self) -> &mut Projectile {
        &mut self.linear
    }

    pub fn parameter(&self) -> f64 {
        self.parameter
    }

    pub fn path(&self) -> &dyn Path {
        self.path.as_ref()
    }

    pub(crate) fn restore(&mut self, parameter: f64) {
        self.parameter = parameter;
    }

    pub fn add_force(&self, force: NVec3) {
        self.linear.add_force(force);
    }

    pub fn update(&mut self, dt: f64) -> Result<()> {
        let force = self.linear.take_force();
        let path = self.path.as_ref();
        let start = self.linear.position;

        let acceleration = path.project(&(force / self.linear.mass()), self.parameter);
        let mut velocity = path.project(&(self.linear.velocity + acceleration * dt), self.parameter);
        ensure_finite(&velocity, "velocity")?;

        let derivative = path.derivative(self.parameter);
        let derivative_squared = derivative.norm_squared();
        let rate = if derivative_squared > 0.0 { velocity.dot(&derivative) / derivative_squared } else { 0.0 };

        // the path must not carry the body further than it would move freely
        let classical = (velocity * dt).norm_squared();
        let mut parameter = self.parameter + rate * dt;
        let mut position = path.position(parameter);
        let mut distance = (position - start).norm_squared();

        let mut tries = 0;
        while classical - distance + path.tolerance() < 0.0 {
            tries += 1;
            if tries > MAX_CORRECTION_TRIES {
                warn!(parameter = self.parameter, "path step did not converge; stopping body");
                parameter = self.parameter;
                position = start;
                velocity = NVec3::zeros();
                break;
            }
            let proportion = classical / distance;
            parameter = self.parameter + rate * dt * proportion;
            position = path.position(parameter);
            distance = (position - start).norm_squared();
        }

        ensure_finite(&position, "position")?;
        self.parameter = parameter;
        self.linear.commit(position, velocity, acceleration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn degenerate_paths_are_rejected() {
        assert!(LinePath::new(NVec3::zeros(), NVec3::zeros()).is_err());
        assert!(CirclePath::new(NVec3::zeros(), 0.0, NVec3::z()).is_err());
        assert!(CirclePath::new(NVec3::zeros(), 1.0, NVec3::zeros()).is_err());
    }

    #[test]
    fn closest_parameter_on_line() {
        let line = LinePath::new(NVec3::zeros(), NVec3::new(10.0, 0.0, 0.0)).unwrap();
        let q = line.closest_parameter(&NVec3::new(3.0, 2.0, 0.0));
        assert!((q - 0.3).abs() < 1e-3, "q = {q}");
    }

    #[test]
    fn projection_drops_normal_component() {
        let line = LinePath::new(NVec3::zeros(), NVec3::new(1.0, 1.0, 0.0)).unwrap();
        let p = line.project(&NVec3::new(1.0, 0.0, 0.0), 0.5);
        assert_relative_eq!(p, NVec3::new(0.5, 0.5, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn body_slides_along_line() {
        let line = LinePath::new(NVec3::zeros(), NVec3::new(10.0, 0.0, 0.0)).unwrap();
        let mut body = ConstrainedProjectile::new(NVec3::new(1.0, 0.5, 0.0), NVec3::new(1.0, 3.0, 0.0), 1.0, line).unwrap();
        assert_relative_eq!(body.linear().position.y, 0.0);
        assert_relative_eq!(body.linear().velocity, NVec3::new(1.0, 0.0, 0.0), epsilon = 1e-9);

        body.add_force(NVec3::new(0.0, -9.8, 0.0));
        body.update(0.1).unwrap();
        assert_relative_eq!(body.linear().position, NVec3::new(1.1, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(body.parameter(), 0.11, epsilon = 1e-6);
    }

    #[test]
    fn body_stays_on_circle() {
        let circle = CirclePath::new(NVec3::zeros(), 2.0, NVec3::z()).unwrap();
        let start = circle.position(0.0);
        let tangent = circle.derivative(0.0).normalize();
        let mut body = ConstrainedProjectile::new(start, tangent, 1.0, circle).unwrap();
        for _ in 0..100 {
            body.update(0.01).unwrap();
            assert_relative_eq!(body.linear().position.norm(), 2.0, epsilon = 1e-9);
        }
        assert!(body.parameter() > 0.0);
    }
}
