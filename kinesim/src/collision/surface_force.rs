//! Surface response
//!
//! [`SurfaceForce`] is a corrective force: it runs after every ordinary
//! force, predicts where each body would end the tick, and when that path
//! crosses a surface triangle it adds the force that reflects the
//! perpendicular velocity (scaled by the elasticity), cancels any other force
//! pushing into the surface, and applies kinetic friction along it.
//!
//! The closed form is exact for one planar contact. When several triangles
//! are crossed they are handled nearest first; if the path still penetrates
//! afterwards the force is recomputed to land just short of the nearest
//! crossing, and as a last resort an escalating randomized search looks for
//! any force that avoids penetration.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::collision::surface::Surface;
use crate::collision::triangle::Triangle;
use crate::error::{Result, SimError};
use crate::simulation::forces::{Force, ForceContext, ForceStage};
use crate::simulation::projectile::Projectile;
use crate::simulation::states::NVec3;

/// Fraction of the way to a crossing that a pulled-back target keeps
const PULL_BACK: f64 = 0.99;
const MAX_PULL_BACKS: usize = 10_000;

/// Fallback schedule: attempt index at which each stage ends
const GROW_UNTIL: usize = 1_000;
const SHRINK_UNTIL: usize = 2_000;
const REVERSE_AT: usize = 2_000;
const SAME_MAGNITUDE_UNTIL: usize = 10_000;
const GAUSSIAN_UNTIL: usize = 30_000;
pub const FALLBACK_ATTEMPTS: usize = 100_000;

const SCALE_STEP: f64 = 1.01;
const GAUSSIAN_SPREAD: f64 = 0.1; // standard deviation as a fraction of the magnitude
const ARBITRARY_MAGNITUDE: f64 = 1e6;

pub struct SurfaceForce {
    surfaces: Vec<Surface>,
    rng: Mutex<StdRng>, // drives the fallback search only
}

struct Contact<'a> {
    surface: &'a Surface,
    triangle: &'a Triangle,
    distance: f64, // from the body to the plane crossing along the predicted path
}

impl SurfaceForce {
    pub fn new(seed: u64) -> Self {
        Self {
            surfaces: Vec::new(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn add_surface(&mut self, surface: Surface) {
        self.surfaces.push(surface);
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.add_surface(surface);
        self
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    fn crossed<'a>(&'a self, start: &'a NVec3, end: &'a NVec3) -> impl Iterator<Item = (&'a Surface, &'a Triangle)> + 'a {
        self.surfaces
            .iter()
            .flat_map(|s| s.triangles().iter().map(move |t| (s, t)))
            .filter(move |(_, t)| t.passed_through(start, end))
    }

    /// Whether the segment start → end passes through any triangle
    pub fn crosses_any(&self, start: &NVec3, end: &NVec3) -> bool {
        self.crossed(start, end).next().is_some()
    }

    /// Force that keeps `body` from passing through any surface during a tick
    /// of `dt`, given everything already accumulated on it
    pub fn corrective_force(&self, index: usize, body: &Projectile, dt: f64) -> Result<NVec3> {
        if !(dt > 0.0) {
            return Ok(NVec3::zeros());
        }
        let start = body.position;
        let (end, _) = body.predict(NVec3::zeros(), dt);

        let mut contacts: Vec<Contact<'_>> = self
            .crossed(&start, &end)
            .map(|(surface, triangle)| Contact {
                surface,
                triangle,
                distance: triangle.intersection(&start, &end).map_or(0.0, |hit| (hit - start).norm()),
            })
            .collect();
        if contacts.is_empty() {
            return Ok(NVec3::zeros());
        }
        contacts.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let mut force = NVec3::zeros();
        for (i, contact) in contacts.iter().enumerate() {
            let (end, _) = body.predict(force, dt);
            // later contacts only matter if the corrected path still hits them
            if i > 0 && !contact.triangle.passed_through(&start, &end) {
                continue;
            }
            force += contact_force(body, contact, &end, &force, dt);
        }

        let (end, _) = body.predict(force, dt);
        if !self.crosses_any(&start, &end) {
            return Ok(force);
        }

        // a constant force cannot reverse the approach within the tick
        // without passing the plane, so land just short of it instead
        let target = match contacts.as_slice() {
            [only] => self.plane_landing(&start, &end, only.triangle),
            _ => None,
        }
        .unwrap_or_else(|| self.nearest_safe_position(&start, &end));
        force = force_for_position(body, &target, dt);
        let (end, _) = body.predict(force, dt);
        if !self.crosses_any(&start, &end) {
            return Ok(force);
        }

        warn!(
            body = index,
            position = ?start,
            "surface correction still penetrates; searching for a fallback force"
        );
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let penetrates = |candidate: &NVec3| {
            let (end, _) = body.predict(*candidate, dt);
            self.crosses_any(&start, &end)
        };
        escalate(force, penetrates, &mut *rng).ok_or(SimError::CollisionUnresolved {
            body: index,
            attempts: FALLBACK_ATTEMPTS,
        })
    }

    /// `end` moved along the triangle normal to finish on the start side, at
    /// a hundredth of the starting distance from the plane. Motion along the
    /// plane is left as the closed form computed it, and the outward
    /// velocity is the least any landing short of the plane allows.
    /// `None` if the landing still crosses something.
    fn plane_landing(&self, start: &NVec3, end: &NVec3, triangle: &Triangle) -> Option<NVec3> {
        let from = triangle.signed_distance(start);
        let to = triangle.signed_distance(end);
        let landing = end + triangle.normal() * (from * (1.0 - PULL_BACK) - to);
        (!self.crosses_any(start, &landing)).then_some(landing)
    }

    /// Closest point to `start`, pulled back from a crossed triangle, that
    /// can be reached without crossing anything; `start` itself if none
    fn nearest_safe_position(&self, start: &NVec3, end: &NVec3) -> NVec3 {
        self.crossed(start, end)
            .filter_map(|(_, t)| t.intersection(start, end))
            .map(|hit| self.pull_back(start, &hit))
            .filter(|p| !self.crosses_any(start, p))
            .min_by(|a, b| (a - start).norm_squared().total_cmp(&(b - start).norm_squared()))
            .unwrap_or(*start)
    }

    fn pull_back(&self, start: &NVec3, hit: &NVec3) -> NVec3 {
        let mut point = start + (hit - start) * PULL_BACK;
        for _ in 0..MAX_PULL_BACKS {
            if !self.crosses_any(start, &point) {
                break;
            }
            point = start + (point - start) * PULL_BACK;
        }
        point
    }
}

impl Default for SurfaceForce {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Force for SurfaceForce {
    fn apply(&self, ctx: &ForceContext<'_>) -> Result<()> {
        for (index, body) in ctx.bodies.iter().enumerate() {
            if body.is_frozen() {
                continue;
            }
            let force = self.corrective_force(index, body.projectile(), ctx.delta_time)?;
            if force != NVec3::zeros() {
                body.add_force(force);
            }
        }
        Ok(())
    }

    fn stage(&self) -> ForceStage {
        ForceStage::Corrective
    }
}

/// Reflection, inward-force cancellation and friction for one contact
///
/// `current` is the correction already decided for nearer contacts; the
/// body's contact velocity includes its effect.
fn contact_force(body: &Projectile, contact: &Contact<'_>, end: &NVec3, current: &NVec3, dt: f64) -> NVec3 {
    let mass = body.mass();
    let triangle = contact.triangle;
    let normal = *triangle.normal();
    let into = if triangle.signed_distance(end) < triangle.signed_distance(&body.position) { -normal } else { normal };

    let velocity = body.velocity + current * (dt / mass);
    let perpendicular = normal * velocity.dot(&normal);
    let parallel = velocity - perpendicular;

    let other = body.net_force();
    let pushing_in = other.dot(&into);
    let cancel = if pushing_in > 0.0 { -into * pushing_in } else { NVec3::zeros() };

    // v⊥' = −e·v⊥
    let normal_force = perpendicular * (-(1.0 + contact.surface.elasticity()) * mass / dt) + cancel;
    let friction_limit = contact.surface.friction_coefficient() * normal_force.norm();
    normal_force + friction_force(mass, &parallel, friction_limit, &other, dt)
}

/// Kinetic friction against `parallel`, or the exact force that brings the
/// sliding velocity to rest if friction would otherwise reverse it
fn friction_force(mass: f64, parallel: &NVec3, limit: f64, other: &NVec3, dt: f64) -> NVec3 {
    let speed = parallel.norm();
    if speed == 0.0 || limit == 0.0 {
        return NVec3::zeros();
    }
    let direction = parallel / speed;
    let along = other.dot(&direction);

    if speed + (along - limit) * dt / mass > 0.0 {
        -direction * limit
    } else {
        -direction * (mass * speed / dt + along)
    }
}

/// Force that lands the body exactly on `target` after `dt`, given the
/// force already accumulated on it
fn force_for_position(body: &Projectile, target: &NVec3, dt: f64) -> NVec3 {
    let acceleration = (target - body.position - body.velocity * dt) * (2.0 / (dt * dt));
    acceleration * body.mass() - body.net_force()
}

/// Escalating search for a force that `penetrates` rejects
///
/// Starting from `original`: grow it by 1%, then shrink it by 1%, reverse
/// it, try random directions at the same magnitude, then Gaussian
/// magnitudes around it (10% spread), then arbitrary magnitudes. `None`
/// after [`FALLBACK_ATTEMPTS`] candidates.
pub fn escalate(original: NVec3, penetrates: impl Fn(&NVec3) -> bool, rng: &mut StdRng) -> Option<NVec3> {
    let magnitude = original.norm();
    let mut candidate = original;
    for attempt in 0..FALLBACK_ATTEMPTS {
        candidate = match attempt {
            0 => original,
            a if a < GROW_UNTIL => candidate * SCALE_STEP,
            a if a == GROW_UNTIL => original / SCALE_STEP,
            a if a < SHRINK_UNTIL => candidate / SCALE_STEP,
            a if a == REVERSE_AT => -original,
            a if a < SAME_MAGNITUDE_UNTIL => random_direction(rng) * magnitude,
            a if a < GAUSSIAN_UNTIL => {
                random_direction(rng) * gaussian(rng, magnitude, GAUSSIAN_SPREAD * magnitude)
            }
            _ => random_direction(rng) * rng.gen_range(0.0..ARBITRARY_MAGNITUDE),
        };
        if !penetrates(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn random_direction(rng: &mut StdRng) -> NVec3 {
    let z: f64 = rng.gen_range(-1.0..=1.0);
    let phi: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    NVec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Box–Muller normal sample
fn gaussian(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>(); // (0, 1]
    let u2: f64 = rng.gen();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::triangle::SurfaceTag;
    use approx::assert_relative_eq;
    use std::cell::RefCell;

    fn wall_at_x1() -> Surface {
        let mut wall = Surface::new(0.5, 0.0);
        wall.add_quad(
            NVec3::new(1.0, -2.0, -2.0),
            NVec3::new(1.0, -2.0, 2.0),
            NVec3::new(1.0, 2.0, 2.0),
            NVec3::new(1.0, 2.0, -2.0),
            SurfaceTag::default(),
        )
        .unwrap();
        wall
    }

    #[test]
    fn no_force_away_from_surfaces() {
        let force = SurfaceForce::default().with_surface(Surface::floor(1.0, 0.0, 0.0, 1.0).unwrap());
        let body = Projectile::new(NVec3::new(0.3, 0.1, 1.0), NVec3::new(0.0, 0.0, -1.0), 1.0).unwrap();
        assert_eq!(force.corrective_force(0, &body, 0.1).unwrap(), NVec3::zeros());
        assert_eq!(force.corrective_force(0, &body, 0.0).unwrap(), NVec3::zeros());
    }

    #[test]
    fn corner_contacts_resolved_nearest_first() {
        let force = SurfaceForce::default()
            .with_surface(Surface::floor(0.5, 0.0, 0.0, 2.0).unwrap())
            .with_surface(wall_at_x1());
        let mut body = Projectile::new(NVec3::new(0.96, 0.0, 0.05), NVec3::new(1.0, 0.0, -1.0), 1.0).unwrap();

        let correction = force.corrective_force(0, &body, 0.1).unwrap();
        body.add_force(correction);
        body.update(0.1).unwrap();

        assert!(body.position.x < 1.0 && body.position.z > 0.0, "penetrated: {:?}", body.position);
        assert_relative_eq!(body.velocity, NVec3::new(-0.5, 0.0, 0.5), epsilon = 1e-9);
    }

    #[test]
    fn approach_inside_half_a_step_lands_short_of_plane() {
        // 3 cm above an inelastic floor at 1 m/s with dt = 0.1: even stopping
        // dead at the plane needs 5 cm
        let force = SurfaceForce::default().with_surface(Surface::floor(0.0, 0.0, 0.0, 2.0).unwrap());
        let mut body = Projectile::new(NVec3::new(0.3, 0.1, 0.03), NVec3::new(0.5, 0.0, -1.0), 1.0).unwrap();
        body.add_force(NVec3::new(0.0, 0.0, -9.8));

        let correction = force.corrective_force(0, &body, 0.1).unwrap();
        body.add_force(correction);
        body.update(0.1).unwrap();

        assert_relative_eq!(body.position.z, 0.03 * (1.0 - PULL_BACK), epsilon = 1e-12);
        // least outward speed a landing at that height allows: 2·(z' − z)/dt + 1
        assert_relative_eq!(body.velocity.z, 1.0 - 2.0 * PULL_BACK * 0.03 / 0.1, epsilon = 1e-9);
        // sliding is untouched
        assert_relative_eq!(body.position.x, 0.35, epsilon = 1e-12);
        assert_relative_eq!(body.velocity.x, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn friction_stops_without_reversing() {
        let limit = 10.0;
        // sliding at 0.05 m/s, friction could remove 0.1 m/s in one tick
        let f = friction_force(1.0, &NVec3::new(0.05, 0.0, 0.0), limit, &NVec3::zeros(), 0.01);
        assert_relative_eq!(f, NVec3::new(-5.0, 0.0, 0.0), epsilon = 1e-9);

        let f = friction_force(1.0, &NVec3::new(1.0, 0.0, 0.0), limit, &NVec3::zeros(), 0.01);
        assert_relative_eq!(f, NVec3::new(-10.0, 0.0, 0.0));
    }

    #[test]
    fn fallback_grows_until_accepted() {
        let mut rng = StdRng::seed_from_u64(7);
        let found = escalate(NVec3::x(), |f| f.x < 2.0, &mut rng).unwrap();
        assert!(found.x >= 2.0 && found.x < 2.0 * SCALE_STEP);
    }

    #[test]
    fn gaussian_stage_stays_near_original_magnitude() {
        let mut rng = StdRng::seed_from_u64(11);
        let tried = RefCell::new(Vec::new());
        let original = NVec3::new(0.0, 0.0, 50.0);
        escalate(
            original,
            |f| {
                tried.borrow_mut().push(f.norm());
                true
            },
            &mut rng,
        );

        let tried = tried.into_inner();
        assert_eq!(tried.len(), FALLBACK_ATTEMPTS);
        let gaussian = &tried[SAME_MAGNITUDE_UNTIL..GAUSSIAN_UNTIL];
        // 10% spread: nothing beyond eight standard deviations
        assert!(gaussian.iter().all(|m| (m - 50.0).abs() < 40.0));
        let mean = gaussian.iter().sum::<f64>() / gaussian.len() as f64;
        assert!((mean - 50.0).abs() < 0.5, "mean magnitude {mean}");
    }

    #[test]
    fn fallback_gives_up() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(escalate(NVec3::x(), |_| true, &mut rng).is_none());
    }
}
