//! Oriented triangles and the geometric queries the surface response needs
//!
//! The normal follows the right-hand rule over (p1, p2, p3). Signed
//! distances are positive on the normal side.

use crate::error::{Result, SimError};
use crate::simulation::states::NVec3;

/// Relative area below which a triangle is considered degenerate
const DEGENERATE_EPS: f64 = 1e-12;

/// Display-only attributes; ignored by the physics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceTag {
    pub color: [u8; 4], // rgba
    pub transparent: bool,
}

impl Default for SurfaceTag {
    fn default() -> Self {
        Self { color: [128, 128, 128, 255], transparent: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    vertices: [NVec3; 3],
    normal: NVec3, // unit
    tag: SurfaceTag,
}

impl Triangle {
    pub fn new(p1: NVec3, p2: NVec3, p3: NVec3) -> Result<Self> {
        let cross = (p2 - p1).cross(&(p3 - p1));
        let scale = (p2 - p1).norm_squared().max((p3 - p1).norm_squared());
        if !(cross.norm() > DEGENERATE_EPS * scale) {
            return Err(SimError::DegenerateTriangle);
        }
        Ok(Self {
            vertices: [p1, p2, p3],
            normal: cross.normalize(),
            tag: SurfaceTag::default(),
        })
    }

    pub fn with_tag(mut self, tag: SurfaceTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn vertices(&self) -> &[NVec3; 3] {
        &self.vertices
    }

    pub fn normal(&self) -> &NVec3 {
        &self.normal
    }

    pub fn tag(&self) -> &SurfaceTag {
        &self.tag
    }

    /// Distance from the triangle's plane, positive on the normal side
    pub fn signed_distance(&self, point: &NVec3) -> f64 {
        self.normal.dot(&(point - self.vertices[0]))
    }

    /// Whether the segment start → end crosses the triangle
    ///
    /// A crossing changes the side of the plane strictly, or leaves the plane
    /// towards the back; the plane hit point must lie inside the triangle
    /// (edges included).
    pub fn passed_through(&self, start: &NVec3, end: &NVec3) -> bool {
        let d0 = self.signed_distance(start);
        let d1 = self.signed_distance(end);
        let crosses = (d0 > 0.0 && d1 < 0.0) || (d0 < 0.0 && d1 > 0.0) || (d0 == 0.0 && d1 < 0.0);
        if !crosses {
            return false;
        }
        let hit = start + (end - start) * (d0 / (d0 - d1));
        self.contains_coplanar(&hit)
    }

    /// Where the line through start and end meets the triangle's plane;
    /// `None` when the line is parallel to it
    pub fn intersection(&self, start: &NVec3, end: &NVec3) -> Option<NVec3> {
        let direction = end - start;
        let denominator = self.normal.dot(&direction);
        if denominator.abs() <= f64::EPSILON * direction.norm() {
            return None;
        }
        let t = -self.signed_distance(start) / denominator;
        Some(start + direction * t)
    }

    /// Barycentric inside test for a point assumed to lie in the plane
    pub fn contains_coplanar(&self, point: &NVec3) -> bool {
        let [a, b, c] = &self.vertices;
        let v0 = c - a;
        let v1 = b - a;
        let v2 = point - a;

        let dot00 = v0.dot(&v0);
        let dot01 = v0.dot(&v1);
        let dot02 = v0.dot(&v2);
        let dot11 = v1.dot(&v1);
        let dot12 = v1.dot(&v2);

        let inv = 1.0 / (dot00 * dot11 - dot01 * dot01);
        let u = (dot11 * dot02 - dot01 * dot12) * inv;
        let v = (dot00 * dot12 - dot01 * dot02) * inv;
        u >= 0.0 && v >= 0.0 && u + v <= 1.0
    }

    /// Closest point of the triangle to `p` (Voronoi region walk)
    pub fn closest_point(&self, p: &NVec3) -> NVec3 {
        let [a, b, c] = self.vertices;
        let ab = b - a;
        let ac = c - a;

        let ap = p - a;
        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }

        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            return a + ab * (d1 / (d1 - d3));
        }

        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            return a + ac * (d2 / (d2 - d6));
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
        }

        let denom = 1.0 / (va + vb + vc);
        a + ab * (vb * denom) + ac * (vc * denom)
    }

    pub fn distance_to_point(&self, p: &NVec3) -> f64 {
        (self.closest_point(p) - p).norm()
    }

    /// Shortest distance between the triangle and the segment start → end
    pub fn distance_to_segment(&self, start: &NVec3, end: &NVec3) -> f64 {
        if self.touches_segment(start, end) {
            return 0.0;
        }
        let [a, b, c] = &self.vertices;
        let edges = [(a, b), (b, c), (c, a)];
        edges
            .iter()
            .map(|(p, q)| segment_distance(start, end, p, q))
            .fold(self.distance_to_point(start).min(self.distance_to_point(end)), f64::min)
    }

    fn touches_segment(&self, start: &NVec3, end: &NVec3) -> bool {
        let d0 = self.signed_distance(start);
        let d1 = self.signed_distance(end);
        if d0 * d1 > 0.0 {
            return false;
        }
        if d0 == d1 {
            // segment lies in the plane; edge distances settle it
            return self.contains_coplanar(start) || self.contains_coplanar(end);
        }
        let hit = start + (end - start) * (d0 / (d0 - d1));
        self.contains_coplanar(&hit)
    }
}

/// Distance between segments p1 → q1 and p2 → q2
fn segment_distance(p1: &NVec3, q1: &NVec3, p2: &NVec3, q2: &NVec3) -> f64 {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    let (s, t) = if a <= f64::EPSILON && e <= f64::EPSILON {
        (0.0, 0.0)
    } else if a <= f64::EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= f64::EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s = if denom > 0.0 { ((b * f - c * e) / denom).clamp(0.0, 1.0) } else { 0.0 };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    ((p1 + d1 * s) - (p2 + d2 * t)).norm()
}
