//! Geometry helpers shared by the build stages.

use glam::{U16Vec3, UVec3, Vec2, Vec3A, Vec3Swizzles as _};

/// An axis-aligned bounding box in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner of the box.
    pub min: Vec3A,
    /// The maximum corner of the box.
    pub max: Vec3A,
}

impl Aabb3d {
    /// Creates a box from its center and half extents.
    #[inline]
    pub fn new(center: impl Into<Vec3A>, half_size: impl Into<Vec3A>) -> Self {
        let center = center.into();
        let half_size = half_size.into();
        Self {
            min: center - half_size,
            max: center + half_size,
        }
    }

    /// Computes the smallest box containing all `verts`.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec3A]) -> Option<Self> {
        let mut iter = verts.iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Self { min, max })
    }

    /// The size of the box along each axis.
    #[inline]
    pub fn extent(&self) -> Vec3A {
        self.max - self.min
    }

    /// Returns `true` if the boxes overlap on all three axes. Touching counts as overlapping.
    #[inline]
    pub fn intersects(&self, other: &Aabb3d) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }
}

/// An axis-aligned bounding box on the xz-plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb2d {
    /// The minimum corner of the box.
    pub min: Vec2,
    /// The maximum corner of the box.
    pub max: Vec2,
}

impl Aabb2d {
    /// Computes the smallest box containing all `verts`.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec2]) -> Option<Self> {
        let mut iter = verts.iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Self { min, max })
    }

    /// Returns `true` if the boxes overlap. Touching counts as overlapping.
    #[inline]
    pub fn intersects(&self, other: &Aabb2d) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }
}

impl From<Aabb3d> for Aabb2d {
    fn from(aabb: Aabb3d) -> Self {
        Self {
            min: aabb.min.xz(),
            max: aabb.max.xz(),
        }
    }
}

pub(crate) trait TriangleIndices {
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A;
}

impl TriangleIndices for UVec3 {
    #[inline]
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A {
        let a = vertices[self[0] as usize];
        let b = vertices[self[1] as usize];
        let c = vertices[self[2] as usize];
        let ab = b - a;
        let ac = c - a;
        ab.cross(ac).normalize_or_zero()
    }
}

/// Gets the standard width (x-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The width offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_x(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard height (z-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The height offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_z(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

/// Gets the direction for the specified offset. One of x and z should be 0.
#[inline]
pub(crate) fn dir_offset(x: i32, z: i32) -> u8 {
    const DIRS: [u8; 5] = [3, 0, u8::MAX, 2, 1];
    DIRS[(((z + 1) << 1) + x) as usize]
}

#[inline]
pub(crate) fn next(i: usize, n: usize) -> usize {
    if i + 1 < n { i + 1 } else { 0 }
}

#[inline]
pub(crate) fn prev(i: usize, n: usize) -> usize {
    if i >= 1 { i - 1 } else { n - 1 }
}

/// Squared distance on the xz-plane between `pt` and the segment `p`-`q`.
pub(crate) fn distance_squared_between_point_and_line_vec2(pt: Vec2, (p, q): (Vec2, Vec2)) -> f32 {
    let pq = q - p;
    let dx = pt.x - p.x;
    let dz = pt.y - p.y;
    let d = pq.length_squared();
    let mut t = pq.x * dx + pq.y * dz;
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    let dx = p.x + t * pq.x - pt.x;
    let dz = p.y + t * pq.y - pt.y;
    dx * dx + dz * dz
}

/// Squared distance in 3D between `pt` and the segment `p`-`q`.
pub(crate) fn distance_squared_between_point_and_line_vec3(
    pt: Vec3A,
    (p, q): (Vec3A, Vec3A),
) -> f32 {
    let pq = q - p;
    let d = pq.length_squared();
    let mut t = pq.dot(pt - p);
    if d > 0.0 {
        t /= d;
    }
    t = t.clamp(0.0, 1.0);
    (p + pq * t - pt).length_squared()
}

/// Twice the signed area of the triangle `a`, `b`, `c` on the xz-plane.
#[inline]
pub(crate) fn vcross2(a: Vec3A, b: Vec3A, c: Vec3A) -> f32 {
    let u = b - a;
    let v = c - a;
    u.x * v.z - v.x * u.z
}

#[inline]
pub(crate) fn next_pow2(mut v: u32) -> u32 {
    v = v.saturating_sub(1);
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v.wrapping_add(1)
}

#[inline]
pub(crate) fn ilog2(v: u32) -> u32 {
    v.checked_ilog2().unwrap_or(0)
}

/// Twice the signed area of the triangle `a`, `b`, `c` on the xz-plane of the voxel grid.
#[inline]
pub(crate) fn area2(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> i32 {
    (b.x as i32 - a.x as i32) * (c.z as i32 - a.z as i32)
        - (c.x as i32 - a.x as i32) * (b.z as i32 - a.z as i32)
}

/// Returns true iff `c` is strictly to the left of the directed line through `a` to `b`.
#[inline]
pub(crate) fn left(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
    area2(a, b, c) < 0
}

#[inline]
pub(crate) fn left_on(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
    area2(a, b, c) <= 0
}

#[inline]
pub(crate) fn collinear(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
    area2(a, b, c) == 0
}

/// Returns true iff `ab` properly intersects `cd`: they share a point interior to both segments.
/// The properness of the intersection is ensured by using strict leftness.
pub(crate) fn intersect_prop(a: U16Vec3, b: U16Vec3, c: U16Vec3, d: U16Vec3) -> bool {
    // Eliminate improper cases.
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// Returns true iff `a`, `b`, `c` are collinear and `c` lies on the closed segment `ab`.
pub(crate) fn between(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    // If ab not vertical, check betweenness on x; else on z.
    if a.x != b.x {
        (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
    } else {
        (a.z <= c.z && c.z <= b.z) || (a.z >= c.z && c.z >= b.z)
    }
}

/// Returns true iff segments `ab` and `cd` intersect, properly or improperly.
pub(crate) fn intersect(a: U16Vec3, b: U16Vec3, c: U16Vec3, d: U16Vec3) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

/// Equality on the xz-plane.
#[inline]
pub(crate) fn vequal(a: U16Vec3, b: U16Vec3) -> bool {
    a.x == b.x && a.z == b.z
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::Vec3;

    use super::*;

    #[test]
    fn direction_offsets_round_trip() {
        for dir in 0..4 {
            let x = dir_offset_x(dir) as i32;
            let z = dir_offset_z(dir) as i32;
            assert_eq!(dir_offset(x, z), dir, "direction {dir}");
        }
    }

    #[test]
    fn aabb_from_verts() {
        let aabb = Aabb3d::from_verts(&[
            Vec3A::new(1.0, -2.0, 3.0),
            Vec3A::new(-1.0, 4.0, 0.5),
            Vec3A::new(0.0, 0.0, 7.0),
        ])
        .unwrap();
        assert_eq!(Vec3::from(aabb.min), Vec3::new(-1.0, -2.0, 0.5));
        assert_eq!(Vec3::from(aabb.max), Vec3::new(1.0, 4.0, 7.0));
        assert_eq!(Aabb3d::from_verts(&[]), None);
    }

    #[test]
    fn point_segment_distance() {
        let d = distance_squared_between_point_and_line_vec2(
            Vec2::new(0.5, 1.0),
            (Vec2::ZERO, Vec2::X),
        );
        assert_relative_eq!(d, 1.0);
        let d = distance_squared_between_point_and_line_vec2(
            Vec2::new(3.0, 0.0),
            (Vec2::ZERO, Vec2::X),
        );
        assert_relative_eq!(d, 4.0);
    }

    #[test]
    fn pow2_helpers() {
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(64), 64);
        assert_eq!(ilog2(64), 6);
        assert_eq!(ilog2(1), 0);
    }

    #[test]
    fn segment_predicates() {
        let v = |x, z| U16Vec3::new(x, 0, z);
        assert!(left(v(0, 1), v(2, 1), v(1, 0)));
        assert!(!left(v(0, 1), v(2, 1), v(1, 2)));
        assert!(left_on(v(0, 1), v(2, 1), v(1, 1)));
        assert!(collinear(v(0, 0), v(2, 0), v(1, 0)));
        assert!(between(v(0, 0), v(2, 0), v(1, 0)));
        assert!(!between(v(0, 0), v(2, 0), v(3, 0)));
        assert!(intersect_prop(v(0, 0), v(2, 2), v(0, 2), v(2, 0)));
        assert!(!intersect_prop(v(0, 0), v(2, 0), v(1, 0), v(1, 2)));
        assert!(intersect(v(0, 0), v(2, 0), v(1, 0), v(1, 2)));
        assert!(!intersect(v(0, 0), v(1, 0), v(0, 1), v(1, 1)));
    }
}
