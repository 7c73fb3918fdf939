//! Bounding records: axis-aligned boxes with derived vertex geometry and an
//! enclosing sphere (mid point + radius).
//!
//! The radius field doubles as the emptiness tag: `0` marks an empty bound,
//! `+INF` a boundless one, anything else a finite radius. Vertex geometry is
//! generated from the canonical box tables; planes degenerate to a single
//! face (4 verts), boundless shapes carry no geometry at all.

use glam::{Mat4, Vec3, Vec4};

use crate::math::{AxisMap, I, J, K};

/// Canonical box edge table (vertex index pairs).
pub const BX_EDGES: [[u8; 2]; 12] = [
    [0x0, 0x1],
    [0x1, 0x2],
    [0x2, 0x3],
    [0x3, 0x0],
    [0x0, 0x4],
    [0x1, 0x5],
    [0x2, 0x6],
    [0x3, 0x7],
    [0x7, 0x6],
    [0x6, 0x5],
    [0x5, 0x4],
    [0x4, 0x7],
];

/// Canonical box face table (vertex index quads).
pub const BX_FACES: [[u8; 4]; 6] = [
    [0x0, 0x1, 0x2, 0x3],
    [0x0, 0x4, 0x5, 0x1],
    [0x1, 0x5, 0x6, 0x2],
    [0x2, 0x6, 0x7, 0x3],
    [0x3, 0x7, 0x4, 0x0],
    [0x7, 0x6, 0x5, 0x4],
];

/// An axis-aligned bound with derived geometry.
#[derive(Debug, Clone)]
pub struct Bound {
    /// Lower corner in sub-world axes.
    pub bmin: Vec3,
    /// Upper corner in sub-world axes.
    pub bmax: Vec3,
    /// Center of the enclosing sphere (world space once geometry is built).
    pub mid: Vec3,
    /// Enclosing radius; `0` = empty, `+INF` = boundless.
    pub rad: f32,
    /// Generated corner vertices (world space when a trnode matrix applies).
    pub verts: Vec<Vec3>,
    /// Structural edge count (for the geometry caps).
    pub edges_num: usize,
    /// Structural face count (for the geometry caps).
    pub faces_num: usize,
}

impl Bound {
    /// An empty bound with no geometry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            bmin: Vec3::splat(f32::INFINITY),
            bmax: Vec3::splat(f32::NEG_INFINITY),
            mid: Vec3::ZERO,
            rad: 0.0,
            verts: Vec::new(),
            edges_num: 0,
            faces_num: 0,
        }
    }

    /// A bound carrying full box geometry (8 verts, 12 edges, 6 faces).
    #[must_use]
    pub fn boxed() -> Self {
        let mut b = Self::empty();
        b.set_geom(8);
        b
    }

    /// Installs geometry storage for the given vertex count (0, 4 or 8).
    pub fn set_geom(&mut self, verts_num: usize) {
        self.verts = vec![Vec3::ZERO; verts_num];
        (self.edges_num, self.faces_num) = match verts_num {
            8 => (BX_EDGES.len(), BX_FACES.len()),
            4 => (4, 1),
            _ => (0, 0),
        };
    }

    /// Resets the box to the empty aggregation state.
    pub fn reset(&mut self) {
        self.bmin = Vec3::splat(f32::INFINITY);
        self.bmax = Vec3::splat(f32::NEG_INFINITY);
        self.rad = 0.0;
    }

    /// Grows the box to enclose another min/max pair.
    pub fn enclose(&mut self, bmin: Vec3, bmax: Vec3) {
        self.bmin = self.bmin.min(bmin);
        self.bmax = self.bmax.max(bmax);
    }

    /// Grows the box to enclose a point.
    pub fn enclose_point(&mut self, p: Vec3) {
        self.bmin = self.bmin.min(p);
        self.bmax = self.bmax.max(p);
    }
}

/// Rebuilds bound geometry from `bmin`/`bmax`: corner vertices (optionally
/// carried through a trnode matrix into world space), mid point and
/// enclosing radius. `plane` restricts generation to the near face.
pub fn update_bbgeom(bound: &mut Bound, map: &AxisMap, plane: bool, trnode_mtx: Option<&Mat4>) {
    debug_assert!(!bound.verts.is_empty());

    let (mi, mj, mk) = (map.map[I], map.map[J], map.map[K]);
    let bmin = bound.bmin;
    let bmax = bound.bmax;

    // Near face (K at bmax), then far face (K at bmin) unless degenerate.
    let corners: [(f32, f32, f32); 8] = [
        (bmax[mi], bmax[mj], bmax[mk]),
        (bmin[mi], bmax[mj], bmax[mk]),
        (bmin[mi], bmin[mj], bmax[mk]),
        (bmax[mi], bmin[mj], bmax[mk]),
        (bmax[mi], bmax[mj], bmin[mk]),
        (bmin[mi], bmax[mj], bmin[mk]),
        (bmin[mi], bmin[mj], bmin[mk]),
        (bmax[mi], bmin[mj], bmin[mk]),
    ];

    let count = if plane { 4 } else { 8 };
    for (v, &(ci, cj, ck)) in bound.verts.iter_mut().zip(corners.iter()).take(count) {
        let mut p = Vec3::ZERO;
        p[mi] = ci;
        p[mj] = cj;
        p[mk] = ck;
        *v = match trnode_mtx {
            Some(mtx) => (*mtx * Vec4::new(p.x, p.y, p.z, 1.0)).truncate(),
            None => p,
        };
    }

    let n = bound.verts.len().min(count);
    let f = 1.0 / n as f32;
    let mut mid = Vec3::ZERO;
    for v in bound.verts.iter().take(n) {
        mid += *v * f;
    }
    bound.mid = mid;

    let mut rad2 = 0.0f32;
    for v in bound.verts.iter().take(n) {
        rad2 = rad2.max((mid - *v).length_squared());
    }
    bound.rad = rad2.sqrt();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_geometry_mid_and_radius() {
        let mut b = Bound::boxed();
        b.bmin = Vec3::new(-1.0, -2.0, -3.0);
        b.bmax = Vec3::new(1.0, 2.0, 3.0);
        update_bbgeom(&mut b, &AxisMap::IDENTITY, false, None);
        assert!((b.mid - Vec3::ZERO).length() < 1e-6);
        assert!((b.rad - Vec3::new(1.0, 2.0, 3.0).length()).abs() < 1e-5);
        assert_eq!(b.verts.len(), 8);
    }

    #[test]
    fn plane_uses_near_face_only() {
        let mut b = Bound::empty();
        b.set_geom(4);
        b.bmin = Vec3::new(-5.0, -5.0, 0.0);
        b.bmax = Vec3::new(5.0, 5.0, 0.0);
        update_bbgeom(&mut b, &AxisMap::IDENTITY, true, None);
        assert_eq!(b.verts.len(), 4);
        assert!((b.rad - (50.0f32).sqrt()).abs() < 1e-4);
    }

    #[test]
    fn trnode_matrix_moves_verts_to_world() {
        let mut b = Bound::boxed();
        b.bmin = Vec3::splat(-1.0);
        b.bmax = Vec3::splat(1.0);
        let mtx = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
        update_bbgeom(&mut b, &AxisMap::IDENTITY, false, Some(&mtx));
        assert!((b.mid - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
    }
}
