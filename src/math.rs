//! Math helpers shared by the update pipeline and the backend compiler.
//!
//! Uses a right-handed coordinate system with +Z up (world) and a local
//! surface frame I/J/K where K is the shape's rotational axis. Matrices are
//! [`glam::Mat4`] with columns holding the images of the local axes, so
//! `mtx.col(i)` is local axis `i` expressed in parent space and `mtx.col(3)`
//! is the position.

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3, Vec4};

/// World axis indices.
pub const X: usize = 0;
/// See [`X`].
pub const Y: usize = 1;
/// See [`X`].
pub const Z: usize = 2;

/// Local axis indices (I/J span the shape, K is the rotational axis).
pub const I: usize = 0;
/// See [`I`].
pub const J: usize = 1;
/// See [`I`].
pub const K: usize = 2;

/// Unbounded sentinel for axis clippers.
pub const INF: f32 = f32::INFINITY;

/// A signed axis permutation: local axes I/J/K map to world axes X/Y/Z with
/// a sign each. Extracted from composed matrices that are signed
/// permutations (+ scale); routes coordinate loads between the local frame
/// and the (sub-)world frame without a full matrix multiply.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisMap {
    /// `map[i]` is the world axis local axis `i` corresponds to.
    pub map: [usize; 3],
    /// Sign of the mapping per local axis, each -1.0 or +1.0.
    pub sgn: [f32; 3],
}

impl AxisMap {
    /// Identity mapping (I->X, J->Y, K->Z, all positive).
    pub const IDENTITY: AxisMap = AxisMap {
        map: [X, Y, Z],
        sgn: [1.0, 1.0, 1.0],
    };

    /// Routes a (sub-)world vector into the local I/J/K frame.
    #[inline]
    #[must_use]
    pub fn to_local(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.sgn[I] * v[self.map[I]],
            self.sgn[J] * v[self.map[J]],
            self.sgn[K] * v[self.map[K]],
        )
    }

    /// Routes a local I/J/K vector back into the (sub-)world frame.
    #[inline]
    #[must_use]
    pub fn to_world(&self, l: Vec3) -> Vec3 {
        let mut v = Vec3::ZERO;
        v[self.map[I]] = self.sgn[I] * l[I];
        v[self.map[J]] = self.sgn[J] * l[J];
        v[self.map[K]] = self.sgn[K] * l[K];
        v
    }

    /// Extracts the axis map, signs and per-axis scale from a matrix whose
    /// linear part is a signed permutation times a diagonal. Returns `None`
    /// when any column fails the axis-aligned pattern test.
    #[must_use]
    pub fn from_matrix(mtx: &Mat4) -> Option<(AxisMap, Vec3)> {
        let mut map = [usize::MAX; 3];
        let mut sgn = [1.0f32; 3];
        let mut scl = Vec3::ONE;

        for i in 0..3 {
            let col = mtx.col(i);
            for j in 0..3 {
                let pattern = (col.x != 0.0) == (j == 0)
                    && (col.y != 0.0) == (j == 1)
                    && (col.z != 0.0) == (j == 2);
                if pattern {
                    map[i] = j;
                    sgn[i] = if col[j] < 0.0 { -1.0 } else { 1.0 };
                    scl[i] = col[j].abs();
                }
            }
            if map[i] == usize::MAX {
                return None;
            }
        }

        Some((AxisMap { map, sgn }, scl))
    }

    /// The axis-map matrix: a pure signed permutation with unit scale.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        let mut m = Mat4::ZERO;
        for i in 0..3 {
            *m.col_mut(i) = Vec4::ZERO;
            m.col_mut(i)[self.map[i]] = self.sgn[i];
        }
        m.col_mut(3)[3] = 1.0;
        m
    }
}

/// Builds the rotation quaternion from Euler angles in degrees, applied in
/// the fixed XYZ order.
#[must_use]
pub fn quat_from_euler_deg(rot: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        rot.x.to_radians(),
        rot.y.to_radians(),
        rot.z.to_radians(),
    )
}

/// Inverse-transpose 3x3 used to carry normals from a local frame to world.
#[inline]
#[must_use]
pub fn normal_matrix(inv: &Mat4) -> Mat3 {
    Mat3::from_mat4(*inv).transpose()
}

/// Preserves ±INF sentinels while shifting a bound component.
#[inline]
#[must_use]
pub fn shift_bound(v: f32, delta: f32) -> f32 {
    if v.is_infinite() { v } else { v + delta }
}
