//! Transform component for scene objects.
//!
//! Stores scale / rotation / position the way the scene description declares
//! them: Euler angles in degrees applied in a fixed XYZ order. The update
//! pipeline classifies transforms as trivial or not, which drives transform
//! caching and the axis-map fastpath:
//!
//! - scale is trivial iff every component is exactly -1 or +1;
//! - rotation is trivial iff every component is a multiple of 90 degrees
//!   within the +-270 table.

use bitflags::bitflags;
use glam::{Mat4, Vec3};

use crate::math::quat_from_euler_deg;

bitflags! {
    /// Non-triviality flags of a transform (or a composed matrix).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct TrmFlags: u8 {
        /// Non-trivial scaling present.
        const SCL = 1 << 0;
        /// Non-trivial rotation present.
        const ROT = 1 << 1;
    }
}

/// Scale / rotation (degrees) / position, relative to the parent object.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Per-axis scale factors.
    pub scale: Vec3,
    /// Euler rotation in degrees, XYZ order.
    pub rotation: Vec3,
    /// Position relative to the parent.
    pub position: Vec3,
}

impl Transform {
    /// Identity transform.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
            position: Vec3::ZERO,
        }
    }

    /// Identity with a position.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }

    /// Composes the local matrix (scale, then rotation, then translation).
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scale,
            quat_from_euler_deg(self.rotation),
            self.position,
        )
    }

    /// True iff every scale component is exactly -1 or +1.
    #[must_use]
    pub fn scaling_trivial(&self) -> bool {
        const SCL: [f32; 2] = [-1.0, 1.0];
        let mut c = 0;
        for s in SCL {
            if self.scale.x == s {
                c += 1;
            }
            if self.scale.y == s {
                c += 1;
            }
            if self.scale.z == s {
                c += 1;
            }
        }
        c == 3
    }

    /// True iff every rotation component is a multiple of 90 degrees within
    /// the canonical +-270 table.
    #[must_use]
    pub fn rotation_trivial(&self) -> bool {
        const ROT: [f32; 7] = [-270.0, -180.0, -90.0, 0.0, 90.0, 180.0, 270.0];
        let mut c = 0;
        for r in ROT {
            if self.rotation.x == r {
                c += 1;
            }
            if self.rotation.y == r {
                c += 1;
            }
            if self.rotation.z == r {
                c += 1;
            }
        }
        c == 3
    }

    /// Classifies the object's own transform. Without the FSCALE option any
    /// non-triviality promotes to full SCL|ROT, disabling the diagonal
    /// fastpath for fractional scales.
    #[must_use]
    pub fn classify(&self, fscale: bool) -> TrmFlags {
        let mut flags = TrmFlags::empty();
        if !self.scaling_trivial() {
            flags |= TrmFlags::SCL;
        }
        if !self.rotation_trivial() {
            flags |= TrmFlags::ROT;
        }
        if !flags.is_empty() && !fscale {
            flags = TrmFlags::SCL | TrmFlags::ROT;
        }
        flags
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
