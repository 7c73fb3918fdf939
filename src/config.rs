//! Runtime configuration: option bits, anti-aliasing modes and hard limits.
//!
//! The option set mirrors the engine's classic feature toggles: every flag
//! gates an optimization or a rendering feature that the update pipeline and
//! the traversal kernel consult at well-defined points.

use bitflags::bitflags;

bitflags! {
    /// Runtime option bits consulted by the update pipeline and the kernels.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Opts: u32 {
        /// Force a full hierarchy update every frame.
        const UPDATE  = 1 << 0;
        /// Enable transform caching for arrays of surfaces (trnode reuse).
        const TARRAY  = 1 << 1;
        /// Enable coarse 2D screen-rectangle culling of finite surfaces.
        const TILING  = 1 << 2;
        /// Keep scale/rotation triviality flags separate, enabling the
        /// diagonal fastpath for fractional-scale transforms.
        const FSCALE  = 1 << 3;
        /// Enable recursive bbox tightening via custom clippers.
        const ADJUST  = 1 << 4;
        /// Honor bounding-volume relations (bvnode sphere early-out).
        const VARRAY  = 1 << 5;
        /// Enable sRGB <-> linear conversion on texture reads and
        /// frame-buffer stores.
        const GAMMA   = 1 << 6;
        /// Launch shadow rays during direct lighting.
        const SHADOWS = 1 << 7;
        /// Tint ambient and light terms with their full RGB colors instead
        /// of scalar intensities.
        const COLORED = 1 << 8;
        /// Use the low-precision Schlick approximation for dielectric
        /// Fresnel and the rational approximation for metal Fresnel.
        const SCHLICK = 1 << 9;
        /// Enable the path-tracing accumulator mode.
        const PT_ON   = 1 << 10;
    }
}

impl Default for Opts {
    fn default() -> Self {
        Opts::TARRAY | Opts::ADJUST | Opts::VARRAY | Opts::GAMMA | Opts::SHADOWS | Opts::COLORED
    }
}

/// Super-sampling mode: a power-of-two subsample grid collapsed in linear
/// space before the gamma encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fsaa {
    /// One sample through the pixel center.
    #[default]
    Off,
    /// Two samples on the pixel diagonal.
    X2,
    /// Four samples on a 2x2 grid.
    X4,
    /// Eight samples on a rotated 4+4 grid.
    X8,
}

impl Fsaa {
    /// Subsample offsets within the pixel, in `[0, 1)` pixel units.
    #[must_use]
    pub fn offsets(self) -> &'static [(f32, f32)] {
        match self {
            Fsaa::Off => &[(0.5, 0.5)],
            Fsaa::X2 => &[(0.25, 0.25), (0.75, 0.75)],
            Fsaa::X4 => &[(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)],
            Fsaa::X8 => &[
                (0.125, 0.375),
                (0.375, 0.125),
                (0.625, 0.375),
                (0.875, 0.125),
                (0.125, 0.875),
                (0.375, 0.625),
                (0.625, 0.875),
                (0.875, 0.625),
            ],
        }
    }
}

/// Engine configuration handed to [`crate::Platform`] at construction.
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime option bits.
    pub opts: Opts,
    /// Super-sampling mode.
    pub fsaa: Fsaa,
    /// Ray-recursion depth cap (context stack frames beyond the primary).
    pub max_depth: usize,
    /// Scalar ambient intensity; tinted by the camera background when
    /// [`Opts::COLORED`] is set.
    pub ambient: f32,
    /// Requested SIMD configuration (`size | type << 8 | factor << 16`);
    /// zero requests the widest grant the host supports.
    pub simd: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            opts: Opts::default(),
            fsaa: Fsaa::Off,
            max_depth: 6,
            ambient: 0.125,
            simd: 0,
        }
    }
}

/// Bounding geometry caps (8 box corners, 12 edges, 6 faces).
pub const VERTS_LIMIT: usize = 8;
/// See [`VERTS_LIMIT`].
pub const EDGES_LIMIT: usize = 12;
/// See [`VERTS_LIMIT`].
pub const FACES_LIMIT: usize = 6;

/// Minimum ray parameter accepted by depth tests; doubles as the
/// self-intersection guard for secondary rays.
pub const T_MIN: f32 = 1.0e-4;

/// Clip threshold shared by the camera pov clamp and clipper epsilons.
pub const CLIP_THRESHOLD: f32 = 1.0e-4;
