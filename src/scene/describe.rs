//! Declarative scene description.
//!
//! Mirrors the classic scene data layout: a tree of objects, each a
//! transform plus a payload (camera, light, sub-array with relations, or a
//! surface with per-side materials). The description is consumed once by
//! [`crate::Scene::build`]; negative relation indices address the parent
//! array itself.

use glam::Vec3;

use crate::math::INF;
use crate::scene::transform::Transform;

/// Animation callback: `(time, prev_time, transform)` in seconds.
pub type AnimFn = Box<dyn Fn(f64, f64, &mut Transform) + Send + Sync>;

/// A color, either linear HDR or hex-packed `0xRRGGBB`.
#[derive(Debug, Clone, Copy)]
pub enum Color {
    /// Linear HDR triple.
    Hdr([f32; 3]),
    /// Hex-packed 8-bit channels, resolved to linear at build.
    Packed(u32),
}

impl Color {
    /// Resolves to a linear HDR triple.
    #[must_use]
    pub fn to_hdr(self) -> Vec3 {
        match self {
            Color::Hdr(c) => Vec3::from_array(c),
            Color::Packed(v) => Vec3::new(
                ((v >> 16) & 0xFF) as f32 / 255.0,
                ((v >> 8) & 0xFF) as f32 / 255.0,
                (v & 0xFF) as f32 / 255.0,
            ),
        }
    }
}

/// Texture reference on a material.
#[derive(Debug, Clone)]
pub enum TextureRef {
    /// Flat color resolved in place as a 1x1 texture.
    Color(Color),
    /// Pre-registered texture looked up by name (with reuse).
    Named(String),
    /// Inline pixel buffer.
    Inline {
        /// Width in texels (power of two).
        x_dim: u32,
        /// Height in texels (power of two).
        y_dim: u32,
        /// Row-major packed `0x00RRGGBB` texels.
        pixels: Vec<u32>,
    },
}

/// Material archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatKind {
    /// Dielectric with Phong terms.
    Plain,
    /// Conductor; complex-index Fresnel, tinted specular.
    Metal,
    /// Emissive; shading short-circuits with the texture color.
    Light,
}

/// Declarative material.
#[derive(Debug, Clone)]
pub struct MaterialDesc {
    /// Archetype.
    pub kind: MatKind,
    /// Texture or flat color.
    pub tex: TextureRef,
    /// Diffuse scale.
    pub diffuse: f32,
    /// Specular scale.
    pub specular: f32,
    /// Specular power (fractional powers supported in 28.4 fixed point).
    pub power: f32,
    /// Reflectivity weight in `[0, 1]`.
    pub reflect: f32,
    /// Transparency weight in `[0, 1]`.
    pub transparency: f32,
    /// Refractive index (1 passes straight through).
    pub refract: f32,
    /// Extinction coefficient for metal Fresnel.
    pub extinction: f32,
    /// Angle-dependent reflectance at transparent interfaces.
    pub fresnel: bool,
    /// Texture is gamma-encoded.
    pub gamma: bool,
}

impl MaterialDesc {
    /// A matte plain material with the given color.
    #[must_use]
    pub fn plain(color: Color) -> Self {
        Self {
            kind: MatKind::Plain,
            tex: TextureRef::Color(color),
            diffuse: 0.75,
            specular: 0.0,
            power: 1.0,
            reflect: 0.0,
            transparency: 0.0,
            refract: 1.0,
            extinction: 0.0,
            fresnel: false,
            gamma: false,
        }
    }

    /// An emissive light material with the given color.
    #[must_use]
    pub fn light(color: Color) -> Self {
        Self {
            kind: MatKind::Light,
            ..Self::plain(color)
        }
    }

    /// A perfect mirror.
    #[must_use]
    pub fn mirror() -> Self {
        Self {
            reflect: 1.0,
            diffuse: 0.0,
            ..Self::plain(Color::Hdr([1.0, 1.0, 1.0]))
        }
    }
}

/// One side of a surface: UV transform plus material.
#[derive(Debug, Clone)]
pub struct SideDesc {
    /// UV scale per texture axis.
    pub scale: [f32; 2],
    /// UV rotation in degrees (multiples of 90 collapse to an axis swap).
    pub rot: f32,
    /// UV offset in texture-space units.
    pub pos: [f32; 2],
    /// Side material.
    pub mat: MaterialDesc,
}

impl Default for SideDesc {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0],
            rot: 0.0,
            pos: [0.0, 0.0],
            mat: MaterialDesc::plain(Color::Hdr([0.5, 0.5, 0.5])),
        }
    }
}

impl SideDesc {
    /// A side with default UVs and the given material.
    #[must_use]
    pub fn with_mat(mat: MaterialDesc) -> Self {
        Self {
            mat,
            ..Self::default()
        }
    }
}

/// Surface shape with its scalar parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceShape {
    /// `K = 0` plane, normal along +K.
    Plane,
    /// `I^2 + J^2 = rad^2`.
    Cylinder {
        /// Radius.
        rad: f32,
    },
    /// `I^2 + J^2 + K^2 = rad^2`.
    Sphere {
        /// Radius.
        rad: f32,
    },
    /// `I^2 + J^2 = (rat * K)^2`.
    Cone {
        /// Radius-over-height ratio.
        rat: f32,
    },
    /// `I^2 + J^2 = par * K`.
    Paraboloid {
        /// Parabolic coefficient.
        par: f32,
    },
    /// `I^2 + J^2 - (rat * K)^2 = hyp`.
    Hyperboloid {
        /// Asymptote slope.
        rat: f32,
        /// Hyperbolic offset (negative gives two sheets).
        hyp: f32,
    },
    /// Degenerate quadric; outside the supported set, skipped at build.
    HyperCylinder {
        /// Asymptote slope.
        rat: f32,
        /// Hyperbolic offset.
        hyp: f32,
    },
    /// Degenerate quadric; outside the supported set, skipped at build.
    ParaCylinder {
        /// Parabolic coefficient.
        par: f32,
    },
    /// Degenerate quadric; outside the supported set, skipped at build.
    HyperParaboloid {
        /// Saddle ratio.
        rat: f32,
    },
}

/// Declarative surface: shape, axis clippers and per-side materials.
#[derive(Debug, Clone)]
pub struct SurfaceDesc {
    /// Shape and parameters.
    pub shape: SurfaceShape,
    /// Per-axis lower clippers in local I/J/K space (`-INF` unbounded).
    pub min: Vec3,
    /// Per-axis upper clippers in local I/J/K space (`+INF` unbounded).
    pub max: Vec3,
    /// Outer (normal-facing) side.
    pub outer: SideDesc,
    /// Inner side.
    pub inner: SideDesc,
}

impl SurfaceDesc {
    /// Unclipped surface with the same material on both sides.
    #[must_use]
    pub fn new(shape: SurfaceShape, mat: MaterialDesc) -> Self {
        Self {
            shape,
            min: Vec3::splat(-INF),
            max: Vec3::splat(INF),
            outer: SideDesc::with_mat(mat.clone()),
            inner: SideDesc::with_mat(mat),
        }
    }

    /// Replaces the axis clippers.
    #[must_use]
    pub fn clipped(mut self, min: Vec3, max: Vec3) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

/// Declarative camera.
#[derive(Debug, Clone)]
pub struct CameraDesc {
    /// Field-of-view scale of the sensor (clamped to a minimum positive
    /// threshold at build; values `<= 0` select the default of 1).
    pub pov: f32,
    /// Movement speeds along local I/J/K.
    pub dps: Vec3,
    /// Rotation speeds (yaw/pitch).
    pub drt: Vec3,
    /// Background color.
    pub background: Color,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            pov: 1.0,
            dps: Vec3::splat(4.0),
            drt: Vec3::splat(2.0),
            background: Color::Hdr([0.2, 0.3, 0.4]),
        }
    }
}

/// Light attenuation constants.
#[derive(Debug, Clone, Copy)]
pub struct Attenuation {
    /// Range cutoff (0 disables).
    pub range: f32,
    /// Constant term (a +1 bias is applied at build).
    pub constant: f32,
    /// Linear term.
    pub linear: f32,
    /// Quadratic term.
    pub quadratic: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            range: 0.0,
            constant: 0.0,
            linear: 0.0,
            quadratic: 0.1,
        }
    }
}

/// Declarative light.
#[derive(Debug, Clone)]
pub struct LightDesc {
    /// Light color (premultiplied by luminosity at build).
    pub color: Color,
    /// Luminosity scale.
    pub luminosity: f32,
    /// Attenuation constants.
    pub attenuation: Attenuation,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            color: Color::Hdr([1.0, 1.0, 1.0]),
            luminosity: 1.0,
            attenuation: Attenuation::default(),
        }
    }
}

/// Relation kinds between sibling objects of one array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    /// Narrow the left/right index cursors into a sub-array.
    IndexArray,
    /// Subtract the clipper's inner subspace from the target.
    MinusInner,
    /// Subtract the clipper's outer subspace from the target.
    MinusOuter,
    /// Close an accumulator group of clippers and dispatch it.
    MinusAccum,
    /// Attach the array as bounding volume for a whole subtree.
    BoundArray,
    /// Clear a subtree's bounding-volume attachment.
    UntieArray,
    /// Attach the array as bounding volume for one indexed child.
    BoundIndex,
    /// Clear one indexed child's bounding-volume attachment.
    UntieIndex,
}

/// A relation triple `(obj1, obj2, kind)`; `-1` addresses the parent array.
#[derive(Debug, Clone, Copy)]
pub struct RelationDesc {
    /// Left index into the current left sub-array (-1 = the array itself).
    pub obj1: i32,
    /// Relation kind.
    pub kind: RelKind,
    /// Right index into the current right sub-array (-1 = the array itself).
    pub obj2: i32,
}

impl RelationDesc {
    /// Shorthand constructor in `(obj1, kind, obj2)` order.
    #[must_use]
    pub fn new(obj1: i32, kind: RelKind, obj2: i32) -> Self {
        Self { obj1, kind, obj2 }
    }
}

/// Object payload in the description tree.
pub enum ObjectKind {
    /// A camera.
    Camera(CameraDesc),
    /// A point light.
    Light(LightDesc),
    /// An interior node with ordered children and relations.
    Array {
        /// Ordered children.
        children: Vec<ObjectDesc>,
        /// Relation triples over the children.
        relations: Vec<RelationDesc>,
    },
    /// A surface.
    Surface(SurfaceDesc),
}

impl std::fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Camera(_) => f.write_str("Camera"),
            ObjectKind::Light(_) => f.write_str("Light"),
            ObjectKind::Array { children, .. } => {
                write!(f, "Array[{}]", children.len())
            }
            ObjectKind::Surface(s) => write!(f, "Surface({:?})", s.shape),
        }
    }
}

/// One object in the description tree.
pub struct ObjectDesc {
    /// Transform relative to the parent.
    pub trm: Transform,
    /// Payload.
    pub kind: ObjectKind,
    /// Optional animation callback invoked during phase 0.
    pub anim: Option<AnimFn>,
}

impl ObjectDesc {
    /// An object with the given transform and payload.
    #[must_use]
    pub fn new(trm: Transform, kind: ObjectKind) -> Self {
        Self {
            trm,
            kind,
            anim: None,
        }
    }

    /// A surface at a position.
    #[must_use]
    pub fn surface(trm: Transform, desc: SurfaceDesc) -> Self {
        Self::new(trm, ObjectKind::Surface(desc))
    }

    /// An array at a position.
    #[must_use]
    pub fn array(trm: Transform, children: Vec<ObjectDesc>, relations: Vec<RelationDesc>) -> Self {
        Self::new(
            trm,
            ObjectKind::Array {
                children,
                relations,
            },
        )
    }

    /// A camera at a position.
    #[must_use]
    pub fn camera(trm: Transform, desc: CameraDesc) -> Self {
        Self::new(trm, ObjectKind::Camera(desc))
    }

    /// A light at a position.
    #[must_use]
    pub fn light(trm: Transform, desc: LightDesc) -> Self {
        Self::new(trm, ObjectKind::Light(desc))
    }

    /// Installs an animation callback.
    #[must_use]
    pub fn animated(mut self, anim: AnimFn) -> Self {
        self.anim = Some(anim);
        self
    }
}

/// A whole scene: the root array plus named textures.
pub struct SceneDesc {
    /// Root object; must be an array.
    pub root: ObjectDesc,
    /// Pre-registered named textures.
    pub textures: Vec<(String, u32, u32, Vec<u32>)>,
}

impl SceneDesc {
    /// A scene with the given root array.
    #[must_use]
    pub fn new(root: ObjectDesc) -> Self {
        Self {
            root,
            textures: Vec::new(),
        }
    }

    /// Registers a named texture (power-of-two dims, packed pixels).
    #[must_use]
    pub fn with_texture(mut self, name: &str, x_dim: u32, y_dim: u32, pixels: Vec<u32>) -> Self {
        self.textures.push((name.to_string(), x_dim, y_dim, pixels));
        self
    }
}
