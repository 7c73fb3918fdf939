//! Scene registry.
//!
//! The [`Scene`] owns every node, material and texture through slotmap
//! arenas; everything else refers to them by key. Building consumes the
//! declarative description recursively: arrays first create their children,
//! then compile their relation vectors (so sibling indices resolve), and
//! unsupported surface tags are skipped with a single diagnostic line.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use log::{debug, warn};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::config::{CLIP_THRESHOLD, EDGES_LIMIT, FACES_LIMIT, Opts, VERTS_LIMIT};
use crate::errors::{PrismError, Result};
use crate::resources::texture::Texture;
use crate::resources::Material;
use crate::scene::describe::{
    MaterialDesc, ObjectDesc, ObjectKind, SceneDesc, SideDesc, SurfaceShape, TextureRef,
};
use crate::scene::object::{
    ArrayData, CameraData, LightData, ObjData, ObjTag, Object, Shape, SurfaceData,
};
use crate::scene::relation::compile_relations;
use crate::scene::surface::SurfKind;
use crate::scene::bound::Bound;
use crate::scene::{MatKey, ObjKey, TexKey};

/// The scene registry: arena-owned object tree plus resource pools.
pub struct Scene {
    /// Object arena.
    pub objects: SlotMap<ObjKey, Object>,
    /// Root array key.
    pub root: ObjKey,
    /// Resolved side materials.
    pub materials: SlotMap<MatKey, Material>,
    /// Registered textures.
    pub textures: SlotMap<TexKey, Arc<Texture>>,
    /// Name lookup for registered textures.
    tex_names: HashMap<String, TexKey>,
    /// Registry list: cameras in tree order.
    pub cameras: Vec<ObjKey>,
    /// Registry list: lights in tree order.
    pub lights: Vec<ObjKey>,
    /// Registry list: surfaces in tree order.
    pub surfaces: Vec<ObjKey>,
    /// Registry list: arrays in tree order.
    pub arrays: Vec<ObjKey>,
    /// Runtime option bits.
    pub opts: Opts,
}

impl Scene {
    /// Builds a scene from its declarative description.
    pub fn build(desc: SceneDesc, opts: Opts) -> Result<Self> {
        let mut scene = Scene {
            objects: SlotMap::with_key(),
            root: ObjKey::default(),
            materials: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            tex_names: HashMap::new(),
            cameras: Vec::new(),
            lights: Vec::new(),
            surfaces: Vec::new(),
            arrays: Vec::new(),
            opts,
        };

        for (name, x_dim, y_dim, pixels) in desc.textures {
            let tex = Arc::new(Texture::new(x_dim, y_dim, pixels)?);
            let key = scene.textures.insert(tex);
            scene.tex_names.insert(name, key);
        }

        if !matches!(desc.root.kind, ObjectKind::Array { .. }) {
            return Err(PrismError::RootNotArray);
        }

        let root = scene
            .build_object(None, desc.root)?
            .ok_or(PrismError::RootNotArray)?;
        scene.root = root;

        debug!(
            "scene built: {} objects ({} surfaces, {} lights, {} cameras)",
            scene.objects.len(),
            scene.surfaces.len(),
            scene.lights.len(),
            scene.cameras.len()
        );

        Ok(scene)
    }

    /// Recursively instantiates one description node. Returns `None` for
    /// unsupported tags, which are skipped with a diagnostic.
    fn build_object(&mut self, parent: Option<ObjKey>, desc: ObjectDesc) -> Result<Option<ObjKey>> {
        let ObjectDesc { trm, kind, anim } = desc;

        let key = match kind {
            ObjectKind::Camera(cam) => {
                let pov = if cam.pov <= 0.0 {
                    1.0
                } else {
                    cam.pov.max(2.0 * CLIP_THRESHOLD)
                };
                let data = ObjData::Camera(CameraData {
                    pov,
                    background: cam.background.to_hdr(),
                    dps: cam.dps,
                    drt: cam.drt,
                    hor_sin: 0.0,
                    hor_cos: 1.0,
                    cam_changed: false,
                });
                let key = self.objects.insert(Object::new(parent, ObjTag::Camera, trm, data));
                self.cameras.push(key);
                key
            }

            ObjectKind::Light(lgt) => {
                let data = ObjData::Light(LightData {
                    col: lgt.color.to_hdr() * lgt.luminosity,
                    a_rng: lgt.attenuation.range,
                    a_cnt: lgt.attenuation.constant + 1.0,
                    a_lnr: lgt.attenuation.linear,
                    a_qdr: lgt.attenuation.quadratic,
                });
                let key = self.objects.insert(Object::new(parent, ObjTag::Light, trm, data));
                self.lights.push(key);
                key
            }

            ObjectKind::Array {
                children,
                relations,
            } => {
                let mut aux = Bound::empty();
                aux.set_geom(8);
                let mut bxx = Bound::empty();
                bxx.set_geom(8);
                let data = ObjData::Array(ArrayData {
                    children: Vec::new(),
                    axm: glam::Mat4::IDENTITY,
                    aux,
                    bxx,
                });
                let key = self.objects.insert(Object::new(parent, ObjTag::Array, trm, data));
                self.arrays.push(key);

                let mut built = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(ck) = self.build_object(Some(key), child)? {
                        built.push(ck);
                    }
                }
                if let Some(a) = self.objects[key].data.as_array_mut() {
                    a.children = built;
                }

                compile_relations(self, key, &relations);
                key
            }

            ObjectKind::Surface(srf) => {
                let Some(kind) = supported_shape(&srf.shape) else {
                    warn!("unsupported surface tag {:?}, skipping", srf.shape);
                    return Ok(None);
                };

                let outer = self.resolve_material(&srf.outer)?;
                let inner = self.resolve_material(&srf.inner)?;

                let mut shape = Shape::new();
                shape.bound.set_geom(kind.geom_verts(srf.min, srf.max));
                if shape.bound.verts.is_empty() {
                    // Boundless along an unclipped axis; tagged infinite.
                    shape.bound.rad = f32::INFINITY;
                }
                if shape.bound.verts.len() > VERTS_LIMIT
                    || shape.bound.edges_num > EDGES_LIMIT
                    || shape.bound.faces_num > FACES_LIMIT
                {
                    return Err(PrismError::BoundLimits {
                        verts: shape.bound.verts.len(),
                        edges: shape.bound.edges_num,
                        faces: shape.bound.faces_num,
                    });
                }

                let data = ObjData::Surface(SurfaceData {
                    kind,
                    smin: srf.min,
                    smax: srf.max,
                    outer,
                    inner,
                    shape,
                    clip: SmallVec::new(),
                    srf_changed: false,
                });
                let key = self.objects.insert(Object::new(parent, kind.tag(), trm, data));
                self.surfaces.push(key);
                key
            }
        };

        self.objects[key].anim = anim;
        Ok(Some(key))
    }

    /// Resolves one side's material against the texture registry.
    fn resolve_material(&mut self, side: &SideDesc) -> Result<MatKey> {
        let tex = self.resolve_texture(&side.mat)?;
        let mat = Material::resolve(&side.mat, side, tex)?;
        Ok(self.materials.insert(mat))
    }

    /// Resolves a texture reference: flat colors in place, named textures
    /// against the registry (reused), inline buffers validated.
    fn resolve_texture(&mut self, mat: &MaterialDesc) -> Result<Arc<Texture>> {
        match &mat.tex {
            TextureRef::Color(c) => {
                let hdr = c.to_hdr();
                Ok(Arc::new(Texture::solid([hdr.x, hdr.y, hdr.z])))
            }
            TextureRef::Named(name) => {
                let key = self
                    .tex_names
                    .get(name)
                    .copied()
                    .ok_or_else(|| PrismError::TextureNotFound(name.clone()))?;
                Ok(Arc::clone(&self.textures[key]))
            }
            TextureRef::Inline {
                x_dim,
                y_dim,
                pixels,
            } => Ok(Arc::new(Texture::new(*x_dim, *y_dim, pixels.clone())?)),
        }
    }

    /// The first declared camera, used as the frame camera.
    #[must_use]
    pub fn primary_camera(&self) -> Option<ObjKey> {
        self.cameras.first().copied()
    }

    /// Background color of the frame camera (black without one).
    #[must_use]
    pub fn background(&self) -> Vec3 {
        self.primary_camera()
            .and_then(|k| match &self.objects[k].data {
                ObjData::Camera(c) => Some(c.background),
                _ => None,
            })
            .unwrap_or(Vec3::ZERO)
    }
}

/// Maps a description shape onto the supported runtime set.
fn supported_shape(shape: &SurfaceShape) -> Option<SurfKind> {
    match *shape {
        SurfaceShape::Plane => Some(SurfKind::Plane),
        SurfaceShape::Cylinder { rad } => Some(SurfKind::Cylinder { rad }),
        SurfaceShape::Sphere { rad } => Some(SurfKind::Sphere { rad }),
        SurfaceShape::Cone { rat } => Some(SurfKind::Cone { rat }),
        SurfaceShape::Paraboloid { par } => Some(SurfKind::Paraboloid { par }),
        SurfaceShape::Hyperboloid { rat, hyp } => Some(SurfKind::Hyperboloid { rat, hyp }),
        SurfaceShape::HyperCylinder { .. }
        | SurfaceShape::ParaCylinder { .. }
        | SurfaceShape::HyperParaboloid { .. } => None,
    }
}
