//! Resolved side materials.
//!
//! A [`Material`] is the flattened, per-surface-side record the shading
//! kernel consumes: a property bitset plus texture routing constants and
//! lighting/transparency coefficients. It is resolved once at scene build
//! from the declarative description; the UV transform collapses to an axis
//! swap + sign when the side rotation is a multiple of 90 degrees.

use std::sync::Arc;

use bitflags::bitflags;

use crate::errors::Result;
use crate::resources::texture::Texture;
use crate::scene::describe::{MatKind, MaterialDesc, SideDesc};

bitflags! {
    /// Material property bits consulted by the shading kernel.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MatProps: u32 {
        /// Texture is larger than 1x1 and must be sampled.
        const TEXTURE  = 1 << 0;
        /// Non-zero reflectivity.
        const REFLECT  = 1 << 1;
        /// Refractive index differs from 1.
        const REFRACT  = 1 << 2;
        /// Non-zero specular scale.
        const SPECULAR = 1 << 3;
        /// Fully opaque (zero transparency).
        const OPAQUE   = 1 << 4;
        /// Fully transparent (transparency of one).
        const TRANSP   = 1 << 5;
        /// Emissive light material; shading short-circuits with emission.
        const LIGHT    = 1 << 6;
        /// Regular (non-emissive) material.
        const NORMAL   = 1 << 7;
        /// Conductor; metal Fresnel and tinted specular.
        const METAL    = 1 << 8;
        /// Texture is gamma-encoded and decodes by squaring.
        const GAMMA    = 1 << 9;
        /// Angle-dependent reflectance at transparent interfaces.
        const FRESNEL  = 1 << 10;
        /// Non-zero diffuse scale.
        const DIFFUSE  = 1 << 11;
    }
}

/// A material resolved for one side of one surface.
#[derive(Debug, Clone)]
pub struct Material {
    /// Property bitset.
    pub props: MatProps,
    /// Backing texture (shared; 1x1 for flat colors).
    pub tex: Arc<Texture>,
    /// Which local I/J coordinate feeds the texture U and V axes.
    pub t_map: [usize; 2],
    /// Texel scale per texture axis (dimension / side scale, signed).
    pub xscal: f32,
    /// See [`Material::xscal`].
    pub yscal: f32,
    /// Texel offset per texture axis (side offset premultiplied by the
    /// texture dimension).
    pub xoffs: f32,
    /// See [`Material::xoffs`].
    pub yoffs: f32,
    /// Diffuse scale.
    pub l_dff: f32,
    /// Specular scale.
    pub l_spc: f32,
    /// Specular power in 28.4 fixed point.
    pub l_pow: u32,
    /// Reflectivity weight.
    pub c_rfl: f32,
    /// Transparency weight.
    pub c_trn: f32,
    /// Refractive index.
    pub c_rfr: f32,
    /// Squared refractive index.
    pub rfr_2: f32,
    /// Squared extinction coefficient for metal Fresnel.
    pub ext_2: f32,
}

impl Material {
    /// Resolves a declarative material + side record against its texture.
    pub fn resolve(desc: &MaterialDesc, side: &SideDesc, tex: Arc<Texture>) -> Result<Self> {
        let mut props = MatProps::empty();

        props |= if tex.is_solid() { MatProps::empty() } else { MatProps::TEXTURE };
        props |= if desc.reflect == 0.0 { MatProps::empty() } else { MatProps::REFLECT };
        props |= if desc.refract == 1.0 { MatProps::empty() } else { MatProps::REFRACT };
        props |= if desc.specular == 0.0 { MatProps::empty() } else { MatProps::SPECULAR };
        props |= if desc.diffuse == 0.0 { MatProps::empty() } else { MatProps::DIFFUSE };
        props |= if desc.transparency == 0.0 { MatProps::OPAQUE } else { MatProps::empty() };
        props |= if desc.transparency == 1.0 { MatProps::TRANSP } else { MatProps::empty() };
        props |= match desc.kind {
            MatKind::Light => MatProps::LIGHT,
            MatKind::Plain => MatProps::NORMAL,
            MatKind::Metal => MatProps::NORMAL | MatProps::METAL,
        };
        props |= if desc.fresnel { MatProps::FRESNEL } else { MatProps::empty() };
        props |= if desc.gamma { MatProps::GAMMA } else { MatProps::empty() };

        // UV rotation reduces to an axis swap + sign for multiples of 90
        // degrees; anything else falls back to the identity mapping.
        let (rs, rc) = side.rot.to_radians().sin_cos();
        let rows = [[rc, rs], [-rs, rc]];
        let mut t_map = [0usize, 1usize];
        let mut t_sgn = [1.0f32, 1.0f32];
        let mut matched = 0;
        for (i, row) in rows.iter().enumerate() {
            for j in 0..2 {
                let pattern = (row[0].abs() == 1.0) == (j == 0) && (row[1].abs() == 1.0) == (j == 1);
                if pattern {
                    t_map[i] = j;
                    t_sgn[i] = if row[j] < 0.0 { -1.0 } else { 1.0 };
                    matched += 1;
                }
            }
        }
        if matched < 2 {
            t_map = [0, 1];
            t_sgn = [1.0, 1.0];
        }

        let x_dim = tex.x_dim as f32;
        let y_dim = tex.y_dim as f32;

        Ok(Self {
            props,
            t_map,
            xscal: x_dim / side.scale[0] * t_sgn[0],
            yscal: y_dim / side.scale[1] * t_sgn[1],
            xoffs: side.pos[t_map[0]] * x_dim,
            yoffs: side.pos[t_map[1]] * y_dim,
            l_dff: desc.diffuse,
            l_spc: desc.specular,
            l_pow: (desc.power * 16.0) as u32,
            c_rfl: desc.reflect,
            c_trn: desc.transparency,
            c_rfr: desc.refract,
            rfr_2: desc.refract * desc.refract,
            ext_2: desc.extinction * desc.extinction,
            tex,
        })
    }
}
