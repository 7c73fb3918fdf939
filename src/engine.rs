//! Engine Core Module
//!
//! This module contains [`Platform`], the explicit context that replaces
//! any process-wide scene state: it owns the scene registry, the compiled
//! backend blocks, the path-tracing accumulator and the granted SIMD
//! configuration, and exposes the two entry points the host drives:
//!
//! - [`Platform::update`] runs the three update phases and recompiles the
//!   backend blocks;
//! - [`Platform::render`] traces a frame into a caller-owned
//!   [`FrameBuffer`].
//!
//! Thread spawning and barriers live in the host: [`Platform::render_stripe`]
//! renders the scanline set `row0, row0 + step, ...` so pre-partitioned
//! workers can split a frame by stride.

use glam::Vec3;
use log::debug;

use crate::backend::dispatch::{granted_lanes, switch0};
use crate::backend::pathtrace::PtState;
use crate::backend::tracer::render_frame;
use crate::backend::{TraceScene, compile};
use crate::config::{Config, Opts};
use crate::errors::{PrismError, Result};
use crate::scene::describe::SceneDesc;
use crate::scene::object::ObjData;
use crate::scene::{Scene, update};

/// A packed B,G,R,X frame buffer with an explicit row stride.
pub struct FrameBuffer {
    width: usize,
    height: usize,
    row: usize,
    pixels: Vec<u32>,
}

impl FrameBuffer {
    /// A tightly packed buffer.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_row(width, height, width)
    }

    /// A buffer with a row stride larger than the width.
    #[must_use]
    pub fn with_row(width: usize, height: usize, row: usize) -> Self {
        let row = row.max(width);
        Self {
            width,
            height,
            row,
            pixels: vec![0; row * height],
        }
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row stride in pixels.
    #[inline]
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Stores one pixel.
    #[inline]
    pub fn put(&mut self, x: usize, y: usize, pixel: u32) {
        self.pixels[y * self.row + x] = pixel;
    }

    /// Reads one pixel.
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.row + x]
    }

    /// The raw pixel words.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Byte view in B,G,R,X memory order (little endian).
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    fn check(&self) -> Result<()> {
        if self.pixels.len() < self.row * self.height || self.row < self.width {
            return Err(PrismError::FrameOverflow {
                width: self.width,
                height: self.height,
                row: self.row,
                len: self.pixels.len(),
            });
        }
        Ok(())
    }
}

/// Interactive camera actions (timed against the last update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAction {
    /// Move along +K.
    MoveUp,
    /// Move along -K.
    MoveDown,
    /// Strafe left.
    MoveLeft,
    /// Strafe right.
    MoveRight,
    /// Move backward.
    MoveBack,
    /// Move forward.
    MoveForward,
    /// Yaw left.
    RotateLeft,
    /// Yaw right.
    RotateRight,
    /// Pitch up (clamped at level).
    RotateUp,
    /// Pitch down (clamped at straight down).
    RotateDown,
}

/// The engine platform: scene, compiled blocks, accumulator and dispatch.
pub struct Platform {
    /// The scene registry.
    pub scene: Scene,
    /// Engine configuration.
    pub cfg: Config,
    trace: Option<TraceScene>,
    pt: Option<PtState>,
    granted: u32,
    lanes: usize,
}

impl Platform {
    /// Builds the scene and selects the SIMD instantiation.
    pub fn new(desc: SceneDesc, cfg: Config) -> Result<Self> {
        let scene = Scene::build(desc, cfg.opts)?;
        let granted = switch0(cfg.simd);
        let lanes = granted_lanes(granted);
        debug!("platform ready: {lanes} lanes (grant {granted:#010x})");
        Ok(Self {
            scene,
            cfg,
            trace: None,
            pt: None,
            granted,
            lanes,
        })
    }

    /// The granted SIMD code (`size | type << 8 | factor << 16`).
    #[must_use]
    pub fn granted(&self) -> u32 {
        self.granted
    }

    /// Packet lane count of the granted configuration.
    #[must_use]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Runs the update phases and recompiles the backend blocks.
    pub fn update(&mut self, time: f64) -> Result<()> {
        update::update(&mut self.scene, time);
        self.trace = Some(compile(&self.scene, &self.cfg)?);
        Ok(())
    }

    /// Renders a full frame. Updates at time zero first if the host never
    /// called [`Platform::update`].
    pub fn render(&mut self, fb: &mut FrameBuffer) -> Result<()> {
        self.render_stripe(fb, 0, 1)?;
        if let Some(pt) = self.pt.as_mut() {
            pt.count += 1;
        }
        Ok(())
    }

    /// Renders the scanline stripe `row0, row0 + step, ...`. Stripe
    /// renders share the accumulator frame; the host advances it with
    /// [`Platform::advance_accum`] once all stripes of a frame are done.
    pub fn render_stripe(&mut self, fb: &mut FrameBuffer, row0: usize, step: usize) -> Result<()> {
        fb.check()?;
        if self.trace.is_none() {
            self.update(0.0)?;
        }

        let pt_on = self.cfg.opts.contains(Opts::PT_ON);
        if pt_on {
            let pixels = fb.width() * fb.height();
            let stale = self.pt.as_ref().is_none_or(|p| p.accum.len() != pixels);
            if stale {
                self.pt = Some(PtState::new(fb.width(), fb.height()));
            }
        }

        let trace = self.trace.as_mut().expect("compiled above");
        if self.cfg.opts.contains(Opts::TILING) {
            trace.refresh_screen_rects(&self.scene, fb.width(), fb.height());
        }
        let trace = self.trace.as_ref().expect("compiled above");
        let pt = if pt_on { self.pt.as_mut() } else { None };

        match self.lanes {
            4 => render_frame::<4>(trace, &self.cfg, fb, pt, row0, step),
            8 => render_frame::<8>(trace, &self.cfg, fb, pt, row0, step),
            16 => render_frame::<16>(trace, &self.cfg, fb, pt, row0, step),
            32 => render_frame::<32>(trace, &self.cfg, fb, pt, row0, step),
            _ => render_frame::<64>(trace, &self.cfg, fb, pt, row0, step),
        }
        Ok(())
    }

    /// Advances the accumulator frame counter (stripe-rendering hosts).
    pub fn advance_accum(&mut self) {
        if let Some(pt) = self.pt.as_mut() {
            pt.count += 1;
        }
    }

    /// Accumulated path-tracing samples per pixel.
    #[must_use]
    pub fn accum_samples(&self) -> u32 {
        self.pt.as_ref().map_or(0, |p| p.count)
    }

    /// Accumulated mean radiance of a pixel (linear space).
    #[must_use]
    pub fn accum_pixel(&self, fb: &FrameBuffer, x: usize, y: usize) -> [f32; 3] {
        self.pt
            .as_ref()
            .map_or([0.0; 3], |p| p.accum[y * fb.width() + x])
    }

    /// Drops accumulated samples (scene or camera changed).
    pub fn restart_accum(&mut self) {
        if let Some(pt) = self.pt.as_mut() {
            pt.restart();
        }
    }

    /// Applies a timed camera action to the frame camera and marks it
    /// changed for the next update.
    pub fn camera_action(&mut self, action: CameraAction, time: f64) {
        let Some(key) = self.scene.primary_camera() else {
            return;
        };
        let node = &mut self.scene.objects[key];
        let t = (time - node.time.unwrap_or(0.0)) as f32;
        let ObjData::Camera(cam) = &mut node.data else {
            return;
        };
        let (dps, drt) = (cam.dps, cam.drt);
        let (hs, hc) = (cam.hor_sin, cam.hor_cos);
        let trm = &mut node.trm;

        match action {
            CameraAction::MoveUp => trm.position.z += dps.z * t,
            CameraAction::MoveDown => trm.position.z -= dps.z * t,
            CameraAction::MoveLeft => {
                trm.position.x -= dps.x * t * hc;
                trm.position.y -= dps.x * t * hs;
            }
            CameraAction::MoveRight => {
                trm.position.x += dps.x * t * hc;
                trm.position.y += dps.x * t * hs;
            }
            CameraAction::MoveBack => {
                trm.position.x += dps.y * t * hs;
                trm.position.y -= dps.y * t * hc;
            }
            CameraAction::MoveForward => {
                trm.position.x -= dps.y * t * hs;
                trm.position.y += dps.y * t * hc;
            }
            CameraAction::RotateLeft => {
                trm.rotation.z += drt.x * t;
                if trm.rotation.z >= 180.0 {
                    trm.rotation.z -= 360.0;
                }
            }
            CameraAction::RotateRight => {
                trm.rotation.z -= drt.x * t;
                if trm.rotation.z <= -180.0 {
                    trm.rotation.z += 360.0;
                }
            }
            CameraAction::RotateUp => {
                if trm.rotation.x < 0.0 {
                    trm.rotation.x = (trm.rotation.x + drt.y * t).min(0.0);
                }
            }
            CameraAction::RotateDown => {
                if trm.rotation.x > -180.0 {
                    trm.rotation.x = (trm.rotation.x - drt.y * t).max(-180.0);
                }
            }
        }

        cam.cam_changed = true;
    }

    /// Background color seen by missed rays.
    #[must_use]
    pub fn background(&self) -> Vec3 {
        self.scene.background()
    }
}
