//! End-to-end render tests
//!
//! Small frames through the full pipeline:
//! - Diffuse shading and shadows over a floor plane
//! - CSG difference via MINUS relations (inner-face visibility)
//! - Mirror reflection of an emissive checker
//! - Refraction with and without Schlick Fresnel
//! - Axis-aligned clipping windows
//! - Path-tracer accumulation

use glam::Vec3;
use prism::{
    CameraDesc, Color, Config, Fsaa, FrameBuffer, LightDesc, MaterialDesc, ObjectDesc, Opts,
    Platform, RelKind, RelationDesc, SceneDesc, SurfaceDesc, SurfaceShape, TextureRef, Transform,
};

// ============================================================================
// Helpers
// ============================================================================

const W: usize = 64;
const H: usize = 64;
const INF: f32 = f32::INFINITY;

fn gray(v: f32) -> MaterialDesc {
    MaterialDesc::plain(Color::Hdr([v, v, v]))
}

fn camera(pos: Vec3, rot_x: f32) -> ObjectDesc {
    let mut trm = Transform::at(pos);
    trm.rotation = Vec3::new(rot_x, 0.0, 0.0);
    ObjectDesc::camera(trm, CameraDesc::default())
}

fn flat_config(opts: Opts) -> Config {
    Config {
        opts,
        fsaa: Fsaa::Off,
        ..Config::default()
    }
}

fn render(desc: SceneDesc, cfg: Config) -> FrameBuffer {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut platform = Platform::new(desc, cfg).unwrap();
    platform.update(0.0).unwrap();
    let mut fb = FrameBuffer::new(W, H);
    platform.render(&mut fb).unwrap();
    fb
}

fn decode(p: u32) -> [f32; 3] {
    [
        ((p >> 16) & 0xFF) as f32 / 255.0,
        ((p >> 8) & 0xFF) as f32 / 255.0,
        (p & 0xFF) as f32 / 255.0,
    ]
}

fn brightness(p: u32) -> f32 {
    let c = decode(p);
    c[0] + c[1] + c[2]
}

/// Projects a world point through the camera convention used by the
/// kernel (pixel centers, square pixels).
fn project(cam_pos: Vec3, rot_x: f32, p: Vec3) -> (usize, usize) {
    let (s, c) = rot_x.to_radians().sin_cos();
    let hor = Vec3::new(1.0, 0.0, 0.0);
    let ver = Vec3::new(0.0, c, s);
    let nrm = Vec3::new(0.0, -s, c);
    let d = p - cam_pos;
    let z = d.dot(nrm);
    assert!(z > 0.0, "point behind camera");
    let su = d.dot(hor) / z;
    let sv = d.dot(ver) / z;
    let half = W as f32 * 0.5;
    (
        (su * half + half) as usize,
        (sv * half + H as f32 * 0.5) as usize,
    )
}

// ============================================================================
// Scenario: plane floor + sphere, diffuse + shadow
// ============================================================================

#[test]
fn floor_sphere_shading_and_shadow() {
    let cam_pos = Vec3::new(0.0, -10.0, 10.0);
    let rot_x = -135.0;
    let no_atten = prism::Attenuation {
        range: 0.0,
        constant: 0.0,
        linear: 0.0,
        quadratic: 0.0,
    };
    let desc = SceneDesc::new(ObjectDesc::array(
        Transform::new(),
        vec![
            ObjectDesc::surface(
                Transform::new(),
                SurfaceDesc::new(SurfaceShape::Plane, gray(0.7))
                    .clipped(Vec3::new(-20.0, -20.0, -INF), Vec3::new(20.0, 20.0, INF)),
            ),
            ObjectDesc::surface(
                Transform::at(Vec3::new(0.0, 0.0, 1.0)),
                SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.0 }, gray(0.7)),
            ),
            ObjectDesc::light(
                Transform::at(Vec3::new(-8.0, -2.0, 3.0)),
                LightDesc {
                    color: Color::Hdr([1.0, 1.0, 1.0]),
                    luminosity: 1.0,
                    attenuation: no_atten,
                },
            ),
            camera(cam_pos, rot_x),
        ],
        Vec::new(),
    ));
    let fb = render(desc, flat_config(Opts::default()));

    // The sphere is visible at its projected center.
    let (sx, sy) = project(cam_pos, rot_x, Vec3::new(0.0, 0.0, 1.0));
    let back = decode(fb.get(0, 0));
    let sphere = decode(fb.get(sx, sy));
    assert!(
        (0..3).any(|i| (sphere[i] - back[i]).abs() > 0.05),
        "sphere not visible at ({sx}, {sy})"
    );

    // The light at (-8, -2, 3) throws the sphere's shadow to (4, 1, 0);
    // the mirrored floor point is lit.
    let (hx, hy) = project(cam_pos, rot_x, Vec3::new(4.0, 1.0, 0.0));
    let (lx, ly) = project(cam_pos, rot_x, Vec3::new(-4.0, 1.0, 0.0));
    let shadowed = brightness(fb.get(hx, hy));
    let lit = brightness(fb.get(lx, ly));
    assert!(
        lit > shadowed + 0.2,
        "shadow not darker: lit {lit} vs shadowed {shadowed}"
    );
}

// ============================================================================
// Scenario: CSG difference
// ============================================================================

#[test]
fn csg_difference_cuts_surfaces() {
    let cam_pos = Vec3::new(0.0, -12.0, 5.0);
    let rot_x = -105.0;
    let children = |relations: Vec<RelationDesc>| {
        SceneDesc::new(ObjectDesc::array(
            Transform::new(),
            vec![
                ObjectDesc::surface(
                    Transform::at(Vec3::new(0.0, 0.0, 3.0)),
                    SurfaceDesc::new(
                        SurfaceShape::Hyperboloid {
                            rat: 2.5,
                            hyp: -0.5,
                        },
                        gray(0.6),
                    )
                    .clipped(Vec3::new(-INF, -INF, -1.5), Vec3::new(INF, INF, 1.5)),
                ),
                ObjectDesc::surface(
                    Transform::at(Vec3::new(0.0, 0.0, 3.0)),
                    SurfaceDesc::new(SurfaceShape::Sphere { rad: 3.0 }, gray(0.6)),
                ),
                ObjectDesc::light(
                    Transform::at(Vec3::new(0.0, -6.0, 6.0)),
                    LightDesc::default(),
                ),
                camera(cam_pos, rot_x),
            ],
            relations,
        ))
    };

    let cut = render(
        children(vec![
            RelationDesc::new(1, RelKind::MinusOuter, 0),
            RelationDesc::new(0, RelKind::MinusOuter, 1),
        ]),
        flat_config(Opts::default()),
    );
    let uncut = render(children(Vec::new()), flat_config(Opts::default()));

    // The equatorial cut changes pixels near the object center, while some
    // pixels stay identical (polar caps and surroundings).
    let (cx, cy) = project(cam_pos, rot_x, Vec3::new(0.0, 0.0, 3.0));
    assert_ne!(cut.get(cx, cy), uncut.get(cx, cy), "cut not visible");

    let mut same = 0;
    let mut diff = 0;
    for y in 0..H {
        for x in 0..W {
            if cut.get(x, y) == uncut.get(x, y) {
                same += 1;
            } else {
                diff += 1;
            }
        }
    }
    assert!(diff > 50, "too few pixels changed by the cut: {diff}");
    assert!(same > 1000, "cut disturbed the whole frame: {same} same");
}

#[test]
fn minus_inner_window_shows_back_face() {
    // A window carved into the front of a hollow sphere exposes the inner
    // material of the back wall.
    let cam_pos = Vec3::new(0.0, -6.0, 0.0);
    let rot_x = -90.0;
    let mut shell = SurfaceDesc::new(SurfaceShape::Sphere { rad: 2.0 }, {
        let mut m = MaterialDesc::light(Color::Hdr([0.0, 0.0, 1.0]));
        m.diffuse = 0.0;
        m
    });
    shell.inner.mat = MaterialDesc::light(Color::Hdr([1.0, 0.0, 0.0]));
    let desc = SceneDesc::new(ObjectDesc::array(
        Transform::new(),
        vec![
            ObjectDesc::surface(Transform::new(), shell),
            ObjectDesc::surface(
                Transform::at(Vec3::new(0.0, -1.5, 0.0)),
                SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.5 }, gray(0.5))
                    .clipped(Vec3::splat(0.0), Vec3::splat(1.0e-3)),
            ),
            camera(cam_pos, rot_x),
        ],
        vec![RelationDesc::new(0, RelKind::MinusInner, 1)],
    ));
    let fb = render(desc, flat_config(Opts::default()));

    // Center: through the window onto the red inner back wall.
    let center = decode(fb.get(W / 2, H / 2));
    assert!(center[0] > 0.9 && center[2] < 0.1, "expected inner red, got {center:?}");

    // Far edge of the sphere: unclipped outer blue.
    let (ex, ey) = project(cam_pos, rot_x, Vec3::new(1.9, 0.0, 0.0));
    let edge = decode(fb.get(ex, ey));
    assert!(edge[2] > 0.9 && edge[0] < 0.1, "expected outer blue, got {edge:?}");
}

// ============================================================================
// Scenario: mirror reflection
// ============================================================================

#[test]
fn mirror_sphere_reflects_checker_ceiling() {
    // Emissive 2x2 checker ceiling above the camera; a mirror sphere below
    // reflects it. Gamma off for exact color matches.
    let mut ceiling = SurfaceDesc::new(SurfaceShape::Plane, gray(0.1));
    ceiling.inner = prism::SideDesc {
        // Four world units per texel: the convex mirror magnifies angles.
        scale: [8.0, 8.0],
        rot: 0.0,
        pos: [0.25, 0.25],
        mat: MaterialDesc {
            tex: TextureRef::Inline {
                x_dim: 2,
                y_dim: 2,
                pixels: vec![0x00FF_FFFF, 0x0000_0000, 0x0000_0000, 0x00FF_FFFF],
            },
            ..MaterialDesc::light(Color::Hdr([1.0, 1.0, 1.0]))
        },
    };

    let desc = SceneDesc::new(ObjectDesc::array(
        Transform::new(),
        vec![
            ObjectDesc::surface(Transform::at(Vec3::new(0.0, 0.0, 5.0)), ceiling),
            ObjectDesc::surface(
                Transform::new(),
                SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.0 }, MaterialDesc::mirror()),
            ),
            camera(Vec3::new(0.0, 0.0, 4.0), 180.0),
        ],
        Vec::new(),
    ));
    let opts = Opts::default() & !Opts::GAMMA;
    let fb = render(desc, flat_config(opts));

    // The center ray reflects straight up into the white texel.
    let center = decode(fb.get(W / 2, H / 2));
    assert!(
        center.iter().all(|&c| c > 0.99),
        "expected white reflection, got {center:?}"
    );

    // Off-center reflections reach black texels somewhere on the sphere.
    let mut found_black = false;
    for y in H / 2 - 12..H / 2 + 12 {
        for x in W / 2 - 12..W / 2 + 12 {
            let c = decode(fb.get(x, y));
            if c.iter().all(|&v| v < 0.01) {
                found_black = true;
            }
        }
    }
    assert!(found_black, "no black texel visible in the mirror");
}

// ============================================================================
// Scenario: refraction
// ============================================================================

fn glass_scene(fresnel: bool) -> SceneDesc {
    let mut glass = MaterialDesc::plain(Color::Hdr([1.0, 1.0, 1.0]));
    glass.diffuse = 0.0;
    glass.transparency = 1.0;
    glass.refract = 1.5;
    glass.fresnel = fresnel;

    // Vertical wall behind the sphere: left half red, right half green.
    let mut wall = SurfaceDesc::new(SurfaceShape::Plane, gray(0.1));
    let mut wall_trm = Transform::at(Vec3::new(0.0, 5.0, 0.0));
    wall_trm.rotation = Vec3::new(90.0, 0.0, 0.0);
    wall.outer = prism::SideDesc {
        scale: [1.0, 1.0],
        rot: 0.0,
        pos: [0.25, 0.0],
        mat: MaterialDesc {
            tex: TextureRef::Inline {
                x_dim: 2,
                y_dim: 1,
                pixels: vec![0x00FF_0000, 0x0000_FF00],
            },
            ..MaterialDesc::light(Color::Hdr([1.0, 1.0, 1.0]))
        },
    };

    SceneDesc::new(ObjectDesc::array(
        Transform::new(),
        vec![
            ObjectDesc::surface(wall_trm, wall),
            ObjectDesc::surface(
                Transform::new(),
                SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.0 }, glass),
            ),
            camera(Vec3::new(0.0, -4.0, 0.0), -90.0),
        ],
        Vec::new(),
    ))
}

#[test]
fn refraction_passes_center_unbent() {
    let opts = Opts::default() & !Opts::GAMMA;
    let fb = render(glass_scene(false), flat_config(opts));
    // Normal incidence through the sphere center: no bend, the wall texel
    // straight ahead dominates.
    let center = decode(fb.get(W / 2, H / 2));
    assert!(
        center[0] > 0.5 && center[0] > center[1],
        "expected red-dominant center, got {center:?}"
    );
}

#[test]
fn schlick_fresnel_changes_grazing_pixels() {
    let opts = Opts::default() & !Opts::GAMMA;
    let plain = render(glass_scene(false), flat_config(opts));
    let fresnel = render(glass_scene(true), flat_config(opts | Opts::SCHLICK));

    // Center stays transmission-dominated (R0 is only 4%)...
    let c = decode(fresnel.get(W / 2, H / 2));
    assert!(c[0] > 0.4, "center lost transmission: {c:?}");

    // ...while some grazing pixel near the silhouette changes.
    let mut changed = false;
    for x in W / 2 + 4..W / 2 + 10 {
        if plain.get(x, H / 2) != fresnel.get(x, H / 2) {
            changed = true;
        }
    }
    assert!(changed, "Fresnel left grazing pixels untouched");
}

// ============================================================================
// Scenario: axis-aligned clipping window
// ============================================================================

#[test]
fn clipped_plane_renders_disc() {
    let build = |kind: RelKind| {
        SceneDesc::new(ObjectDesc::array(
            Transform::new(),
            vec![
                ObjectDesc::surface(
                    Transform::new(),
                    SurfaceDesc::new(SurfaceShape::Plane, {
                        let mut m = MaterialDesc::light(Color::Hdr([1.0, 1.0, 0.0]));
                        m.diffuse = 0.0;
                        m
                    })
                    .clipped(Vec3::new(-5.0, -5.0, -INF), Vec3::new(5.0, 5.0, INF)),
                ),
                ObjectDesc::surface(
                    Transform::new(),
                    SurfaceDesc::new(SurfaceShape::Sphere { rad: 2.0 }, gray(0.5))
                        .clipped(Vec3::splat(0.0), Vec3::splat(1.0e-3)),
                ),
                camera(Vec3::new(0.0, 0.0, 8.0), 180.0),
            ],
            vec![RelationDesc::new(0, kind, 1)],
        ))
    };
    let opts = Opts::default() & !Opts::GAMMA;

    // px = 32 + 4x, py = 32 + 4y for floor points (x, y, 0).
    let plane = [1.0f32, 1.0, 0.0];
    let outer = render(build(RelKind::MinusOuter), flat_config(opts));
    // Inside the disc: plane; outside the disc but inside the rectangle:
    // background; outside the rectangle: background.
    assert_eq!(decode(outer.get(36, 32))[0..2], plane[0..2]);
    assert_ne!(decode(outer.get(46, 32)), decode(outer.get(36, 32)));
    assert_eq!(outer.get(46, 32), outer.get(56, 32));

    let inner = render(build(RelKind::MinusInner), flat_config(opts));
    // Complement: hole at the disc, plane in the rectangle ring.
    assert_ne!(decode(inner.get(36, 32))[0], 1.0);
    assert_eq!(decode(inner.get(46, 32))[0..2], plane[0..2]);
}

// ============================================================================
// Scenario: path tracer
// ============================================================================

#[test]
fn path_tracer_accumulates_and_converges() {
    let pw = 32;
    let desc = SceneDesc::new(ObjectDesc::array(
        Transform::new(),
        vec![
            ObjectDesc::surface(
                Transform::new(),
                SurfaceDesc::new(SurfaceShape::Plane, gray(0.6))
                    .clipped(Vec3::new(-20.0, -20.0, -INF), Vec3::new(20.0, 20.0, INF)),
            ),
            ObjectDesc::surface(Transform::at(Vec3::new(0.0, 0.0, 4.0)), {
                // Emissive ceiling facing down.
                let mut d = SurfaceDesc::new(SurfaceShape::Plane, gray(0.1));
                d.inner.mat = MaterialDesc::light(Color::Hdr([1.0, 1.0, 1.0]));
                d
            }),
            camera(Vec3::new(0.0, -6.0, 2.0), -90.0),
        ],
        Vec::new(),
    ));

    let cfg = Config {
        opts: (Opts::default() | Opts::PT_ON) & !Opts::GAMMA,
        ..Config::default()
    };
    let mut platform = Platform::new(desc, cfg).unwrap();
    platform.update(0.0).unwrap();
    let mut fb = FrameBuffer::new(pw, pw);

    let mut mid = [0.0f32; 3];
    for frame in 0..40 {
        platform.render(&mut fb).unwrap();
        if frame == 19 {
            mid = platform.accum_pixel(&fb, pw / 2, pw - 4);
        }
    }
    assert_eq!(platform.accum_samples(), 40);

    // A ceiling pixel is a direct emission hit every sample: exactly one.
    let ceiling = platform.accum_pixel(&fb, pw / 2, 2);
    assert!((ceiling[0] - 1.0).abs() < 1e-4, "ceiling {ceiling:?}");

    // A floor pixel gathers bounced light: positive, finite, and stable
    // between 20 and 40 samples.
    let floor = platform.accum_pixel(&fb, pw / 2, pw - 4);
    assert!(floor[0] > 0.0 && floor[0].is_finite());
    assert!(
        (floor[0] - mid[0]).abs() < 0.25,
        "accumulator unstable: {mid:?} -> {floor:?}"
    );
}

// ============================================================================
// Options: FSAA and TILING
// ============================================================================

#[test]
fn fsaa_smooths_silhouette_edges() {
    let desc = |fsaa: Fsaa| {
        (
            SceneDesc::new(ObjectDesc::array(
                Transform::new(),
                vec![
                    ObjectDesc::surface(
                        Transform::new(),
                        SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.0 }, {
                            let mut m = MaterialDesc::light(Color::Hdr([1.0, 1.0, 1.0]));
                            m.diffuse = 0.0;
                            m
                        }),
                    ),
                    camera(Vec3::new(0.0, -4.0, 0.0), -90.0),
                ],
                Vec::new(),
            )),
            Config {
                opts: Opts::default() & !Opts::GAMMA,
                fsaa,
                ..Config::default()
            },
        )
    };

    let (d, c) = desc(Fsaa::Off);
    let hard = render(d, c);
    let (d, c) = desc(Fsaa::X4);
    let soft = render(d, c);

    // Somewhere along the silhouette the supersampled frame blends the
    // white sphere into the background.
    let mut blended = false;
    for y in 0..H {
        for x in 0..W {
            let c = decode(soft.get(x, y));
            if c[0] > 0.3 && c[0] < 0.95 {
                blended = true;
            }
        }
    }
    assert!(blended, "no blended edge pixels with FSAA");
    // Interior stays saturated in both frames.
    assert_eq!(hard.get(W / 2, H / 2), soft.get(W / 2, H / 2));
}

#[test]
fn tiling_cull_is_conservative() {
    let build = || {
        SceneDesc::new(ObjectDesc::array(
            Transform::new(),
            vec![
                ObjectDesc::surface(
                    Transform::at(Vec3::new(-1.5, 0.0, 0.0)),
                    SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.0 }, {
                        let mut m = MaterialDesc::light(Color::Hdr([1.0, 0.0, 0.0]));
                        m.diffuse = 0.0;
                        m
                    }),
                ),
                ObjectDesc::surface(
                    Transform::at(Vec3::new(1.5, 0.0, 0.0)),
                    SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.0 }, {
                        let mut m = MaterialDesc::light(Color::Hdr([0.0, 1.0, 0.0]));
                        m.diffuse = 0.0;
                        m
                    }),
                ),
                camera(Vec3::new(0.0, -6.0, 0.0), -90.0),
            ],
            Vec::new(),
        ))
    };
    let plain = render(build(), flat_config(Opts::default()));
    let tiled = render(build(), flat_config(Opts::default() | Opts::TILING));
    for y in 0..H {
        for x in 0..W {
            assert_eq!(plain.get(x, y), tiled.get(x, y), "pixel ({x}, {y}) differs");
        }
    }
}

// ============================================================================
// Frame buffer
// ============================================================================

#[test]
fn framebuffer_stride_and_bytes() {
    let mut fb = FrameBuffer::with_row(3, 2, 5);
    fb.put(2, 1, 0x00AA_BB99);
    assert_eq!(fb.get(2, 1), 0x00AA_BB99);
    let bytes = fb.bytes();
    assert_eq!(bytes.len(), 5 * 2 * 4);
    // Little-endian B,G,R,X ordering.
    let off = (1 * 5 + 2) * 4;
    assert_eq!(bytes[off], 0x99);
    assert_eq!(bytes[off + 1], 0xBB);
    assert_eq!(bytes[off + 2], 0xAA);
}
