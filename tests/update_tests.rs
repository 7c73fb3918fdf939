//! Update pipeline tests
//!
//! Tests for:
//! - Matrix composition and inverse round-trips
//! - Trnode determination and transform caching
//! - Axis-map extraction for trivial transforms
//! - Animation callbacks and change propagation
//! - Camera actions

use glam::{Mat4, Vec3, Vec4};
use prism::scene::update;
use prism::scene::{ObjData, ObjKey, Scene};
use prism::{
    CameraAction, CameraDesc, Color, Config, LightDesc, MaterialDesc, ObjectDesc, Opts, Platform,
    SceneDesc, SurfaceDesc, SurfaceShape, Transform,
};

// ============================================================================
// Helpers
// ============================================================================

const EPSILON: f32 = 1e-5;

fn gray() -> MaterialDesc {
    MaterialDesc::plain(Color::Hdr([0.5, 0.5, 0.5]))
}

fn sphere_at(pos: Vec3, rad: f32) -> ObjectDesc {
    ObjectDesc::surface(
        Transform::at(pos),
        SurfaceDesc::new(SurfaceShape::Sphere { rad }, gray()),
    )
}

fn basic_scene(children: Vec<ObjectDesc>) -> SceneDesc {
    SceneDesc::new(ObjectDesc::array(Transform::new(), children, Vec::new()))
}

fn surface_keys(scene: &Scene) -> Vec<ObjKey> {
    scene.surfaces.clone()
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

// ============================================================================
// Matrix composition
// ============================================================================

#[test]
fn world_matrix_composes_parent_chain() {
    let inner = ObjectDesc::array(
        Transform::at(Vec3::new(0.0, 1.0, 0.0)),
        vec![sphere_at(Vec3::new(0.0, 0.0, 2.0), 1.0)],
        Vec::new(),
    );
    let desc = basic_scene(vec![inner]);
    let mut scene = Scene::build(desc, Opts::default()).unwrap();
    update::update(&mut scene, 0.0);

    let key = surface_keys(&scene)[0];
    let pos = scene.objects[key].pos();
    assert!(vec3_approx(pos, Vec3::new(0.0, 1.0, 2.0)));
}

#[test]
fn inverse_roundtrips_for_self_trnode() {
    let mut trm = Transform::at(Vec3::new(3.0, -2.0, 1.0));
    trm.rotation = Vec3::new(30.0, 45.0, 60.0);
    trm.scale = Vec3::new(2.0, 1.0, 1.0);
    let obj = ObjectDesc::surface(trm, SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.0 }, gray()));
    let mut scene = Scene::build(basic_scene(vec![obj]), Opts::default()).unwrap();
    update::update(&mut scene, 0.0);

    let key = surface_keys(&scene)[0];
    let node = &scene.objects[key];
    assert_eq!(node.trnode, Some(key));

    // mtx * inv == identity within epsilon; vectors round-trip.
    let ident = node.mtx * node.inv;
    let diff = ident - Mat4::IDENTITY;
    for c in 0..4 {
        assert!(diff.col(c).length() < 1e-4, "column {c} off: {:?}", diff.col(c));
    }
    let v = Vec4::new(0.3, -1.2, 2.5, 1.0);
    let back = node.inv * (node.mtx * v);
    assert!((back - v).length() < 1e-4);
}

// ============================================================================
// Trnode determination and transform caching
// ============================================================================

#[test]
fn trivial_surface_under_rotated_array_caches() {
    let mut arr_trm = Transform::new();
    arr_trm.rotation = Vec3::new(0.0, 0.0, 45.0);
    let arr = ObjectDesc::array(
        arr_trm,
        vec![sphere_at(Vec3::new(1.0, 0.0, 0.0), 1.0)],
        Vec::new(),
    );
    let mut scene = Scene::build(basic_scene(vec![arr]), Opts::default()).unwrap();
    update::update(&mut scene, 0.0);

    let skey = surface_keys(&scene)[0];
    let surf = &scene.objects[skey];
    let arr_key = surf.parent.unwrap();

    // The rotated array is the trnode; the surface keeps its relative
    // matrix (position untouched by the array rotation).
    assert_eq!(surf.trnode, Some(arr_key));
    assert!(vec3_approx(surf.pos(), Vec3::new(1.0, 0.0, 0.0)));
}

#[test]
fn caching_disabled_without_tarray() {
    let mut arr_trm = Transform::new();
    arr_trm.rotation = Vec3::new(0.0, 0.0, 45.0);
    let arr = ObjectDesc::array(
        arr_trm,
        vec![sphere_at(Vec3::new(1.0, 0.0, 0.0), 1.0)],
        Vec::new(),
    );
    let opts = Opts::default() & !Opts::TARRAY;
    let mut scene = Scene::build(basic_scene(vec![arr]), opts).unwrap();
    update::update(&mut scene, 0.0);

    let skey = surface_keys(&scene)[0];
    let surf = &scene.objects[skey];
    // Full world matrix: the surface becomes its own trnode and its
    // position picks up the array rotation.
    assert_eq!(surf.trnode, Some(skey));
    let r = std::f32::consts::FRAC_1_SQRT_2;
    assert!(vec3_approx(surf.pos(), Vec3::new(r, r, 0.0)));
}

#[test]
fn lights_always_get_world_matrices() {
    let mut arr_trm = Transform::new();
    arr_trm.rotation = Vec3::new(0.0, 0.0, 45.0);
    let arr = ObjectDesc::array(
        arr_trm,
        vec![ObjectDesc::light(
            Transform::at(Vec3::new(1.0, 0.0, 0.0)),
            LightDesc::default(),
        )],
        Vec::new(),
    );
    let mut scene = Scene::build(basic_scene(vec![arr]), Opts::default()).unwrap();
    update::update(&mut scene, 0.0);

    let lkey = scene.lights[0];
    let r = std::f32::consts::FRAC_1_SQRT_2;
    assert!(vec3_approx(scene.objects[lkey].pos(), Vec3::new(r, r, 0.0)));
}

// ============================================================================
// Axis mapping
// ============================================================================

#[test]
fn quarter_turn_extracts_axis_map() {
    let mut trm = Transform::new();
    trm.rotation = Vec3::new(0.0, 0.0, 90.0);
    let obj = ObjectDesc::surface(
        trm,
        SurfaceDesc::new(SurfaceShape::Cylinder { rad: 1.0 }, gray()),
    );
    let mut scene = Scene::build(basic_scene(vec![obj]), Opts::default()).unwrap();
    update::update(&mut scene, 0.0);

    let key = surface_keys(&scene)[0];
    let node = &scene.objects[key];
    // Trivial transform: no trnode, I maps to +Y, J to -X.
    assert_eq!(node.trnode, None);
    assert_eq!(node.map.map, [1, 0, 2]);
    assert_eq!(node.map.sgn, [1.0, -1.0, 1.0]);
}

#[test]
fn mapped_cylinder_coeffs_follow_k() {
    // Cylinder rotated 90 about X: local K (the hollow axis) maps to -Y.
    let mut trm = Transform::new();
    trm.rotation = Vec3::new(90.0, 0.0, 0.0);
    let obj = ObjectDesc::surface(
        trm,
        SurfaceDesc::new(SurfaceShape::Cylinder { rad: 2.0 }, gray()),
    );
    let mut scene = Scene::build(basic_scene(vec![obj]), Opts::default()).unwrap();
    update::update(&mut scene, 0.0);

    let key = surface_keys(&scene)[0];
    let node = &scene.objects[key];
    let s = node.data.as_surface().unwrap();
    // The square-coefficient hole sits on the world Y axis now.
    assert_eq!(s.shape.sci.y, 0.0);
    assert_eq!(s.shape.sci.x, 1.0);
    assert_eq!(s.shape.sci.z, 1.0);
    assert_eq!(s.shape.sci.w, 4.0);
}

#[test]
fn scaling_only_array_reduces_to_diagonal() {
    let mut arr_trm = Transform::new();
    arr_trm.scale = Vec3::new(2.0, 3.0, 4.0);
    let arr = ObjectDesc::array(
        arr_trm,
        vec![sphere_at(Vec3::ZERO, 1.0)],
        Vec::new(),
    );
    // FSCALE keeps the scaling-only classification.
    let opts = Opts::default() | Opts::FSCALE;
    let mut scene = Scene::build(basic_scene(vec![arr]), opts).unwrap();
    update::update(&mut scene, 0.0);

    let skey = surface_keys(&scene)[0];
    let arr_key = scene.objects[skey].parent.unwrap();
    let arr_node = &scene.objects[arr_key];
    assert_eq!(arr_node.trnode, Some(arr_key));

    // The array matrix is a plain diagonal.
    let m = arr_node.mtx;
    assert!((m.col(0) - Vec4::new(2.0, 0.0, 0.0, 0.0)).length() < EPSILON);
    assert!((m.col(1) - Vec4::new(0.0, 3.0, 0.0, 0.0)).length() < EPSILON);
    assert!((m.col(2) - Vec4::new(0.0, 0.0, 4.0, 0.0)).length() < EPSILON);
}

// ============================================================================
// Animation and change propagation
// ============================================================================

#[test]
fn animation_moves_object_between_updates() {
    let anim: prism::scene::describe::AnimFn =
        Box::new(|time, _prev, trm: &mut Transform| {
            trm.position.x = time as f32;
        });
    let obj = sphere_at(Vec3::ZERO, 1.0).animated(anim);
    let mut scene = Scene::build(basic_scene(vec![obj]), Opts::default()).unwrap();

    update::update(&mut scene, 1.0);
    let key = surface_keys(&scene)[0];
    assert!(vec3_approx(scene.objects[key].pos(), Vec3::new(1.0, 0.0, 0.0)));

    update::update(&mut scene, 2.5);
    assert!(vec3_approx(scene.objects[key].pos(), Vec3::new(2.5, 0.0, 0.0)));
    assert!(scene.objects[key].obj_changed);
}

#[test]
fn static_objects_settle_after_first_update() {
    let mut scene =
        Scene::build(basic_scene(vec![sphere_at(Vec3::ZERO, 1.0)]), Opts::default()).unwrap();
    update::update(&mut scene, 0.0);
    update::update(&mut scene, 1.0);
    let key = surface_keys(&scene)[0];
    assert!(!scene.objects[key].obj_changed);
}

#[test]
fn update_opt_forces_full_pass() {
    let mut scene = Scene::build(
        basic_scene(vec![sphere_at(Vec3::ZERO, 1.0)]),
        Opts::default() | Opts::UPDATE,
    )
    .unwrap();
    update::update(&mut scene, 0.0);
    update::update(&mut scene, 1.0);
    let key = surface_keys(&scene)[0];
    assert!(scene.objects[key].obj_changed);
}

// ============================================================================
// Camera actions
// ============================================================================

#[test]
fn camera_action_yaws_and_marks_changed() {
    let desc = SceneDesc::new(ObjectDesc::array(
        Transform::new(),
        vec![
            ObjectDesc::camera(Transform::at(Vec3::new(0.0, -5.0, 0.0)), CameraDesc::default()),
            sphere_at(Vec3::ZERO, 1.0),
        ],
        Vec::new(),
    ));
    let mut platform = Platform::new(desc, Config::default()).unwrap();
    platform.update(0.0).unwrap();

    let before = {
        let key = platform.scene.primary_camera().unwrap();
        platform.scene.objects[key].trm.rotation.z
    };
    platform.camera_action(CameraAction::RotateLeft, 1.0);
    let key = platform.scene.primary_camera().unwrap();
    let node = &platform.scene.objects[key];
    assert!(node.trm.rotation.z > before);
    match &node.data {
        ObjData::Camera(c) => assert!(c.cam_changed),
        _ => unreachable!(),
    }

    // The next update folds the action in and clears the flag.
    platform.update(1.0).unwrap();
    let node = &platform.scene.objects[key];
    match &node.data {
        ObjData::Camera(c) => assert!(!c.cam_changed),
        _ => unreachable!(),
    }
}
