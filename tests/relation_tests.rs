//! Relation compiler tests
//!
//! Tests for:
//! - Custom clipper list construction and accumulator marker ordering
//! - Array clipper expansion to children
//! - Bounding-volume attach/untie over subtrees and indexed children
//! - Index-cursor narrowing into sub-arrays

use glam::Vec3;
use prism::backend::blocks::ClipRef;
use prism::backend::compile;
use prism::scene::relation::{ClipElem, ClipKind};
use prism::scene::update;
use prism::scene::{ObjKey, Scene};
use prism::{
    CameraDesc, Color, Config, MaterialDesc, ObjectDesc, Opts, RelKind, RelationDesc, SceneDesc,
    SurfaceDesc, SurfaceShape, Transform,
};

// ============================================================================
// Helpers
// ============================================================================

fn gray() -> MaterialDesc {
    MaterialDesc::plain(Color::Hdr([0.5, 0.5, 0.5]))
}

fn sphere() -> ObjectDesc {
    ObjectDesc::surface(
        Transform::new(),
        SurfaceDesc::new(SurfaceShape::Sphere { rad: 1.0 }, gray()),
    )
}

fn build(children: Vec<ObjectDesc>, relations: Vec<RelationDesc>) -> Scene {
    let desc = SceneDesc::new(ObjectDesc::array(Transform::new(), children, relations));
    Scene::build(desc, Opts::default()).unwrap()
}

fn clip_of(scene: &Scene, i: usize) -> Vec<ClipElem> {
    scene.objects[scene.surfaces[i]]
        .data
        .as_surface()
        .unwrap()
        .clip
        .iter()
        .copied()
        .collect()
}

// ============================================================================
// Clipper lists
// ============================================================================

#[test]
fn single_minus_relation_builds_one_clipper() {
    let scene = build(
        vec![sphere(), sphere()],
        vec![RelationDesc::new(0, RelKind::MinusOuter, 1)],
    );
    let clip = clip_of(&scene, 0);
    assert_eq!(clip.len(), 1);
    let expect: ObjKey = scene.surfaces[1];
    assert!(matches!(
        clip[0],
        ClipElem::Surface { obj, kind: ClipKind::MinusOuter } if obj == expect
    ));
    // The clipper itself carries no list.
    assert!(clip_of(&scene, 1).is_empty());
}

#[test]
fn accum_group_brackets_in_template_order() {
    // Two clippers bracketed by an accumulator, dispatched to child 0.
    let scene = build(
        vec![sphere(), sphere(), sphere()],
        vec![
            RelationDesc::new(-1, RelKind::MinusOuter, 1),
            RelationDesc::new(-1, RelKind::MinusInner, 2),
            RelationDesc::new(0, RelKind::MinusAccum, -1),
        ],
    );
    let clip = clip_of(&scene, 0);
    // Head insertion reverses the template.
    assert_eq!(clip.len(), 4);
    assert_eq!(clip[0], ClipElem::Leave);
    assert!(matches!(clip[1], ClipElem::Surface { kind: ClipKind::MinusInner, .. }));
    assert!(matches!(clip[2], ClipElem::Surface { kind: ClipKind::MinusOuter, .. }));
    assert_eq!(clip[3], ClipElem::Enter);
}

#[test]
fn backend_reverses_into_kernel_order() {
    let children = vec![
        sphere(),
        sphere(),
        sphere(),
        ObjectDesc::camera(Transform::at(Vec3::new(0.0, -5.0, 0.0)), CameraDesc::default()),
    ];
    let relations = vec![
        RelationDesc::new(-1, RelKind::MinusOuter, 1),
        RelationDesc::new(-1, RelKind::MinusInner, 2),
        RelationDesc::new(0, RelKind::MinusAccum, -1),
    ];
    let mut scene = build(children, relations);
    update::update(&mut scene, 0.0);
    let ts = compile(&scene, &Config::default()).unwrap();

    // Kernel order: ENTER, clippers in template order, LEAVE.
    let clip = &ts.surfs[0].clip;
    assert_eq!(clip.len(), 4);
    assert!(matches!(clip[0], ClipRef::Enter));
    assert!(matches!(clip[1], ClipRef::Surf { blk: 1, kind: ClipKind::MinusOuter }));
    assert!(matches!(clip[2], ClipRef::Surf { blk: 2, kind: ClipKind::MinusInner }));
    assert!(matches!(clip[3], ClipRef::Leave));
}

#[test]
fn array_clipper_expands_to_children() {
    let pair = ObjectDesc::array(
        Transform::new(),
        vec![sphere(), sphere()],
        Vec::new(),
    );
    let scene = build(
        vec![sphere(), pair],
        vec![RelationDesc::new(0, RelKind::MinusOuter, 1)],
    );
    let clip = clip_of(&scene, 0);
    assert_eq!(clip.len(), 2);
    for elem in clip {
        assert!(matches!(elem, ClipElem::Surface { kind: ClipKind::MinusOuter, .. }));
    }
}

#[test]
fn array_target_fans_out_to_children() {
    let pair = ObjectDesc::array(Transform::new(), vec![sphere(), sphere()], Vec::new());
    let scene = build(
        vec![pair, sphere()],
        vec![RelationDesc::new(0, RelKind::MinusInner, 1)],
    );
    // Both surfaces inside the target array got the clipper.
    assert_eq!(clip_of(&scene, 0).len(), 1);
    assert_eq!(clip_of(&scene, 1).len(), 1);
    assert!(clip_of(&scene, 2).is_empty());
}

// ============================================================================
// Bounding-volume relations
// ============================================================================

#[test]
fn bound_array_attaches_subtree() {
    let scene = build(
        vec![sphere(), sphere()],
        vec![RelationDesc::new(-1, RelKind::BoundArray, -1)],
    );
    for i in 0..2 {
        assert_eq!(scene.objects[scene.surfaces[i]].bvnode, Some(scene.root));
    }
}

#[test]
fn untie_array_clears_subtree() {
    let scene = build(
        vec![sphere(), sphere()],
        vec![
            RelationDesc::new(-1, RelKind::BoundArray, -1),
            RelationDesc::new(-1, RelKind::UntieArray, -1),
        ],
    );
    for i in 0..2 {
        assert_eq!(scene.objects[scene.surfaces[i]].bvnode, None);
    }
}

#[test]
fn bound_index_attaches_one_child() {
    let scene = build(
        vec![sphere(), sphere()],
        vec![RelationDesc::new(-1, RelKind::BoundIndex, 0)],
    );
    assert_eq!(scene.objects[scene.surfaces[0]].bvnode, Some(scene.root));
    assert_eq!(scene.objects[scene.surfaces[1]].bvnode, None);
}

#[test]
fn varray_off_ignores_bound_relations() {
    let desc = SceneDesc::new(ObjectDesc::array(
        Transform::new(),
        vec![sphere()],
        vec![RelationDesc::new(-1, RelKind::BoundArray, -1)],
    ));
    let scene = Scene::build(desc, Opts::default() & !Opts::VARRAY).unwrap();
    assert_eq!(scene.objects[scene.surfaces[0]].bvnode, None);
}

#[test]
fn boundless_surface_never_attaches() {
    let plane = ObjectDesc::surface(
        Transform::new(),
        SurfaceDesc::new(SurfaceShape::Plane, gray()),
    );
    let scene = build(
        vec![plane],
        vec![RelationDesc::new(-1, RelKind::BoundArray, -1)],
    );
    assert_eq!(scene.objects[scene.surfaces[0]].bvnode, None);
}

// ============================================================================
// Index narrowing
// ============================================================================

#[test]
fn index_array_narrows_right_cursor() {
    // MINUS against a surface buried inside a sub-array.
    let pair = ObjectDesc::array(Transform::new(), vec![sphere(), sphere()], Vec::new());
    let scene = build(
        vec![sphere(), pair],
        vec![
            RelationDesc::new(-1, RelKind::IndexArray, 1),
            RelationDesc::new(0, RelKind::MinusOuter, 1),
        ],
    );
    let clip = clip_of(&scene, 0);
    assert_eq!(clip.len(), 1);
    // The clipper is the sub-array's second sphere (surfaces[2]).
    let expect = scene.surfaces[2];
    assert!(matches!(clip[0], ClipElem::Surface { obj, .. } if obj == expect));
}

#[test]
fn out_of_range_indices_are_skipped() {
    let scene = build(
        vec![sphere(), sphere()],
        vec![RelationDesc::new(7, RelKind::MinusOuter, 9)],
    );
    assert!(clip_of(&scene, 0).is_empty());
    assert!(clip_of(&scene, 1).is_empty());
}
