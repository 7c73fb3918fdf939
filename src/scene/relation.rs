//! Relation compiler.
//!
//! Converts an array's relation triples into per-surface custom clipper
//! lists and bounding-volume attachments. Clipper templates are dispatched
//! to targets head-first; because the template is built tail-first here and
//! the backend compiler reverses the list once more, the accumulator
//! ENTER/LEAVE markers end up in correct nesting order for the kernel.

use log::warn;

use crate::config::Opts;
use crate::scene::describe::{RelKind, RelationDesc};
use crate::scene::object::ObjData;
use crate::scene::{ObjKey, Scene};

/// Which subspace of the clipper is subtracted from the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipKind {
    /// Subtract the clipper's inner subspace (keep lanes on the outer side).
    MinusInner,
    /// Subtract the clipper's outer subspace (keep lanes on the inner side).
    MinusOuter,
}

/// One element of a surface's custom clipper list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipElem {
    /// Clip against a surface.
    Surface {
        /// The clipper surface.
        obj: ObjKey,
        /// Subtracted subspace.
        kind: ClipKind,
    },
    /// Open an accumulator group.
    Enter,
    /// Close an accumulator group.
    Leave,
}

/// Template element produced by the relation loop, consumed by
/// [`add_relation`].
#[derive(Debug, Clone, Copy)]
enum TemplateElem {
    Enter,
    Leave,
    Clip { obj: ObjKey, kind: ClipKind },
}

/// Compiles one array's relation vector. Children must already exist.
pub fn compile_relations(scene: &mut Scene, array: ObjKey, rels: &[RelationDesc]) {
    let children: Vec<ObjKey> = match scene.objects[array].data.as_array() {
        Some(a) => a.children.clone(),
        None => return,
    };

    // Left/right cursors narrow on INDEX_ARRAY for deep addressing.
    let mut left = children.clone();
    let mut right = children.clone();

    let mut pending: Vec<TemplateElem> = Vec::new();
    let mut acc = false;

    for rel in rels {
        let o1 = rel.obj1;
        let o2 = rel.obj2;
        if o1 >= left.len() as i32 || o2 >= right.len() as i32 {
            warn!("relation index out of range: ({o1}, {o2})");
            continue;
        }

        let mut elem: Option<TemplateElem> = None;
        let mut bv: Option<(ObjKey, ObjKey, bool)> = None; // (target, bvnode, mode)

        match rel.kind {
            RelKind::IndexArray => {
                if o1 >= 0 && o2 >= -1 {
                    if let Some(a) = scene.objects[left[o1 as usize]].data.as_array() {
                        left = a.children.clone();
                    }
                }
                if o1 >= -1 && o2 >= 0 {
                    if let Some(a) = scene.objects[right[o2 as usize]].data.as_array() {
                        right = a.children.clone();
                    }
                }
                continue;
            }

            RelKind::MinusInner | RelKind::MinusOuter => {
                let kind = if rel.kind == RelKind::MinusInner {
                    ClipKind::MinusInner
                } else {
                    ClipKind::MinusOuter
                };
                if o1 == -1 && o2 >= 0 && !acc {
                    acc = true;
                    pending.push(TemplateElem::Enter);
                }
                if o1 >= -1 && o2 >= 0 {
                    elem = Some(TemplateElem::Clip {
                        obj: right[o2 as usize],
                        kind,
                    });
                    right = children.clone();
                }
                if o1 == -1 && o2 >= 0 {
                    if let Some(e) = elem.take() {
                        pending.push(e);
                    }
                }
            }

            RelKind::MinusAccum => {
                if o1 >= 0 && o2 == -1 && acc {
                    acc = false;
                    pending.push(TemplateElem::Leave);
                    let template = std::mem::take(&mut pending);
                    add_relation(scene, left[o1 as usize], &template);
                    left = children.clone();
                }
                continue;
            }

            RelKind::BoundArray | RelKind::UntieArray => {
                let mode = rel.kind == RelKind::BoundArray;
                if o1 == -1 && o2 == -1 {
                    bv = Some((array, array, mode));
                }
                if o1 == -1 && o2 >= 0 {
                    let tgt = right[o2 as usize];
                    if scene.objects[tgt].tag.is_array() {
                        bv = Some((tgt, tgt, mode));
                    }
                }
            }

            RelKind::BoundIndex | RelKind::UntieIndex => {
                let mode = rel.kind == RelKind::BoundIndex;
                if o1 == -1 && o2 >= 0 {
                    bv = Some((right[o2 as usize], array, mode));
                }
                if o1 >= 0 && o2 >= 0 {
                    let arr = left[o1 as usize];
                    if scene.objects[arr].tag.is_array() {
                        bv = Some((right[o2 as usize], arr, mode));
                    }
                }
            }
        }

        if o1 >= 0 {
            if let Some(e) = elem.take() {
                add_relation(scene, left[o1 as usize], &[e]);
                left = children.clone();
            }
        }
        if let Some((target, node, mode)) = bv {
            if scene.opts.contains(Opts::VARRAY) {
                update_bvnode(scene, target, node, mode);
            }
            if o1 >= 0 {
                left = children.clone();
            }
            if o2 >= 0 {
                right = children.clone();
            }
        }
    }

    if acc {
        warn!("unterminated accumulator group in relations");
    }
}

/// Dispatches a clipper template to a target: arrays fan out to all
/// children, surfaces head-insert the elements (array clippers expand to
/// their children).
fn add_relation(scene: &mut Scene, target: ObjKey, template: &[TemplateElem]) {
    match &scene.objects[target].data {
        ObjData::Array(a) => {
            let children = a.children.clone();
            for child in children {
                add_relation(scene, child, template);
            }
        }
        ObjData::Surface(_) => {
            for elem in template {
                match *elem {
                    TemplateElem::Enter => head_insert(scene, target, ClipElem::Enter),
                    TemplateElem::Leave => head_insert(scene, target, ClipElem::Leave),
                    TemplateElem::Clip { obj, kind } => match &scene.objects[obj].data {
                        ObjData::Array(a) => {
                            let children = a.children.clone();
                            for child in children {
                                add_relation(scene, target, &[TemplateElem::Clip {
                                    obj: child,
                                    kind,
                                }]);
                            }
                        }
                        ObjData::Surface(_) => {
                            head_insert(scene, target, ClipElem::Surface { obj, kind });
                        }
                        _ => {}
                    },
                }
            }
        }
        _ => {}
    }
}

fn head_insert(scene: &mut Scene, target: ObjKey, elem: ClipElem) {
    if let Some(s) = scene.objects[target].data.as_surface_mut() {
        s.clip.insert(0, elem);
    }
}

/// Installs or clears a bvnode attachment over a subtree. The bvnode never
/// attaches to itself, and boundless objects are never attached.
pub fn update_bvnode(scene: &mut Scene, obj: ObjKey, bvnode: ObjKey, mode: bool) {
    if obj != bvnode && scene.objects[obj].geom_verts() != 0 {
        let node = &mut scene.objects[obj];
        if mode && node.bvnode.is_none() {
            node.bvnode = Some(bvnode);
        }
        if !mode && node.bvnode == Some(bvnode) {
            node.bvnode = None;
        }
    }

    if let Some(a) = scene.objects[obj].data.as_array() {
        let children = a.children.clone();
        for child in children {
            update_bvnode(scene, child, bvnode, mode);
        }
    }
}
