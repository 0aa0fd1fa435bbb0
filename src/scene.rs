//! Scene input model: camera, meshes and the visibility policy.
//!
//! The engine consumes evaluated geometry; nothing here reads files or talks
//! to a host application. Meshes arrive as indexed polygon lists with
//! per-face material slots and an optional set of user-marked feature edges.
//! The camera is either a full camera description or a detached viewport
//! override (explicit view-projection, position and clip range) so the
//! engine can run without a live camera object.
use nalgebra::{Matrix4, Vector3};

/// Camera projection kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// Vertical field of view in radians.
    Perspective { fov_y: f64 },
    /// Total width of the orthographic view volume.
    Orthographic { scale: f64 },
}

/// Full camera description, camera-to-world oriented.
#[derive(Clone, Debug)]
pub struct Camera {
    pub projection: Projection,
    /// Camera-to-world matrix; the camera looks down its local -Z axis.
    pub matrix: Matrix4<f64>,
    pub clip_start: f64,
    pub clip_end: f64,
    /// Sensor shift in NDC-half units, subtracted doubled after division.
    pub shift_x: f64,
    pub shift_y: f64,
}

impl Camera {
    /// World-space position taken from the matrix translation column.
    pub fn position(&self) -> Vector3<f64> {
        self.matrix.column(3).xyz()
    }

    /// World-space backward axis (+Z of the camera frame).
    ///
    /// Points from the scene toward the viewer; the view direction is its
    /// negation.
    pub fn back_vector(&self) -> Vector3<f64> {
        (self.matrix * nalgebra::Vector4::new(0.0, 0.0, 1.0, 0.0)).xyz()
    }
}

/// Detached-viewport replacement for a camera object.
///
/// Used when the computation runs without a scene camera: the caller supplies
/// the combined view-projection matrix and the quantities the geometric tests
/// need directly.
#[derive(Clone, Debug)]
pub struct ViewportOverride {
    pub view_projection: Matrix4<f64>,
    /// Viewer position in world space.
    pub position: Vector3<f64>,
    /// World-space vector pointing from the scene toward the viewer.
    pub back_vector: Vector3<f64>,
    pub near: f64,
    pub far: f64,
    pub perspective: bool,
}

/// How an object participates in feature-line extraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectUsage {
    /// Defer to the containing collections.
    #[default]
    Inherent,
    /// Contribute lines and occlusion.
    Include,
    /// Contribute occlusion only; no candidate lines.
    OcclusionOnly,
    /// Skip entirely.
    Exclude,
}

/// Collection-level usage override applied to inherent-usage members.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollectionUsage {
    #[default]
    Include,
    OcclusionOnly,
    Exclude,
}

/// A node of the collection hierarchy.
///
/// `members` holds indices into the scene's object list. A collection with
/// `force` set pushes its exclude/occlusion-only usage onto every
/// inherent-usage object it recursively contains.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    pub usage: CollectionUsage,
    pub force: bool,
    pub members: Vec<usize>,
    pub children: Vec<Collection>,
}

impl Collection {
    fn contains_recursive(&self, object: usize) -> bool {
        self.members.contains(&object)
            || self.children.iter().any(|c| c.contains_recursive(object))
    }

    /// Resolves the usage a collection hierarchy imposes on `object`.
    ///
    /// Returns [`ObjectUsage::Inherent`] when no collection has an opinion;
    /// the object's own usage applies then. An object's explicit
    /// include/exclude is authoritative over non-forcing collections.
    pub fn resolve_usage(&self, object: usize, own: ObjectUsage) -> ObjectUsage {
        if own == ObjectUsage::Inherent
            && self.force
            && self.usage != CollectionUsage::Include
            && self.contains_recursive(object)
        {
            return match self.usage {
                CollectionUsage::Exclude => ObjectUsage::Exclude,
                CollectionUsage::OcclusionOnly => ObjectUsage::OcclusionOnly,
                CollectionUsage::Include => ObjectUsage::Inherent,
            };
        }

        if self.children.is_empty() {
            if self.members.contains(&object) {
                if own == ObjectUsage::Inherent {
                    return match self.usage {
                        CollectionUsage::OcclusionOnly => ObjectUsage::OcclusionOnly,
                        CollectionUsage::Exclude => ObjectUsage::Exclude,
                        CollectionUsage::Include => ObjectUsage::Inherent,
                    };
                }
                return own;
            }
            return ObjectUsage::Inherent;
        }

        for child in &self.children {
            let result = child.resolve_usage(object, own);
            if result != ObjectUsage::Inherent && result != ObjectUsage::Include {
                return result;
            }
        }
        ObjectUsage::Inherent
    }
}

/// One polygon face: vertex indices plus a material slot.
#[derive(Clone, Debug)]
pub struct Face {
    pub verts: Vec<u32>,
    pub material: i32,
}

/// Evaluated mesh geometry for one object.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub positions: Vec<Vector3<f64>>,
    pub faces: Vec<Face>,
    /// User-marked feature edges, as unordered vertex pairs.
    pub marked_edges: Vec<[u32; 2]>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// One scene object: mesh geometry plus its world transform and usage.
#[derive(Clone, Debug)]
pub struct SceneObject {
    pub name: String,
    pub transform: Matrix4<f64>,
    pub mesh: MeshData,
    pub usage: ObjectUsage,
}

/// Evaluated scene handed to [`crate::LineArtEngine::process`].
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub camera: Option<Camera>,
    pub viewport_override: Option<ViewportOverride>,
    pub objects: Vec<SceneObject>,
    pub root_collection: Option<Collection>,
}

impl Scene {
    /// Effective usage of the object at `index` after collection overrides.
    pub fn effective_usage(&self, index: usize) -> ObjectUsage {
        let own = self.objects[index].usage;
        let resolved = match &self.root_collection {
            Some(root) => root.resolve_usage(index, own),
            None => ObjectUsage::Inherent,
        };
        if resolved == ObjectUsage::Inherent {
            own
        } else {
            resolved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(usage: ObjectUsage) -> SceneObject {
        SceneObject {
            name: "test".into(),
            transform: Matrix4::identity(),
            mesh: MeshData::default(),
            usage,
        }
    }

    #[test]
    fn forced_collection_downgrades_inherent_objects() {
        let scene = Scene {
            objects: vec![object(ObjectUsage::Inherent)],
            root_collection: Some(Collection {
                usage: CollectionUsage::OcclusionOnly,
                force: true,
                members: vec![],
                children: vec![Collection {
                    usage: CollectionUsage::Include,
                    force: false,
                    members: vec![0],
                    children: vec![],
                }],
            }),
            ..Default::default()
        };
        assert_eq!(scene.effective_usage(0), ObjectUsage::OcclusionOnly);
    }

    #[test]
    fn explicit_object_usage_wins_over_unforced_collection() {
        let scene = Scene {
            objects: vec![object(ObjectUsage::Include)],
            root_collection: Some(Collection {
                usage: CollectionUsage::Exclude,
                force: false,
                members: vec![0],
                children: vec![],
            }),
            ..Default::default()
        };
        assert_eq!(scene.effective_usage(0), ObjectUsage::Include);
    }

    #[test]
    fn leaf_collection_usage_applies_to_inherent_member() {
        let scene = Scene {
            objects: vec![object(ObjectUsage::Inherent), object(ObjectUsage::Inherent)],
            root_collection: Some(Collection {
                usage: CollectionUsage::Exclude,
                force: false,
                members: vec![1],
                children: vec![],
            }),
            ..Default::default()
        };
        assert_eq!(scene.effective_usage(0), ObjectUsage::Inherent);
        assert_eq!(scene.effective_usage(1), ObjectUsage::Exclude);
    }
}
