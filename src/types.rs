//! Shared identifier and status types used across the pipeline stages.
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Index of a render vertex in the buffer's vertex arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertId(pub u32);

/// Index of a render line in the buffer's line arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineId(pub u32);

/// Index of a render triangle in the buffer's triangle arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TriId(pub u32);

/// Index of a cell in the tile grid arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AreaId(pub u32);

/// Index of a source object in the scene's object list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectId(pub u32);

impl VertId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}
impl LineId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}
impl TriId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}
impl AreaId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}
impl ObjectId {
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Feature-type bitset carried by every render line.
///
/// A line can hold several flags at once: a user-marked silhouette edge keeps
/// both `EDGE_MARK` and `CONTOUR`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EdgeFlags(pub u8);

impl EdgeFlags {
    pub const CONTOUR: EdgeFlags = EdgeFlags(1 << 0);
    pub const CREASE: EdgeFlags = EdgeFlags(1 << 1);
    pub const MATERIAL: EdgeFlags = EdgeFlags(1 << 2);
    pub const EDGE_MARK: EdgeFlags = EdgeFlags(1 << 3);
    pub const INTERSECTION: EdgeFlags = EdgeFlags(1 << 4);

    #[inline]
    pub fn contains(self, other: EdgeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: EdgeFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Feature-line category, used for work scheduling and output grouping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LineCategory {
    Contour,
    Crease,
    Intersection,
    Material,
    EdgeMark,
}

impl LineCategory {
    /// All categories in occlusion-processing order.
    pub const ALL: [LineCategory; 5] = [
        LineCategory::Contour,
        LineCategory::Crease,
        LineCategory::Intersection,
        LineCategory::Material,
        LineCategory::EdgeMark,
    ];
}

/// Triangle state after near-plane culling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullStatus {
    /// Fully in front of the near plane, used as-is.
    #[default]
    Keep,
    /// Straddled the near plane and was replaced by clipped triangles.
    Replaced,
    /// Fully behind the near plane.
    Discarded,
}

/// Shared computation status, observed cooperatively by the workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum RenderStatus {
    #[default]
    Idle,
    Running,
    Finished,
    Canceled,
}

/// Shared, lock-protected computation status.
///
/// The initiator flips it to `Canceled`; workers poll it between line
/// categories. Kept on its own lock, decoupled from the work-queue lock, so
/// status polling never contends with chunk dequeuing.
#[derive(Clone, Debug, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<RenderStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> RenderStatus {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the status; a finished report never overwrites a cancellation.
    pub fn set(&self, status: RenderStatus) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if status == RenderStatus::Finished && *guard == RenderStatus::Canceled {
            return;
        }
        *guard = status;
    }

    pub fn cancel(&self) {
        self.set(RenderStatus::Canceled);
    }

    pub fn is_canceled(&self) -> bool {
        self.get() == RenderStatus::Canceled
    }
}

/// Compact per-pass result summary.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LineArtResult {
    pub status: RenderStatus,
    pub contour_count: usize,
    pub crease_count: usize,
    pub material_count: usize,
    pub edge_mark_count: usize,
    pub intersection_count: usize,
    pub chain_count: usize,
    pub latency_ms: f64,
}
