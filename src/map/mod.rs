//! In-memory model of one map.
//!
//! Entities live in flat arenas on [`Level`] and refer to each other by
//! index; partner and child edges are index fields, so there are no
//! pointer cycles.  The builder owns one `Level` per map and drops it
//! before the next.

pub mod load;
pub mod udmf;

use bitflags::bitflags;
use glam::DVec2;

use crate::geom::{ANG_EPSILON, Bbox, compute_angle};
use crate::wad::MapFormat;

pub type VertexId = usize;
pub type SectorId = usize;
pub type SidedefId = usize;
pub type LinedefId = usize;
pub type SegId = usize;
pub type SubsecId = usize;
pub type NodeId = usize;

/// Marks a seg that must not reach the output (sorts after every real
/// index).
pub const SEG_GARBAGE: i32 = i32::MAX;

/*--------------------------- vertices -------------------------------*/

/// One angular "spoke" at a vertex: an outgoing wall direction plus the
/// sectors on either side of it.
#[derive(Clone, Copy, Debug)]
pub struct WallTip {
    pub angle: f64,
    pub left: Option<SectorId>,
    pub right: Option<SectorId>,
}

#[derive(Clone, Debug)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    /// Stable index: position on disk for loaded vertices, ordinal among
    /// the new vertices for split products.
    pub index: i32,
    pub is_new: bool,
    pub is_used: bool,
    /// Walltips sorted ascending by angle.
    pub tips: Vec<WallTip>,
}

impl Vertex {
    #[inline]
    pub fn pos(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }
}

/*--------------------------- sectors / sides ------------------------*/

#[derive(Clone, Debug)]
pub struct Sector {
    pub index: usize,
    /// Set when a polyobject spawns here; the sector's lines become
    /// precious and its segs are never picked as partitions.
    pub has_polyobj: bool,
}

#[derive(Clone, Debug)]
pub struct Sidedef {
    pub index: usize,
    pub sector: Option<SectorId>,
}

/*--------------------------- linedefs -------------------------------*/

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LinedefFlags: u16 {
        const IMPASSABLE      = 0x0001;
        const BLOCK_MONSTERS  = 0x0002;
        const TWO_SIDED       = 0x0004;
        const UPPER_UNPEGGED  = 0x0008;
        const LOWER_UNPEGGED  = 0x0010;
        const SECRET          = 0x0040;
        const BLOCK_SOUND     = 0x0080;
        const NOT_ON_MAP      = 0x0200;
        const ALREADY_ON_MAP  = 0x1000;
    }
}

#[derive(Clone, Debug)]
pub struct Linedef {
    pub start: VertexId,
    pub end: VertexId,
    pub right: Option<SidedefId>,
    pub left: Option<SidedefId>,
    /// Special type (8-bit in Hexen maps).
    pub line_type: u16,
    pub tag: i16,
    pub two_sided: bool,
    /// Tag in [900,1000): avoid splitting (deep water, invisible lifts).
    pub is_precious: bool,
    /// Both sides present and referencing the same sector.
    pub self_ref: bool,
    /// Endpoints coincide within 1/128 unit.
    pub zero_len: bool,
    /// Later duplicate of an identical line (same endpoints).
    pub overlap: bool,
    pub index: usize,
}

#[derive(Clone, Debug)]
pub struct Thing {
    pub x: f64,
    pub y: f64,
    pub kind: u16,
    pub index: usize,
}

/*--------------------------- segs -----------------------------------*/

/// An oriented half-edge on a linedef, or on a partition line for
/// minisegs (`linedef == None`).  The sector a seg bounds lies on its
/// right.
#[derive(Clone, Debug)]
pub struct Seg {
    pub start: VertexId,
    pub end: VertexId,
    /// 0 = right of the source linedef, 1 = left.
    pub side: u8,
    pub linedef: Option<LinedefId>,
    pub sector: Option<SectorId>,
    pub partner: Option<SegId>,
    /// Output position; −1 until subsector emission, [`SEG_GARBAGE`]
    /// for discards.
    pub index: i32,
    // precomputed geometry, must be refreshed after any endpoint change
    pub ps: DVec2,
    pub pe: DVec2,
    pub pd: DVec2,
    pub plen: f64,
}

/*--------------------------- BSP tree -------------------------------*/

/// A convex leaf: its segs, in clockwise order once building finishes.
#[derive(Clone, Debug)]
pub struct Subsec {
    pub segs: Vec<SegId>,
    pub bounds: Bbox,
    pub index: usize,
}

/// Either child of an interior node.
#[derive(Clone, Copy, Debug)]
pub enum BspChild {
    Node(NodeId),
    Subsec(SubsecId),
}

#[derive(Clone, Debug)]
pub struct NodeChild {
    pub child: BspChild,
    pub bounds: Bbox,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub right: NodeChild,
    pub left: NodeChild,
    /// Assigned in post-order during emission.
    pub index: i32,
}

/*--------------------------- the level ------------------------------*/

#[derive(Debug)]
pub struct Level {
    pub name: String,
    pub format: MapFormat,

    pub verts: Vec<Vertex>,
    pub sectors: Vec<Sector>,
    pub sides: Vec<Sidedef>,
    pub lines: Vec<Linedef>,
    pub things: Vec<Thing>,

    pub segs: Vec<Seg>,
    pub subsecs: Vec<Subsec>,
    pub nodes: Vec<Node>,

    /// Frozen once the loader completes.
    pub num_old_vert: usize,
    pub num_new_vert: usize,
    /// Linedefs with at least one sidedef.
    pub num_real_lines: usize,

    // save-time state
    pub overflows: bool,
    pub force_xnod: bool,
}

impl Level {
    pub fn new(name: impl Into<String>, format: MapFormat) -> Level {
        Level {
            name: name.into(),
            format,
            verts: Vec::new(),
            sectors: Vec::new(),
            sides: Vec::new(),
            lines: Vec::new(),
            things: Vec::new(),
            segs: Vec::new(),
            subsecs: Vec::new(),
            nodes: Vec::new(),
            num_old_vert: 0,
            num_new_vert: 0,
            num_real_lines: 0,
            overflows: false,
            force_xnod: false,
        }
    }

    /*--------------------- allocation helpers -----------------------*/

    pub fn new_vertex(&mut self, x: f64, y: f64) -> VertexId {
        let id = self.verts.len();
        self.verts.push(Vertex {
            x,
            y,
            index: id as i32,
            is_new: false,
            is_used: false,
            tips: Vec::new(),
        });
        id
    }

    pub fn new_sector(&mut self) -> SectorId {
        let id = self.sectors.len();
        self.sectors.push(Sector {
            index: id,
            has_polyobj: false,
        });
        id
    }

    pub fn new_sidedef(&mut self, sector: Option<SectorId>) -> SidedefId {
        let id = self.sides.len();
        self.sides.push(Sidedef { index: id, sector });
        id
    }

    /*--------------------- seg geometry -----------------------------*/

    /// Refresh a seg's cached positions after its endpoints changed.
    pub fn recompute_seg(&mut self, seg: SegId) {
        let ps = self.verts[self.segs[seg].start].pos();
        let pe = self.verts[self.segs[seg].end].pos();

        let s = &mut self.segs[seg];
        s.ps = ps;
        s.pe = pe;
        s.pd = pe - ps;
        s.plen = s.pd.length();

        debug_assert!(s.plen > 0.0, "zero-length seg");
    }

    /*--------------------- walltips ---------------------------------*/

    /// Record an outgoing wall at `vert` with direction `(dx,dy)` and the
    /// sectors on the left/right of that direction.
    pub fn add_wall_tip(
        &mut self,
        vert: VertexId,
        dx: f64,
        dy: f64,
        left: Option<SectorId>,
        right: Option<SectorId>,
    ) {
        let angle = compute_angle(dx, dy);
        let tips = &mut self.verts[vert].tips;

        let pos = tips.partition_point(|t| t.angle < angle);
        tips.insert(pos, WallTip { angle, left, right });
    }

    /// Is the space in direction `(dx,dy)` from `vert` open?  Returns the
    /// sector it opens into, or `None` when a wall lies along the query
    /// or the space is void.
    pub fn vertex_check_open(&self, vert: VertexId, dx: f64, dy: f64) -> Option<SectorId> {
        let angle = compute_angle(dx, dy);
        let tips = &self.verts[vert].tips;

        // a wall in exactly this direction closes the space
        for tip in tips {
            let diff = (tip.angle - angle).abs();
            if diff < ANG_EPSILON || diff > 360.0 - ANG_EPSILON {
                return None;
            }
        }

        // between two tips the open sector is the right side of the tip
        // above the query angle (equivalently the left side of the one
        // below, wrapping at 360)
        for tip in tips {
            if angle + ANG_EPSILON < tip.angle {
                return tip.right;
            }
        }
        tips.last().and_then(|t| t.left)
    }
}
