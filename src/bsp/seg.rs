//! Seg-level machinery: the initial seg list, splitting, and the
//! intersection bookkeeping that closes subsectors with minisegs.

use glam::DVec2;

use crate::build::Report;
use crate::geom::{DIST_EPSILON, along_dist, perp_dist};
use crate::map::{Level, LinedefId, SectorId, Seg, SegId, VertexId};

/// A partition line, captured from a candidate seg.
#[derive(Clone, Debug)]
pub struct Partition {
    pub ps: DVec2,
    pub pd: DVec2,
    pub plen: f64,
    pub linedef: Option<LinedefId>,
}

impl Partition {
    pub fn from_seg(lev: &Level, sid: SegId) -> Partition {
        let seg = &lev.segs[sid];
        Partition {
            ps: seg.ps,
            pd: seg.pd,
            plen: seg.plen,
            linedef: seg.linedef,
        }
    }

    #[inline]
    pub fn perp(&self, p: DVec2) -> f64 {
        perp_dist(self.ps, self.pd, self.plen, p)
    }

    #[inline]
    pub fn along(&self, p: DVec2) -> f64 {
        along_dist(self.ps, self.pd, self.plen, p)
    }
}

/*====================================================================*/
/*                       Initial segs                                 */
/*====================================================================*/

fn new_seg(
    lev: &mut Level,
    start: VertexId,
    end: VertexId,
    side: u8,
    linedef: Option<LinedefId>,
    sector: Option<SectorId>,
) -> SegId {
    let id = lev.segs.len();
    lev.segs.push(Seg {
        start,
        end,
        side,
        linedef,
        sector,
        partner: None,
        index: -1,
        ps: DVec2::ZERO,
        pe: DVec2::ZERO,
        pd: DVec2::ZERO,
        plen: 0.0,
    });
    lev.recompute_seg(id);
    id
}

/// Build the initial seg list from the real linedefs: a right seg per
/// right sidedef, a left seg per left sidedef, partnered mutually.
pub fn create_segs(lev: &mut Level, report: &mut Report) -> Vec<SegId> {
    let mut list = Vec::with_capacity(lev.num_real_lines * 2);

    for i in 0..lev.lines.len() {
        let line = &lev.lines[i];

        if line.zero_len {
            if line.right.is_some() || line.left.is_some() {
                report.minor(format_args!(
                    "{}: linedef #{} is zero length",
                    lev.name, line.index
                ));
            }
            continue;
        }
        if line.right.is_none() && line.left.is_none() {
            continue;
        }

        if line.right.is_none() {
            report.minor(format_args!(
                "{}: linedef #{} has no right sidedef",
                lev.name, line.index
            ));
        }

        let (start, end) = (line.start, line.end);
        let right_sec = line.right.and_then(|s| lev.sides[s].sector);
        let left_sec = line.left.and_then(|s| lev.sides[s].sector);
        let (has_right, has_left) = (line.right.is_some(), line.left.is_some());

        let mut right_seg = None;
        if has_right {
            right_seg = Some(new_seg(lev, start, end, 0, Some(i), right_sec));
        }
        if has_left {
            let left_seg = new_seg(lev, end, start, 1, Some(i), left_sec);
            if let Some(r) = right_seg {
                lev.segs[r].partner = Some(left_seg);
                lev.segs[left_seg].partner = Some(r);
            }
            list.extend(right_seg);
            list.push(left_seg);
        } else {
            list.extend(right_seg);
        }
    }

    list
}

/*====================================================================*/
/*                       Splitting                                    */
/*====================================================================*/

/// Allocate the vertex introduced by splitting `sid` at `(x, y)` and
/// give it the walltips implied by the seg and its partner.
fn new_vertex_from_split(lev: &mut Level, sid: SegId, x: f64, y: f64) -> VertexId {
    let id = lev.verts.len();
    lev.verts.push(crate::map::Vertex {
        x,
        y,
        index: lev.num_new_vert as i32,
        is_new: true,
        is_used: true,
        tips: Vec::new(),
    });
    lev.num_new_vert += 1;

    let seg = &lev.segs[sid];
    let pd = seg.pd;
    let sector = seg.sector;
    let partner_sector = seg.partner.and_then(|p| lev.segs[p].sector);

    // looking back along the seg its own sector lies to the left
    lev.add_wall_tip(id, -pd.x, -pd.y, sector, partner_sector);
    lev.add_wall_tip(id, pd.x, pd.y, partner_sector, sector);

    id
}

/// Split `sid` at `(x, y)`, returning the new second half.  The partner
/// (when present) is split symmetrically and the partner links stay
/// mutual.
pub fn split_seg(lev: &mut Level, sid: SegId, x: f64, y: f64, report: &mut Report) -> SegId {
    if let Some(ld) = lev.segs[sid].linedef
        && lev.lines[ld].is_precious
    {
        report.warn(format_args!(
            "{}: seg split on precious linedef #{}",
            lev.name, ld
        ));
    }

    let new_vert = new_vertex_from_split(lev, sid, x, y);

    let new_id = lev.segs.len();
    let mut copy = lev.segs[sid].clone();
    copy.start = new_vert;
    lev.segs.push(copy);

    lev.segs[sid].end = new_vert;
    lev.recompute_seg(sid);
    lev.recompute_seg(new_id);

    if let Some(p) = lev.segs[sid].partner {
        let np_id = lev.segs.len();
        let mut np = lev.segs[p].clone();
        np.end = new_vert;
        lev.segs.push(np);

        // keep the partner relationship valid on both halves
        lev.segs[new_id].partner = Some(np_id);
        lev.segs[np_id].partner = Some(new_id);

        lev.segs[p].start = new_vert;
        lev.recompute_seg(p);
        lev.recompute_seg(np_id);
    }

    new_id
}

/*====================================================================*/
/*                       Intersections / minisegs                     */
/*====================================================================*/

/// A point where the current partition crosses map geometry, with the
/// open/closed state of the space on either side along the partition.
#[derive(Clone, Debug)]
pub struct Cut {
    pub vertex: VertexId,
    pub along: f64,
    pub open_before: Option<SectorId>,
    pub open_after: Option<SectorId>,
    pub self_ref: bool,
}

/// Record an intersection at `vertex` (once per vertex).
pub fn add_intersection(
    cuts: &mut Vec<Cut>,
    lev: &Level,
    part: &Partition,
    vertex: VertexId,
    self_ref: bool,
) {
    if cuts.iter().any(|c| c.vertex == vertex) {
        return;
    }

    let pos = lev.verts[vertex].pos();
    cuts.push(Cut {
        vertex,
        along: part.along(pos),
        open_before: lev.vertex_check_open(vertex, -part.pd.x, -part.pd.y),
        open_after: lev.vertex_check_open(vertex, part.pd.x, part.pd.y),
        self_ref,
    });
}

/// Walk the sorted intersection list and close off the open gaps with
/// partnered miniseg pairs, one per side of the partition.
pub fn add_minisegs(
    lev: &mut Level,
    part: &Partition,
    cuts: &mut Vec<Cut>,
    rights: &mut Vec<SegId>,
    lefts: &mut Vec<SegId>,
    report: &mut Report,
) {
    cuts.sort_by(|a, b| a.along.partial_cmp(&b.along).expect("finite distances"));

    for i in 0..cuts.len().saturating_sub(1) {
        let (cur, next) = (&cuts[i], &cuts[i + 1]);

        if next.along - cur.along < DIST_EPSILON {
            continue;
        }

        match (cur.open_after, next.open_before) {
            (None, None) => {} // closed space between the cuts
            (Some(sa), Some(sb)) => {
                if sa != sb && !cur.self_ref && !next.self_ref {
                    report.minor(format_args!(
                        "{}: sector mismatch along partition (#{} vs #{})",
                        lev.name, sa, sb
                    ));
                }

                let (va, vb) = (cur.vertex, next.vertex);
                let right = new_seg(lev, va, vb, 0, None, Some(sa));
                let left = new_seg(lev, vb, va, 1, None, Some(sb));
                lev.segs[right].partner = Some(left);
                lev.segs[left].partner = Some(right);

                rights.push(right);
                lefts.push(left);
            }
            _ => {
                if !cur.self_ref && !next.self_ref {
                    report.minor(format_args!(
                        "{}: unclosed sector along partition near ({:.1},{:.1})",
                        lev.name,
                        lev.verts[cur.vertex].x,
                        lev.verts[cur.vertex].y
                    ));
                }
            }
        }
    }
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
