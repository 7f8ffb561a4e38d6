//! Partition selection and the BSP recursion, plus the tree post passes
//! (clockwise ordering, miniseg removal, 16-bit round-off).
//!
//! The scoring heuristic follows the classic node-builder lineage: seg
//! splits are expensive (scaled by the configurable split cost), near
//! misses and splits close to a seg end are surcharged, precious lines
//! are protected by a huge multiplier, and unbalanced trees pay per seg
//! of imbalance.

use crate::build::{BuildConfig, BuildError, Report};
use crate::bsp::seg::{Partition, add_intersection, add_minisegs, split_seg};
use crate::geom::{Bbox, DIST_EPSILON, IFFY_LEN, compute_angle};
use crate::map::{
    BspChild, Level, Node, NodeChild, SEG_GARBAGE, SegId, Subsec, SubsecId,
};

/// Above this many segs, fast mode samples candidates with a stride.
const SEG_FAST_THRESHOLD: usize = 200;

/// Splitting a precious linedef costs this many ordinary splits.
const PRECIOUS_MULTIPLY: i64 = 100;

/*====================================================================*/
/*                       Partition scoring                            */
/*====================================================================*/

#[derive(Default)]
struct EvalInfo {
    cost: i64,
    real_left: i64,
    real_right: i64,
    mini_left: i64,
    mini_right: i64,
}

impl EvalInfo {
    fn add_left(&mut self, real: bool) {
        if real {
            self.real_left += 1;
        } else {
            self.mini_left += 1;
        }
    }

    fn add_right(&mut self, real: bool) {
        if real {
            self.real_right += 1;
        } else {
            self.mini_right += 1;
        }
    }
}

/// Score `part` against every seg in `list`.  Returns `None` for an
/// unusable partition (trivial split) or one already worse than
/// `best_cost`.
fn eval_partition(
    lev: &Level,
    list: &[SegId],
    part: &Partition,
    factor: i64,
    best_cost: i64,
) -> Option<i64> {
    let mut info = EvalInfo::default();

    for &sid in list {
        let seg = &lev.segs[sid];
        let real = seg.linedef.is_some();

        // segs of the partition's own linedef are forced collinear:
        // their endpoints are numerically identical anyway
        let (a, b) = if part.linedef.is_some() && seg.linedef == part.linedef {
            (0.0, 0.0)
        } else {
            (part.perp(seg.ps), part.perp(seg.pe))
        };
        let (fa, fb) = (a.abs(), b.abs());

        if fa <= DIST_EPSILON && fb <= DIST_EPSILON {
            // collinear: direction decides the side
            if seg.pd.dot(part.pd) < 0.0 {
                info.add_left(real);
            } else {
                info.add_right(real);
            }
            continue;
        }

        // entirely on the right?
        if a > -DIST_EPSILON && b > -DIST_EPSILON {
            info.add_right(real);

            // near misses breed very short minisegs
            if !((a >= IFFY_LEN && b >= IFFY_LEN)
                || (a <= DIST_EPSILON && b >= IFFY_LEN)
                || (b <= DIST_EPSILON && a >= IFFY_LEN))
            {
                let q = if a <= DIST_EPSILON || b <= DIST_EPSILON {
                    IFFY_LEN / a.max(b)
                } else {
                    IFFY_LEN / a.min(b)
                };
                info.cost += (100.0 * factor as f64 * (q * q - 1.0)) as i64;
            }
            if info.cost > best_cost {
                return None;
            }
            continue;
        }

        // entirely on the left?
        if a < DIST_EPSILON && b < DIST_EPSILON {
            info.add_left(real);

            if !((a <= -IFFY_LEN && b <= -IFFY_LEN)
                || (a >= -DIST_EPSILON && b <= -IFFY_LEN)
                || (b >= -DIST_EPSILON && a <= -IFFY_LEN))
            {
                let q = if a >= -DIST_EPSILON || b >= -DIST_EPSILON {
                    IFFY_LEN / -a.min(b)
                } else {
                    IFFY_LEN / -a.max(b)
                };
                info.cost += (70.0 * factor as f64 * (q * q - 1.0)) as i64;
            }
            if info.cost > best_cost {
                return None;
            }
            continue;
        }

        // the seg straddles the partition
        info.cost += 100 * factor;

        let precious = seg
            .linedef
            .is_some_and(|ld| lev.lines[ld].is_precious);
        if precious {
            info.cost += 100 * factor * PRECIOUS_MULTIPLY;
        }

        // a split close to one end produces a really short piece
        if fa < IFFY_LEN || fb < IFFY_LEN {
            let q = IFFY_LEN / fa.min(fb);
            info.cost += (140.0 * factor as f64 * (q * q - 1.0)) as i64;
        }

        if info.cost > best_cost {
            return None;
        }
    }

    // a partition with nothing real on one side is no partition at all
    if info.real_left == 0 || info.real_right == 0 {
        return None;
    }

    info.cost += 100 * (info.real_left - info.real_right).abs();
    info.cost += 50 * (info.mini_left - info.mini_right).abs();

    // slight preference for axis-aligned partition lines
    if part.pd.x != 0.0 && part.pd.y != 0.0 {
        info.cost += 25;
    }

    if info.cost > best_cost {
        return None;
    }
    Some(info.cost)
}

/// Choose the cheapest usable partition seg, or `None` when the list is
/// already convex.
fn pick_node(lev: &Level, list: &[SegId], cfg: &BuildConfig) -> Option<SegId> {
    let step = if cfg.fast && list.len() > SEG_FAST_THRESHOLD {
        list.len() / SEG_FAST_THRESHOLD
    } else {
        1
    };

    let mut best = None;
    let mut best_cost = i64::MAX;

    let mut i = 0;
    while i < list.len() {
        let sid = list[i];
        i += step;

        let seg = &lev.segs[sid];

        // minisegs never partition, nor do self-referencing lines or
        // the segs of a polyobject's home sector
        let Some(ld) = seg.linedef else { continue };
        if lev.lines[ld].self_ref {
            continue;
        }
        if seg.sector.is_some_and(|s| lev.sectors[s].has_polyobj) {
            continue;
        }

        let part = Partition::from_seg(lev, sid);
        if let Some(cost) = eval_partition(lev, list, &part, cfg.split_cost as i64, best_cost)
            && cost < best_cost
        {
            best_cost = cost;
            best = Some(sid);
        }
    }

    best
}

/*====================================================================*/
/*                       Dividing the seg list                        */
/*====================================================================*/

fn divide_segs(
    lev: &mut Level,
    work: Vec<SegId>,
    part: &Partition,
    rights: &mut Vec<SegId>,
    lefts: &mut Vec<SegId>,
    cuts: &mut Vec<crate::bsp::seg::Cut>,
    report: &mut Report,
) {
    let mut work = work;
    let mut i = 0;

    while i < work.len() {
        let sid = work[i];
        i += 1;

        let seg = &lev.segs[sid];
        let self_ref = seg.linedef.is_some_and(|ld| lev.lines[ld].self_ref);

        let (a, b) = if part.linedef.is_some() && seg.linedef == part.linedef {
            (0.0, 0.0)
        } else {
            (part.perp(seg.ps), part.perp(seg.pe))
        };
        let (fa, fb) = (a.abs(), b.abs());

        if fa <= DIST_EPSILON && fb <= DIST_EPSILON {
            // collinear with the partition
            let (start, end, along_part) =
                (seg.start, seg.end, seg.pd.dot(part.pd) >= 0.0);
            add_intersection(cuts, lev, part, start, self_ref);
            add_intersection(cuts, lev, part, end, self_ref);

            if along_part {
                rights.push(sid);
            } else {
                lefts.push(sid);
            }
            continue;
        }

        if a > -DIST_EPSILON && b > -DIST_EPSILON {
            // on the right; note a touching endpoint
            let (start, end) = (seg.start, seg.end);
            if fa <= DIST_EPSILON {
                add_intersection(cuts, lev, part, start, self_ref);
            } else if fb <= DIST_EPSILON {
                add_intersection(cuts, lev, part, end, self_ref);
            }
            rights.push(sid);
            continue;
        }

        if a < DIST_EPSILON && b < DIST_EPSILON {
            let (start, end) = (seg.start, seg.end);
            if fa <= DIST_EPSILON {
                add_intersection(cuts, lev, part, start, self_ref);
            } else if fb <= DIST_EPSILON {
                add_intersection(cuts, lev, part, end, self_ref);
            }
            lefts.push(sid);
            continue;
        }

        // straddler: split at the crossing point, snapped to 1/8192
        let t = a / (a - b);
        let x = ((seg.ps.x + t * seg.pd.x) * 8192.0).round() / 8192.0;
        let y = ((seg.ps.y + t * seg.pd.y) * 8192.0).round() / 8192.0;

        let partner = lev.segs[sid].partner;
        let second = split_seg(lev, sid, x, y, report);
        add_intersection(cuts, lev, part, lev.segs[sid].end, self_ref);

        // the partner straddles identically and sits later in the work
        // list (its geometry was truncated by the same split); its far
        // half must be classified too
        if let Some(p) = partner {
            let far = lev.segs[second].partner.expect("split partner");
            match work[i..].iter().position(|&s| s == p) {
                Some(j) => work.insert(i + j + 1, far),
                None => work.push(far),
            }
        }

        if a < 0.0 {
            lefts.push(sid);
            rights.push(second);
        } else {
            rights.push(sid);
            lefts.push(second);
        }
    }
}

/*====================================================================*/
/*                       The recursion                                */
/*====================================================================*/

fn find_seg_bounds(lev: &Level, list: &[SegId]) -> Bbox {
    let mut bb = Bbox::empty();
    for &sid in list {
        bb.add_point(lev.segs[sid].ps);
        bb.add_point(lev.segs[sid].pe);
    }
    bb
}

fn create_subsec(lev: &mut Level, list: Vec<SegId>) -> SubsecId {
    debug_assert!(!list.is_empty(), "empty subsector");

    let bounds = find_seg_bounds(lev, &list);
    let id = lev.subsecs.len();
    lev.subsecs.push(Subsec {
        segs: list,
        bounds,
        index: id,
    });
    id
}

/// Node partition coordinates come from the candidate's linedef (its
/// vertices are integral), oriented to match the seg's side.
fn partition_coords(lev: &Level, sid: SegId) -> (f64, f64, f64, f64) {
    let seg = &lev.segs[sid];

    let (x, y, mut dx, mut dy) = match seg.linedef {
        Some(ld) => {
            let line = &lev.lines[ld];
            let (s, e) = if seg.side == 0 {
                (line.start, line.end)
            } else {
                (line.end, line.start)
            };
            let (sv, ev) = (&lev.verts[s], &lev.verts[e]);
            (sv.x, sv.y, ev.x - sv.x, ev.y - sv.y)
        }
        None => (seg.ps.x, seg.ps.y, seg.pd.x, seg.pd.y),
    };

    // keep deltas within 16-bit range for the classic node record
    while dx.abs() > 32766.0 || dy.abs() > 32766.0 {
        dx /= 2.0;
        dy /= 2.0;
    }

    (x, y, dx, dy)
}

/// Recursively build the tree for `work`, returning the child handle.
pub fn build_bsp(
    lev: &mut Level,
    work: Vec<SegId>,
    cfg: &BuildConfig,
    report: &mut Report,
    depth: usize,
) -> Result<BspChild, BuildError> {
    if cfg.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    let Some(part_sid) = pick_node(lev, &work, cfg) else {
        return Ok(BspChild::Subsec(create_subsec(lev, work)));
    };

    let part = Partition::from_seg(lev, part_sid);

    let mut rights = Vec::new();
    let mut lefts = Vec::new();
    let mut cuts = Vec::new();

    divide_segs(lev, work, &part, &mut rights, &mut lefts, &mut cuts, report);
    add_minisegs(lev, &part, &mut cuts, &mut rights, &mut lefts, report);

    debug_assert!(!rights.is_empty() && !lefts.is_empty(), "trivial partition");

    let (x, y, dx, dy) = partition_coords(lev, part_sid);
    let right_bounds = find_seg_bounds(lev, &rights);
    let left_bounds = find_seg_bounds(lev, &lefts);

    let right_child = build_bsp(lev, rights, cfg, report, depth + 1)?;
    let left_child = build_bsp(lev, lefts, cfg, report, depth + 1)?;

    let id = lev.nodes.len();
    lev.nodes.push(Node {
        x,
        y,
        dx,
        dy,
        right: NodeChild {
            child: right_child,
            bounds: right_bounds,
        },
        left: NodeChild {
            child: left_child,
            bounds: left_bounds,
        },
        index: -1,
    });
    Ok(BspChild::Node(id))
}

/// Height of a subtree, for the verbose build statistics.
pub fn compute_bsp_height(lev: &Level, child: BspChild) -> usize {
    match child {
        BspChild::Subsec(_) => 1,
        BspChild::Node(n) => {
            let node = &lev.nodes[n];
            1 + compute_bsp_height(lev, node.right.child)
                .max(compute_bsp_height(lev, node.left.child))
        }
    }
}

/*====================================================================*/
/*                       Tree post passes                             */
/*====================================================================*/

fn clockwise_order(lev: &mut Level, sub: SubsecId) {
    let segs = std::mem::take(&mut lev.subsecs[sub].segs);

    // centroid of all seg endpoints
    let mut mid = glam::DVec2::ZERO;
    for &sid in &segs {
        mid += lev.segs[sid].ps + lev.segs[sid].pe;
    }
    mid /= (segs.len() * 2) as f64;

    let angle_of = |lev: &Level, sid: SegId| {
        let m = (lev.segs[sid].ps + lev.segs[sid].pe) * 0.5;
        compute_angle(m.x - mid.x, m.y - mid.y)
    };

    let mut sorted = segs;
    sorted.sort_by(|&a, &b| {
        angle_of(lev, b)
            .partial_cmp(&angle_of(lev, a))
            .expect("finite angles")
    });

    // engines take the subsector's sector from the first seg: prefer a
    // real seg, and not one of a self-referencing line
    let score = |lev: &Level, sid: SegId| match lev.segs[sid].linedef {
        None => 0,
        Some(ld) if lev.lines[ld].self_ref => 2,
        Some(_) => 3,
    };
    let mut first = 0;
    let mut best_score = -1;
    for (i, &sid) in sorted.iter().enumerate() {
        let s = score(lev, sid);
        if s > best_score {
            best_score = s;
            first = i;
        }
    }
    sorted.rotate_left(first);

    lev.subsecs[sub].segs = sorted;
}

/// Order every subsector's segs clockwise around its centroid and assign
/// the global output indices.
pub fn clockwise_bsp_tree(lev: &mut Level) {
    let mut cur_index = 0;
    for sub in 0..lev.subsecs.len() {
        clockwise_order(lev, sub);
        for i in 0..lev.subsecs[sub].segs.len() {
            let sid = lev.subsecs[sub].segs[i];
            lev.segs[sid].index = cur_index;
            cur_index += 1;
        }
    }
}

/// Strip minisegs out of every subsector (they are not part of the
/// classic or XNOD formats) and renumber the survivors.
pub fn normalise_bsp_tree(lev: &mut Level) {
    let mut cur_index = 0;
    for sub in 0..lev.subsecs.len() {
        let segs = std::mem::take(&mut lev.subsecs[sub].segs);
        let mut kept = Vec::with_capacity(segs.len());

        for sid in segs {
            if lev.segs[sid].linedef.is_none() {
                lev.segs[sid].index = SEG_GARBAGE;
            } else {
                lev.segs[sid].index = cur_index;
                cur_index += 1;
                kept.push(sid);
            }
        }
        lev.subsecs[sub].segs = kept;
    }
}

/// Reduce vertex precision for classic 16-bit output.  Segs that become
/// degenerate are discarded; a subsector losing everything is written
/// with a zero seg count.
pub fn round_off_bsp_tree(lev: &mut Level, report: &mut Report) {
    for v in lev.verts.iter_mut() {
        if v.is_new {
            v.x = v.x.round();
            v.y = v.y.round();
        }
    }

    let mut cur_index = 0;
    for sub in 0..lev.subsecs.len() {
        let segs = std::mem::take(&mut lev.subsecs[sub].segs);
        let mut kept = Vec::with_capacity(segs.len());

        for sid in segs {
            let s = &lev.segs[sid];
            let degenerate = lev.verts[s.start].x.round() == lev.verts[s.end].x.round()
                && lev.verts[s.start].y.round() == lev.verts[s.end].y.round();

            if degenerate {
                lev.segs[sid].index = SEG_GARBAGE;
            } else {
                lev.recompute_seg(sid);
                lev.segs[sid].index = cur_index;
                cur_index += 1;
                kept.push(sid);
            }
        }

        if kept.is_empty() {
            report.warn(format_args!(
                "{}: subsector #{} lost all segs to round-off",
                lev.name, sub
            ));
        }
        lev.subsecs[sub].segs = kept;
    }
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::create_segs;
    use crate::geom::point_on_line_side;
    use crate::map::load::load_level;
    use crate::testutil::*;
    use crate::wad::Wad;

    fn build(wad: &Wad) -> (Level, BspChild, Report) {
        let mut report = Report::default();
        let mut lev = load_level(wad, 0, &mut report).unwrap();
        let list = create_segs(&mut lev, &mut report);
        let cfg = BuildConfig::default();
        let root = build_bsp(&mut lev, list, &cfg, &mut report, 0).unwrap();
        clockwise_bsp_tree(&mut lev);
        (lev, root, report)
    }

    #[test]
    fn square_room_is_one_convex_leaf() {
        let (_tmp, wad) = square_map();
        let (lev, root, _) = build(&wad);

        assert!(matches!(root, BspChild::Subsec(0)));
        assert_eq!(lev.nodes.len(), 0);
        assert_eq!(lev.subsecs.len(), 1);
        assert_eq!(lev.subsecs[0].segs.len(), 4);
        assert_eq!(lev.num_new_vert, 0);

        // indices are contiguous from zero
        let mut idx: Vec<i32> = lev.subsecs[0].segs.iter().map(|&s| lev.segs[s].index).collect();
        idx.sort();
        assert_eq!(idx, vec![0, 1, 2, 3]);
    }

    #[test]
    fn two_rooms_split_on_the_door() {
        let (_tmp, wad) = two_room_map();
        let (lev, root, _) = build(&wad);

        let BspChild::Node(n) = root else {
            panic!("expected a root node");
        };
        assert_eq!(lev.nodes.len(), 1);
        assert_eq!(lev.subsecs.len(), 2);
        assert_eq!(lev.segs.len(), 8);

        // partition lies on x = 128
        let node = &lev.nodes[n];
        assert_eq!(node.x, 128.0);
        assert_eq!(node.dx, 0.0);

        // each side has the four segs of its room
        for ss in &lev.subsecs {
            assert_eq!(ss.segs.len(), 4);
        }

        // child bounding boxes contain their segs
        for (nc, _) in [(&node.right, 0), (&node.left, 1)] {
            if let BspChild::Subsec(s) = nc.child {
                for &sid in &lev.subsecs[s].segs {
                    assert!(nc.bounds.contains(lev.segs[sid].ps));
                    assert!(nc.bounds.contains(lev.segs[sid].pe));
                }
            }
        }
    }

    #[test]
    fn subsectors_are_convex_and_clockwise() {
        let (_tmp, wad) = two_room_map();
        let (lev, _, _) = build(&wad);

        for ss in &lev.subsecs {
            for &a in &ss.segs {
                for &b in &ss.segs {
                    let mid = (lev.segs[b].ps + lev.segs[b].pe) * 0.5;
                    let side =
                        point_on_line_side(lev.segs[a].ps, lev.segs[a].pd, mid);
                    assert!(side >= 0, "seg midpoint on the left of a sibling");
                }
            }
        }
    }

    #[test]
    fn partner_symmetry_after_build() {
        let (_tmp, wad) = two_room_map();
        let (lev, _, _) = build(&wad);

        for sid in 0..lev.segs.len() {
            if let Some(p) = lev.segs[sid].partner {
                assert_eq!(lev.segs[p].partner, Some(sid));
            }
        }
    }

    #[test]
    fn every_seg_lands_in_exactly_one_subsector() {
        let (_tmp, wad) = two_room_map();
        let (lev, _, _) = build(&wad);

        let mut seen = vec![0u32; lev.segs.len()];
        for ss in &lev.subsecs {
            for &sid in &ss.segs {
                seen[sid] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn l_shape_needs_a_miniseg() {
        // L-shaped room: convex decomposition must close the cut with
        // a miniseg pair
        let verts = vertices_lump(&[
            (0, 256),
            (128, 256),
            (128, 128),
            (256, 128),
            (256, 0),
            (0, 0),
        ]);
        let lines = linedefs_lump(&[
            Line::solid(0, 1, 0),
            Line::solid(1, 2, 1),
            Line::solid(2, 3, 2),
            Line::solid(3, 4, 3),
            Line::solid(4, 5, 4),
            Line::solid(5, 0, 5),
        ]);
        let sides = sidedefs_lump(&[0; 6]);
        let (_tmp, wad) = map_wad("MAP01", things_lump(&[]), lines, sides, verts, sectors_lump(1));
        let (lev, root, _) = build(&wad);

        assert!(matches!(root, BspChild::Node(_)));
        assert!(lev.subsecs.len() >= 2);

        let minisegs: Vec<SegId> = (0..lev.segs.len())
            .filter(|&s| lev.segs[s].linedef.is_none())
            .collect();
        assert!(!minisegs.is_empty(), "expected minisegs across the notch");

        // minisegs come in mutual pairs
        for &m in &minisegs {
            let p = lev.segs[m].partner.expect("miniseg without partner");
            assert!(lev.segs[p].linedef.is_none());
            assert_eq!(lev.segs[p].partner, Some(m));
        }
    }

    #[test]
    fn self_ref_line_is_never_a_partition() {
        // a square room with an interior self-referencing line
        let verts = vertices_lump(&[
            (0, 128),
            (128, 128),
            (128, 0),
            (0, 0),
            (32, 32),
            (96, 96),
        ]);
        let lines = linedefs_lump(&[
            Line::solid(0, 1, 0),
            Line::solid(1, 2, 1),
            Line::solid(2, 3, 2),
            Line::solid(3, 0, 3),
            Line::pass(4, 5, 4, 5),
        ]);
        let sides = sidedefs_lump(&[0, 0, 0, 0, 0, 0]);
        let (_tmp, wad) = map_wad("MAP01", things_lump(&[]), lines, sides, verts, sectors_lump(1));

        let (lev, root, _) = build(&wad);

        // the outer walls cannot split the room either, so the whole
        // map stays one leaf containing the self-ref segs
        assert!(matches!(root, BspChild::Subsec(_)));
        assert_eq!(lev.subsecs.len(), 1);
        assert_eq!(lev.subsecs[0].segs.len(), 6);

        // the first seg must not belong to the self-referencing line
        let first = lev.subsecs[0].segs[0];
        let ld = lev.segs[first].linedef.unwrap();
        assert!(!lev.lines[ld].self_ref);
    }

    #[test]
    fn normalise_discards_minisegs() {
        let verts = vertices_lump(&[
            (0, 256),
            (128, 256),
            (128, 128),
            (256, 128),
            (256, 0),
            (0, 0),
        ]);
        let lines = linedefs_lump(&[
            Line::solid(0, 1, 0),
            Line::solid(1, 2, 1),
            Line::solid(2, 3, 2),
            Line::solid(3, 4, 3),
            Line::solid(4, 5, 4),
            Line::solid(5, 0, 5),
        ]);
        let sides = sidedefs_lump(&[0; 6]);
        let (_tmp, wad) = map_wad("MAP01", things_lump(&[]), lines, sides, verts, sectors_lump(1));
        let (mut lev, _, _) = build(&wad);

        normalise_bsp_tree(&mut lev);

        let mut real = 0;
        for ss in &lev.subsecs {
            for &sid in &ss.segs {
                assert!(lev.segs[sid].linedef.is_some());
                real += 1;
            }
        }
        // discarded minisegs carry the garbage sentinel
        for seg in &lev.segs {
            if seg.linedef.is_none() {
                assert_eq!(seg.index, SEG_GARBAGE);
            } else {
                assert!(seg.index >= 0 && seg.index < real);
            }
        }
    }

    #[test]
    fn deterministic_tree() {
        let (_tmp, wad) = two_room_map();
        let (lev_a, _, _) = build(&wad);
        let (lev_b, _, _) = build(&wad);

        assert_eq!(lev_a.segs.len(), lev_b.segs.len());
        assert_eq!(lev_a.subsecs.len(), lev_b.subsecs.len());
        for (a, b) in lev_a.segs.iter().zip(&lev_b.segs) {
            assert_eq!(a.start, b.start);
            assert_eq!(a.end, b.end);
            assert_eq!(a.index, b.index);
        }
    }
}
