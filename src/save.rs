//! Output lump encoding: classic vanilla records, the ZDoom extended
//! `XNOD` format and the `XGL3` format, plus the per-map save
//! orchestration (lump creation order, overflow checks, auto-promotion).

use byteorder::{LittleEndian as LE, WriteBytesExt};

use crate::blockmap::build_blockmap;
use crate::bsp::{normalise_bsp_tree, round_off_bsp_tree};
use crate::build::{BuildConfig, BuildError, Report};
use crate::geom::{compute_angle, round_i32};
use crate::map::{BspChild, Level, NodeId, SEG_GARBAGE, SegId};
use crate::reject::build_reject;
use crate::wad::{MapFormat, Wad};

// Extended node-format magics.  Only XNOD and XGL3 are ever written;
// the rest are recognised identifiers of the family (the Z* variants
// are their zlib-compressed counterparts, which we do not emit).
pub const XNOD_MAGIC: &[u8; 4] = b"XNOD";
pub const ZNOD_MAGIC: &[u8; 4] = b"ZNOD";
pub const XGLN_MAGIC: &[u8; 4] = b"XGLN";
pub const ZGLN_MAGIC: &[u8; 4] = b"ZGLN";
pub const XGL2_MAGIC: &[u8; 4] = b"XGL2";
pub const ZGL2_MAGIC: &[u8; 4] = b"ZGL2";
pub const XGL3_MAGIC: &[u8; 4] = b"XGL3";
pub const ZGL3_MAGIC: &[u8; 4] = b"ZGL3";
pub const DEEP_MAGIC: &[u8; 8] = b"xNd4\0\0\0\0";

/*====================================================================*/
/*                       Common helpers                               */
/*====================================================================*/

/// The output order: every live seg by ascending index, garbage dropped.
pub fn sort_segs(lev: &Level) -> Vec<SegId> {
    let mut order: Vec<SegId> = (0..lev.segs.len())
        .filter(|&s| lev.segs[s].index != SEG_GARBAGE)
        .collect();

    for &s in &order {
        assert!(lev.segs[s].index >= 0, "seg {s} never reached a subsector");
    }
    order.sort_by_key(|&s| lev.segs[s].index);
    order
}

fn vanilla_seg_angle(lev: &Level, sid: SegId) -> u16 {
    let seg = &lev.segs[sid];

    // the "true" delta, as the 16-bit output will store it
    let dx = lev.verts[seg.end].x.round() - lev.verts[seg.start].x.round();
    let dy = lev.verts[seg.end].y.round() - lev.verts[seg.start].y.round();

    let angle = compute_angle(dx, dy);
    ((angle * 65536.0 / 360.0 + 0.5).floor() as i64 & 0xFFFF) as u16
}

fn vanilla_seg_dist(lev: &Level, sid: SegId) -> u16 {
    let seg = &lev.segs[sid];
    let line = &lev.lines[seg.linedef.expect("miniseg in vanilla output")];

    // reference endpoint of the linedef on the seg's side
    let lv = if seg.side != 0 { line.end } else { line.start };
    let (lx, ly) = (lev.verts[lv].x, lev.verts[lv].y);

    let sx = lev.verts[seg.start].x.round();
    let sy = lev.verts[seg.start].y.round();

    ((sx - lx).hypot(sy - ly) + 0.5).floor() as i64 as u16
}

fn vertex_index_16bit(lev: &Level, v: usize) -> u16 {
    let vert = &lev.verts[v];
    if vert.is_new {
        vert.index as u16 | 0x8000
    } else {
        vert.index as u16
    }
}

fn vertex_index_xnod(lev: &Level, v: usize) -> u32 {
    let vert = &lev.verts[v];
    if vert.is_new {
        (lev.num_old_vert as i32 + vert.index) as u32
    } else {
        vert.index as u32
    }
}

fn mark_overflow(lev: &mut Level, report: &mut Report, what: &str) {
    report.warn(format_args!("{}: number of {} has overflowed", lev.name, what));
    lev.overflows = true;
}

/*====================================================================*/
/*                       Classic format                               */
/*====================================================================*/

fn put_vertices(lev: &mut Level, report: &mut Report) -> Vec<u8> {
    let mut out = Vec::with_capacity(lev.num_old_vert * 4);
    let mut count = 0usize;

    for v in &lev.verts {
        if v.is_new {
            continue;
        }
        out.write_i16::<LE>(round_i32(v.x) as i16).unwrap();
        out.write_i16::<LE>(round_i32(v.y) as i16).unwrap();
        count += 1;
    }

    assert_eq!(count, lev.num_old_vert, "vertex write-back miscounted");

    if count > 65534 {
        mark_overflow(lev, report, "vertices");
    }
    out
}

fn put_segs(lev: &mut Level, order: &[SegId], report: &mut Report) -> Vec<u8> {
    let mut out = Vec::with_capacity(order.len() * 12);

    for &sid in order {
        let seg = &lev.segs[sid];
        let linedef = seg.linedef.expect("miniseg in vanilla output") as u16;
        let (start, end, side) = (seg.start, seg.end, seg.side);

        out.write_u16::<LE>(vertex_index_16bit(lev, start)).unwrap();
        out.write_u16::<LE>(vertex_index_16bit(lev, end)).unwrap();
        out.write_u16::<LE>(vanilla_seg_angle(lev, sid)).unwrap();
        out.write_u16::<LE>(linedef).unwrap();
        out.write_u16::<LE>(side as u16).unwrap();
        out.write_u16::<LE>(vanilla_seg_dist(lev, sid)).unwrap();
    }

    if order.len() > 65534 {
        mark_overflow(lev, report, "segs");
    }
    out
}

fn put_subsecs(lev: &mut Level, report: &mut Report) -> Vec<u8> {
    let mut out = Vec::with_capacity(lev.subsecs.len() * 4);

    for sub in &lev.subsecs {
        // a subsector emptied by round-off keeps a zero count
        let first = sub
            .segs
            .first()
            .map(|&s| lev.segs[s].index as u16)
            .unwrap_or(0);

        out.write_u16::<LE>(sub.segs.len() as u16).unwrap();
        out.write_u16::<LE>(first).unwrap();
    }

    if lev.subsecs.len() > 32767 {
        mark_overflow(lev, report, "subsectors");
    }
    out
}

fn put_one_node(lev: &mut Level, id: NodeId, cur: &mut i32, out: &mut Vec<u8>) {
    if let BspChild::Node(r) = lev.nodes[id].right.child {
        put_one_node(lev, r, cur, out);
    }
    if let BspChild::Node(l) = lev.nodes[id].left.child {
        put_one_node(lev, l, cur, out);
    }

    lev.nodes[id].index = *cur;
    *cur += 1;

    let node = &lev.nodes[id];

    // x/y/dx/dy are integral for non-UDMF maps
    out.write_i16::<LE>(round_i32(node.x) as i16).unwrap();
    out.write_i16::<LE>(round_i32(node.y) as i16).unwrap();
    out.write_i16::<LE>(round_i32(node.dx) as i16).unwrap();
    out.write_i16::<LE>(round_i32(node.dy) as i16).unwrap();

    for nc in [&node.right, &node.left] {
        out.write_i16::<LE>(nc.bounds.maxy as i16).unwrap();
        out.write_i16::<LE>(nc.bounds.miny as i16).unwrap();
        out.write_i16::<LE>(nc.bounds.minx as i16).unwrap();
        out.write_i16::<LE>(nc.bounds.maxx as i16).unwrap();
    }

    for nc in [&node.right, &node.left] {
        let child = match nc.child {
            BspChild::Node(n) => {
                let idx = lev.nodes[n].index;
                assert!(idx >= 0, "child node written before parent traversal");
                idx as u16
            }
            BspChild::Subsec(s) => lev.subsecs[s].index as u16 | 0x8000,
        };
        out.write_u16::<LE>(child).unwrap();
    }
}

fn put_nodes(lev: &mut Level, root: Option<BspChild>, report: &mut Report) -> Vec<u8> {
    let mut out = Vec::with_capacity(lev.nodes.len() * 28);
    let mut cur = 0;

    if let Some(BspChild::Node(root_id)) = root {
        put_one_node(lev, root_id, &mut cur, &mut out);
    }

    assert_eq!(cur as usize, lev.nodes.len(), "node emission miscounted");

    if cur > 32767 {
        mark_overflow(lev, report, "nodes");
    }
    out
}

/*====================================================================*/
/*                       ZDoom extended formats                       */
/*====================================================================*/

fn put_z_vertices(lev: &Level, out: &mut Vec<u8>) {
    out.write_u32::<LE>(lev.num_old_vert as u32).unwrap();
    out.write_u32::<LE>(lev.num_new_vert as u32).unwrap();

    let mut count = 0usize;
    for v in &lev.verts {
        if !v.is_new {
            continue;
        }
        out.write_i32::<LE>(round_i32(v.x * 65536.0)).unwrap();
        out.write_i32::<LE>(round_i32(v.y * 65536.0)).unwrap();
        count += 1;
    }
    assert_eq!(count, lev.num_new_vert, "new-vertex emission miscounted");
}

fn put_z_subsecs(lev: &Level, order: &[SegId], out: &mut Vec<u8>) {
    out.write_u32::<LE>(lev.subsecs.len() as u32).unwrap();

    // segs are implicit: they must be packed contiguously in subsector
    // order, which the sort pass guarantees
    let mut cur_seg = 0i32;
    for sub in &lev.subsecs {
        out.write_u32::<LE>(sub.segs.len() as u32).unwrap();

        for &sid in &sub.segs {
            assert_eq!(
                lev.segs[sid].index, cur_seg,
                "seg index out of step in subsector {}",
                sub.index
            );
            cur_seg += 1;
        }
    }
    assert_eq!(cur_seg as usize, order.len(), "subsector seg total mismatch");
}

fn put_z_segs(lev: &Level, order: &[SegId], out: &mut Vec<u8>) {
    out.write_u32::<LE>(order.len() as u32).unwrap();

    for (i, &sid) in order.iter().enumerate() {
        let seg = &lev.segs[sid];
        assert_eq!(seg.index as usize, i, "seg order out of step");

        out.write_u32::<LE>(vertex_index_xnod(lev, seg.start)).unwrap();
        out.write_u32::<LE>(vertex_index_xnod(lev, seg.end)).unwrap();
        out.write_u16::<LE>(seg.linedef.expect("miniseg in XNOD segs") as u16)
            .unwrap();
        out.write_u8(seg.side).unwrap();
    }
}

fn put_xgl3_segs(lev: &Level, order: &[SegId], out: &mut Vec<u8>) {
    out.write_u32::<LE>(order.len() as u32).unwrap();

    for (i, &sid) in order.iter().enumerate() {
        let seg = &lev.segs[sid];
        assert_eq!(seg.index as usize, i, "seg order out of step");

        let partner = match seg.partner {
            Some(p) => lev.segs[p].index as u32,
            None => 0xFFFF_FFFF,
        };
        let linedef = match seg.linedef {
            Some(ld) => ld as u32,
            None => 0xFFFF_FFFF,
        };

        out.write_u32::<LE>(vertex_index_xnod(lev, seg.start)).unwrap();
        out.write_u32::<LE>(partner).unwrap();
        out.write_u32::<LE>(linedef).unwrap();
        out.write_u8(seg.side).unwrap();
    }
}

fn put_one_z_node(lev: &mut Level, id: NodeId, xgl3: bool, cur: &mut i32, out: &mut Vec<u8>) {
    if let BspChild::Node(r) = lev.nodes[id].right.child {
        put_one_z_node(lev, r, xgl3, cur, out);
    }
    if let BspChild::Node(l) = lev.nodes[id].left.child {
        put_one_z_node(lev, l, xgl3, cur, out);
    }

    lev.nodes[id].index = *cur;
    *cur += 1;

    let node = &lev.nodes[id];

    if xgl3 {
        // 16.16 fixed-point partition line
        out.write_i32::<LE>(round_i32(node.x * 65536.0)).unwrap();
        out.write_i32::<LE>(round_i32(node.y * 65536.0)).unwrap();
        out.write_i32::<LE>(round_i32(node.dx * 65536.0)).unwrap();
        out.write_i32::<LE>(round_i32(node.dy * 65536.0)).unwrap();
    } else {
        out.write_i16::<LE>(round_i32(node.x) as i16).unwrap();
        out.write_i16::<LE>(round_i32(node.y) as i16).unwrap();
        out.write_i16::<LE>(round_i32(node.dx) as i16).unwrap();
        out.write_i16::<LE>(round_i32(node.dy) as i16).unwrap();
    }

    for nc in [&node.right, &node.left] {
        out.write_i16::<LE>(nc.bounds.maxy as i16).unwrap();
        out.write_i16::<LE>(nc.bounds.miny as i16).unwrap();
        out.write_i16::<LE>(nc.bounds.minx as i16).unwrap();
        out.write_i16::<LE>(nc.bounds.maxx as i16).unwrap();
    }

    for nc in [&node.right, &node.left] {
        let child = match nc.child {
            BspChild::Node(n) => {
                let idx = lev.nodes[n].index;
                assert!(idx >= 0, "child node written before parent traversal");
                idx as u32
            }
            BspChild::Subsec(s) => lev.subsecs[s].index as u32 | 0x8000_0000,
        };
        out.write_u32::<LE>(child).unwrap();
    }
}

fn put_z_nodes(lev: &mut Level, root: Option<BspChild>, xgl3: bool, out: &mut Vec<u8>) {
    out.write_u32::<LE>(lev.nodes.len() as u32).unwrap();

    let mut cur = 0;
    if let Some(BspChild::Node(root_id)) = root {
        put_one_z_node(lev, root_id, xgl3, &mut cur, out);
    }
    assert_eq!(cur as usize, lev.nodes.len(), "z-node emission miscounted");
}

fn save_zd_format(lev: &mut Level, root: Option<BspChild>) -> Vec<u8> {
    let order = sort_segs(lev);

    let mut out = Vec::new();
    out.extend_from_slice(XNOD_MAGIC);
    put_z_vertices(lev, &mut out);
    put_z_subsecs(lev, &order, &mut out);
    put_z_segs(lev, &order, &mut out);
    put_z_nodes(lev, root, false, &mut out);
    out
}

fn save_xgl3_format(lev: &mut Level, root: Option<BspChild>) -> Vec<u8> {
    let order = sort_segs(lev);

    let mut out = Vec::new();
    out.extend_from_slice(XGL3_MAGIC);
    put_z_vertices(lev, &mut out);
    put_z_subsecs(lev, &order, &mut out);
    put_xgl3_segs(lev, &order, &mut out);
    put_z_nodes(lev, root, true, &mut out);
    out
}

/*====================================================================*/
/*                       Limits / auto-promotion                      */
/*====================================================================*/

/// Overflow checks on the input counts, plus promotion to XNOD when the
/// built tree cannot fit the classic 16-bit records.
pub fn check_limits(lev: &mut Level, cfg: &BuildConfig, report: &mut Report) {
    // 0xFFFF is reserved ("no side" for sidedefs, minisegs for
    // linedefs); sectors get the same caution
    if lev.sectors.len() > 65534 {
        mark_overflow(lev, report, "sectors");
    }
    if lev.sides.len() > 65534 {
        mark_overflow(lev, report, "sidedefs");
    }
    if lev.lines.len() > 65534 {
        mark_overflow(lev, report, "linedefs");
    }

    if !(cfg.force_xnod || cfg.ssect_xgl3)
        && (lev.num_old_vert > 32767
            || lev.num_new_vert > 32767
            || lev.segs.len() > 32767
            || lev.nodes.len() > 32767)
    {
        report.warn(format_args!(
            "{}: forcing XNOD format nodes due to overflows",
            lev.name
        ));
        lev.force_xnod = true;
    }
}

/*====================================================================*/
/*                       Lump plumbing                                */
/*====================================================================*/

/// Replace an existing level lump's body, or insert a new lump at the
/// end of the level (before ENDMAP for UDMF maps).
fn create_level_lump(wad: &mut Wad, lev_idx: usize, name: &str, data: Vec<u8>) {
    match wad.level_lookup_lump(lev_idx, name) {
        Some(idx) => wad.set_lump_data(idx, data),
        None => {
            let mut last = wad.level_last_lump(lev_idx);
            if wad.level_format(lev_idx) != MapFormat::Udmf {
                last += 1;
            }
            wad.insert_point(Some(last));
            let idx = wad.add_lump(name);
            wad.set_lump_data(idx, data);
        }
    }
}

/// Make sure `name` exists in the level, inserting an empty lump after
/// `after` (or at the level end, with a warning, when even that is
/// missing).
fn add_missing_lump(
    wad: &mut Wad,
    lev_idx: usize,
    lev: &Level,
    name: &str,
    after: &str,
    report: &mut Report,
) {
    if wad.level_lookup_lump(lev_idx, name).is_some() {
        return;
    }

    let exist = match wad.level_lookup_lump(lev_idx, after) {
        Some(i) => i,
        None => {
            report.warn(format_args!(
                "{}: missing {} lump, level structure is broken",
                lev.name, after
            ));
            wad.level_last_lump(lev_idx)
        }
    };

    wad.insert_point(Some(exist + 1));
    wad.add_lump(name);
}

fn put_blockmap(
    lev: &Level,
    wad: &mut Wad,
    lev_idx: usize,
    cfg: &BuildConfig,
    report: &mut Report,
) {
    let data = if !cfg.do_blockmap || lev.lines.is_empty() {
        Vec::new()
    } else {
        build_blockmap(lev, report)
    };
    create_level_lump(wad, lev_idx, "BLOCKMAP", data);
}

fn put_reject(lev: &Level, wad: &mut Wad, lev_idx: usize, cfg: &BuildConfig) {
    let data = if !cfg.do_reject || lev.sectors.is_empty() {
        Vec::new()
    } else {
        build_reject(lev)
    };
    create_level_lump(wad, lev_idx, "REJECT", data);
}

/*====================================================================*/
/*                       Whole-level save                             */
/*====================================================================*/

/// Save a classic or Hexen map: rewrite the five derived lumps in the
/// format decided by (user flags, overflow state).
pub fn save_level(
    lev: &mut Level,
    wad: &mut Wad,
    lev_idx: usize,
    root: Option<BspChild>,
    cfg: &BuildConfig,
    report: &mut Report,
) -> Result<(), BuildError> {
    wad.begin_write();

    // ensure all necessary level lumps are present
    add_missing_lump(wad, lev_idx, lev, "SEGS", "VERTEXES", report);
    add_missing_lump(wad, lev_idx, lev, "SSECTORS", "SEGS", report);
    add_missing_lump(wad, lev_idx, lev, "NODES", "SSECTORS", report);
    add_missing_lump(wad, lev_idx, lev, "REJECT", "SECTORS", report);
    add_missing_lump(wad, lev_idx, lev, "BLOCKMAP", "REJECT", report);

    lev.force_xnod = cfg.force_xnod;
    check_limits(lev, cfg, report);

    if (lev.force_xnod || cfg.ssect_xgl3) && lev.num_real_lines > 0 {
        // extended formats leave the classic SEGS lump empty
        create_level_lump(wad, lev_idx, "SEGS", Vec::new());

        if cfg.ssect_xgl3 {
            let data = save_xgl3_format(lev, root);
            create_level_lump(wad, lev_idx, "SSECTORS", data);
        } else {
            create_level_lump(wad, lev_idx, "SSECTORS", Vec::new());
        }

        if lev.force_xnod {
            // minisegs have no place in XNOD subsectors
            normalise_bsp_tree(lev);
            let data = save_zd_format(lev, root);
            create_level_lump(wad, lev_idx, "NODES", data);
        } else {
            create_level_lump(wad, lev_idx, "NODES", Vec::new());
        }
    } else {
        normalise_bsp_tree(lev);

        // classic nodes use 16-bit coords; segs degenerated by the
        // precision loss are dropped here
        round_off_bsp_tree(lev, report);

        let order = sort_segs(lev);

        let data = put_vertices(lev, report);
        create_level_lump(wad, lev_idx, "VERTEXES", data);

        let data = put_segs(lev, &order, report);
        create_level_lump(wad, lev_idx, "SEGS", data);
        let data = put_subsecs(lev, report);
        create_level_lump(wad, lev_idx, "SSECTORS", data);
        let data = put_nodes(lev, root, report);
        create_level_lump(wad, lev_idx, "NODES", data);
    }

    put_blockmap(lev, wad, lev_idx, cfg, report);
    put_reject(lev, wad, lev_idx, cfg);

    wad.end_write()?;

    if lev.overflows {
        return Err(BuildError::LumpOverflow);
    }
    Ok(())
}

/// Save a UDMF map: the whole tree goes into a fresh ZNODES lump in
/// XGL3 form, inserted before ENDMAP.
pub fn save_udmf(
    lev: &mut Level,
    wad: &mut Wad,
    lev_idx: usize,
    root: Option<BspChild>,
    cfg: &BuildConfig,
    report: &mut Report,
) -> Result<(), BuildError> {
    wad.begin_write();

    wad.remove_znodes(lev_idx);
    create_level_lump(wad, lev_idx, "ZNODES", Vec::new());

    add_missing_lump(wad, lev_idx, lev, "REJECT", "ZNODES", report);
    add_missing_lump(wad, lev_idx, lev, "BLOCKMAP", "REJECT", report);

    if lev.num_real_lines > 0 {
        let data = save_xgl3_format(lev, root);
        create_level_lump(wad, lev_idx, "ZNODES", data);
    }

    put_blockmap(lev, wad, lev_idx, cfg, report);
    put_reject(lev, wad, lev_idx, cfg);

    wad.end_write()?;
    Ok(())
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
