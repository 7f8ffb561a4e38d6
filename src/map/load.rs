//! Binary map-lump decoding (classic Doom and Hexen) and the shared
//! post-load passes: vertex pruning, overlap detection, walltips and
//! polyobject sector marking.
//!
//! All record sizes are fixed and little-endian:
//!
//! | lump | classic | Hexen |
//! |---|---|---|
//! | VERTEXES | 4 | 4 |
//! | LINEDEFS | 14 | 16 |
//! | SIDEDEFS | 30 | 30 |
//! | SECTORS  | 26 | 26 |
//! | THINGS   | 10 | 20 |

use byteorder::{LittleEndian as LE, ReadBytesExt};
use std::io::Cursor;

use crate::build::{BuildError, Report};
use crate::geom::{DIST_EPSILON, line_touches_box};
use crate::map::{Level, LinedefFlags, Linedef, SectorId, SidedefId, Thing, VertexId};
use crate::wad::{MapFormat, Wad};

const VERTEX_SIZE: usize = 4;
const LINEDEF_SIZE: usize = 14;
const HEXEN_LINEDEF_SIZE: usize = 16;
const SIDEDEF_SIZE: usize = 30;
const SECTOR_SIZE: usize = 26;
const THING_SIZE: usize = 10;
const HEXEN_THING_SIZE: usize = 20;

// Hexen linedef specials marking polyobject geometry
const HEXTYPE_POLY_START: u16 = 1;
const HEXTYPE_POLY_EXPLICIT: u16 = 5;

// polyobject spawn-spot thing types
const PO_SPAWN_TYPE: u16 = 3001;
const PO_SPAWNCRUSH_TYPE: u16 = 3002;
const ZDOOM_PO_SPAWN_TYPE: u16 = 9301;
const ZDOOM_PO_SPAWNCRUSH_TYPE: u16 = 9302;

/// Half-size of the box scanned around a polyobject spawn point.
const POLY_BOX_SZ: i32 = 10;

/*====================================================================*/
/*                          Public API                                */
/*====================================================================*/

/// Decode map `lev_idx` of `wad` into a fresh [`Level`] and run the
/// post-load passes.
pub fn load_level(wad: &Wad, lev_idx: usize, report: &mut Report) -> Result<Level, BuildError> {
    let format = wad.level_format(lev_idx);
    let mut lev = Level::new(wad.level_name(lev_idx), format);

    match format {
        MapFormat::Udmf => {
            super::udmf::parse_textmap(wad, lev_idx, &mut lev)?;
        }
        _ => {
            get_vertices(wad, lev_idx, &mut lev)?;
            get_sectors(wad, lev_idx, &mut lev)?;
            get_sidedefs(wad, lev_idx, &mut lev)?;

            if format == MapFormat::Hexen {
                get_linedefs_hexen(wad, lev_idx, &mut lev)?;
                get_things_hexen(wad, lev_idx, &mut lev)?;
            } else {
                get_linedefs(wad, lev_idx, &mut lev)?;
                get_things(wad, lev_idx, &mut lev)?;
            }

            // prune unused vertices at the end of the lump, otherwise
            // leftovers from previous seg splits keep accumulating
            prune_vertices_at_end(&mut lev);
        }
    }
    lev.num_old_vert = lev.verts.len();

    log::debug!(
        "{}: loaded {} vertices, {} sectors, {} sides, {} lines, {} things",
        lev.name,
        lev.verts.len(),
        lev.sectors.len(),
        lev.sides.len(),
        lev.lines.len(),
        lev.things.len()
    );

    detect_overlapping_vertices(&mut lev, report);
    detect_overlapping_lines(&mut lev, report);

    calculate_wall_tips(&mut lev);

    match format {
        MapFormat::Hexen => detect_polyobj_sectors(&mut lev, false, report),
        MapFormat::Udmf => detect_polyobj_sectors(&mut lev, true, report),
        MapFormat::Doom => {}
    }

    Ok(lev)
}

/*====================================================================*/
/*                          Lump decoding                             */
/*====================================================================*/

fn lump_bytes<'a>(wad: &'a Wad, lev_idx: usize, name: &str) -> Option<&'a [u8]> {
    wad.level_lookup_lump(lev_idx, name)
        .map(|i| wad.lump(i).data.as_slice())
}

fn record_count(
    lev: &Level,
    name: &'static str,
    len: usize,
    elem: usize,
) -> Result<usize, BuildError> {
    if len % elem != 0 {
        return Err(BuildError::BadData(format!(
            "{}: truncated {} lump ({} bytes, element {})",
            lev.name, name, len, elem
        )));
    }
    Ok(len / elem)
}

fn lookup_vertex(lev: &Level, num: u16) -> Result<VertexId, BuildError> {
    if num as usize >= lev.verts.len() {
        return Err(BuildError::BadData(format!(
            "{}: illegal vertex number #{}",
            lev.name, num
        )));
    }
    Ok(num as usize)
}

fn lookup_sector(lev: &Level, num: u16) -> Result<Option<SectorId>, BuildError> {
    if num == 0xFFFF {
        return Ok(None);
    }
    if num as usize >= lev.sectors.len() {
        return Err(BuildError::BadData(format!(
            "{}: illegal sector number #{}",
            lev.name, num
        )));
    }
    Ok(Some(num as usize))
}

/// Illegal sidedef numbers are silently treated as "no side".
fn lookup_sidedef(lev: &Level, num: u16) -> Option<SidedefId> {
    if num == 0xFFFF || num as usize >= lev.sides.len() {
        return None;
    }
    Some(num as usize)
}

fn get_vertices(wad: &Wad, lev_idx: usize, lev: &mut Level) -> Result<(), BuildError> {
    let Some(buf) = lump_bytes(wad, lev_idx, "VERTEXES") else {
        return Ok(());
    };
    let count = record_count(lev, "VERTEXES", buf.len(), VERTEX_SIZE)?;

    let mut cur = Cursor::new(buf);
    for _ in 0..count {
        let x = cur.read_i16::<LE>()? as f64;
        let y = cur.read_i16::<LE>()? as f64;
        lev.new_vertex(x, y);
    }
    Ok(())
}

fn get_sectors(wad: &Wad, lev_idx: usize, lev: &mut Level) -> Result<(), BuildError> {
    let Some(buf) = lump_bytes(wad, lev_idx, "SECTORS") else {
        return Ok(());
    };
    let count = record_count(lev, "SECTORS", buf.len(), SECTOR_SIZE)?;

    // only sector identity matters to the builder
    for _ in 0..count {
        lev.new_sector();
    }
    Ok(())
}

fn get_sidedefs(wad: &Wad, lev_idx: usize, lev: &mut Level) -> Result<(), BuildError> {
    let Some(buf) = lump_bytes(wad, lev_idx, "SIDEDEFS") else {
        return Ok(());
    };
    let count = record_count(lev, "SIDEDEFS", buf.len(), SIDEDEF_SIZE)?;

    let mut cur = Cursor::new(buf);
    for _ in 0..count {
        cur.set_position(cur.position() + 28); // offsets + texture names
        let sector = lookup_sector(lev, cur.read_u16::<LE>()?)?;
        lev.new_sidedef(sector);
    }
    Ok(())
}

pub(crate) fn finish_linedef(lev: &mut Level, mut line: Linedef) {
    lev.verts[line.start].is_used = true;
    lev.verts[line.end].is_used = true;

    let sv = &lev.verts[line.start];
    let ev = &lev.verts[line.end];
    line.zero_len =
        (sv.x - ev.x).abs() < DIST_EPSILON && (sv.y - ev.y).abs() < DIST_EPSILON;

    if line.right.is_some() || line.left.is_some() {
        lev.num_real_lines += 1;
    }

    line.self_ref = match (line.left, line.right) {
        (Some(l), Some(r)) => {
            lev.sides[l].sector.is_some() && lev.sides[l].sector == lev.sides[r].sector
        }
        _ => false,
    };

    line.index = lev.lines.len();
    lev.lines.push(line);
}

fn get_linedefs(wad: &Wad, lev_idx: usize, lev: &mut Level) -> Result<(), BuildError> {
    let Some(buf) = lump_bytes(wad, lev_idx, "LINEDEFS") else {
        return Ok(());
    };
    let count = record_count(lev, "LINEDEFS", buf.len(), LINEDEF_SIZE)?;

    let mut cur = Cursor::new(buf);
    for _ in 0..count {
        let start = lookup_vertex(lev, cur.read_u16::<LE>()?)?;
        let end = lookup_vertex(lev, cur.read_u16::<LE>()?)?;
        let flags = LinedefFlags::from_bits_truncate(cur.read_u16::<LE>()?);
        let line_type = cur.read_u16::<LE>()?;
        let tag = cur.read_i16::<LE>()?;
        let right = lookup_sidedef(lev, cur.read_u16::<LE>()?);
        let left = lookup_sidedef(lev, cur.read_u16::<LE>()?);

        finish_linedef(
            lev,
            Linedef {
                start,
                end,
                right,
                left,
                line_type,
                tag,
                two_sided: flags.contains(LinedefFlags::TWO_SIDED),
                is_precious: (900..1000).contains(&tag),
                self_ref: false,
                zero_len: false,
                overlap: false,
                index: 0,
            },
        );
    }
    Ok(())
}

fn get_linedefs_hexen(wad: &Wad, lev_idx: usize, lev: &mut Level) -> Result<(), BuildError> {
    let Some(buf) = lump_bytes(wad, lev_idx, "LINEDEFS") else {
        return Ok(());
    };
    let count = record_count(lev, "LINEDEFS", buf.len(), HEXEN_LINEDEF_SIZE)?;

    let mut cur = Cursor::new(buf);
    for _ in 0..count {
        let start = lookup_vertex(lev, cur.read_u16::<LE>()?)?;
        let end = lookup_vertex(lev, cur.read_u16::<LE>()?)?;
        let flags = LinedefFlags::from_bits_truncate(cur.read_u16::<LE>()?);
        let line_type = cur.read_u8()? as u16;
        cur.set_position(cur.position() + 5); // special args
        let right = lookup_sidedef(lev, cur.read_u16::<LE>()?);
        let left = lookup_sidedef(lev, cur.read_u16::<LE>()?);

        // Hexen linedefs carry no tag, so the precious-tag rule cannot
        // apply; the two-sided flag still matters for the reject builder
        finish_linedef(
            lev,
            Linedef {
                start,
                end,
                right,
                left,
                line_type,
                tag: 0,
                two_sided: flags.contains(LinedefFlags::TWO_SIDED),
                is_precious: false,
                self_ref: false,
                zero_len: false,
                overlap: false,
                index: 0,
            },
        );
    }
    Ok(())
}

fn get_things(wad: &Wad, lev_idx: usize, lev: &mut Level) -> Result<(), BuildError> {
    let Some(buf) = lump_bytes(wad, lev_idx, "THINGS") else {
        return Ok(());
    };
    let count = record_count(lev, "THINGS", buf.len(), THING_SIZE)?;

    let mut cur = Cursor::new(buf);
    for i in 0..count {
        let x = cur.read_i16::<LE>()? as f64;
        let y = cur.read_i16::<LE>()? as f64;
        cur.set_position(cur.position() + 2); // angle
        let kind = cur.read_u16::<LE>()?;
        cur.set_position(cur.position() + 2); // options

        lev.things.push(Thing { x, y, kind, index: i });
    }
    Ok(())
}

fn get_things_hexen(wad: &Wad, lev_idx: usize, lev: &mut Level) -> Result<(), BuildError> {
    let Some(buf) = lump_bytes(wad, lev_idx, "THINGS") else {
        return Ok(());
    };
    let count = record_count(lev, "THINGS", buf.len(), HEXEN_THING_SIZE)?;

    let mut cur = Cursor::new(buf);
    for i in 0..count {
        cur.set_position(cur.position() + 2); // tid
        let x = cur.read_i16::<LE>()? as f64;
        let y = cur.read_i16::<LE>()? as f64;
        cur.set_position(cur.position() + 4); // height + angle
        let kind = cur.read_u16::<LE>()?;
        cur.set_position(cur.position() + 8); // options + special + args

        lev.things.push(Thing { x, y, kind, index: i });
    }
    Ok(())
}

/*====================================================================*/
/*                          Post-load passes                          */
/*====================================================================*/

fn prune_vertices_at_end(lev: &mut Level) {
    let before = lev.verts.len();

    while let Some(v) = lev.verts.last() {
        if v.is_used {
            break;
        }
        lev.verts.pop();
    }

    if lev.verts.len() < before {
        log::debug!(
            "{}: pruned {} unused vertices at end",
            lev.name,
            before - lev.verts.len()
        );
    }
}

/// Merge vertices with identical coordinates: linedefs are relinked to
/// the lowest-index copy.  The duplicates stay in the arena so the old
/// vertex lump can be written back verbatim.
pub fn detect_overlapping_vertices(lev: &mut Level, report: &mut Report) {
    let mut order: Vec<VertexId> = (0..lev.verts.len()).collect();
    order.sort_by(|&a, &b| {
        let (va, vb) = (&lev.verts[a], &lev.verts[b]);
        (va.x, va.y, a)
            .partial_cmp(&(vb.x, vb.y, b))
            .expect("vertex coords are not NaN")
    });

    let mut remap: Vec<VertexId> = (0..lev.verts.len()).collect();
    let mut merged = 0usize;

    for w in order.windows(2) {
        let (a, b) = (w[0], w[1]);
        if lev.verts[a].x == lev.verts[b].x && lev.verts[a].y == lev.verts[b].y {
            remap[b] = remap[a];
            merged += 1;
        }
    }

    if merged == 0 {
        return;
    }

    for line in lev.lines.iter_mut() {
        line.start = remap[line.start];
        line.end = remap[line.end];
    }
    report.minor(format_args!(
        "{}: merged {} overlapping vertices",
        lev.name, merged
    ));
}

/// Flag later duplicates of lines with the same endpoint pair.  Both
/// are kept; the duplicate is excluded from walltip accumulation.
pub fn detect_overlapping_lines(lev: &mut Level, report: &mut Report) {
    let key = |l: &Linedef| {
        let (a, b) = (l.start, l.end);
        if a <= b { (a, b) } else { (b, a) }
    };

    let mut order: Vec<usize> = (0..lev.lines.len()).collect();
    order.sort_by_key(|&i| key(&lev.lines[i]));

    let mut count = 0usize;
    for w in order.windows(2) {
        if key(&lev.lines[w[0]]) == key(&lev.lines[w[1]]) && !lev.lines[w[0]].zero_len {
            lev.lines[w[1].max(w[0])].overlap = true;
            count += 1;
        }
    }

    if count > 0 {
        report.minor(format_args!(
            "{}: detected {} overlapping linedefs",
            lev.name, count
        ));
    }
}

/// Accumulate the per-vertex angular wall lists used by the open/closed
/// space queries during miniseg creation.
pub fn calculate_wall_tips(lev: &mut Level) {
    for i in 0..lev.lines.len() {
        let line = &lev.lines[i];

        if line.overlap || line.zero_len {
            continue;
        }

        let (start, end) = (line.start, line.end);
        let dx = lev.verts[end].x - lev.verts[start].x;
        let dy = lev.verts[end].y - lev.verts[start].y;

        let left = line.left.and_then(|s| lev.sides[s].sector);
        let right = line.right.and_then(|s| lev.sides[s].sector);

        lev.add_wall_tip(start, dx, dy, left, right);
        lev.add_wall_tip(end, -dx, -dy, right, left);
    }
}

/*--------------------- polyobject detection -------------------------*/

fn mark_polyobj_sector(lev: &mut Level, sector: Option<SectorId>) {
    let Some(sector) = sector else { return };
    if lev.sectors[sector].has_polyobj {
        return;
    }
    lev.sectors[sector].has_polyobj = true;

    // make every line touching the sector precious so the polyobj's
    // home is not carved up by foreign partitions
    for line in lev.lines.iter_mut() {
        let on_right = line.right.is_some_and(|s| lev.sides[s].sector == Some(sector));
        let on_left = line.left.is_some_and(|s| lev.sides[s].sector == Some(sector));
        if on_right || on_left {
            line.is_precious = true;
        }
    }
}

fn mark_polyobj_point(lev: &mut Level, x: f64, y: f64, report: &mut Report) {
    // the spawn spot may sit directly on a linedef or vertex: mark every
    // sector whose lines cross a small box around it
    let bminx = (x as i32) - POLY_BOX_SZ;
    let bminy = (y as i32) - POLY_BOX_SZ;
    let bmaxx = (x as i32) + POLY_BOX_SZ;
    let bmaxy = (y as i32) + POLY_BOX_SZ;

    let mut inside = Vec::new();
    for (i, line) in lev.lines.iter().enumerate() {
        let (sv, ev) = (&lev.verts[line.start], &lev.verts[line.end]);
        if line_touches_box(
            bminx,
            bminy,
            bmaxx,
            bmaxy,
            sv.x as i32,
            sv.y as i32,
            ev.x as i32,
            ev.y as i32,
        ) {
            inside.push(i);
        }
    }
    if !inside.is_empty() {
        for i in inside {
            let right = lev.lines[i].right.and_then(|s| lev.sides[s].sector);
            let left = lev.lines[i].left.and_then(|s| lev.sides[s].sector);
            mark_polyobj_sector(lev, right);
            mark_polyobj_sector(lev, left);
        }
        return;
    }

    // otherwise cast a horizontal ray and take the facing side of the
    // nearest crossing linedef
    let mut best_dist = f64::MAX;
    let mut best: Option<usize> = None;

    for (i, line) in lev.lines.iter().enumerate() {
        let (x1, y1) = (lev.verts[line.start].x, lev.verts[line.start].y);
        let (x2, y2) = (lev.verts[line.end].x, lev.verts[line.end].y);

        if (y2 - y1).abs() < DIST_EPSILON {
            continue;
        }
        if (y > y1 && y > y2) || (y < y1 && y < y2) {
            continue;
        }

        let x_cut = x1 + (x2 - x1) * (y - y1) / (y2 - y1) - x;
        if x_cut.abs() < best_dist.abs() {
            best_dist = x_cut;
            best = Some(i);
        }
    }

    let Some(best) = best else {
        report.warn(format_args!(
            "{}: failed to find a sector containing polyobj point ({:.0},{:.0})",
            lev.name, x, y
        ));
        return;
    };

    let line = &lev.lines[best];
    let going_up = lev.verts[line.end].y > lev.verts[line.start].y;

    // a north-going line keeps its right side to the east
    let side = if (best_dist > 0.0) == going_up {
        line.left
    } else {
        line.right
    };
    let sector = side.and_then(|s| lev.sides[s].sector);
    mark_polyobj_sector(lev, sector);
}

/// Find sectors hosting polyobjects and mark them.  Hexen and ZDoom use
/// conflicting spawn-spot thing types; a level containing any ZDoom-type
/// spawn is treated as ZDoom-style throughout (UDMF always is).
pub fn detect_polyobj_sectors(lev: &mut Level, is_udmf: bool, report: &mut Report) {
    let has_polyobjs = lev
        .lines
        .iter()
        .any(|l| l.line_type == HEXTYPE_POLY_START || l.line_type == HEXTYPE_POLY_EXPLICIT);
    if !has_polyobjs {
        return;
    }

    let hexen_style = !is_udmf
        && !lev
            .things
            .iter()
            .any(|t| t.kind == ZDOOM_PO_SPAWN_TYPE || t.kind == ZDOOM_PO_SPAWNCRUSH_TYPE);

    let spawns: Vec<(f64, f64)> = lev
        .things
        .iter()
        .filter(|t| {
            if hexen_style {
                t.kind == PO_SPAWN_TYPE || t.kind == PO_SPAWNCRUSH_TYPE
            } else {
                t.kind == ZDOOM_PO_SPAWN_TYPE || t.kind == ZDOOM_PO_SPAWNCRUSH_TYPE
            }
        })
        .map(|t| (t.x, t.y))
        .collect();

    for (x, y) in spawns {
        mark_polyobj_point(lev, x, y, report);
    }
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
