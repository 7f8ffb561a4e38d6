//! BLOCKMAP construction: the 128×128 bucket grid engines use for
//! collision queries.
//!
//! Offsets inside the lump are 16-bit *words* from the lump start.  The
//! layout is: 8-byte header, `w*h` offsets, one shared null cell that
//! every empty block points at, then each distinct cell list framed by
//! `0x0000 … 0xFFFF`.  Identical lists are detected by sorting on
//! (count, rolling-XOR checksum, contents) and stored once.

use byteorder::{LittleEndian as LE, WriteBytesExt};
use smallvec::SmallVec;

use crate::build::Report;
use crate::geom::{Bbox, line_touches_box};
use crate::map::Level;

/// Grid cell edge length in map units.
const BLOCK_SIZE: i32 = 128;

/// Sentinel marking a cell that shares another cell's list.
const DUMMY_DUP: usize = usize::MAX;

/// Line lists are tiny for nearly every cell.
type Cell = SmallVec<[u16; 8]>;

pub struct Blockmap {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    cells: Vec<Option<Cell>>,
    /// Rolling checksum per cell, for cheap duplicate grouping.
    sums: Vec<u16>,
}

/*====================================================================*/
/*                       Grid construction                            */
/*====================================================================*/

/// Map extent over the non-degenerate linedefs.
pub fn find_map_limits(lev: &Level) -> Bbox {
    let mut bbox = Bbox::empty();

    for line in &lev.lines {
        if line.zero_len {
            continue;
        }
        bbox.add_point(lev.verts[line.start].pos());
        bbox.add_point(lev.verts[line.end].pos());
    }

    if bbox.minx > bbox.maxx {
        // no real geometry at all
        bbox = Bbox {
            minx: 0,
            miny: 0,
            maxx: 0,
            maxy: 0,
        };
    }
    bbox
}

impl Blockmap {
    /// Size the grid from the map extent; the origin snaps down to a
    /// multiple of 8 on each axis.
    pub fn new(lev: &Level) -> Blockmap {
        let bbox = find_map_limits(lev);

        log::debug!(
            "{}: map limits ({},{}) to ({},{})",
            lev.name,
            bbox.minx,
            bbox.miny,
            bbox.maxx,
            bbox.maxy
        );

        let x = bbox.minx - (bbox.minx & 0x7);
        let y = bbox.miny - (bbox.miny & 0x7);
        let w = (bbox.maxx - x) / BLOCK_SIZE + 1;
        let h = (bbox.maxy - y) / BLOCK_SIZE + 1;

        Blockmap {
            x,
            y,
            w,
            h,
            cells: vec![None; (w * h) as usize],
            sums: vec![0x1234; (w * h) as usize],
        }
    }

    fn add(&mut self, block: usize, line_index: u16) {
        assert!(block < self.cells.len(), "bad block number {block}");

        self.sums[block] = (self.sums[block].rotate_left(4)) ^ line_index;
        self.cells[block].get_or_insert_default().push(line_index);
    }

    fn add_line(&mut self, lev: &Level, line_index: usize) {
        let line = &lev.lines[line_index];
        let (x1, y1) = (lev.verts[line.start].x as i32, lev.verts[line.start].y as i32);
        let (x2, y2) = (lev.verts[line.end].x as i32, lev.verts[line.end].y as i32);

        let mut bx1 = (x1.min(x2) - self.x) / BLOCK_SIZE;
        let mut by1 = (y1.min(y2) - self.y) / BLOCK_SIZE;
        let mut bx2 = (x1.max(x2) - self.x) / BLOCK_SIZE;
        let mut by2 = (y1.max(y2) - self.y) / BLOCK_SIZE;

        // tolerate truncated grids
        bx1 = bx1.max(0);
        by1 = by1.max(0);
        bx2 = bx2.min(self.w - 1);
        by2 = by2.min(self.h - 1);

        if bx2 < bx1 || by2 < by1 {
            return;
        }

        let idx = line_index as u16;

        // purely horizontal / vertical lines fill a straight run
        if by1 == by2 {
            for bx in bx1..=bx2 {
                self.add((by1 * self.w + bx) as usize, idx);
            }
            return;
        }
        if bx1 == bx2 {
            for by in by1..=by2 {
                self.add((by * self.w + bx1) as usize, idx);
            }
            return;
        }

        // diagonals: clip against each candidate cell
        for by in by1..=by2 {
            for bx in bx1..=bx2 {
                let minx = self.x + bx * BLOCK_SIZE;
                let miny = self.y + by * BLOCK_SIZE;

                if line_touches_box(
                    minx,
                    miny,
                    minx + BLOCK_SIZE - 1,
                    miny + BLOCK_SIZE - 1,
                    x1,
                    y1,
                    x2,
                    y2,
                ) {
                    self.add((by * self.w + bx) as usize, idx);
                }
            }
        }
    }

    fn fill(&mut self, lev: &Level) {
        for i in 0..lev.lines.len() {
            if lev.lines[i].zero_len {
                continue;
            }
            self.add_line(lev, i);
        }
    }

    /*================================================================*/
    /*                     Compression + encoding                     */
    /*================================================================*/

    /// Compute per-cell lump offsets, sharing duplicates and the null
    /// cell.  Returns `(offsets, emit_order)` or `None` on overflow.
    fn compress(&self) -> Option<(Vec<u16>, Vec<usize>)> {
        let count = self.cells.len();

        // sort cell ids so duplicates become neighbours
        let mut dups: Vec<usize> = (0..count).collect();
        dups.sort_by(|&a, &b| {
            let (ca, cb) = (&self.cells[a], &self.cells[b]);
            match (ca, cb) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(la), Some(lb)) => la
                    .len()
                    .cmp(&lb.len())
                    .then(self.sums[a].cmp(&self.sums[b]))
                    .then(la.cmp(lb)),
            }
        });

        let same = |a: usize, b: usize| -> bool {
            self.cells[a] == self.cells[b] && (self.cells[a].is_none() || self.sums[a] == self.sums[b])
        };

        // offsets are in 16-bit words: header (4) + pointers + null cell
        let mut cur_offset = 4 + count + 2;
        let null_offset = 4 + count;

        let mut ptrs = vec![0u16; count];
        let mut order = Vec::new();

        let mut orig_size = 4 + count;
        let mut new_size = cur_offset;

        let mut i = 0;
        while i < count {
            let blk = dups[i];

            if self.cells[blk].is_none() {
                ptrs[blk] = null_offset as u16;
                dups[i] = DUMMY_DUP;
                orig_size += 2;
                i += 1;
                continue;
            }

            let words = 2 + self.cells[blk].as_ref().unwrap().len();

            // only the last of a duplicate run claims fresh space
            if i + 1 < count && same(blk, dups[i + 1]) {
                ptrs[blk] = cur_offset as u16;
                dups[i] = DUMMY_DUP;
                orig_size += words;
                i += 1;
                continue;
            }

            ptrs[blk] = cur_offset as u16;
            order.push(blk);
            cur_offset += words;
            orig_size += words;
            new_size += words;
            i += 1;
        }

        if cur_offset > 0xFFFF {
            return None;
        }

        let compression = if orig_size > new_size {
            (orig_size - new_size) * 100 / orig_size
        } else {
            0
        };
        log::debug!(
            "blockmap {}x{} (compression {}%)",
            self.w,
            self.h,
            compression
        );

        Some((ptrs, order))
    }

    fn encode(&self, ptrs: &[u16], order: &[usize]) -> Vec<u8> {
        let mut out = Vec::new();

        out.write_i16::<LE>(self.x as i16).unwrap();
        out.write_i16::<LE>(self.y as i16).unwrap();
        out.write_i16::<LE>(self.w as i16).unwrap();
        out.write_i16::<LE>(self.h as i16).unwrap();

        for &p in ptrs {
            assert!(p != 0, "blockmap offset not set");
            out.write_u16::<LE>(p).unwrap();
        }

        // the shared null cell
        out.write_u16::<LE>(0x0000).unwrap();
        out.write_u16::<LE>(0xFFFF).unwrap();

        for &blk in order {
            out.write_u16::<LE>(0x0000).unwrap();
            for &line in self.cells[blk].as_ref().unwrap() {
                out.write_u16::<LE>(line).unwrap();
            }
            out.write_u16::<LE>(0xFFFF).unwrap();
        }
        out
    }
}

/// Build the BLOCKMAP lump body.  `None` disables nothing here: an
/// overflowing map yields an empty body (engines rebuild at runtime).
pub fn build_blockmap(lev: &Level, report: &mut Report) -> Vec<u8> {
    let mut bm = Blockmap::new(lev);
    bm.fill(lev);

    match bm.compress() {
        Some((ptrs, order)) => bm.encode(&ptrs, &order),
        None => {
            report.warn(format_args!(
                "{}: blockmap overflowed (lump will be empty)",
                lev.name
            ));
            Vec::new()
        }
    }
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::load::load_level;
    use crate::testutil::*;
    use byteorder::ReadBytesExt;
    use std::io::Cursor;

    fn lev_of(wad: &crate::wad::Wad) -> Level {
        let mut report = Report::default();
        load_level(wad, 0, &mut report).unwrap()
    }

    /// Decode a blockmap body into (header, per-cell line lists).
    fn decode(body: &[u8]) -> ((i16, i16, i16, i16), Vec<Vec<u16>>) {
        let mut cur = Cursor::new(body);
        let x = cur.read_i16::<LE>().unwrap();
        let y = cur.read_i16::<LE>().unwrap();
        let w = cur.read_i16::<LE>().unwrap();
        let h = cur.read_i16::<LE>().unwrap();

        let count = (w as usize) * (h as usize);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(cur.read_u16::<LE>().unwrap());
        }

        let mut cells = Vec::with_capacity(count);
        for off in offsets {
            let byte = off as usize * 2;
            let mut c = Cursor::new(&body[byte..]);
            assert_eq!(c.read_u16::<LE>().unwrap(), 0x0000, "missing list header");
            let mut lines = Vec::new();
            loop {
                let v = c.read_u16::<LE>().unwrap();
                if v == 0xFFFF {
                    break;
                }
                lines.push(v);
            }
            cells.push(lines);
        }
        ((x, y, w, h), cells)
    }

    #[test]
    fn square_room_fits_one_or_two_blocks() {
        let (_tmp, wad) = square_map();
        let lev = lev_of(&wad);
        let mut report = Report::default();

        let body = build_blockmap(&lev, &mut report);
        let ((x, y, w, h), cells) = decode(&body);

        assert_eq!((x, y), (0, 0));
        assert_eq!((w, h), (2, 2)); // 0..=128 straddles the 128 boundary
        assert_eq!(cells.len(), 4);

        // cell (0,0) covers 0..127: bottom (2) and left (3) lines only;
        // the lines at x=128 / y=128 land in the next row/column
        let mut c0 = cells[0].clone();
        c0.sort();
        assert_eq!(c0, vec![2, 3]);
        let mut c3 = cells[3].clone();
        c3.sort();
        assert_eq!(c3, vec![0, 1]);
    }

    #[test]
    fn origin_snaps_down_to_multiple_of_8() {
        let verts = vertices_lump(&[(-13, -5), (100, -5), (100, 90), (-13, 90)]);
        let lines = linedefs_lump(&[
            Line::solid(3, 2, 0),
            Line::solid(2, 1, 1),
            Line::solid(1, 0, 2),
            Line::solid(0, 3, 3),
        ]);
        let sides = sidedefs_lump(&[0; 4]);
        let (_tmp, wad) = map_wad("MAP01", things_lump(&[]), lines, sides, verts, sectors_lump(1));
        let lev = lev_of(&wad);
        let mut report = Report::default();

        let body = build_blockmap(&lev, &mut report);
        let ((x, y, _, _), _) = decode(&body);

        assert_eq!(x % 8, 0);
        assert_eq!(y % 8, 0);
        assert!(x <= -13 && y <= -5);
    }

    #[test]
    fn diagonal_line_only_in_touched_cells() {
        // diagonal from (0,0) to (300,300) plus a far-away closing loop
        let verts = vertices_lump(&[(0, 0), (300, 300), (300, 0)]);
        let lines = linedefs_lump(&[
            Line::solid(0, 1, 0),
            Line::solid(1, 2, 1),
            Line::solid(2, 0, 2),
        ]);
        let sides = sidedefs_lump(&[0; 3]);
        let (_tmp, wad) = map_wad("MAP01", things_lump(&[]), lines, sides, verts, sectors_lump(1));
        let lev = lev_of(&wad);
        let mut report = Report::default();

        let body = build_blockmap(&lev, &mut report);
        let ((x, y, w, h), cells) = decode(&body);
        assert_eq!((x, y), (0, 0));
        assert_eq!((w, h), (3, 3));

        // the diagonal (line 0) must appear exactly in the cells its
        // geometry touches, per the same clip predicate
        for by in 0..3i32 {
            for bx in 0..3i32 {
                let cell = &cells[(by * 3 + bx) as usize];
                let expect = line_touches_box(
                    bx * 128,
                    by * 128,
                    bx * 128 + 127,
                    by * 128 + 127,
                    0,
                    0,
                    300,
                    300,
                );
                assert_eq!(
                    cell.contains(&0),
                    expect,
                    "cell ({bx},{by}) diagonal membership"
                );
            }
        }

        // the NW corner cell is away from all three lines: empty,
        // served by the shared null cell
        assert!(cells[6].is_empty());
    }

    #[test]
    fn duplicate_cells_share_storage() {
        // a tall thin room: the middle rows all see exactly the two
        // vertical lines, so their lists must collapse to one copy
        let verts = vertices_lump(&[(0, 640), (64, 640), (64, 0), (0, 0)]);
        let lines = linedefs_lump(&[
            Line::solid(0, 1, 0),
            Line::solid(1, 2, 1),
            Line::solid(2, 3, 2),
            Line::solid(3, 0, 3),
        ]);
        let sides = sidedefs_lump(&[0; 4]);
        let (_tmp, wad) = map_wad("MAP01", things_lump(&[]), lines, sides, verts, sectors_lump(1));
        let lev = lev_of(&wad);
        let mut report = Report::default();

        let body = build_blockmap(&lev, &mut report);
        let ((_, _, w, h), cells) = decode(&body);
        assert_eq!((w, h), (1, 6));

        // middle cells hold {left, right} lines only
        for row in 1..4 {
            let mut c = cells[row].clone();
            c.sort();
            assert_eq!(c, vec![1, 3]);
        }

        // identical middle rows share one stored list: re-read the raw
        // offsets and require at least two equal ones
        let mut cur = Cursor::new(&body[8..]);
        let mut offs = Vec::new();
        for _ in 0..6 {
            offs.push(cur.read_u16::<LE>().unwrap());
        }
        assert!(
            offs[1] == offs[2] || offs[2] == offs[3],
            "duplicate rows should share an offset: {offs:?}"
        );
    }

    #[test]
    fn zero_length_lines_ignored() {
        let verts = vertices_lump(&[(0, 0), (128, 0), (64, 64)]);
        let lines = linedefs_lump(&[
            Line::solid(0, 1, 0),
            Line::solid(2, 2, 1), // zero length
        ]);
        let sides = sidedefs_lump(&[0, 0]);
        let (_tmp, wad) = map_wad("MAP01", things_lump(&[]), lines, sides, verts, sectors_lump(1));
        let lev = lev_of(&wad);
        let mut report = Report::default();

        let body = build_blockmap(&lev, &mut report);
        let (_, cells) = decode(&body);

        for cell in &cells {
            assert!(!cell.contains(&1));
        }
    }
}
