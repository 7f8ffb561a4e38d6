//! Hand-crafted WAD and lump fixtures shared by the unit tests.

use byteorder::{LittleEndian as LE, WriteBytesExt};
use tempfile::NamedTempFile;

use crate::wad::Wad;

fn pad_name(name: &str) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, b) in name.bytes().take(8).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    out
}

/// Serialise `(name, body)` pairs into a well-formed PWAD image.
pub fn build_wad(lumps: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PWAD");
    out.extend(&(lumps.len() as u32).to_le_bytes());

    let body_len: usize = lumps.iter().map(|(_, d)| d.len()).sum();
    out.extend(&((12 + body_len) as u32).to_le_bytes());

    let mut offset = 12u32;
    let mut dir = Vec::new();
    for (name, data) in lumps {
        dir.extend(&offset.to_le_bytes());
        dir.extend(&(data.len() as u32).to_le_bytes());
        dir.extend_from_slice(&pad_name(name));
        offset += data.len() as u32;
    }
    for (_, data) in lumps {
        out.extend_from_slice(*data);
    }
    out.extend_from_slice(&dir);
    out
}

/// Write a PWAD image to a temp file and open it for mutation.
pub fn open_wad(lumps: &[(&str, &[u8])]) -> (NamedTempFile, Wad) {
    let tmp = NamedTempFile::new().expect("tempfile");
    std::fs::write(tmp.path(), build_wad(lumps)).unwrap();
    let wad = Wad::open(tmp.path()).expect("open fixture wad");
    (tmp, wad)
}

/*------------------------- binary map lumps -------------------------*/

pub fn vertices_lump(verts: &[(i16, i16)]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(x, y) in verts {
        out.write_i16::<LE>(x).unwrap();
        out.write_i16::<LE>(y).unwrap();
    }
    out
}

/// One classic linedef record.
#[derive(Clone, Copy)]
pub struct Line {
    pub start: u16,
    pub end: u16,
    pub flags: u16,
    pub special: u16,
    pub tag: i16,
    pub right: u16,
    pub left: u16,
}

impl Line {
    /// One-sided line using sidedef `right`.
    pub fn solid(start: u16, end: u16, right: u16) -> Line {
        Line {
            start,
            end,
            flags: 0x0001,
            special: 0,
            tag: 0,
            right,
            left: 0xFFFF,
        }
    }

    /// Two-sided line between sidedefs `right` and `left`.
    pub fn pass(start: u16, end: u16, right: u16, left: u16) -> Line {
        Line {
            start,
            end,
            flags: 0x0004,
            special: 0,
            tag: 0,
            right,
            left,
        }
    }
}

pub fn linedefs_lump(lines: &[Line]) -> Vec<u8> {
    let mut out = Vec::new();
    for l in lines {
        out.write_u16::<LE>(l.start).unwrap();
        out.write_u16::<LE>(l.end).unwrap();
        out.write_u16::<LE>(l.flags).unwrap();
        out.write_u16::<LE>(l.special).unwrap();
        out.write_i16::<LE>(l.tag).unwrap();
        out.write_u16::<LE>(l.right).unwrap();
        out.write_u16::<LE>(l.left).unwrap();
    }
    out
}

/// Sidedef records referencing the given sectors (textures blank).
pub fn sidedefs_lump(sectors: &[u16]) -> Vec<u8> {
    let mut out = Vec::new();
    for &sec in sectors {
        out.write_i16::<LE>(0).unwrap(); // x offset
        out.write_i16::<LE>(0).unwrap(); // y offset
        out.extend_from_slice(&[0u8; 24]); // upper/lower/middle names
        out.write_u16::<LE>(sec).unwrap();
    }
    out
}

pub fn sectors_lump(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for _ in 0..count {
        out.write_i16::<LE>(0).unwrap(); // floor
        out.write_i16::<LE>(128).unwrap(); // ceiling
        out.extend_from_slice(b"FLAT1\0\0\0");
        out.extend_from_slice(b"FLAT1\0\0\0");
        out.write_u16::<LE>(160).unwrap(); // light
        out.write_u16::<LE>(0).unwrap(); // special
        out.write_i16::<LE>(0).unwrap(); // tag
    }
    out
}

pub fn things_lump(things: &[(i16, i16, u16)]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(x, y, kind) in things {
        out.write_i16::<LE>(x).unwrap();
        out.write_i16::<LE>(y).unwrap();
        out.write_u16::<LE>(0).unwrap(); // angle
        out.write_u16::<LE>(kind).unwrap();
        out.write_u16::<LE>(7).unwrap(); // options
    }
    out
}

/*------------------------- whole-map fixtures -----------------------*/

/// Assemble a classic map WAD from pre-built input lumps.
pub fn map_wad(
    name: &str,
    things: Vec<u8>,
    linedefs: Vec<u8>,
    sidedefs: Vec<u8>,
    vertexes: Vec<u8>,
    sectors: Vec<u8>,
) -> (NamedTempFile, Wad) {
    open_wad(&[
        (name, &[]),
        ("THINGS", &things),
        ("LINEDEFS", &linedefs),
        ("SIDEDEFS", &sidedefs),
        ("VERTEXES", &vertexes),
        ("SECTORS", &sectors),
    ])
}

/// One square room, 128×128: four vertices, four one-sided lines wound
/// clockwise so every right side faces the interior.
pub fn square_map() -> (NamedTempFile, Wad) {
    let verts = vertices_lump(&[(0, 128), (128, 128), (128, 0), (0, 0)]);
    let lines = linedefs_lump(&[
        Line::solid(0, 1, 0),
        Line::solid(1, 2, 1),
        Line::solid(2, 3, 2),
        Line::solid(3, 0, 3),
    ]);
    let sides = sidedefs_lump(&[0, 0, 0, 0]);

    map_wad(
        "MAP01",
        things_lump(&[(64, 64, 1)]),
        lines,
        sides,
        verts,
        sectors_lump(1),
    )
}

/// Two 128×128 rooms side by side, joined by a two-sided line at x=128.
/// Six one-sided walls plus the shared door line; two sectors.
pub fn two_room_map() -> (NamedTempFile, Wad) {
    let verts = vertices_lump(&[
        (0, 128),
        (128, 128),
        (256, 128),
        (256, 0),
        (128, 0),
        (0, 0),
    ]);
    let lines = linedefs_lump(&[
        Line::solid(0, 1, 0), // room A top
        Line::solid(1, 2, 1), // room B top
        Line::solid(2, 3, 2), // room B right
        Line::solid(3, 4, 3), // room B bottom
        Line::solid(4, 5, 4), // room A bottom
        Line::solid(5, 0, 5), // room A left
        Line::pass(4, 1, 6, 7), // shared wall, right side faces room B
    ]);
    // sides 0,4,5 bound room A (sector 0); 1,2,3 room B (sector 1);
    // the shared line faces B on the right, A on the left
    let sides = sidedefs_lump(&[0, 1, 1, 1, 0, 0, 1, 0]);

    map_wad(
        "MAP01",
        things_lump(&[(64, 64, 1)]),
        lines,
        sides,
        verts,
        sectors_lump(2),
    )
}

/// Two 128×128 rooms with 128 units of void between them; no shared
/// linedefs, so the reject builder must keep the sectors apart.
pub fn disjoint_rooms_map() -> (NamedTempFile, Wad) {
    let verts = vertices_lump(&[
        // room A
        (0, 128),
        (128, 128),
        (128, 0),
        (0, 0),
        // room B
        (256, 128),
        (384, 128),
        (384, 0),
        (256, 0),
    ]);
    let lines = linedefs_lump(&[
        Line::solid(0, 1, 0),
        Line::solid(1, 2, 1),
        Line::solid(2, 3, 2),
        Line::solid(3, 0, 3),
        Line::solid(4, 5, 4),
        Line::solid(5, 6, 5),
        Line::solid(6, 7, 6),
        Line::solid(7, 4, 7),
    ]);
    let sides = sidedefs_lump(&[0, 0, 0, 0, 1, 1, 1, 1]);

    map_wad(
        "MAP01",
        things_lump(&[(64, 64, 1), (320, 64, 2)]),
        lines,
        sides,
        verts,
        sectors_lump(2),
    )
}
