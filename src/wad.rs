//! WAD container — read *and* rewrite.
//!
//! * The whole file is loaded into memory at open; every lump owns its
//!   body, so mutation is cheap and the file is written back exactly once
//!   in [`Wad::end_write`].
//! * Both `PWAD` and `IWAD` magics are accepted; the kind is preserved.
//! * Map headers are detected from the lump *neighbourhood* (a marker is
//!   whatever lump precedes THINGS/LINEDEFS/… or a TEXTMAP), not from the
//!   marker name itself.

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Size (in bytes) of one directory entry.
const DIR_ENTRY_SIZE: usize = 16;

/// Size of the WAD header.
const HEADER_SIZE: usize = 12;

/// Upper bound on lumps forming one binary-format map.
const MAX_LUMPS_IN_A_LEVEL: usize = 21;

/// One lump: 8-byte name plus its body.
#[derive(Clone, Debug)]
pub struct Lump {
    /// Eight-byte ASCII name, padded with NULs.
    pub name: [u8; 8],
    /// Lump body (owned; empty for marker lumps).
    pub data: Vec<u8>,
}

impl Lump {
    /// Printable view of the name, trimmed at the first NUL.
    pub fn name_str(&self) -> &str {
        lump_name_str(&self.name)
    }
}

/// Convert an eight-byte, NUL-padded lump name into a printable string.
pub fn lump_name_str(raw: &[u8; 8]) -> &str {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end]).unwrap_or("?")
}

fn make_lump_name(name: &str) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, b) in name.bytes().take(8).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    out
}

/// Outer container kind, preserved on rewrite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WadKind {
    Iwad,
    Pwad,
}

/// How a single map is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapFormat {
    Doom,
    Hexen,
    Udmf,
}

/// Errors that can be encountered while opening/parsing a WAD.
#[derive(Error, Debug)]
pub enum WadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a WAD file (bad magic)")]
    BadMagic,

    #[error("directory extends beyond end of file")]
    DirectoryOutOfBounds,

    #[error("lump {name} (# {index}) body {offset}+{size} past EOF ({file_size})")]
    BadOffset {
        index: usize,
        name: String,
        offset: u32,
        size: u32,
        file_size: usize,
    },

    #[error("lump # {0} has a non-printable name")]
    BadName(usize),
}

/// Entire WAD resident in memory, plus the open (writable) file handle.
#[derive(Debug)]
pub struct Wad {
    path: PathBuf,
    file: File,
    kind: WadKind,
    lumps: Vec<Lump>,
    /// Directory indices of map header lumps, in directory order.
    levels: Vec<usize>,
    insert_point: Option<usize>,
    writing: bool,
}

impl Wad {
    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    /// Open an existing WAD for in-place mutation.  A read-only file is
    /// rejected here (the open itself fails).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WadError> {
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        let kind = match &magic {
            b"IWAD" => WadKind::Iwad,
            b"PWAD" => WadKind::Pwad,
            _ => return Err(WadError::BadMagic),
        };

        let num_lumps = file.read_u32::<LE>()? as usize;
        let dir_offset = file.read_u32::<LE>()? as usize;

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;

        let dir_end = dir_offset
            .checked_add(num_lumps * DIR_ENTRY_SIZE)
            .ok_or(WadError::DirectoryOutOfBounds)?;
        if bytes.len() < HEADER_SIZE || dir_end > bytes.len() {
            return Err(WadError::DirectoryOutOfBounds);
        }

        let mut lumps = Vec::with_capacity(num_lumps);
        let mut cur = &bytes[dir_offset..dir_end];

        for i in 0..num_lumps {
            let offset = cur.read_u32::<LE>()?;
            let size = cur.read_u32::<LE>()?;
            let mut name = [0u8; 8];
            cur.read_exact(&mut name)?;

            // names are NUL-padded printable ASCII
            if name
                .iter()
                .any(|&b| b != 0 && !(0x20..=0x7e).contains(&b))
            {
                return Err(WadError::BadName(i));
            }

            let start = offset as usize;
            let end = start + size as usize;
            if end > bytes.len() {
                return Err(WadError::BadOffset {
                    index: i,
                    name: lump_name_str(&name).into(),
                    offset,
                    size,
                    file_size: bytes.len(),
                });
            }

            lumps.push(Lump {
                name,
                data: bytes[start..end].to_vec(),
            });
        }

        let mut wad = Wad {
            path: path.as_ref().to_owned(),
            file,
            kind,
            lumps,
            levels: Vec::new(),
            insert_point: None,
            writing: false,
        };
        wad.detect_levels();
        Ok(wad)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> WadKind {
        self.kind
    }

    pub fn lumps(&self) -> &[Lump] {
        &self.lumps
    }

    pub fn lump(&self, idx: usize) -> &Lump {
        &self.lumps[idx]
    }

    // ---------------------------------------------------------------------
    // Map detection
    // ---------------------------------------------------------------------

    /// 1-based slot when `name` is one of the five lumps that may directly
    /// follow a map header, 0 otherwise.
    fn what_level_part(name: &str) -> u32 {
        match name.to_ascii_uppercase().as_str() {
            "THINGS" => 1,
            "LINEDEFS" => 2,
            "SIDEDEFS" => 3,
            "VERTEXES" => 4,
            "SECTORS" => 5,
            _ => 0,
        }
    }

    fn is_level_lump(name: &str) -> bool {
        const NAMES: &[&str] = &[
            "THINGS", "LINEDEFS", "SIDEDEFS", "VERTEXES", "SEGS", "SSECTORS", "NODES", "SECTORS",
            "REJECT", "BLOCKMAP", "BEHAVIOR", "SCRIPTS",
        ];
        NAMES.iter().any(|n| name.eq_ignore_ascii_case(n))
            || name.to_ascii_uppercase().starts_with("GL_")
    }

    fn detect_levels(&mut self) {
        self.levels.clear();

        let mut k = 0;
        while k + 1 < self.lumps.len() {
            // a map lump can never be a header itself
            let name = self.lumps[k].name_str();
            if Self::is_level_lump(name)
                || name.eq_ignore_ascii_case("TEXTMAP")
                || name.eq_ignore_ascii_case("ENDMAP")
                || name.eq_ignore_ascii_case("ZNODES")
            {
                k += 1;
                continue;
            }

            if self.lumps[k + 1].name_str().eq_ignore_ascii_case("TEXTMAP") {
                self.levels.push(k);
                k += 1;
                continue;
            }

            // a header is followed by at least four distinct map lumps
            let mut part_mask = 0u32;
            let mut part_count = 0;

            for i in 1..=4 {
                if k + i >= self.lumps.len() {
                    break;
                }
                let part = Self::what_level_part(self.lumps[k + i].name_str());
                if part == 0 || part_mask & (1 << part) != 0 {
                    break;
                }
                part_mask |= 1 << part;
                part_count += 1;
            }

            if part_count == 4 {
                self.levels.push(k);
            }
            k += 1;
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Directory index of map `lev`'s header lump.
    pub fn level_header(&self, lev: usize) -> usize {
        self.levels[lev]
    }

    pub fn level_name(&self, lev: usize) -> &str {
        self.lumps[self.levels[lev]].name_str()
    }

    pub fn level_format(&self, lev: usize) -> MapFormat {
        let start = self.levels[lev];

        if start + 1 < self.lumps.len()
            && self.lumps[start + 1].name_str().eq_ignore_ascii_case("TEXTMAP")
        {
            return MapFormat::Udmf;
        }

        let last = self.level_last_lump(lev);
        for i in start + 1..=last {
            if self.lumps[i].name_str().eq_ignore_ascii_case("BEHAVIOR") {
                return MapFormat::Hexen;
            }
        }
        MapFormat::Doom
    }

    /// Directory index of the last lump belonging to map `lev`.
    pub fn level_last_lump(&self, lev: usize) -> usize {
        let start = self.levels[lev];
        let mut count = 1;

        // UDMF maps run through ENDMAP, keeping unknown lumps in between
        if start + 1 < self.lumps.len()
            && self.lumps[start + 1].name_str().eq_ignore_ascii_case("TEXTMAP")
        {
            while start + count < self.lumps.len() {
                if self.lumps[start + count].name_str().eq_ignore_ascii_case("ENDMAP") {
                    count += 1;
                    break;
                }
                count += 1;
            }
            return start + count - 1;
        }

        while count < MAX_LUMPS_IN_A_LEVEL
            && start + count < self.lumps.len()
            && Self::is_level_lump(self.lumps[start + count].name_str())
        {
            count += 1;
        }
        start + count - 1
    }

    /// Find `name` within map `lev`'s lump span.
    pub fn level_lookup_lump(&self, lev: usize, name: &str) -> Option<usize> {
        let start = self.levels[lev];
        let last = self.level_last_lump(lev);

        (start + 1..=last).find(|&i| self.lumps[i].name_str().eq_ignore_ascii_case(name))
    }

    // ---------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------

    /// Start a mutation bracket.  Changes accumulate in memory until
    /// [`Wad::end_write`].
    pub fn begin_write(&mut self) {
        debug_assert!(!self.writing, "nested begin_write");
        self.writing = true;
        self.insert_point = None;
    }

    /// Subsequent [`Wad::add_lump`] calls insert at `idx` (advancing as
    /// they go); `None` restores append-at-end.
    pub fn insert_point(&mut self, idx: Option<usize>) {
        self.insert_point = idx;
    }

    /// Create an empty lump, at the insert point or at the end.
    /// Returns its directory index.
    pub fn add_lump(&mut self, name: &str) -> usize {
        debug_assert!(self.writing, "add_lump outside begin_write");

        let pos = match self.insert_point {
            Some(p) if p <= self.lumps.len() => p,
            _ => self.lumps.len(),
        };

        self.lumps.insert(
            pos,
            Lump {
                name: make_lump_name(name),
                data: Vec::new(),
            },
        );

        // keep cached header indices and the insert point in step
        for h in self.levels.iter_mut() {
            if *h >= pos {
                *h += 1;
            }
        }
        self.insert_point = Some(pos + 1);

        pos
    }

    /// Replace a lump's body (the RecreateLump operation).
    pub fn set_lump_data(&mut self, idx: usize, data: Vec<u8>) {
        debug_assert!(self.writing, "set_lump_data outside begin_write");
        self.lumps[idx].data = data;
    }

    pub fn remove_lump(&mut self, idx: usize) {
        debug_assert!(self.writing, "remove_lump outside begin_write");
        self.lumps.remove(idx);

        for h in self.levels.iter_mut() {
            if *h > idx {
                *h -= 1;
            }
        }
        if let Some(p) = self.insert_point
            && p > idx
        {
            self.insert_point = Some(p - 1);
        }
    }

    /// Drop any existing ZNODES lump from a UDMF map.
    pub fn remove_znodes(&mut self, lev: usize) {
        while let Some(idx) = self.level_lookup_lump(lev, "ZNODES") {
            self.remove_lump(idx);
        }
    }

    /// Close the mutation bracket and write the whole file back:
    /// header, lump bodies, then the directory.
    pub fn end_write(&mut self) -> Result<(), WadError> {
        debug_assert!(self.writing, "end_write without begin_write");
        self.writing = false;
        self.insert_point = None;

        let mut out = Vec::with_capacity(
            HEADER_SIZE
                + self.lumps.iter().map(|l| l.data.len()).sum::<usize>()
                + self.lumps.len() * DIR_ENTRY_SIZE,
        );

        out.extend_from_slice(match self.kind {
            WadKind::Iwad => b"IWAD",
            WadKind::Pwad => b"PWAD",
        });
        out.write_u32::<LE>(self.lumps.len() as u32)?;

        let mut offset = HEADER_SIZE as u32;
        let mut dir = Vec::with_capacity(self.lumps.len() * DIR_ENTRY_SIZE);
        for lump in &self.lumps {
            dir.write_u32::<LE>(if lump.data.is_empty() { 0 } else { offset })?;
            dir.write_u32::<LE>(lump.data.len() as u32)?;
            dir.extend_from_slice(&lump.name);
            offset += lump.data.len() as u32;
        }

        out.write_u32::<LE>(offset)?; // directory starts after the bodies
        for lump in &self.lumps {
            out.extend_from_slice(&lump.data);
        }
        out.extend_from_slice(&dir);

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&out)?;
        self.file.set_len(out.len() as u64)?;
        self.file.flush()?;
        Ok(())
    }
}

// ==========================================================================
// Tests
// ==========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::build_wad;
    use tempfile::NamedTempFile;

    fn open_bytes(bytes: &[u8]) -> (NamedTempFile, Result<Wad, WadError>) {
        let tmp = NamedTempFile::new().expect("tempfile");
        std::fs::write(tmp.path(), bytes).unwrap();
        let wad = Wad::open(tmp.path());
        (tmp, wad)
    }

    const MAP_LUMPS: &[&str] = &[
        "THINGS", "LINEDEFS", "SIDEDEFS", "VERTEXES", "SEGS", "SSECTORS", "NODES", "SECTORS",
        "REJECT", "BLOCKMAP",
    ];

    fn classic_map(header: &str) -> Vec<(String, Vec<u8>)> {
        let mut v = vec![(header.to_owned(), Vec::new())];
        for n in MAP_LUMPS {
            v.push(((*n).to_owned(), Vec::new()));
        }
        v
    }

    fn as_refs<'a>(v: &'a [(String, Vec<u8>)]) -> Vec<(&'a str, &'a [u8])> {
        v.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect()
    }

    #[test]
    fn rejects_garbage_file() {
        let (_tmp, wad) = open_bytes(b"NOTWAD_____");
        assert!(matches!(wad.unwrap_err(), WadError::BadMagic));
    }

    #[test]
    fn rejects_directory_past_eof() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"PWAD");
        bytes.extend(&1u32.to_le_bytes());
        bytes.extend(&1000u32.to_le_bytes()); // directory way past EOF

        let (_tmp, wad) = open_bytes(&bytes);
        assert!(matches!(wad.unwrap_err(), WadError::DirectoryOutOfBounds));
    }

    #[test]
    fn rejects_lump_body_past_eof() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"PWAD");
        bytes.extend(&1u32.to_le_bytes());
        bytes.extend(&12u32.to_le_bytes());
        bytes.extend(&1000u32.to_le_bytes()); // lump offset past EOF
        bytes.extend(&4u32.to_le_bytes());
        bytes.extend(b"BAD\0\0\0\0\0");

        let (_tmp, wad) = open_bytes(&bytes);
        assert!(matches!(wad.unwrap_err(), WadError::BadOffset { .. }));
    }

    #[test]
    fn detects_classic_map() {
        let lumps = classic_map("MAP01");
        let (_tmp, wad) = open_bytes(&build_wad(&as_refs(&lumps)));
        let wad = wad.unwrap();

        assert_eq!(wad.level_count(), 1);
        assert_eq!(wad.level_name(0), "MAP01");
        assert_eq!(wad.level_format(0), MapFormat::Doom);
        assert_eq!(wad.level_last_lump(0), 10);
        assert_eq!(wad.level_lookup_lump(0, "SECTORS"), Some(8));
        assert_eq!(wad.level_lookup_lump(0, "TEXTMAP"), None);
    }

    #[test]
    fn detects_hexen_map() {
        let mut lumps = classic_map("MAP01");
        lumps.push(("BEHAVIOR".into(), Vec::new()));
        let (_tmp, wad) = open_bytes(&build_wad(&as_refs(&lumps)));
        let wad = wad.unwrap();

        assert_eq!(wad.level_format(0), MapFormat::Hexen);
        assert_eq!(wad.level_last_lump(0), 11);
    }

    #[test]
    fn detects_udmf_map_with_extra_lumps() {
        let lumps: Vec<(String, Vec<u8>)> = vec![
            ("MAP01".into(), Vec::new()),
            ("TEXTMAP".into(), b"namespace=\"zdoom\";".to_vec()),
            ("DIALOGUE".into(), b"custom".to_vec()),
            ("ENDMAP".into(), Vec::new()),
            ("TRAILER".into(), Vec::new()),
        ];
        let (_tmp, wad) = open_bytes(&build_wad(&as_refs(&lumps)));
        let wad = wad.unwrap();

        assert_eq!(wad.level_count(), 1);
        assert_eq!(wad.level_format(0), MapFormat::Udmf);
        // span ends at ENDMAP, keeping DIALOGUE inside
        assert_eq!(wad.level_last_lump(0), 3);
    }

    #[test]
    fn two_maps_in_directory_order() {
        let mut lumps = classic_map("MAP02");
        lumps.extend(classic_map("MAP01"));
        let (_tmp, wad) = open_bytes(&build_wad(&as_refs(&lumps)));
        let wad = wad.unwrap();

        assert_eq!(wad.level_count(), 2);
        assert_eq!(wad.level_name(0), "MAP02");
        assert_eq!(wad.level_name(1), "MAP01");
    }

    #[test]
    fn insert_and_rewrite_round_trip() {
        let lumps = classic_map("MAP01");
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), build_wad(&as_refs(&lumps))).unwrap();

        {
            let mut wad = Wad::open(tmp.path()).unwrap();
            wad.begin_write();

            // insert a lump after SECTORS and give it a body
            let sectors = wad.level_lookup_lump(0, "SECTORS").unwrap();
            wad.insert_point(Some(sectors + 1));
            let idx = wad.add_lump("GL_MAP01");
            wad.set_lump_data(idx, b"test-body".to_vec());

            wad.end_write().unwrap();
        }

        let wad = Wad::open(tmp.path()).unwrap();
        assert_eq!(wad.lumps().len(), 12);
        assert_eq!(wad.lump(9).name_str(), "GL_MAP01");
        assert_eq!(wad.lump(9).data, b"test-body");
        // the map is still detected after the insertion
        assert_eq!(wad.level_count(), 1);
        assert_eq!(wad.level_header(0), 0);
    }

    #[test]
    fn insertion_shifts_later_map_headers() {
        let mut lumps = classic_map("MAP01");
        lumps.extend(classic_map("MAP02"));
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), build_wad(&as_refs(&lumps))).unwrap();

        let mut wad = Wad::open(tmp.path()).unwrap();
        assert_eq!(wad.level_header(1), 11);

        wad.begin_write();
        wad.insert_point(Some(5));
        wad.add_lump("EXTRA");
        assert_eq!(wad.level_header(0), 0);
        assert_eq!(wad.level_header(1), 12);
        wad.end_write().unwrap();
    }

    #[test]
    fn remove_znodes_only_in_level_span() {
        let lumps: Vec<(String, Vec<u8>)> = vec![
            ("MAP01".into(), Vec::new()),
            ("TEXTMAP".into(), b"x".to_vec()),
            ("ZNODES".into(), b"stale".to_vec()),
            ("ENDMAP".into(), Vec::new()),
            ("ZNODES".into(), b"foreign".to_vec()),
        ];
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), build_wad(&as_refs(&lumps))).unwrap();

        let mut wad = Wad::open(tmp.path()).unwrap();
        wad.begin_write();
        wad.remove_znodes(0);
        wad.end_write().unwrap();

        assert_eq!(wad.lumps().len(), 4);
        assert_eq!(wad.lump(2).name_str(), "ENDMAP");
        assert_eq!(wad.lump(3).data, b"foreign");
    }
}
