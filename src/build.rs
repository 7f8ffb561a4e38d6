//! Per-map orchestration and the build configuration surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::bsp::{build_bsp, clockwise_bsp_tree, compute_bsp_height, create_segs};
use crate::map::{BspChild, load::load_level};
use crate::save::{save_level, save_udmf};
use crate::wad::{MapFormat, Wad, WadError};

pub const SPLIT_COST_MIN: i32 = 1;
pub const SPLIT_COST_DEFAULT: i32 = 11;
pub const SPLIT_COST_MAX: i32 = 32;

/// Knobs the node builder honours; one instance serves a whole run.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Sample partition candidates instead of scoring every seg.
    pub fast: bool,
    /// When false, an empty BLOCKMAP lump is written.
    pub do_blockmap: bool,
    /// When false, an empty REJECT lump is written.
    pub do_reject: bool,
    /// Always emit XNOD format nodes.
    pub force_xnod: bool,
    /// Emit XGL3 format in the SSECTORS lump.
    pub ssect_xgl3: bool,
    /// Cost of a seg split, 1..=32.
    pub split_cost: i32,
    pub verbosity: u8,
    /// Cooperative cancellation: set externally, checked at every
    /// recursion step.
    pub cancelled: Arc<AtomicBool>,
}

impl Default for BuildConfig {
    fn default() -> BuildConfig {
        BuildConfig {
            fast: false,
            do_blockmap: true,
            do_reject: true,
            force_xnod: false,
            ssect_xgl3: false,
            split_cost: SPLIT_COST_DEFAULT,
            verbosity: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl BuildConfig {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Telemetry accumulated over a run.
#[derive(Clone, Copy, Debug, Default)]
pub struct Report {
    pub warnings: u32,
    pub minor_issues: u32,
}

impl Report {
    pub fn warn(&mut self, msg: std::fmt::Arguments) {
        self.warnings += 1;
        log::warn!("{msg}");
    }

    pub fn minor(&mut self, msg: std::fmt::Arguments) {
        self.minor_issues += 1;
        log::debug!("{msg}");
    }
}

/// How building a map (or file) can fail.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Wad(#[from] WadError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Structural corruption in a map's lumps; fails the whole file.
    #[error("corrupt map data: {0}")]
    BadData(String),

    /// Cooperative cancellation was observed; aborts the file.
    #[error("build cancelled")]
    Cancelled,

    /// An output lump exceeded the chosen format's limits; fails only
    /// the current map.
    #[error("one or more output lumps overflowed")]
    LumpOverflow,
}

/// Build the derived lumps for map `lev_idx`, updating the WAD in
/// memory and writing it back.  Per-map state is dropped on return.
pub fn build_level(
    wad: &mut Wad,
    lev_idx: usize,
    cfg: &BuildConfig,
    report: &mut Report,
) -> Result<(), BuildError> {
    if cfg.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    let mut lev = load_level(wad, lev_idx, report)?;

    let mut root: Option<BspChild> = None;
    if lev.num_real_lines > 0 {
        let list = create_segs(&mut lev, report);
        root = Some(build_bsp(&mut lev, list, cfg, report, 0)?);
    }

    log::debug!(
        "{}: built {} NODES, {} SSECTORS, {} SEGS, {} VERTEXES",
        lev.name,
        lev.nodes.len(),
        lev.subsecs.len(),
        lev.segs.len(),
        lev.num_old_vert + lev.num_new_vert
    );
    if let Some(BspChild::Node(n)) = root {
        let node = &lev.nodes[n];
        log::debug!(
            "{}: subtree heights {} / {}",
            lev.name,
            compute_bsp_height(&lev, node.right.child),
            compute_bsp_height(&lev, node.left.child)
        );
    }

    clockwise_bsp_tree(&mut lev);

    match lev.format {
        MapFormat::Doom | MapFormat::Hexen => save_level(&mut lev, wad, lev_idx, root, cfg, report),
        MapFormat::Udmf => save_udmf(&mut lev, wad, lev_idx, root, cfg, report),
    }
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
