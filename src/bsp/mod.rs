//! BSP construction: recursive divide-and-conquer over the map's segs.
//!
//! * `seg` — initial seg creation, seg splitting, the intersection list
//!   along a partition and miniseg generation.
//! * `node` — partition scoring/selection, the recursion itself, and the
//!   post passes (clockwise ordering, normalise, round-off).

pub mod node;
pub mod seg;

pub use node::{
    build_bsp, clockwise_bsp_tree, compute_bsp_height, normalise_bsp_tree, round_off_bsp_tree,
};
pub use seg::create_segs;
