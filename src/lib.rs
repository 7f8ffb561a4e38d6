//! yabsp — Yet Another BSP node builder for Doom WADs.
//!
//! Given a WAD containing maps in classic, Hexen or UDMF format, the
//! builder reconstructs the derived geometry lumps the engine needs at
//! runtime: SEGS, SSECTORS, NODES (classic, XNOD or XGL3 variants),
//! BLOCKMAP and REJECT.  The WAD is updated in place; input map lumps
//! are preserved.

pub mod blockmap;
pub mod bsp;
pub mod build;
pub mod geom;
pub mod map;
pub mod reject;
pub mod save;
pub mod wad;

#[cfg(test)]
pub mod testutil;
