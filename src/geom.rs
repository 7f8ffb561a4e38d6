//! Geometric primitives shared by the node builder, blockmap and
//! polyobject detection.
//!
//! Everything works in 64-bit floats (`glam::DVec2`); coordinates from
//! classic maps are integral, UDMF maps may carry fractions.

use glam::DVec2;

/// Two points closer than this (per axis) are considered coincident.
pub const DIST_EPSILON: f64 = 1.0 / 128.0;

/// Classification epsilon for point-vs-line side tests.
pub const SIDE_EPSILON: f64 = 1.0 / 16384.0;

/// Angular epsilon (degrees) for walltip matching.
pub const ANG_EPSILON: f64 = 1.0 / 1024.0;

/// Splits closer than this to a seg end are penalised (they breed
/// very short segs, one source of slime trails).
pub const IFFY_LEN: f64 = 4.0;

#[inline]
pub fn round_i32(v: f64) -> i32 {
    v.round() as i32
}

/// Angle of the vector `(dx,dy)` in degrees, 0 = east, 90 = north,
/// result in `[0, 360)`.
pub fn compute_angle(dx: f64, dy: f64) -> f64 {
    if dx == 0.0 {
        return if dy > 0.0 { 90.0 } else { 270.0 };
    }

    let mut angle = dy.atan2(dx).to_degrees();
    if angle < 0.0 {
        angle += 360.0;
    }
    angle
}

// ──────────────────────────────────────────────────────────────────────────
//                       Partition-relative distances
// ──────────────────────────────────────────────────────────────────────────

/// Signed perpendicular distance of `p` from the line through `ps` with
/// direction `pd` (length `plen`).  Positive means the *right* side.
#[inline]
pub fn perp_dist(ps: DVec2, pd: DVec2, plen: f64, p: DVec2) -> f64 {
    ((p.x - ps.x) * pd.y - (p.y - ps.y) * pd.x) / plen
}

/// Signed distance of `p` along the line direction, from `ps`.
#[inline]
pub fn along_dist(ps: DVec2, pd: DVec2, plen: f64, p: DVec2) -> f64 {
    ((p.x - ps.x) * pd.x + (p.y - ps.y) * pd.y) / plen
}

/// Which side of the line through `ps`/`pd` is `p` on?
/// `+1` right, `-1` left, `0` on the line (within [`SIDE_EPSILON`]).
pub fn point_on_line_side(ps: DVec2, pd: DVec2, p: DVec2) -> i32 {
    let perp = (p.x - ps.x) * pd.y - (p.y - ps.y) * pd.x;

    if perp.abs() <= SIDE_EPSILON * pd.length() {
        0
    } else if perp > 0.0 {
        1
    } else {
        -1
    }
}

// ──────────────────────────────────────────────────────────────────────────
//                       Bounding boxes
// ──────────────────────────────────────────────────────────────────────────

/// Integer axis-aligned bounding box (map units).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bbox {
    pub minx: i32,
    pub miny: i32,
    pub maxx: i32,
    pub maxy: i32,
}

impl Bbox {
    /// An inverted box that any `add_point` will fix up.
    pub fn empty() -> Bbox {
        Bbox {
            minx: i32::MAX,
            miny: i32::MAX,
            maxx: i32::MIN,
            maxy: i32::MIN,
        }
    }

    /// Grow to include `p`; float coords widen to the enclosing integers.
    pub fn add_point(&mut self, p: DVec2) {
        self.minx = self.minx.min(p.x.floor() as i32);
        self.miny = self.miny.min(p.y.floor() as i32);
        self.maxx = self.maxx.max(p.x.ceil() as i32);
        self.maxy = self.maxy.max(p.y.ceil() as i32);
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.minx as f64
            && p.x <= self.maxx as f64
            && p.y >= self.miny as f64
            && p.y <= self.maxy as f64
    }
}

/// Classify a bounding box against the line through `ps`/`pd`:
/// `+1` fully on the right, `-1` fully on the left, `0` straddling.
pub fn box_on_line_side(bbox: &Bbox, ps: DVec2, pd: DVec2) -> i32 {
    let corners = [
        DVec2::new(bbox.minx as f64, bbox.miny as f64),
        DVec2::new(bbox.maxx as f64, bbox.miny as f64),
        DVec2::new(bbox.minx as f64, bbox.maxy as f64),
        DVec2::new(bbox.maxx as f64, bbox.maxy as f64),
    ];

    let mut side = 0;
    for p in corners {
        let s = point_on_line_side(ps, pd, p);
        if s == 0 {
            return 0;
        }
        if side == 0 {
            side = s;
        } else if side != s {
            return 0;
        }
    }
    side
}

// ──────────────────────────────────────────────────────────────────────────
//                       Line-vs-box clipping
// ──────────────────────────────────────────────────────────────────────────

/// Does the segment `(x1,y1)-(x2,y2)` touch the closed box?
///
/// Iterative clip: each round pushes an outside endpoint onto the box
/// boundary; the segment misses the box when both endpoints are beyond
/// the same edge.  Integer endpoints, like the on-disk formats.
pub fn line_touches_box(
    xmin: i32,
    ymin: i32,
    xmax: i32,
    ymax: i32,
    mut x1: i32,
    mut y1: i32,
    mut x2: i32,
    mut y2: i32,
) -> bool {
    let mut count = 2;

    loop {
        if y1 > ymax {
            if y2 > ymax {
                return false;
            }
            x1 += ((x2 - x1) as f64 * (ymax - y1) as f64 / (y2 - y1) as f64) as i32;
            y1 = ymax;
            count = 2;
            continue;
        }

        if y1 < ymin {
            if y2 < ymin {
                return false;
            }
            x1 += ((x2 - x1) as f64 * (ymin - y1) as f64 / (y2 - y1) as f64) as i32;
            y1 = ymin;
            count = 2;
            continue;
        }

        if x1 > xmax {
            if x2 > xmax {
                return false;
            }
            y1 += ((y2 - y1) as f64 * (xmax - x1) as f64 / (x2 - x1) as f64) as i32;
            x1 = xmax;
            count = 2;
            continue;
        }

        if x1 < xmin {
            if x2 < xmin {
                return false;
            }
            y1 += ((y2 - y1) as f64 * (xmin - x1) as f64 / (x2 - x1) as f64) as i32;
            x1 = xmin;
            count = 2;
            continue;
        }

        count -= 1;
        if count == 0 {
            break;
        }

        std::mem::swap(&mut x1, &mut x2);
        std::mem::swap(&mut y1, &mut y2);
    }

    true
}

// ──────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use glam::dvec2;

    #[test]
    fn angle_quadrants() {
        assert_eq!(compute_angle(1.0, 0.0), 0.0);
        assert_eq!(compute_angle(0.0, 1.0), 90.0);
        assert_eq!(compute_angle(-1.0, 0.0), 180.0);
        assert_eq!(compute_angle(0.0, -1.0), 270.0);
        assert!((compute_angle(1.0, 1.0) - 45.0).abs() < 1e-9);
        assert!((compute_angle(1.0, -1.0) - 315.0).abs() < 1e-9);
    }

    #[test]
    fn point_side_signs() {
        // north-going line through origin: right side is east
        let ps = dvec2(0.0, 0.0);
        let pd = dvec2(0.0, 128.0);

        assert_eq!(point_on_line_side(ps, pd, dvec2(10.0, 50.0)), 1);
        assert_eq!(point_on_line_side(ps, pd, dvec2(-10.0, 50.0)), -1);
        assert_eq!(point_on_line_side(ps, pd, dvec2(0.0, 99.0)), 0);
    }

    #[test]
    fn perp_and_along() {
        let ps = dvec2(0.0, 0.0);
        let pd = dvec2(100.0, 0.0);

        assert!((perp_dist(ps, pd, 100.0, dvec2(50.0, -7.0)) - 7.0).abs() < 1e-9);
        assert!((along_dist(ps, pd, 100.0, dvec2(50.0, -7.0)) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn bbox_grows() {
        let mut bb = Bbox::empty();
        bb.add_point(dvec2(-10.5, 3.0));
        bb.add_point(dvec2(20.0, -8.2));

        assert_eq!(bb.minx, -11);
        assert_eq!(bb.miny, -9);
        assert_eq!(bb.maxx, 20);
        assert_eq!(bb.maxy, 3);
    }

    #[test]
    fn box_sides() {
        let bb = Bbox {
            minx: 10,
            miny: 10,
            maxx: 20,
            maxy: 20,
        };
        // north-going line at x = 0: the box lies fully to the right
        let ps = dvec2(0.0, 0.0);
        let pd = dvec2(0.0, 1.0);
        assert_eq!(box_on_line_side(&bb, ps, pd), 1);
        // south-going line at x = 0: fully left
        assert_eq!(box_on_line_side(&bb, ps, dvec2(0.0, -1.0)), -1);
        // diagonal through the box straddles
        assert_eq!(box_on_line_side(&bb, dvec2(0.0, 0.0), dvec2(1.0, 1.0)), 0);
        // line along the box's left edge touches a corner
        assert_eq!(box_on_line_side(&bb, dvec2(10.0, 0.0), dvec2(0.0, 1.0)), 0);
    }

    #[test]
    fn clip_hits_and_misses() {
        // diagonal through the box
        assert!(line_touches_box(0, 0, 127, 127, -50, -50, 200, 200));
        // entirely north of the box
        assert!(!line_touches_box(0, 0, 127, 127, -50, 300, 200, 400));
        // clips a corner
        assert!(line_touches_box(0, 0, 127, 127, -10, 100, 100, 210));
        // near miss past the corner
        assert!(!line_touches_box(0, 0, 127, 127, 120, 300, 300, 120));
        // fully inside
        assert!(line_touches_box(0, 0, 127, 127, 10, 10, 20, 20));
    }
}
