//! REJECT construction.
//!
//! Only basic processing: sectors are grouped by connectivity (any
//! two-sided linedef joining two distinct sectors merges their groups),
//! and a pair of sectors in different groups can never see each other.
//! The result is a symmetric, row-major bit matrix with a zero diagonal.

use crate::map::{Level, SectorId};

/// Union-find over sector ids, with path compression.
struct SectorGroups {
    parent: Vec<SectorId>,
}

impl SectorGroups {
    fn new(count: usize) -> SectorGroups {
        SectorGroups {
            parent: (0..count).collect(),
        }
    }

    fn find(&mut self, s: SectorId) -> SectorId {
        if self.parent[s] != s {
            let root = self.find(self.parent[s]);
            self.parent[s] = root;
        }
        self.parent[s]
    }

    fn union(&mut self, a: SectorId, b: SectorId) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // smaller root wins, keeping group ids stable
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

fn group_sectors(lev: &Level) -> SectorGroups {
    let mut groups = SectorGroups::new(lev.sectors.len());

    for line in &lev.lines {
        let (Some(right), Some(left)) = (line.right, line.left) else {
            continue;
        };
        let (Some(s1), Some(s2)) = (lev.sides[right].sector, lev.sides[left].sector) else {
            continue;
        };
        if s1 != s2 {
            groups.union(s1, s2);
        }
    }
    groups
}

/// Build the REJECT lump body: one bit per (view, target) pair, set when
/// the pair cannot possibly see each other.
pub fn build_reject(lev: &Level) -> Vec<u8> {
    let num = lev.sectors.len();
    let mut matrix = vec![0u8; (num * num + 7) / 8];

    let mut groups = group_sectors(lev);

    for view in 0..num {
        for target in 0..view {
            if groups.find(view) == groups.find(target) {
                continue;
            }

            // set both orientations at once, keeping the matrix symmetric
            let p1 = view * num + target;
            let p2 = target * num + view;
            matrix[p1 >> 3] |= 1 << (p1 & 7);
            matrix[p2 >> 3] |= 1 << (p2 & 7);
        }
    }

    log::debug!("{}: reject size {}", lev.name, matrix.len());
    matrix
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
