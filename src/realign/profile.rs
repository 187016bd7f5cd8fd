//! Profile columns and the evidence each read contributes to them.

use crate::model::alphabet::N;
use crate::utils::phred_to_error;

/// The reference's contribution to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSlot {
    Base(u8),
    /// The reference row has a gap in this column.
    Gap,
    /// The reference row does not reach this column.
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    /// Top-strand A/C/G/T evidence.
    pub fwd: [f64; 4],
    /// Bottom-strand A/C/G/T evidence.
    pub rev: [f64; 4],
    pub ref_slot: RefSlot,
    /// Residues in this column, the reference included.
    pub non_gap: u32,
    pub gap_fwd: f64,
    pub gap_rev: f64,
}

impl Default for Column {
    fn default() -> Self {
        Column {
            fwd: [0.0; 4],
            rev: [0.0; 4],
            ref_slot: RefSlot::Absent,
            non_gap: 0,
            gap_fwd: 0.0,
            gap_rev: 0.0,
        }
    }
}

/// Probability that the read is placed correctly.
#[inline]
pub fn map_confidence(mapq: u8) -> f64 {
    if mapq as f64 > 254.5 {
        1.0
    } else {
        1.0 - phred_to_error(mapq as f64)
    }
}

impl Column {
    /// A column with no residues left, reference included.
    pub fn is_empty(&self) -> bool {
        self.non_gap == 0
    }

    fn strand_mut(&mut self, is_top: bool) -> &mut [f64; 4] {
        if is_top {
            &mut self.fwd
        } else {
            &mut self.rev
        }
    }

    fn evidence(base: u8, qual: u8, map_conf: f64) -> [f64; 4] {
        if base >= N {
            return [map_conf / 4.0; 4];
        }
        let e = phred_to_error(qual as f64);
        let mut weights = [e / 3.0 * map_conf; 4];
        weights[base as usize] = (1.0 - e) * map_conf;
        weights
    }

    pub fn add_evidence(&mut self, is_top: bool, base: u8, qual: u8, map_conf: f64) {
        let weights = Column::evidence(base, qual, map_conf);
        for (slot, w) in self.strand_mut(is_top).iter_mut().zip(weights) {
            *slot += w;
        }
        self.non_gap += 1;
    }

    /// Exact inverse of [`Column::add_evidence`] with the same arguments.
    pub fn remove_evidence(&mut self, is_top: bool, base: u8, qual: u8, map_conf: f64) {
        let weights = Column::evidence(base, qual, map_conf);
        for (slot, w) in self.strand_mut(is_top).iter_mut().zip(weights) {
            *slot -= w;
        }
        self.non_gap = self.non_gap.saturating_sub(1);
    }

    pub fn add_reference(&mut self, base: u8) {
        self.ref_slot = RefSlot::Base(base);
        self.non_gap += 1;
    }

    pub fn remove_reference(&mut self) {
        if let RefSlot::Base(_) = self.ref_slot {
            self.non_gap = self.non_gap.saturating_sub(1);
        }
        self.ref_slot = RefSlot::Absent;
    }

    pub fn add_gap(&mut self, is_top: bool, map_conf: f64) {
        if is_top {
            self.gap_fwd += map_conf;
        } else {
            self.gap_rev += map_conf;
        }
    }

    pub fn remove_gap(&mut self, is_top: bool, map_conf: f64) {
        if is_top {
            self.gap_fwd -= map_conf;
        } else {
            self.gap_rev -= map_conf;
        }
    }

    pub fn total_evidence(&self) -> f64 {
        self.fwd.iter().chain(self.rev.iter()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alphabet::{A, C, G, T};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const EPS: f64 = 1e-9;

    fn assert_close(a: &Column, b: &Column) {
        for i in 0..4 {
            assert!((a.fwd[i] - b.fwd[i]).abs() < EPS);
            assert!((a.rev[i] - b.rev[i]).abs() < EPS);
        }
        assert!((a.gap_fwd - b.gap_fwd).abs() < EPS);
        assert!((a.gap_rev - b.gap_rev).abs() < EPS);
        assert_eq!(a.non_gap, b.non_gap);
        assert_eq!(a.ref_slot, b.ref_slot);
    }

    #[test]
    fn test_add_evidence_weights() {
        let mut col = Column::default();
        col.add_evidence(true, C, 10, 1.0);
        assert!((col.fwd[C as usize] - 0.9).abs() < EPS);
        assert!((col.fwd[A as usize] - 0.1 / 3.0).abs() < EPS);
        assert_eq!(col.rev, [0.0; 4]);
        assert_eq!(col.non_gap, 1);
        assert!((col.total_evidence() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_n_spreads_evenly() {
        let mut col = Column::default();
        col.add_evidence(false, N, 40, 0.8);
        assert_eq!(col.rev, [0.2; 4]);
    }

    #[test]
    fn test_map_confidence() {
        assert!((map_confidence(20) - 0.99).abs() < EPS);
        assert_eq!(map_confidence(255), 1.0);
        assert_eq!(map_confidence(0), 0.0);
    }

    #[test]
    fn test_evidence_reversibility_random_sequence() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut col = Column::default();
        col.add_reference(G);
        col.add_evidence(true, T, 30, 0.99);
        let before = col;

        let calls: Vec<(bool, u8, u8, f64, bool)> = (0..200)
            .map(|_| {
                (
                    rng.random_bool(0.5),
                    rng.random_range(0..5u8),
                    rng.random_range(2..41u8),
                    rng.random_range(0.0..1.0),
                    rng.random_bool(0.2),
                )
            })
            .collect();
        for &(top, base, qual, conf, gap) in &calls {
            if gap {
                col.add_gap(top, conf);
            } else {
                col.add_evidence(top, base, qual, conf);
            }
        }
        for &(top, base, qual, conf, gap) in &calls {
            if gap {
                col.remove_gap(top, conf);
            } else {
                col.remove_evidence(top, base, qual, conf);
            }
        }
        assert_close(&col, &before);
    }

    #[test]
    fn test_reference_slot_lifecycle() {
        let mut col = Column::default();
        assert!(col.is_empty());
        col.add_reference(A);
        assert_eq!(col.ref_slot, RefSlot::Base(A));
        assert!(!col.is_empty());
        col.remove_reference();
        assert_eq!(col.ref_slot, RefSlot::Absent);
        assert!(col.is_empty());
    }
}
