//! Strand- and conversion-aware log10 scores for aligning a read against profile columns.
//!
//! One function family serves every policy; the [`Variant`] passed by value selects
//! which strand's counts, which complement lookups and which edge rule apply.

use super::profile::{Column, RefSlot};
use crate::model::alphabet::{complement, A, C, G, N, T};
use crate::model::ScoringModel;
use crate::reads::MateRole;
use crate::utils::phred_to_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The reference row realigned against the reads.
    Ref,
    /// Top strand, original read.
    Ct,
    /// Top strand, right mate.
    CtRight,
    /// Bottom strand, original read.
    Ga,
    /// Bottom strand, right mate.
    GaRight,
}

impl Kind {
    pub fn select(is_ref: bool, is_top: bool, role: MateRole) -> Kind {
        match (is_ref, is_top, role) {
            (true, _, _) => Kind::Ref,
            (false, true, MateRole::Original) => Kind::Ct,
            (false, true, MateRole::RightMate) => Kind::CtRight,
            (false, false, MateRole::Original) => Kind::Ga,
            (false, false, MateRole::RightMate) => Kind::GaRight,
        }
    }

    fn is_bottom(self) -> bool {
        matches!(self, Kind::Ga | Kind::GaRight)
    }

    /// Index into the read base frequencies for profile base `i`.
    fn read_freq_index(self, i: u8) -> usize {
        if self.is_bottom() {
            complement(i) as usize
        } else {
            i as usize
        }
    }

    /// Whether error tables are looked up on the complementary strand.
    fn complements_errors(self) -> bool {
        matches!(self, Kind::CtRight | Kind::Ga)
    }

    fn error_index(self, i: u8) -> usize {
        if self.complements_errors() {
            complement(i) as usize
        } else {
            i as usize
        }
    }
}

/// Position of a DP row relative to the read: before it starts, inside it, after it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellPos {
    First,
    Inner,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    pub kind: Kind,
    pub cell: CellPos,
}

/// Per-column frequencies derived once per band.
///
/// Read policies use slots 0..4. The reference policy uses top-strand A/G in
/// slots 0 and 2 and bottom-strand C/T in slots 5 and 7.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetFreqs {
    pub freqs: [f64; 8],
    pub gap_freq: f64,
}

fn strand_freqs(col: &Column, bottom: bool) -> TargetFreqs {
    let (own, other, own_gap, other_gap) = if bottom {
        (&col.rev, &col.fwd, col.gap_rev, col.gap_fwd)
    } else {
        (&col.fwd, &col.rev, col.gap_fwd, col.gap_rev)
    };
    let mut freqs = [0.0; 8];
    let observed: f64 = own.iter().sum();
    // The reference counts as one residue of maximal confidence.
    let sum = observed + 1.0 + own_gap;
    if observed != 0.0 || col.ref_slot != RefSlot::Gap {
        for i in 0..4 {
            freqs[i] = own[i] / sum;
        }
    } else {
        freqs[..4].fill(0.25);
    }

    // Half the observed unconverted share, so a converted reference base is not punished.
    let (keep, conv) = if bottom { (G, A) } else { (C, T) };
    let (keep, conv) = (keep as usize, conv as usize);
    let est_meth = if own[keep] + own[conv] > 0.0 {
        0.5 * own[keep] / (own[keep] + own[conv])
    } else {
        0.0
    };

    let mut ref_gap = 0.0;
    match col.ref_slot {
        RefSlot::Base(b) if b < N => {
            let b = b as usize;
            if b == keep {
                freqs[keep] += est_meth / sum;
                freqs[conv] += (1.0 - est_meth) / sum;
            } else {
                freqs[b] += 1.0 / sum;
            }
        }
        RefSlot::Base(_) => {
            for i in 0..4 {
                let share = if i == keep {
                    est_meth
                } else if i == conv {
                    1.0 - est_meth
                } else {
                    1.0
                };
                freqs[i] += share / sum / 4.0;
            }
            ref_gap = 1.0;
        }
        RefSlot::Gap => ref_gap = 1.0,
        RefSlot::Absent => {}
    }

    let other_total: f64 = other.iter().sum::<f64>() + other_gap;
    let gap_freq = (col.gap_fwd + col.gap_rev + ref_gap) / (sum + other_total);
    TargetFreqs { freqs, gap_freq }
}

fn reference_freqs(col: &Column) -> TargetFreqs {
    let mut freqs = [0.0; 8];
    let mut sum_f = col.fwd[A as usize] + col.fwd[G as usize];
    let mut sum_r = col.rev[C as usize] + col.rev[T as usize];
    let informative = sum_f != 0.0 || sum_r != 0.0;
    sum_f += col.gap_fwd;
    sum_r += col.gap_rev;
    if informative {
        freqs[0] = col.fwd[A as usize] / sum_f / 2.0;
        freqs[2] = col.fwd[G as usize] / sum_f / 2.0;
        freqs[5] = col.rev[C as usize] / sum_r / 2.0;
        freqs[7] = col.rev[T as usize] / sum_r / 2.0;
    } else {
        freqs[0] = 0.25;
        freqs[2] = 0.25;
        freqs[5] = 0.25;
        freqs[7] = 0.25;
    }
    let total = sum_f + sum_r;
    let gap_freq = if total > 0.0 {
        (col.gap_fwd + col.gap_rev) / total
    } else {
        0.0
    };
    TargetFreqs { freqs, gap_freq }
}

pub fn target_freqs(kind: Kind, col: &Column) -> TargetFreqs {
    match kind {
        Kind::Ref => reference_freqs(col),
        Kind::Ct | Kind::CtRight => strand_freqs(col, false),
        Kind::Ga | Kind::GaRight => strand_freqs(col, true),
    }
}

#[inline]
fn floor_log10(sc: f64, limit: f64) -> f64 {
    sc.log10().max(limit)
}

/// Score of read base `base` (quality `qual`) against a column.
pub fn match_score(model: &ScoringModel, kind: Kind, tf: &TargetFreqs, base: u8, qual: u8) -> f64 {
    let limit = model.score_limit;
    if kind == Kind::Ref {
        let freq = match base {
            A => tf.freqs[0],
            C => tf.freqs[5],
            G => tf.freqs[2],
            T => tf.freqs[7],
            _ => 0.25,
        };
        return floor_log10(freq / model.ref_base_freqs[base.min(N) as usize], limit);
    }

    let rbf = &model.read_base_freqs;
    if base >= N {
        let sc: f64 = (0..4u8)
            .map(|i| tf.freqs[i as usize] / rbf[kind.read_freq_index(i)])
            .sum::<f64>()
            / 4.0;
        return floor_log10(sc, limit);
    }

    let e = phred_to_error(qual as f64);
    let observed: f64 = tf.freqs[..4].iter().sum();
    let sc = if observed < 0.001 {
        e * model.ins_error_rate * model.ins_errors[kind.error_index(base)]
    } else {
        let mut sc = tf.freqs[base as usize] / rbf[kind.read_freq_index(base)] * (1.0 - e);
        let b = kind.error_index(base);
        for i in (0..4u8).filter(|&i| i != base) {
            let err = model.seq_errors[kind.error_index(i) * 5 + b];
            sc += tf.freqs[i as usize] / rbf[kind.read_freq_index(i)] * e * err;
        }
        sc
    };
    floor_log10(sc, limit)
}

/// Score of skipping a profile column (a gap in the read).
pub fn horizontal_gap(model: &ScoringModel, variant: Variant, tf: &TargetFreqs) -> f64 {
    if variant.cell != CellPos::Inner {
        return model.end_gap_score.log10();
    }
    let kind = variant.kind;
    let sc = if kind == Kind::Ref {
        tf.gap_freq / model.del_rate
    } else {
        let rbf = &model.read_base_freqs;
        // CT and GA-right read deletion errors directly; the other two complemented.
        let mut sc = tf.gap_freq / model.del_rate * (1.0 - model.del_error_rate);
        for i in 0..4u8 {
            sc += tf.freqs[i as usize] / rbf[kind.read_freq_index(i)]
                * model.del_error_rate
                * model.del_errors[kind.error_index(i)];
        }
        sc
    };
    floor_log10(sc / 2.0, model.score_limit)
}

/// Score of inserting read base `base` between profile columns.
pub fn vertical_gap(model: &ScoringModel, kind: Kind, base: u8, qual: u8) -> f64 {
    if kind == Kind::Ref {
        return model.score_limit;
    }
    let e = phred_to_error(qual as f64);
    let sc = e * model.ins_error_rate * model.ins_errors[kind.error_index(base.min(N))];
    floor_log10(sc, model.score_limit)
}
