//! Banded three-state (Gotoh) global alignment of a read against a profile band.

use super::scoring::{horizontal_gap, match_score, vertical_gap, CellPos, Kind, TargetFreqs, Variant};
use crate::model::ScoringModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignOp {
    /// Band column aligned to a read base: `(column, read_pos)`.
    Match(usize, usize),
    /// Band column skipped by the read.
    ProfileOnly(usize),
    /// Read base inserted between band columns.
    ReadOnly(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandAlignment {
    pub score: f64,
    pub ops: Vec<AlignOp>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    M,
    H,
    V,
}

const NEG: f64 = f64::NEG_INFINITY;

#[derive(Clone, Copy)]
struct Cell {
    score: [f64; 3],
    from: [State; 3],
}

const EMPTY: Cell = Cell {
    score: [NEG; 3],
    from: [State::M; 3],
};

fn best_of(scores: [f64; 3], add: [f64; 3]) -> (f64, State) {
    let mut best = (scores[0] + add[0], State::M);
    for (s, state) in [(scores[1] + add[1], State::H), (scores[2] + add[2], State::V)] {
        if s > best.0 {
            best = (s, state);
        }
    }
    best
}

/// Aligns `bases` against `band`, restricted to diagonals `col - row` in `[lo, hi]`.
///
/// The range is widened as needed so that both corners of the matrix are reachable.
/// Deletions on the first and last rows take the end-gap score; insertions are
/// priced the same everywhere. Gap open and extend scores coincide.
#[allow(clippy::too_many_arguments)]
pub fn align_banded(
    model: &ScoringModel,
    kind: Kind,
    band: &[TargetFreqs],
    bases: &[u8],
    quals: &[u8],
    lo: isize,
    hi: isize,
) -> BandAlignment {
    let n = band.len() as isize;
    let m = bases.len() as isize;
    let lo = lo.max(-m).min(0).min(n - m);
    let hi = hi.min(n).max(0).max(n - m);
    let width = (hi - lo + 1) as usize;

    let vertical: Vec<f64> = bases
        .iter()
        .zip(quals)
        .map(|(&b, &q)| vertical_gap(model, kind, b, q))
        .collect();
    let inner = Variant {
        kind,
        cell: CellPos::Inner,
    };
    let horizontal_inner: Vec<f64> = band.iter().map(|tf| horizontal_gap(model, inner, tf)).collect();
    let horizontal_edge = |i: isize, j: usize| {
        let cell = if i == 0 { CellPos::First } else { CellPos::Last };
        horizontal_gap(model, Variant { kind, cell }, &band[j])
    };

    let idx = |i: isize, d: isize| (i as usize) * width + (d - lo) as usize;
    let mut dp = vec![EMPTY; (m as usize + 1) * width];

    for i in 0..=m {
        for d in lo..=hi {
            let j = i + d;
            if j < 0 || j > n {
                continue;
            }
            if i == 0 && j == 0 {
                dp[idx(0, d)].score = [0.0, NEG, NEG];
                continue;
            }
            let mut cell = EMPTY;
            if i > 0 && j > 0 {
                let prev = dp[idx(i - 1, d)].score;
                let (ju, ru) = ((j - 1) as usize, (i - 1) as usize);
                let s = match_score(model, kind, &band[ju], bases[ru], quals[ru]);
                let (score, from) = best_of(prev, [s; 3]);
                cell.score[0] = score;
                cell.from[0] = from;
            }
            if j > 0 && d > lo {
                let prev = dp[idx(i, d - 1)].score;
                let g = if i == 0 || i == m {
                    horizontal_edge(i, (j - 1) as usize)
                } else {
                    horizontal_inner[(j - 1) as usize]
                };
                let (score, from) = best_of(prev, [g; 3]);
                cell.score[1] = score;
                cell.from[1] = from;
            }
            if i > 0 && d < hi {
                let prev = dp[idx(i - 1, d + 1)].score;
                let (score, from) = best_of(prev, [vertical[(i - 1) as usize]; 3]);
                cell.score[2] = score;
                cell.from[2] = from;
            }
            dp[idx(i, d)] = cell;
        }
    }

    let (score, mut state) = best_of(dp[idx(m, n - m)].score, [0.0; 3]);
    let mut ops = Vec::with_capacity((m + n) as usize);
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        let cell = dp[idx(i, j - i)];
        match state {
            State::M => {
                ops.push(AlignOp::Match((j - 1) as usize, (i - 1) as usize));
                state = cell.from[0];
                i -= 1;
                j -= 1;
            }
            State::H => {
                ops.push(AlignOp::ProfileOnly((j - 1) as usize));
                state = cell.from[1];
                j -= 1;
            }
            State::V => {
                ops.push(AlignOp::ReadOnly((i - 1) as usize));
                state = cell.from[2];
                i -= 1;
            }
        }
    }
    ops.reverse();
    BandAlignment { score, ops }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alphabet::encode_seq;
    use crate::model::ModelParams;
    use crate::realign::profile::{Column, RefSlot};
    use crate::realign::scoring::target_freqs;

    fn band_from(seq: &[u8], depth: f64) -> Vec<TargetFreqs> {
        encode_seq(seq)
            .into_iter()
            .map(|b| {
                let mut col = Column::default();
                col.fwd[b as usize] = depth;
                col.ref_slot = RefSlot::Base(b);
                col.non_gap = 1;
                target_freqs(Kind::Ct, &col)
            })
            .collect()
    }

    fn count(ops: &[AlignOp]) -> (usize, usize, usize) {
        ops.iter().fold((0, 0, 0), |(m, p, r), op| match op {
            AlignOp::Match(..) => (m + 1, p, r),
            AlignOp::ProfileOnly(_) => (m, p + 1, r),
            AlignOp::ReadOnly(_) => (m, p, r + 1),
        })
    }

    #[test]
    fn test_exact_placement_inside_band() {
        let model = ScoringModel::default();
        let band = band_from(b"GATTACAGATTACA", 5.0);
        let read = encode_seq(b"ACAGAT");
        let quals = vec![30; read.len()];
        let aln = align_banded(&model, Kind::Ct, &band, &read, &quals, 0, 14);
        let first_match = aln
            .ops
            .iter()
            .find_map(|op| match op {
                AlignOp::Match(col, 0) => Some(*col),
                _ => None,
            })
            .unwrap();
        assert_eq!(first_match, 4);
        assert_eq!(count(&aln.ops), (6, 8, 0));
    }

    #[test]
    fn test_ops_cover_both_sequences() {
        let model = ScoringModel::default();
        let band = band_from(b"ACGTACGTAC", 3.0);
        let read = encode_seq(b"ACGTTTACGT");
        let quals = vec![25; read.len()];
        let aln = align_banded(&model, Kind::Ct, &band, &read, &quals, -3, 3);
        let (m, p, r) = count(&aln.ops);
        assert_eq!(m + p, band.len());
        assert_eq!(m + r, read.len());
        let read_positions: Vec<usize> = aln
            .ops
            .iter()
            .filter_map(|op| match op {
                AlignOp::Match(_, k) | AlignOp::ReadOnly(k) => Some(*k),
                _ => None,
            })
            .collect();
        assert_eq!(read_positions, (0..read.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_deletion_is_opened_inside_read() {
        let model = ScoringModel::default();
        let band = band_from(b"GACCAAAATTTTGGTACAG", 8.0);
        let read = encode_seq(b"GACCAAAAGGTACAG");
        let quals = vec![35; read.len()];
        let aln = align_banded(&model, Kind::Ct, &band, &read, &quals, -2, 6);
        assert_eq!(count(&aln.ops), (15, 4, 0));
        let skipped: Vec<AlignOp> = (8..12).map(AlignOp::ProfileOnly).collect();
        assert_eq!(aln.ops[8..12], skipped[..]);
        assert!(aln.ops.contains(&AlignOp::Match(12, 8)));
    }

    #[test]
    fn test_end_gap_score_moves_leading_deletion() {
        let band = band_from(b"CCCACAGTTGGG", 5.0);
        let read = encode_seq(b"CCACAGTTGGG");
        let quals = vec![30; read.len()];

        let bonus = ScoringModel::default();
        let aln = align_banded(&bonus, Kind::Ct, &band, &read, &quals, -2, 3);
        assert_eq!(aln.ops[..2], [AlignOp::ProfileOnly(0), AlignOp::Match(1, 0)]);
        assert_eq!(count(&aln.ops), (11, 1, 0));

        let penalty = ScoringModel::new(&ModelParams {
            end_gap_score: 0.001,
            ..ModelParams::default()
        });
        let aln = align_banded(&penalty, Kind::Ct, &band, &read, &quals, -2, 3);
        assert_eq!(aln.ops[..3], [AlignOp::Match(0, 0), AlignOp::ProfileOnly(1), AlignOp::Match(2, 1)]);
        assert_eq!(count(&aln.ops), (11, 1, 0));
    }

    #[test]
    fn test_edge_deletions_take_end_gap_score() {
        let model = ScoringModel::default();
        let band = band_from(b"TTACGTTT", 4.0);
        let read = encode_seq(b"ACGT");
        let quals = vec![30; read.len()];
        let aln = align_banded(&model, Kind::Ct, &band, &read, &quals, 0, 4);
        let expected: Vec<AlignOp> = [AlignOp::ProfileOnly(0), AlignOp::ProfileOnly(1)]
            .into_iter()
            .chain((0..4).map(|k| AlignOp::Match(k + 2, k)))
            .chain([AlignOp::ProfileOnly(6), AlignOp::ProfileOnly(7)])
            .collect();
        assert_eq!(aln.ops, expected);
        let matches: f64 = (0..4).map(|k| match_score(&model, Kind::Ct, &band[k + 2], read[k], 30)).sum();
        let edge = 4.0 * model.end_gap_score.log10();
        assert!((aln.score - matches - edge).abs() < 1e-9);
    }
}
