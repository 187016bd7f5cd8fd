//! Sequencing error frequency tables.
//!
//! Substitution tables are row-major `[true * 5 + observed]`. Insertion and deletion
//! tables give, per base, the share of indel errors involving that base.

use super::alphabet::ALPHABET_SIZE;

/// Selects between uniform tables and the empirically skewed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Simple,
    NonSimple,
}

pub type SubstTable = [f64; ALPHABET_SIZE * ALPHABET_SIZE];
pub type IndelTable = [f64; ALPHABET_SIZE];

const THIRD: f64 = 1.0 / 3.0;

const SEQ_ERRORS_SIMPLE: SubstTable = [
    0.0, THIRD, THIRD, THIRD, 0.0, //
    THIRD, 0.0, THIRD, THIRD, 0.0, //
    THIRD, THIRD, 0.0, THIRD, 0.0, //
    THIRD, THIRD, THIRD, 0.0, 0.0, //
    0.25, 0.25, 0.25, 0.25, 0.0,
];

// Illumina-like: transitions dominate, A->C and T->G are the usual transversions.
const SEQ_ERRORS_NON_SIMPLE: SubstTable = [
    0.0, 0.35, 0.45, 0.20, 0.0, //
    0.35, 0.0, 0.20, 0.45, 0.0, //
    0.45, 0.20, 0.0, 0.35, 0.0, //
    0.20, 0.45, 0.35, 0.0, 0.0, //
    0.25, 0.25, 0.25, 0.25, 0.0,
];

const INDEL_ERRORS_SIMPLE: IndelTable = [0.2, 0.2, 0.2, 0.2, 0.2];

const INS_ERRORS_NON_SIMPLE: IndelTable = [0.28, 0.22, 0.22, 0.28, 0.0];

const DEL_ERRORS_NON_SIMPLE: IndelTable = [0.27, 0.23, 0.23, 0.27, 0.0];

pub fn seq_error_freqs(detail: Detail) -> &'static SubstTable {
    match detail {
        Detail::Simple => &SEQ_ERRORS_SIMPLE,
        Detail::NonSimple => &SEQ_ERRORS_NON_SIMPLE,
    }
}

pub fn ins_error_freqs(detail: Detail) -> &'static IndelTable {
    match detail {
        Detail::Simple => &INDEL_ERRORS_SIMPLE,
        Detail::NonSimple => &INS_ERRORS_NON_SIMPLE,
    }
}

pub fn del_error_freqs(detail: Detail) -> &'static IndelTable {
    match detail {
        Detail::Simple => &INDEL_ERRORS_SIMPLE,
        Detail::NonSimple => &DEL_ERRORS_NON_SIMPLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitution_rows_sum_to_one() {
        for detail in [Detail::Simple, Detail::NonSimple] {
            let table = seq_error_freqs(detail);
            for row in table.chunks(ALPHABET_SIZE) {
                let sum: f64 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-12, "{:?}: {:?}", detail, row);
            }
            for b in 0..4 {
                assert_eq!(table[b * ALPHABET_SIZE + b], 0.0);
            }
        }
    }

    #[test]
    fn test_indel_tables_sum_to_one() {
        for detail in [Detail::Simple, Detail::NonSimple] {
            let ins: f64 = ins_error_freqs(detail).iter().sum();
            let del: f64 = del_error_freqs(detail).iter().sum();
            assert!((ins - 1.0).abs() < 1e-12);
            assert!((del - 1.0).abs() < 1e-12);
        }
    }
}
