//! Bisulfite-aware substitution matrices.
//!
//! `m[observed][truth]` is the probability of reading `observed` when the reference
//! carries `truth`. A reference base first goes through bisulfite conversion and is
//! then sequenced with identity `seq_identity`; a fraction `ref_n_rate` of every
//! column is moved to the `N` row. The `N` column is the identity.

use super::alphabet::{ALPHABET_SIZE, A, C, G, N, T};
use super::error_tables::Detail;

/// Which strand's conversion signature the matrix models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsCase {
    /// Top strand: unmethylated C is read as T.
    Ct,
    /// Bottom strand, in reference orientation: unmethylated G is read as A.
    Ga,
}

impl BsCase {
    fn converted_pair(self) -> (u8, u8) {
        match self {
            BsCase::Ct => (C, T),
            BsCase::Ga => (G, A),
        }
    }
}

const TRANSITION_SHARE: f64 = 2.0 / 3.0;

#[derive(Debug, Clone)]
pub struct BsSubstitutionMatrix {
    pub case: BsCase,
    pub detail: Detail,
    /// `m[observed][truth]`.
    pub m: [[f64; ALPHABET_SIZE]; ALPHABET_SIZE],
    /// Probability that a reference C (G for [`BsCase::Ga`]) ends up converted.
    pub conversion_prob: f64,
    /// Per-pair sequencing error mass for a transition partner.
    pub transition_prob: f64,
    /// Per-pair sequencing error mass for each transversion partner.
    pub transversion_prob: f64,
}

fn is_transition(a: u8, b: u8) -> bool {
    matches!((a, b), (A, G) | (G, A) | (C, T) | (T, C))
}

impl BsSubstitutionMatrix {
    /// Builds the matrix. Arguments are trusted: rates must lie in `[0, 1]`.
    pub fn new(
        case: BsCase,
        detail: Detail,
        meth_rate: f64,
        conv_rate: f64,
        seq_identity: f64,
        ref_n_rate: f64,
    ) -> Self {
        let error = 1.0 - seq_identity;
        let (transition_prob, transversion_prob) = match detail {
            Detail::Simple => (error / 3.0, error / 3.0),
            Detail::NonSimple => (error * TRANSITION_SHARE, error * (1.0 - TRANSITION_SHARE) / 2.0),
        };
        let conversion_prob = (1.0 - meth_rate) * conv_rate;
        let (unconverted, converted) = case.converted_pair();

        let sequencing = |observed: u8, x: u8| -> f64 {
            if observed == x {
                seq_identity
            } else if is_transition(observed, x) {
                transition_prob
            } else {
                transversion_prob
            }
        };

        let mut m = [[0.0; ALPHABET_SIZE]; ALPHABET_SIZE];
        for truth in [A, C, G, T] {
            // Distribution over the base that actually enters the sequencer.
            let mut converted_to = [0.0; 4];
            if truth == unconverted {
                converted_to[unconverted as usize] = 1.0 - conversion_prob;
                converted_to[converted as usize] = conversion_prob;
            } else {
                converted_to[truth as usize] = 1.0;
            }
            for observed in [A, C, G, T] {
                let p: f64 = (0..4u8)
                    .map(|x| converted_to[x as usize] * sequencing(observed, x))
                    .sum();
                m[observed as usize][truth as usize] = p * (1.0 - ref_n_rate);
            }
            m[N as usize][truth as usize] = ref_n_rate;
        }
        m[N as usize][N as usize] = 1.0;

        BsSubstitutionMatrix {
            case,
            detail,
            m,
            conversion_prob,
            transition_prob,
            transversion_prob,
        }
    }

    /// Expected frequency of each observed base when reference bases are uniform over `ACGT`.
    pub fn observed_base_freqs(&self) -> [f64; ALPHABET_SIZE] {
        let mut freqs = [0.0; ALPHABET_SIZE];
        for (observed, freq) in freqs.iter_mut().enumerate() {
            *freq = (0..4).map(|truth| self.m[observed][truth] * 0.25).sum();
        }
        freqs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_columns_stochastic(matrix: &BsSubstitutionMatrix) {
        for truth in 0..ALPHABET_SIZE {
            let sum: f64 = (0..ALPHABET_SIZE).map(|obs| matrix.m[obs][truth]).sum();
            assert!(
                (sum - 1.0).abs() < 1e-9,
                "column {} sums to {} for {:?}",
                truth,
                sum,
                matrix.case
            );
        }
    }

    #[test]
    fn test_column_stochastic_over_parameter_grid() {
        for case in [BsCase::Ct, BsCase::Ga] {
            for detail in [Detail::Simple, Detail::NonSimple] {
                for meth in [0.0, 0.3, 1.0] {
                    for conv in [0.0, 0.5, 0.998] {
                        for identity in [0.9, 0.99, 1.0] {
                            for n_rate in [0.0, 0.01] {
                                let matrix =
                                    BsSubstitutionMatrix::new(case, detail, meth, conv, identity, n_rate);
                                assert_columns_stochastic(&matrix);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_ct_conversion_moves_c_to_t() {
        let matrix = BsSubstitutionMatrix::new(BsCase::Ct, Detail::Simple, 0.0, 1.0, 1.0, 0.0);
        assert_eq!(matrix.m[T as usize][C as usize], 1.0);
        assert_eq!(matrix.m[C as usize][C as usize], 0.0);
        assert_eq!(matrix.m[G as usize][G as usize], 1.0);
        assert_eq!(matrix.m[A as usize][G as usize], 0.0);
    }

    #[test]
    fn test_ga_conversion_moves_g_to_a() {
        let matrix = BsSubstitutionMatrix::new(BsCase::Ga, Detail::Simple, 0.25, 1.0, 1.0, 0.0);
        assert!((matrix.m[A as usize][G as usize] - 0.75).abs() < 1e-12);
        assert!((matrix.m[G as usize][G as usize] - 0.25).abs() < 1e-12);
        assert_eq!(matrix.m[C as usize][C as usize], 1.0);
    }

    #[test]
    fn test_non_simple_splits_error_mass() {
        let matrix = BsSubstitutionMatrix::new(BsCase::Ct, Detail::NonSimple, 1.0, 0.0, 0.97, 0.0);
        assert!((matrix.transition_prob - 0.02).abs() < 1e-12);
        assert!((matrix.transversion_prob - 0.005).abs() < 1e-12);
        assert!((matrix.m[G as usize][A as usize] - 0.02).abs() < 1e-12);
        assert!((matrix.m[C as usize][A as usize] - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_observed_freqs_skew_towards_t() {
        let matrix = BsSubstitutionMatrix::new(BsCase::Ct, Detail::Simple, 0.0, 0.998, 0.99, 0.0);
        let freqs = matrix.observed_base_freqs();
        assert!(freqs[T as usize] > freqs[C as usize]);
        let sum: f64 = freqs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ga_observed_freqs_complement_ct() {
        let ct = BsSubstitutionMatrix::new(BsCase::Ct, Detail::NonSimple, 0.2, 0.998, 0.99, 0.01);
        let ga = BsSubstitutionMatrix::new(BsCase::Ga, Detail::NonSimple, 0.2, 0.998, 0.99, 0.01);
        let (ct, ga) = (ct.observed_base_freqs(), ga.observed_base_freqs());
        for (b, comp) in [(A, T), (C, G), (G, C), (T, A), (N, N)] {
            assert!((ct[b as usize] - ga[comp as usize]).abs() < 1e-12);
        }
    }
}
