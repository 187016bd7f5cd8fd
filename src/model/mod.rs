//! Error and substitution model shared read-only by every realignment window.

pub mod alphabet;
mod error_tables;
mod subst;

pub use error_tables::{
    del_error_freqs, ins_error_freqs, seq_error_freqs, Detail, IndelTable, SubstTable,
};
pub use subst::{BsCase, BsSubstitutionMatrix};

use alphabet::ALPHABET_SIZE;

/// Parameters the model is built from. Validation happens at the command line.
#[derive(Debug, Clone)]
pub struct ModelParams {
    pub global_meth_rate: f64,
    pub bs_conv_rate: f64,
    pub seq_identity: f64,
    pub ref_n_rate: f64,
    pub non_simple_subst: bool,
    pub non_simple_ins: bool,
    pub non_simple_del: bool,
    pub del_rate: f64,
    pub del_error_rate: f64,
    pub ins_error_rate: f64,
    pub end_gap_score: f64,
    pub score_limit: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            global_meth_rate: 0.0,
            bs_conv_rate: 0.998,
            seq_identity: 0.99,
            ref_n_rate: 0.0,
            non_simple_subst: false,
            non_simple_ins: false,
            non_simple_del: false,
            del_rate: 0.0025,
            del_error_rate: 0.001,
            ins_error_rate: 0.001,
            end_gap_score: 4.5,
            score_limit: -10.0,
        }
    }
}

fn detail(non_simple: bool) -> Detail {
    if non_simple {
        Detail::NonSimple
    } else {
        Detail::Simple
    }
}

/// Everything the realignment scores consult, built once per run.
#[derive(Debug, Clone)]
pub struct ScoringModel {
    pub seq_errors: SubstTable,
    pub ins_errors: IndelTable,
    pub del_errors: IndelTable,
    /// Base composition of top-strand reads; bottom-strand policies look it up complemented.
    pub read_base_freqs: [f64; ALPHABET_SIZE],
    pub ref_base_freqs: [f64; ALPHABET_SIZE],
    pub del_rate: f64,
    pub del_error_rate: f64,
    pub ins_error_rate: f64,
    pub end_gap_score: f64,
    pub score_limit: f64,
}

impl ScoringModel {
    pub fn new(params: &ModelParams) -> Self {
        let subst_detail = detail(params.non_simple_subst);
        let read_base_freqs = BsSubstitutionMatrix::new(
            BsCase::Ct,
            subst_detail,
            params.global_meth_rate,
            params.bs_conv_rate,
            params.seq_identity,
            params.ref_n_rate,
        )
        .observed_base_freqs();
        ScoringModel {
            seq_errors: *seq_error_freqs(subst_detail),
            ins_errors: *ins_error_freqs(detail(params.non_simple_ins)),
            del_errors: *del_error_freqs(detail(params.non_simple_del)),
            read_base_freqs,
            ref_base_freqs: [0.25; ALPHABET_SIZE],
            del_rate: params.del_rate,
            del_error_rate: params.del_error_rate,
            ins_error_rate: params.ins_error_rate,
            end_gap_score: params.end_gap_score,
            score_limit: params.score_limit,
        }
    }
}

impl Default for ScoringModel {
    fn default() -> Self {
        ScoringModel::new(&ModelParams::default())
    }
}
