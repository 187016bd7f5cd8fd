//! Joint diploid genotype and methylation-level decision for one position.
//!
//! Each read base is scored against six haploid hypotheses: the four bases plus
//! methylated C and methylated G. Genotypes carrying a C are scored on top-strand
//! reads with a methylation level that is maximized; genotypes carrying a G
//! likewise on bottom-strand reads.

use super::pileup::{BaseObs, PositionEvidence, RefContext, StrandEvidence};
use super::stats::CallStats;
use super::CallParams;
use crate::model::alphabet::{complement, A, C, G, N, T};
use crate::model::{seq_error_freqs, Detail};
use crate::reads::MateRole;
use crate::utils::{normalize_log_probs, phred_to_error};
use arrayvec::ArrayVec;

const CM: usize = 4;
const GM: usize = 5;
const NUM_GENOTYPES: usize = 10;
const NEWTON_ITERATIONS: usize = 10;
const GRID_STEPS: usize = 100;

/// Unordered diploid genotype; `0 <= first <= second < 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Genotype {
    pub first: u8,
    pub second: u8,
}

impl Genotype {
    pub fn new(a: u8, b: u8) -> Self {
        Genotype {
            first: a.min(b),
            second: a.max(b),
        }
    }

    pub fn hom(base: u8) -> Self {
        Genotype::new(base, base)
    }

    pub fn is_hom(&self) -> bool {
        self.first == self.second
    }

    pub fn contains(&self, base: u8) -> bool {
        self.first == base || self.second == base
    }

    /// The allele that is not `base`, or `base` for a homozygote.
    fn other(&self, base: u8) -> u8 {
        if self.first == base {
            self.second
        } else {
            self.first
        }
    }
}

/// All ten genotypes in `AA, AC, AG, AT, CC, CG, ... TT` order.
pub fn all_genotypes() -> ArrayVec<Genotype, NUM_GENOTYPES> {
    let mut genotypes = ArrayVec::new();
    for a in A..=T {
        for b in a..=T {
            genotypes.push(Genotype::new(a, b));
        }
    }
    genotypes
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethCall {
    pub genotype: Genotype,
    /// Natural log of the ratio between the best and second-best posteriors.
    pub score: f64,
    pub genotype_prob: f64,
    /// Methylation level of the C allele, or of the G allele when there is no C.
    pub meth_level1: Option<f64>,
    /// Methylation level of the G allele of a CG genotype.
    pub meth_level2: Option<f64>,
    pub genotype_called: bool,
    pub meth_called: bool,
}

/// Probability of observing `base` given each haploid hypothesis.
fn haplotype_probs(top: bool, obs: &BaseObs, params: &CallParams) -> [f64; 6] {
    let e = phred_to_error(obs.qual as f64);
    let table = seq_error_freqs(Detail::NonSimple);
    let (conv_base, conv_target, conv_meth) = if top { (C, T, CM) } else { (G, A, GM) };
    let i = obs.base;
    let err = |truth: u8| -> f64 {
        if !params.non_uniform_errors {
            return e / 3.0;
        }
        let (t, o) = match obs.role {
            MateRole::Original => (truth, i),
            MateRole::RightMate => (complement(truth), complement(i)),
        };
        e * table[t as usize * 5 + o as usize]
    };

    let mut probs = [0.0; 6];
    for (h, prob) in probs.iter_mut().enumerate() {
        let truth = match h {
            CM => C,
            GM => G,
            _ => h as u8,
        };
        *prob = if truth == conv_base {
            let rate = if h == conv_meth {
                params.meth_conv_rate
            } else {
                params.conv_rate
            };
            if i == conv_base {
                (1.0 - e) * (1.0 - rate)
            } else if i == conv_target {
                err(truth) + (1.0 - e) * rate
            } else {
                err(truth)
            }
        } else if i == truth {
            1.0 - e
        } else {
            err(truth)
        };
        if params.use_mapq {
            let em = phred_to_error(obs.mapq as f64);
            *prob = (1.0 - em) * *prob + em * 0.25;
        }
    }
    probs
}

/// Per-read factors `c0 + c1 * beta` of a methylation-dependent likelihood.
type Factors = Vec<(f64, f64)>;

fn log_lhood(factors: &[(f64, f64)], beta: f64) -> f64 {
    factors.iter().map(|(c0, c1)| (c0 + c1 * beta).ln()).sum()
}

fn grid_maximum(factors: &[(f64, f64)]) -> (f64, f64) {
    let mut best = (0.0, f64::NEG_INFINITY);
    for step in 0..=GRID_STEPS {
        let beta = step as f64 / GRID_STEPS as f64;
        let ll = log_lhood(factors, beta);
        if ll > best.1 {
            best = (beta, ll);
        }
    }
    best
}

/// First and second derivatives of the log-likelihood at `beta`.
fn derivatives(factors: &[(f64, f64)], beta: f64) -> (f64, f64) {
    factors.iter().fold((0.0, 0.0), |(d1, d2), (c0, c1)| {
        let v = c0 + c1 * beta;
        (d1 + c1 / v, d2 - (c1 * c1) / (v * v))
    })
}

fn newton_maximum(factors: &[(f64, f64)], guess: f64) -> Option<(f64, f64)> {
    let mut beta = guess.clamp(0.0, 1.0);
    for _ in 0..NEWTON_ITERATIONS {
        let (d1, d2) = derivatives(factors, beta);
        if !(d2 < 0.0) || !d1.is_finite() {
            break;
        }
        let next = (beta - d1 / d2).clamp(0.0, 1.0);
        let done = (next - beta).abs() < 1e-12;
        beta = next;
        if done {
            break;
        }
    }
    let (_, d2) = derivatives(factors, beta);
    let ll = log_lhood(factors, beta);
    (d2 < 0.0 && ll.is_finite()).then_some((beta, ll))
}

/// Methylation level maximizing the likelihood, with its log-likelihood.
fn maximize_beta(factors: &[(f64, f64)], guess: f64, params: &CallParams, stats: &mut CallStats) -> (f64, f64) {
    if factors.is_empty() {
        return (guess.clamp(0.0, 1.0), 0.0);
    }
    if params.beta_sampling {
        return grid_maximum(factors);
    }
    match newton_maximum(factors, guess) {
        Some(best) => {
            stats.count_no_plan_b += 1;
            best
        }
        None => {
            stats.count_plan_b += 1;
            grid_maximum(factors)
        }
    }
}

/// Starting point for the methylation level of `g` on one strand.
fn beta_guess(g: Genotype, ev: &StrandEvidence, unconverted: u8, converted: u8) -> f64 {
    let kept = ev.count(unconverted) as f64;
    let total = ev.count(unconverted) + ev.count(converted);
    if g == Genotype::new(unconverted, converted) {
        let diff = ev.count(converted) as i64 - (total / 2) as i64;
        if diff > 0 {
            kept / (kept + diff as f64)
        } else {
            1.0
        }
    } else {
        kept / total as f64
    }
}

fn log_priors(ref_base: u8, params: &CallParams) -> [f64; NUM_GENOTYPES] {
    let mut priors = [(1.0 / NUM_GENOTYPES as f64).ln(); NUM_GENOTYPES];
    if !params.genotype_priors {
        return priors;
    }
    let (het, homo) = (params.prob_het, params.prob_homo);
    let raw: ArrayVec<f64, NUM_GENOTYPES> = all_genotypes()
        .iter()
        .map(|g| match (g.is_hom(), g.contains(ref_base)) {
            (true, true) => 1.0 - het - homo,
            (false, true) => het / 3.0,
            (true, false) => homo / 3.0,
            (false, false) => het * homo / 3.0,
        })
        .collect();
    let total: f64 = raw.iter().sum();
    for (prior, p) in priors.iter_mut().zip(&raw) {
        *prior = (p / total).ln();
    }
    priors
}

struct StrandFactors {
    top: Vec<Factors>,
    bottom: Vec<Factors>,
    fixed: [f64; NUM_GENOTYPES],
}

fn collect_factors(ev: &PositionEvidence, params: &CallParams) -> StrandFactors {
    let genotypes = all_genotypes();
    let mut factors = StrandFactors {
        top: vec![Vec::new(); NUM_GENOTYPES],
        bottom: vec![Vec::new(); NUM_GENOTYPES],
        fixed: [0.0; NUM_GENOTYPES],
    };
    for (top, strand) in [(true, &ev.top), (false, &ev.bottom)] {
        let (meth_base, meth_slot, other_base) = if top { (C, CM, G) } else { (G, GM, C) };
        for obs in &strand.obs {
            if obs.base >= N || obs.qual < 1 || (params.use_mapq && obs.mapq < 1) {
                continue;
            }
            let p = haplotype_probs(top, obs, params);
            for (gi, g) in genotypes.iter().enumerate() {
                if g.contains(meth_base) {
                    let (pc, pcm) = (p[meth_base as usize], p[meth_slot]);
                    let factor = if g.is_hom() {
                        (pc, pcm - pc)
                    } else {
                        let other = if *g == Genotype::new(C, G) {
                            other_base
                        } else {
                            g.other(meth_base)
                        };
                        (0.5 * (pc + p[other as usize]), 0.5 * (pcm - pc))
                    };
                    let target = if top { &mut factors.top } else { &mut factors.bottom };
                    target[gi].push(factor);
                } else {
                    factors.fixed[gi] += (0.5 * p[g.first as usize] + 0.5 * p[g.second as usize]).ln();
                }
            }
        }
    }
    factors
}

/// Decides genotype and methylation levels from the evidence at one position.
pub fn decide(ev: &PositionEvidence, ctx: &RefContext, params: &CallParams, stats: &mut CallStats) -> MethCall {
    let genotypes = all_genotypes();
    let factors = collect_factors(ev, params);
    let top_ct = ev.top.count(C) + ev.top.count(T);
    let bottom_ga = ev.bottom.count(G) + ev.bottom.count(A);

    let mut lhoods = factors.fixed;
    let mut betas: [(Option<f64>, Option<f64>); NUM_GENOTYPES] = [(None, None); NUM_GENOTYPES];
    for (gi, g) in genotypes.iter().enumerate() {
        let mut levels = ArrayVec::<f64, 2>::new();
        if g.contains(C) {
            if top_ct == 0 {
                lhoods[gi] = f64::NEG_INFINITY;
                continue;
            }
            let (beta, ll) = maximize_beta(&factors.top[gi], beta_guess(*g, &ev.top, C, T), params, stats);
            lhoods[gi] += ll;
            levels.push(beta);
        }
        if g.contains(G) {
            if bottom_ga == 0 {
                lhoods[gi] = f64::NEG_INFINITY;
                continue;
            }
            let guess = beta_guess(*g, &ev.bottom, G, A);
            let (beta, ll) = maximize_beta(&factors.bottom[gi], guess, params, stats);
            lhoods[gi] += ll;
            levels.push(beta);
        }
        betas[gi] = (levels.first().copied(), levels.get(1).copied());
    }

    let priors = log_priors(ctx.ref_base, params);
    let log_posts: ArrayVec<f64, NUM_GENOTYPES> = lhoods.iter().zip(&priors).map(|(l, p)| l + p).collect();
    let posts = normalize_log_probs(&log_posts);

    let ref_index = genotypes.iter().position(|g| *g == Genotype::hom(ctx.ref_base)).unwrap_or(0);
    let (mut best, mut second) = (ref_index, ref_index);
    let (mut max1, mut max2) = (0.0, 0.0);
    let mut seen = false;
    for (gi, &post) in posts.iter().enumerate() {
        if post >= max1 {
            if seen {
                second = best;
                max2 = max1;
            }
            best = gi;
            max1 = post;
            seen = true;
        } else if post >= max2 {
            second = gi;
            max2 = post;
        }
    }

    let score = if max1 == 0.0 {
        best = ref_index;
        0.0
    } else {
        log_posts[best] - log_posts[second]
    };
    let genotype = genotypes[best];
    let genotype_called = max1 > 0.0 && score > params.min_score;
    if !genotype_called {
        stats.count_score_too_low += 1;
    }
    let (meth_level1, meth_level2) = betas[best];
    MethCall {
        genotype,
        score,
        genotype_prob: max1,
        meth_level1,
        meth_level2,
        genotype_called,
        meth_called: genotype_called && (genotype.contains(C) || genotype.contains(G)),
    }
}
