//! Position scan over a gapped alignment store.

use super::genotype::{decide, Genotype};
use super::stats::CallStats;
use super::{CallParams, CallRecord};
use crate::model::alphabet::{complement, C, G, N};
use crate::reads::{gaps, AlignmentStore, MateRole};
use std::collections::BTreeSet;
use std::ops::Range;

/// Cytosine sequence context on one strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    Cg,
    Chg,
    Chh,
}

impl Context {
    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Cg => "CG",
            Context::Chg => "CHG",
            Context::Chh => "CHH",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefContext {
    /// Genomic coordinate, 0-based.
    pub pos: u64,
    pub ref_base: u8,
    pub fwd: Context,
    pub rev: Context,
}

/// One read base at a position, in reference orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseObs {
    pub base: u8,
    pub qual: u8,
    pub mapq: u8,
    pub role: MateRole,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrandEvidence {
    /// A, C, G, T, N counts.
    pub counts: [u32; 5],
    pub obs: Vec<BaseObs>,
}

impl StrandEvidence {
    pub fn push(&mut self, obs: BaseObs) {
        self.counts[obs.base.min(N) as usize] += 1;
        self.obs.push(obs);
    }

    pub fn count(&self, base: u8) -> u32 {
        self.counts[base.min(N) as usize]
    }

    pub fn coverage(&self) -> u32 {
        self.counts.iter().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionEvidence {
    pub top: StrandEvidence,
    pub bottom: StrandEvidence,
    /// Reads spanning the position, deletions included.
    pub coverage: usize,
    pub has_mismatch: bool,
    /// Distinct 5' read offsets of mismatching bases away from the read borders.
    pub mismatch_read_pos: BTreeSet<usize>,
}

/// Forward and reverse contexts of ungapped reference position `k`.
pub fn sequence_context(bases: &[u8], k: usize) -> (Context, Context) {
    let at = |i: Option<usize>| i.and_then(|i| bases.get(i)).copied();
    let fwd = if at(k.checked_add(1)) == Some(G) {
        Context::Cg
    } else if at(k.checked_add(2)) == Some(G) {
        Context::Chg
    } else {
        Context::Chh
    };
    let rev = if at(k.checked_sub(1)) == Some(C) {
        Context::Cg
    } else if at(k.checked_sub(2)) == Some(C) {
        Context::Chg
    } else {
        Context::Chh
    };
    (fwd, rev)
}

fn gather(store: &AlignmentStore, reads: &[usize], view_pos: usize, ref_base: u8, params: &CallParams) -> PositionEvidence {
    let mut ev = PositionEvidence::default();
    for &i in reads {
        let aln = &store.alignments[i];
        if !(aln.min_pos() <= view_pos && view_pos < aln.max_pos()) {
            continue;
        }
        ev.coverage += 1;
        let read = &store.reads[aln.read_id];
        let len = read.bases.len();
        let Some(k) = gaps::to_source(&aln.gaps, len, view_pos - aln.min_pos()) else {
            continue;
        };
        let (read_pos, base) = if aln.is_top() {
            (k, read.bases[k])
        } else {
            (len - 1 - k, complement(read.bases[len - 1 - k]))
        };
        if base != ref_base {
            ev.has_mismatch = true;
            if params.min_diff_read_pos > 0
                && len - read_pos > params.exclude_border
                && read_pos >= params.exclude_border
            {
                ev.mismatch_read_pos.insert(read_pos);
            }
        }
        let obs = BaseObs {
            base,
            qual: read.quals[read_pos],
            mapq: aln.mapq,
            role: aln.role,
        };
        if aln.is_top() {
            ev.top.push(obs);
        } else {
            ev.bottom.push(obs);
        }
    }
    ev
}

/// Calls every reference position of `store` whose genomic coordinate lies in `window`.
pub fn scan_store(
    store: &AlignmentStore,
    window: Range<u64>,
    params: &CallParams,
    stats: &mut CallStats,
) -> Vec<CallRecord> {
    let contig = &store.contig;
    let mut order: Vec<usize> = (0..store.alignments.len()).collect();
    order.sort_by_key(|&i| store.alignments[i].min_pos());
    let half_coverage = params.min_coverage as f64 / 2.0;

    let mut records = Vec::new();
    let mut first = 0;
    for view_pos in 0..contig.view_len() {
        let Some(k) = gaps::to_source(&contig.gaps, contig.bases.len(), view_pos) else {
            continue;
        };
        let pos = contig.genomic_pos(k);
        if pos < window.start {
            continue;
        }
        if pos >= window.end {
            break;
        }
        let ref_base = contig.bases[k];
        if ref_base >= N {
            continue;
        }

        while first < order.len() && store.alignments[order[first]].max_pos() <= view_pos {
            first += 1;
        }
        let last = first + order[first..].partition_point(|&i| store.alignments[i].min_pos() <= view_pos);
        if last - first < params.min_coverage {
            continue;
        }

        let ev = gather(store, &order[first..last], view_pos, ref_base, params);
        if ev.coverage < params.min_coverage {
            continue;
        }
        let top_cov = ev.top.coverage() as f64;
        let bottom_cov = ev.bottom.coverage() as f64;
        let one_sided = top_cov <= half_coverage || bottom_cov <= half_coverage;
        if ev.has_mismatch && one_sided {
            stats.count_cov_too_low += 1;
        }

        let is_cg = ref_base == C || ref_base == G;
        if !(is_cg || (ev.has_mismatch && ev.coverage > params.min_coverage)) {
            continue;
        }
        if ev.coverage > params.max_coverage {
            stats.count_cov_too_high += 1;
            continue;
        }
        if one_sided {
            continue;
        }

        let (fwd, rev) = sequence_context(&contig.bases, k);
        let ctx = RefContext { pos, ref_base, fwd, rev };
        let call = decide(&ev, &ctx, params, stats);
        stats.positions_evaluated += 1;

        let differs = call.genotype_called && call.genotype != Genotype::hom(ref_base);
        if !(differs || call.meth_called || is_cg) {
            continue;
        }
        let supported = params.min_diff_read_pos == 0 || ev.mismatch_read_pos.len() >= params.min_diff_read_pos;
        let record = CallRecord {
            context: ctx,
            coverage: ev.coverage,
            top_counts: ev.top.counts,
            bottom_counts: ev.bottom.counts,
            is_snp: differs && supported && call.genotype_prob >= params.min_prob,
            call,
        };
        for site in record.methylation_sites() {
            stats.record_methylation(site.context, site.level);
        }
        if record.is_snp {
            stats.snps_called += 1;
        }
        records.push(record);
    }
    records
}
