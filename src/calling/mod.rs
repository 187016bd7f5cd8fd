//! SNP and methylation calling over realigned read groups.

pub mod genotype;
pub mod pileup;
pub mod stats;

pub use genotype::{all_genotypes, decide, Genotype, MethCall};
pub use pileup::{scan_store, Context, RefContext};
pub use stats::CallStats;

use crate::model::alphabet::{C, G};
use crate::model::ScoringModel;
use crate::reads::{build_store, ParsedRead};
use crate::realign::{realign_store, RealignParams};
use crate::utils::Result;
use arrayvec::ArrayVec;
use std::ops::Range;

/// Reference bases kept on each side of a group so that edge positions keep their context.
pub const CONTEXT_FLANK: u64 = 2;

#[derive(Debug, Clone)]
pub struct CallParams {
    pub min_coverage: usize,
    pub max_coverage: usize,
    pub exclude_border: usize,
    pub min_diff_read_pos: usize,
    pub min_score: f64,
    pub min_prob: f64,
    pub conv_rate: f64,
    pub meth_conv_rate: f64,
    pub prob_het: f64,
    pub prob_homo: f64,
    pub genotype_priors: bool,
    pub beta_sampling: bool,
    pub use_mapq: bool,
    pub non_uniform_errors: bool,
    pub realign: bool,
    pub indel_threshold: usize,
    pub realign_border: u64,
}

impl Default for CallParams {
    fn default() -> Self {
        CallParams {
            min_coverage: 6,
            max_coverage: 500,
            exclude_border: 0,
            min_diff_read_pos: 0,
            min_score: 9.0,
            min_prob: 0.7,
            conv_rate: 0.998,
            meth_conv_rate: 0.0,
            prob_het: 0.005,
            prob_homo: 0.0005,
            genotype_priors: false,
            beta_sampling: false,
            use_mapq: false,
            non_uniform_errors: false,
            realign: false,
            indel_threshold: 3,
            realign_border: 0,
        }
    }
}

/// A methylation level on one strand of a called position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethSite {
    pub strand: char,
    pub context: Context,
    pub level: f64,
}

/// A position that was evaluated and is worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub context: RefContext,
    pub coverage: usize,
    pub top_counts: [u32; 5],
    pub bottom_counts: [u32; 5],
    pub call: MethCall,
    /// Called non-reference genotype passing the probability and read-position filters.
    pub is_snp: bool,
}

impl CallRecord {
    pub fn methylation_sites(&self) -> ArrayVec<MethSite, 2> {
        let mut sites = ArrayVec::new();
        if !self.call.meth_called {
            return sites;
        }
        let g = self.call.genotype;
        let plus = |level| MethSite {
            strand: '+',
            context: self.context.fwd,
            level,
        };
        let minus = |level| MethSite {
            strand: '-',
            context: self.context.rev,
            level,
        };
        if g.contains(C) && g.contains(G) {
            sites.extend(self.call.meth_level1.map(plus));
            sites.extend(self.call.meth_level2.map(minus));
        } else if g.contains(C) {
            sites.extend(self.call.meth_level1.map(plus));
        } else if g.contains(G) {
            sites.extend(self.call.meth_level1.map(minus));
        }
        sites
    }
}

#[derive(Debug, Clone, Default)]
pub struct WindowResult {
    pub records: Vec<CallRecord>,
    pub stats: CallStats,
}

/// Splits reads sorted by start into groups chained by overlapping or abutting
/// reference spans.
pub fn group_reads(reads: &[ParsedRead]) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    while start < reads.len() {
        let mut group_end = reads[start].ref_end();
        let mut end = start + 1;
        while end < reads.len() && reads[end].ref_start <= group_end {
            group_end = group_end.max(reads[end].ref_end());
            end += 1;
        }
        groups.push(start..end);
        start = end;
    }
    groups
}

/// Calls the positions of `window` from reads overlapping it.
///
/// `ref_bases` are ordinals starting at genomic `ref_offset` and must cover every read.
#[allow(clippy::too_many_arguments)]
pub fn call_window(
    contig: &str,
    ref_offset: u64,
    ref_bases: &[u8],
    mut reads: Vec<ParsedRead>,
    window: Range<u64>,
    params: &CallParams,
    realign: &RealignParams,
    model: &ScoringModel,
) -> Result<WindowResult> {
    reads.sort_by_key(|read| read.ref_start);
    let ref_end = ref_offset + ref_bases.len() as u64;
    let mut result = WindowResult::default();

    for group in group_reads(&reads) {
        let members = &reads[group];
        let group_start = members[0].ref_start;
        let group_end = members.iter().map(|r| r.ref_end()).max().unwrap_or(group_start);
        if group_end <= window.start || group_start >= window.end {
            continue;
        }
        if members.len() < params.min_coverage {
            result.stats.groups_skipped += 1;
            continue;
        }

        let border = params.realign_border + CONTEXT_FLANK;
        let slice_start = group_start.saturating_sub(border).max(ref_offset);
        let slice_end = (group_end + border).min(ref_end);
        if group_start < ref_offset || slice_end < group_end {
            return Err(format!(
                "Reads on {} span {}-{} beyond the loaded reference {}-{}",
                contig, group_start, group_end, ref_offset, ref_end
            ));
        }
        let slice = &ref_bases[(slice_start - ref_offset) as usize..(slice_end - ref_offset) as usize];
        let mut store = build_store(contig, slice_start, slice, members)?;

        let indel_reads = members.iter().filter(|r| r.has_indel).count();
        if params.realign && indel_reads >= params.indel_threshold {
            realign_store(&mut store, model, realign, &mut result.stats.realign)?;
        }
        let call_range = group_start.max(window.start)..group_end.min(window.end);
        result
            .records
            .extend(scan_store(&store, call_range, params, &mut result.stats));
    }
    log::debug!(
        "{}:{}-{}: {} reads, {} records",
        contig,
        window.start,
        window.end,
        reads.len(),
        result.records.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alphabet::{encode_seq, A, T};
    use crate::reads::{CigarOp, GapAnchor, MateRole};
    use crate::realign::RealignStats;

    const GENOME: &[u8] = b"TTAGACGTTAACGTATTAGCATATCAGTTACCATGAAGTC";

    fn parsed(seq: &[u8], start: u64, ops: Vec<CigarOp>, top: bool) -> ParsedRead {
        ParsedRead {
            name: format!("r{}", start),
            bases: encode_seq(seq),
            quals: vec![30; seq.len()],
            ref_start: start,
            has_indel: ops.iter().any(|op| matches!(op, CigarOp::Ins(_) | CigarOp::Del(_))),
            ops,
            role: MateRole::Original,
            top,
            mapq: 60,
        }
    }

    fn full(seq: &[u8], top: bool) -> ParsedRead {
        parsed(seq, 0, vec![CigarOp::Match(seq.len() as u32)], top)
    }

    fn snp_reads() -> Vec<ParsedRead> {
        let mut alt = GENOME.to_vec();
        alt[9] = b'T';
        (0..20)
            .map(|i| full(if i < 10 { GENOME } else { &alt[..] }, i % 2 == 0))
            .collect()
    }

    fn run(reads: Vec<ParsedRead>, params: &CallParams) -> WindowResult {
        call_window(
            "chr1",
            0,
            &encode_seq(GENOME),
            reads,
            0..GENOME.len() as u64,
            params,
            &RealignParams::default(),
            &ScoringModel::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_group_reads() {
        let m = |n| vec![CigarOp::Match(n)];
        let reads = vec![
            parsed(b"ACGT", 0, m(4), true),
            parsed(b"ACGT", 3, m(4), true),
            parsed(b"ACGT", 7, m(4), true),
            parsed(b"ACGT", 12, m(4), true),
            parsed(b"ACGT", 20, m(4), false),
        ];
        assert_eq!(group_reads(&reads), vec![0..3, 3..4, 4..5]);
        assert!(group_reads(&[]).is_empty());
    }

    #[test]
    fn test_window_call_reports_snp() {
        let result = run(snp_reads(), &CallParams::default());
        let snps: Vec<_> = result.records.iter().filter(|r| r.is_snp).collect();
        assert_eq!(snps.len(), 1);
        assert_eq!(snps[0].context.pos, 9);
        assert_eq!(snps[0].call.genotype, Genotype::new(A, T));
        assert_eq!(result.stats.realign.groups, 0);
    }

    #[test]
    fn test_indel_free_group_is_unaffected_by_realignment() {
        let plain = run(snp_reads(), &CallParams::default());
        let forced = CallParams {
            realign: true,
            indel_threshold: 0,
            ..CallParams::default()
        };
        let realigned = run(snp_reads(), &forced);
        assert_eq!(realigned.stats.realign.groups, 1);
        assert_eq!(plain.records, realigned.records);
    }

    #[test]
    fn test_small_groups_are_skipped() {
        let reads: Vec<_> = (0..5).map(|i| full(GENOME, i % 2 == 0)).collect();
        let result = run(reads, &CallParams::default());
        assert!(result.records.is_empty());
        assert_eq!(result.stats.groups_skipped, 1);
    }

    fn insertion_reads() -> Vec<ParsedRead> {
        let mut inserted = GENOME[..20].to_vec();
        inserted.extend_from_slice(b"GG");
        inserted.extend_from_slice(&GENOME[20..]);
        let placed = vec![CigarOp::Match(20), CigarOp::Ins(2), CigarOp::Match(20)];
        let shifted = vec![CigarOp::Match(22), CigarOp::Ins(2), CigarOp::Match(18)];
        let mut reads: Vec<_> = (0..5).map(|i| full(GENOME, i % 2 == 0)).collect();
        reads.extend((0..3).map(|i| parsed(&inserted, 0, placed.clone(), i % 2 == 1)));
        reads.extend((0..2).map(|i| parsed(&inserted, 0, shifted.clone(), i % 2 == 0)));
        reads
    }

    #[test]
    fn test_insertion_columns_are_merged_by_realignment() {
        let reads = insertion_reads();
        let mut store = build_store("chr1", 0, &encode_seq(GENOME), &reads).unwrap();
        assert_eq!(store.contig.gaps, vec![GapAnchor::new(20, 22), GapAnchor::new(22, 26)]);

        let mut stats = RealignStats::default();
        realign_store(&mut store, &ScoringModel::default(), &RealignParams::default(), &mut stats).unwrap();
        assert_eq!(store.contig.gaps, vec![GapAnchor::new(20, 22)]);
        assert_eq!(stats.columns_removed, 2);
        for aln in &store.alignments[..5] {
            assert_eq!(aln.gaps, vec![GapAnchor::new(20, 22)]);
        }
        for aln in &store.alignments[5..] {
            assert!(aln.gaps.is_empty());
            assert_eq!((aln.min_pos(), aln.max_pos()), (0, 42));
        }
    }

    #[test]
    fn test_insertion_group_is_realigned() {
        let params = CallParams {
            realign: true,
            ..CallParams::default()
        };
        let result = run(insertion_reads(), &params);
        assert_eq!(result.stats.realign.groups, 1);
        assert!(result.records.iter().all(|r| !r.is_snp));

        // Only C/G positions remain worth evaluating once the insertion is in one place.
        let cg = GENOME.iter().filter(|&&b| b == b'C' || b == b'G').count();
        assert_eq!(result.stats.positions_evaluated, cg);
        for pos in [19, 24] {
            let record = result.records.iter().find(|r| r.context.pos == pos).unwrap();
            assert_eq!(record.coverage, 10);
            assert_eq!((record.top_counts[C as usize], record.bottom_counts[C as usize]), (5, 5));
        }

        let unaligned = run(insertion_reads(), &CallParams::default());
        assert_eq!(unaligned.stats.realign.groups, 0);
        assert_eq!(unaligned.stats.positions_evaluated, cg + 2);
    }

    #[test]
    fn test_methylation_sites_by_genotype() {
        let ctx = RefContext {
            pos: 0,
            ref_base: C,
            fwd: Context::Cg,
            rev: Context::Chh,
        };
        let call = MethCall {
            genotype: Genotype::new(C, G),
            score: 20.0,
            genotype_prob: 1.0,
            meth_level1: Some(0.9),
            meth_level2: Some(0.1),
            genotype_called: true,
            meth_called: true,
        };
        let mut record = CallRecord {
            context: ctx,
            coverage: 10,
            top_counts: [0; 5],
            bottom_counts: [0; 5],
            call,
            is_snp: false,
        };
        let sites = record.methylation_sites();
        assert_eq!(sites.len(), 2);
        assert_eq!((sites[0].strand, sites[0].context), ('+', Context::Cg));
        assert_eq!((sites[1].strand, sites[1].level), ('-', 0.1));

        record.call.genotype = Genotype::new(A, G);
        let sites = record.methylation_sites();
        assert_eq!(sites.len(), 1);
        assert_eq!((sites[0].strand, sites[0].level), ('-', 0.9));

        record.call.meth_called = false;
        assert!(record.methylation_sites().is_empty());
    }
}
