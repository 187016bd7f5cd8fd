//! Turns mapped BAM records into a gapped window alignment.
//!
//! Pairwise CIGARs are merged into one multiple alignment: every reference
//! position receives as many insertion columns as the longest insertion any read
//! carries there. Reads fill those columns left-justified and gap the rest.

use super::cigar::{soft_clips, CigarOp, CigarOpExt};
use super::gaps::{self, Row};
use super::store::{AlignedRead, AlignmentStore, Contig, MateRole, ReadSeq};
use crate::model::alphabet::{encode_seq, reverse_complement};
use crate::utils::Result;
use rust_htslib::bam;
use std::collections::HashMap;

const MISSING_QUAL: u8 = 20;

#[derive(Debug, Clone)]
pub struct ReadFilter {
    pub min_mapq: u8,
    pub keep_suboptimal: bool,
    /// Maximum reads kept per start position and strand; zero keeps all.
    pub max_pile: usize,
}

impl Default for ReadFilter {
    fn default() -> Self {
        ReadFilter {
            min_mapq: 1,
            keep_suboptimal: false,
            max_pile: 0,
        }
    }
}

/// A filtered record with soft clips removed, bases in reference orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRead {
    pub name: String,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
    pub ref_start: u64,
    pub ops: Vec<CigarOp>,
    pub role: MateRole,
    pub top: bool,
    pub mapq: u8,
    pub has_indel: bool,
}

impl ParsedRead {
    /// Genomic coordinate one past the last aligned reference base.
    pub fn ref_end(&self) -> u64 {
        self.ref_start + ref_span(&self.ops) as u64
    }
}

/// Bisulfite strand of origin and mate role from the SAM flags.
pub fn strand_and_role(paired: bool, reverse: bool, last: bool) -> (bool, MateRole) {
    let role = if paired && last {
        MateRole::RightMate
    } else {
        MateRole::Original
    };
    let bottom = (!paired && reverse) || (paired && reverse && !last) || (paired && !reverse && last);
    (!bottom, role)
}

pub fn parse_record(rec: &bam::Record, filter: &ReadFilter) -> Option<ParsedRead> {
    if rec.is_unmapped() || rec.cigar_len() == 0 {
        return None;
    }
    if (rec.is_secondary() || rec.is_supplementary()) && !filter.keep_suboptimal {
        return None;
    }
    if rec.mapq() < filter.min_mapq {
        return None;
    }

    let ops: Vec<CigarOp> = rec.cigar().take().to_vec();
    let (lead, trail) = soft_clips(&ops);
    let seq = rec.seq().as_bytes();
    if lead + trail >= seq.len() {
        return None;
    }
    let bases = encode_seq(&seq[lead..seq.len() - trail]);
    let quals = if rec.qual().first() == Some(&255) {
        vec![MISSING_QUAL; bases.len()]
    } else {
        rec.qual()[lead..seq.len() - trail].to_vec()
    };
    let ops: Vec<CigarOp> = ops
        .into_iter()
        .filter(|op| !matches!(op, CigarOp::SoftClip(_) | CigarOp::HardClip(_)))
        .collect();
    let has_indel = ops.iter().any(|op| op.is_indel());
    let (top, role) = strand_and_role(rec.is_paired(), rec.is_reverse(), rec.is_last_in_template());

    Some(ParsedRead {
        name: String::from_utf8_lossy(rec.qname()).to_string(),
        bases,
        quals,
        ref_start: rec.pos().max(0) as u64,
        ops,
        role,
        top,
        mapq: rec.mapq(),
        has_indel,
    })
}

/// Drops reads beyond `max_pile` that share a start position and strand.
pub fn limit_piles(reads: Vec<ParsedRead>, max_pile: usize) -> Vec<ParsedRead> {
    if max_pile == 0 {
        return reads;
    }
    let mut piles: HashMap<(u64, bool), usize> = HashMap::new();
    reads
        .into_iter()
        .filter(|read| {
            let count = piles.entry((read.ref_start, read.top)).or_insert(0);
            *count += 1;
            *count <= max_pile
        })
        .collect()
}

fn ref_span(ops: &[CigarOp]) -> usize {
    ops.iter().map(|op| op.get_ref_len()).sum()
}

/// Longest insertion before each reference position, `ref_len + 1` entries.
fn insertion_columns(reads: &[ParsedRead], offset: u64, ref_len: usize) -> Vec<usize> {
    let mut ins_max = vec![0usize; ref_len + 1];
    for read in reads {
        let mut p = (read.ref_start - offset) as usize;
        let mut run = 0;
        for op in &read.ops {
            match op {
                CigarOp::Ins(len) => run += *len as usize,
                _ => {
                    if run > 0 {
                        ins_max[p] = ins_max[p].max(run);
                        run = 0;
                    }
                    p += op.get_ref_len();
                }
            }
        }
        if run > 0 {
            ins_max[p] = ins_max[p].max(run);
        }
    }
    ins_max
}

/// Appends cells at consecutive view positions, dropping leading gaps.
struct RowBuilder {
    start: usize,
    row: Row,
}

impl RowBuilder {
    fn emit(&mut self, view: usize, cell: Option<usize>) -> Result<()> {
        if self.row.is_empty() {
            if cell.is_none() {
                return Ok(());
            }
            self.start = view;
        }
        if view != self.start + self.row.len() {
            return Err(format!(
                "Non-contiguous alignment row at view position {}",
                view
            ));
        }
        self.row.push(cell);
        Ok(())
    }

    fn finish(mut self) -> (usize, Row) {
        while self.row.last() == Some(&None) {
            self.row.pop();
        }
        (self.start, self.row)
    }
}

fn read_row(
    read: &ParsedRead,
    offset: u64,
    ins_max: &[usize],
    ref_view: &[usize],
) -> Result<(usize, Row)> {
    let block_start = |p: usize| ref_view[p] - ins_max[p];
    let mut builder = RowBuilder {
        start: 0,
        row: Vec::with_capacity(read.bases.len()),
    };
    let mut p = (read.ref_start - offset) as usize;
    let mut k = 0;
    let mut filled = (usize::MAX, 0);

    for op in &read.ops {
        match op {
            CigarOp::Ins(len) => {
                if filled.0 != p {
                    filled = (p, 0);
                }
                for _ in 0..*len {
                    builder.emit(block_start(p) + filled.1, Some(k))?;
                    filled.1 += 1;
                    k += 1;
                }
            }
            CigarOp::Match(len) | CigarOp::Equal(len) | CigarOp::Diff(len) => {
                for _ in 0..*len {
                    let done = if filled.0 == p { filled.1 } else { 0 };
                    for j in done..ins_max[p] {
                        builder.emit(block_start(p) + j, None)?;
                    }
                    builder.emit(ref_view[p], Some(k))?;
                    k += 1;
                    p += 1;
                }
            }
            CigarOp::Del(len) | CigarOp::RefSkip(len) => {
                for _ in 0..*len {
                    let done = if filled.0 == p { filled.1 } else { 0 };
                    for j in done..ins_max[p] {
                        builder.emit(block_start(p) + j, None)?;
                    }
                    builder.emit(ref_view[p], None)?;
                    p += 1;
                }
            }
            CigarOp::SoftClip(_) | CigarOp::HardClip(_) | CigarOp::Pad(_) => {}
        }
    }

    if k != read.bases.len() {
        return Err(format!(
            "CIGAR of {} covers {} bases but the read has {}",
            read.name,
            k,
            read.bases.len()
        ));
    }
    Ok(builder.finish())
}

/// Builds the window alignment over reference bases starting at genomic `offset`.
///
/// Reads must lie inside the reference slice.
pub fn build_store(
    contig_name: &str,
    offset: u64,
    ref_bases: &[u8],
    reads: &[ParsedRead],
) -> Result<AlignmentStore> {
    let ref_len = ref_bases.len();
    for read in reads {
        let start = read.ref_start.checked_sub(offset).ok_or_else(|| {
            format!("Read {} starts before the window reference", read.name)
        })? as usize;
        if start + ref_span(&read.ops) > ref_len {
            return Err(format!("Read {} ends past the window reference", read.name));
        }
    }

    let ins_max = insertion_columns(reads, offset, ref_len);
    let mut ref_view = Vec::with_capacity(ref_len + 1);
    let mut contig_row: Row = Vec::with_capacity(ref_len);
    for (p, &ins) in ins_max.iter().enumerate() {
        contig_row.extend(std::iter::repeat(None).take(ins));
        ref_view.push(contig_row.len());
        if p < ref_len {
            contig_row.push(Some(p));
        }
    }

    let contig = Contig {
        name: contig_name.to_string(),
        offset,
        bases: ref_bases.to_vec(),
        gaps: gaps::compact(&contig_row),
    };

    let mut store_reads = Vec::with_capacity(reads.len());
    let mut alignments = Vec::with_capacity(reads.len());
    for read in reads {
        let (start, row) = read_row(read, offset, &ins_max, &ref_view)?;
        if row.is_empty() {
            continue;
        }
        let end = start + row.len();
        let (begin, end, bases, quals) = if read.top {
            (start, end, read.bases.clone(), read.quals.clone())
        } else {
            let mut quals = read.quals.clone();
            quals.reverse();
            (end, start, reverse_complement(&read.bases), quals)
        };
        alignments.push(AlignedRead {
            read_id: store_reads.len(),
            begin,
            end,
            gaps: gaps::compact(&row),
            role: read.role,
            mapq: read.mapq,
            has_indel: read.has_indel,
        });
        store_reads.push(ReadSeq {
            name: read.name.clone(),
            bases,
            quals,
        });
    }

    Ok(AlignmentStore {
        contig,
        reads: store_reads,
        alignments,
    })
}
