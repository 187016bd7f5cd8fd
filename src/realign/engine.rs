//! Iterative profile realignment.
//!
//! Every read is taken out of the profile, realigned against a band around its
//! previous placement and put back. Passes repeat until the summed alignment
//! score stops improving.

use super::dp::{align_banded, AlignOp};
use super::profile::{Column, RefSlot};
use super::scoring::{target_freqs, Kind};
use crate::model::ScoringModel;
use crate::reads::{gaps::Row, MateRole};

const MAX_RETRIES: usize = 3;
const MAX_PASSES: usize = 4;
const BACKSLIDE_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RealignParams {
    pub band_width: usize,
    pub realign_reference: bool,
}

impl Default for RealignParams {
    fn default() -> Self {
        RealignParams {
            band_width: 4,
            realign_reference: false,
        }
    }
}

/// A strand-normalized working copy of one read, owned by the realigner.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRead {
    /// Bases in reference orientation.
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
    pub begin: usize,
    /// Cells from `begin`; always starts and ends with a residue.
    pub row: Row,
    pub is_top: bool,
    pub role: MateRole,
    pub map_conf: f64,
    pub is_ref: bool,
    detached: bool,
}

impl WorkRead {
    pub fn new(
        bases: Vec<u8>,
        quals: Vec<u8>,
        begin: usize,
        row: Row,
        is_top: bool,
        role: MateRole,
        map_conf: f64,
        is_ref: bool,
    ) -> Self {
        WorkRead {
            bases,
            quals,
            begin,
            row,
            is_top,
            role,
            map_conf,
            is_ref,
            detached: false,
        }
    }

    pub fn end(&self) -> usize {
        self.begin + self.row.len()
    }

    fn kind(&self) -> Kind {
        Kind::select(self.is_ref, self.is_top, self.role)
    }
}

/// Gap weight picked up by a freshly inserted column.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GapInsertion {
    pub fwd: f64,
    pub rev: f64,
    /// Whether the reference row runs through the new column.
    pub ref_spans: bool,
}

/// Counters threaded through realignment; merged by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealignStats {
    pub groups: usize,
    pub passes: usize,
    pub reads_realigned: usize,
    pub singletons: usize,
    pub columns_inserted: usize,
    pub columns_removed: usize,
}

impl RealignStats {
    pub fn merge(&mut self, other: &RealignStats) {
        self.groups += other.groups;
        self.passes += other.passes;
        self.reads_realigned += other.reads_realigned;
        self.singletons += other.singletons;
        self.columns_inserted += other.columns_inserted;
        self.columns_removed += other.columns_removed;
    }
}

pub struct Realigner<'a> {
    model: &'a ScoringModel,
    params: &'a RealignParams,
    pub columns: Vec<Column>,
    pub reads: Vec<WorkRead>,
}

impl<'a> Realigner<'a> {
    /// Builds the initial profile of `num_columns` columns from the reads' rows.
    pub fn new(
        model: &'a ScoringModel,
        params: &'a RealignParams,
        reads: Vec<WorkRead>,
        num_columns: usize,
    ) -> Self {
        let mut realigner = Realigner {
            model,
            params,
            columns: vec![Column::default(); num_columns],
            reads,
        };
        for r in 0..realigner.reads.len() {
            realigner.add_row(r);
        }
        realigner
    }

    fn add_cell(col: &mut Column, read: &WorkRead, cell: Option<usize>) {
        match (cell, read.is_ref) {
            (Some(k), true) => col.add_reference(read.bases[k]),
            (Some(k), false) => col.add_evidence(read.is_top, read.bases[k], read.quals[k], read.map_conf),
            (None, true) => col.ref_slot = RefSlot::Gap,
            (None, false) => col.add_gap(read.is_top, read.map_conf),
        }
    }

    fn remove_cell(col: &mut Column, read: &WorkRead, cell: Option<usize>) {
        match (cell, read.is_ref) {
            (Some(_), true) => col.remove_reference(),
            (Some(k), false) => {
                col.remove_evidence(read.is_top, read.bases[k], read.quals[k], read.map_conf)
            }
            (None, true) => {
                if col.ref_slot == RefSlot::Gap {
                    col.ref_slot = RefSlot::Absent;
                }
            }
            (None, false) => col.remove_gap(read.is_top, read.map_conf),
        }
    }

    fn add_row(&mut self, r: usize) {
        let read = &self.reads[r];
        for (j, &cell) in read.row.iter().enumerate() {
            Realigner::add_cell(&mut self.columns[read.begin + j], read, cell);
        }
    }

    fn remove_row(&mut self, r: usize) {
        let read = &self.reads[r];
        for (j, &cell) in read.row.iter().enumerate() {
            Realigner::remove_cell(&mut self.columns[read.begin + j], read, cell);
        }
    }

    /// Opens a gap at view position `p` in every attached read.
    ///
    /// Reads starting at or after `p` shift right; reads running through it gain a
    /// gap cell. The column itself is not created here.
    pub fn insert_gap_column(&mut self, p: usize) -> GapInsertion {
        let mut ins = GapInsertion::default();
        for read in self.reads.iter_mut().filter(|read| !read.detached) {
            if read.begin >= p {
                read.begin += 1;
            } else if p < read.end() {
                read.row.insert(p - read.begin, None);
                if read.is_ref {
                    ins.ref_spans = true;
                } else if read.is_top {
                    ins.fwd += read.map_conf;
                } else {
                    ins.rev += read.map_conf;
                }
            }
        }
        ins
    }

    /// Removes column `p`, which must hold no residue of any attached read.
    pub fn remove_gap_column(&mut self, p: usize) {
        for read in self.reads.iter_mut().filter(|read| !read.detached) {
            if read.begin > p {
                read.begin -= 1;
            } else if p < read.end() {
                debug_assert!(read.row[p - read.begin].is_none());
                read.row.remove(p - read.begin);
            }
        }
        self.columns.remove(p);
    }

    fn new_column(&mut self, p: usize, r: usize, k: usize) -> Column {
        let ins = self.insert_gap_column(p);
        let mut col = Column {
            gap_fwd: ins.fwd,
            gap_rev: ins.rev,
            ref_slot: if ins.ref_spans {
                RefSlot::Gap
            } else {
                RefSlot::Absent
            },
            ..Column::default()
        };
        Realigner::add_cell(&mut col, &self.reads[r], Some(k));
        col
    }

    /// Realigns read `r` and returns its alignment score.
    pub fn realign_read(&mut self, r: usize, stats: &mut RealignStats) -> f64 {
        let bw = self.params.band_width;
        let begin = self.reads[r].begin;
        let row_len = self.reads[r].row.len();
        let read_len = self.reads[r].bases.len();
        let band_offset = begin.saturating_sub(bw);
        let mut left_diag = (begin - band_offset) as isize - bw as isize;
        let mut right_diag = left_diag + 2 * bw as isize;
        let increase_band_right = self.reads[r].row.iter().filter(|c| c.is_none()).count() as isize;

        self.remove_row(r);
        self.reads[r].detached = true;

        let mut pos = begin;
        let mut survived = false;
        let (mut removed_begin, mut increase_band_left, mut removed_end) = (0isize, 0isize, 0isize);
        for _ in 0..row_len {
            if self.columns[pos].is_empty() {
                self.remove_gap_column(pos);
                stats.columns_removed += 1;
                if survived {
                    increase_band_left += 1;
                    removed_end += 1;
                } else {
                    removed_begin += 1;
                }
            } else {
                survived = true;
                removed_end = 0;
                pos += 1;
            }
        }
        increase_band_left -= removed_end;

        if !survived {
            stats.singletons += 1;
            let at = begin.min(self.columns.len());
            let mut new_cols = Vec::with_capacity(read_len);
            for k in 0..read_len {
                new_cols.push(self.new_column(at + k, r, k));
            }
            stats.columns_inserted += read_len;
            self.columns.splice(at..at, new_cols);
            let read = &mut self.reads[r];
            read.begin = at;
            read.row = (0..read_len).map(Some).collect();
            read.detached = false;
            return 0.0;
        }

        left_diag -= removed_begin;
        right_diag -= removed_begin;
        let band_end = (pos + bw).min(self.columns.len());
        let band_len = (band_end - band_offset) as isize;
        let lo = (left_diag - increase_band_left).max(-(read_len as isize));
        let hi = (right_diag + increase_band_right).min(band_len);

        let read = &self.reads[r];
        let kind = read.kind();
        let band: Vec<_> = self.columns[band_offset..band_end]
            .iter()
            .map(|col| target_freqs(kind, col))
            .collect();
        let aln = align_banded(self.model, kind, &band, &read.bases, &read.quals, lo, hi);

        self.rebuild_band(r, band_offset, band_end, &aln.ops, stats);
        self.reads[r].detached = false;
        stats.reads_realigned += 1;
        aln.score
    }

    fn rebuild_band(
        &mut self,
        r: usize,
        band_offset: usize,
        band_end: usize,
        ops: &[AlignOp],
        stats: &mut RealignStats,
    ) {
        let old_band: Vec<Column> = self.columns[band_offset..band_end].to_vec();
        let is_residue = |op: &AlignOp| !matches!(op, AlignOp::ProfileOnly(_));
        let first = ops.iter().position(is_residue).unwrap_or(0);
        let last = ops.iter().rposition(is_residue).unwrap_or(0);

        let mut new_band = Vec::with_capacity(old_band.len() + ops.len());
        let mut row: Row = Vec::with_capacity(last + 1 - first);
        let mut new_begin = None;
        for (t, op) in ops.iter().enumerate() {
            match *op {
                AlignOp::ProfileOnly(j) => {
                    let mut col = old_band[j];
                    if t > first && t < last {
                        Realigner::add_cell(&mut col, &self.reads[r], None);
                        row.push(None);
                    }
                    new_band.push(col);
                }
                AlignOp::Match(j, k) => {
                    let mut col = old_band[j];
                    Realigner::add_cell(&mut col, &self.reads[r], Some(k));
                    new_begin.get_or_insert(new_band.len());
                    row.push(Some(k));
                    new_band.push(col);
                }
                AlignOp::ReadOnly(k) => {
                    let col = self.new_column(band_offset + new_band.len(), r, k);
                    stats.columns_inserted += 1;
                    new_begin.get_or_insert(new_band.len());
                    row.push(Some(k));
                    new_band.push(col);
                }
            }
        }

        self.columns.splice(band_offset..band_end, new_band);
        let read = &mut self.reads[r];
        read.begin = band_offset + new_begin.unwrap_or(0);
        read.row = row;
    }

    /// Realigns every read once, the reference only when configured to.
    pub fn pass(&mut self, stats: &mut RealignStats) -> f64 {
        let mut profile_score = 0.0;
        for r in 0..self.reads.len() {
            if self.reads[r].is_ref && !self.params.realign_reference {
                continue;
            }
            profile_score += self.realign_read(r, stats);
        }
        stats.passes += 1;
        profile_score
    }

    /// Runs passes until the profile score stops improving; returns each pass's score.
    pub fn run(&mut self, stats: &mut RealignStats) -> Vec<f64> {
        let scores = converge(|| self.pass(stats));
        log::trace!("Realignment pass scores: {:?}", scores);
        scores
    }
}

/// Calls `next_pass` while its score improves on the previous one.
///
/// A pass falling more than `BACKSLIDE_TOLERANCE` below its predecessor uses up a
/// retry and does not stop the loop.
fn converge(mut next_pass: impl FnMut() -> f64) -> Vec<f64> {
    let mut scores = vec![next_pass()];
    let mut old_score = scores[0];
    let mut score = old_score + 1.0;
    let mut retries = 0;
    while score > old_score && retries < MAX_RETRIES && scores.len() < MAX_PASSES {
        old_score = score;
        score = next_pass();
        scores.push(score);
        if score < old_score - BACKSLIDE_TOLERANCE {
            retries += 1;
            score = old_score + 1.0;
        }
    }
    scores
}
