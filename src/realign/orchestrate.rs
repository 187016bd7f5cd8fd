//! Realignment of a whole alignment store: working copies in, gap lists out.

use super::engine::{RealignParams, RealignStats, Realigner, WorkRead};
use super::profile::map_confidence;
use crate::model::ScoringModel;
use crate::reads::{gaps, AlignmentStore, MateRole};
use crate::utils::Result;

const REFERENCE_QUAL: u8 = 40;

/// Trims leading and trailing gaps off a row, returning the offset of the first residue.
fn trim_row(mut row: gaps::Row) -> (usize, gaps::Row) {
    let lead = row.iter().take_while(|c| c.is_none()).count();
    let trail = row.iter().rev().take_while(|c| c.is_none()).count();
    if lead == row.len() {
        return (0, Vec::new());
    }
    row.truncate(row.len() - trail);
    row.drain(..lead);
    (lead, row)
}

/// Realigns every read of `store` to convergence and writes the new placements
/// and gap lists back, contig included. Returns the score of each pass.
pub fn realign_store(
    store: &mut AlignmentStore,
    model: &ScoringModel,
    params: &RealignParams,
    stats: &mut RealignStats,
) -> Result<Vec<f64>> {
    store.validate()?;
    if store.contig.bases.is_empty() {
        return Err(format!("Contig {} has no reference bases", store.contig.name));
    }

    let mut order: Vec<usize> = (0..store.alignments.len()).collect();
    order.sort_by_key(|&i| store.alignments[i].min_pos());

    let mut reads = Vec::with_capacity(order.len() + 1);
    let mut num_columns = store.contig.view_len();
    for &i in &order {
        let aln = &store.alignments[i];
        let (bases, quals) = store.oriented(aln);
        let row = gaps::expand(&aln.gaps, bases.len());
        num_columns = num_columns.max(aln.min_pos() + row.len());
        reads.push(WorkRead::new(
            bases,
            quals,
            aln.min_pos(),
            row,
            aln.is_top(),
            aln.role,
            map_confidence(aln.mapq),
            false,
        ));
    }

    let contig = &store.contig;
    let (ref_begin, ref_row) = trim_row(gaps::expand(&contig.gaps, contig.bases.len()));
    reads.push(WorkRead::new(
        contig.bases.clone(),
        vec![REFERENCE_QUAL; contig.bases.len()],
        ref_begin,
        ref_row,
        true,
        MateRole::Original,
        1.0,
        true,
    ));

    let mut realigner = Realigner::new(model, params, reads, num_columns);
    let scores = realigner.run(stats);
    stats.groups += 1;

    let num_columns = realigner.columns.len();
    let mut work = realigner.reads;
    let reference = work.pop().ok_or("Realignment lost the reference row")?;
    let mut full_row = vec![None; reference.begin];
    full_row.extend_from_slice(&reference.row);
    full_row.resize(num_columns.max(full_row.len()), None);
    store.contig.gaps = gaps::compact(&full_row);

    for (read, &i) in work.iter().zip(&order) {
        let aln = &mut store.alignments[i];
        let (lo, hi) = (read.begin, read.end());
        if aln.is_top() {
            (aln.begin, aln.end) = (lo, hi);
        } else {
            (aln.begin, aln.end) = (hi, lo);
        }
        aln.gaps = gaps::compact(&read.row);
    }
    log::debug!(
        "{}: realigned {} reads in {} passes, {} columns",
        store.contig.name,
        order.len(),
        scores.len(),
        num_columns
    );
    Ok(scores)
}
