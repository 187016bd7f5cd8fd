//! Run-length gap lists.
//!
//! A gap list maps an ungapped sequence into a gapped view. Each anchor says that
//! source position `seq_pos` sits at view position `gap_pos`; the offset
//! `gap_pos - seq_pos` holds until the next anchor. A final anchor with
//! `seq_pos == len` records trailing gaps.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapAnchor {
    pub seq_pos: usize,
    pub gap_pos: usize,
}

impl GapAnchor {
    pub fn new(seq_pos: usize, gap_pos: usize) -> Self {
        GapAnchor { seq_pos, gap_pos }
    }

    #[inline]
    fn offset(&self) -> usize {
        self.gap_pos - self.seq_pos
    }
}

/// Gapped cells of one row: `Some(k)` holds source residue `k`, `None` is a gap.
pub type Row = Vec<Option<usize>>;

/// View position of source residue `seq_pos`.
pub fn to_view(anchors: &[GapAnchor], seq_pos: usize) -> usize {
    let idx = anchors.partition_point(|a| a.seq_pos <= seq_pos);
    match idx {
        0 => seq_pos,
        _ => seq_pos + anchors[idx - 1].offset(),
    }
}

/// Source residue shown at `view_pos`, or `None` when the view holds a gap there.
pub fn to_source(anchors: &[GapAnchor], seq_len: usize, view_pos: usize) -> Option<usize> {
    let idx = anchors.partition_point(|a| a.gap_pos <= view_pos);
    let (seq_start, view_start) = match idx {
        0 => (0, 0),
        _ => (anchors[idx - 1].seq_pos, anchors[idx - 1].gap_pos),
    };
    // Leading gaps before the first residue of this run.
    if idx == 0 && anchors.first().is_some_and(|a| a.seq_pos == 0) {
        return None;
    }
    let seq_pos = seq_start + (view_pos - view_start);
    let next_seq = anchors.get(idx).map_or(seq_len, |a| a.seq_pos);
    (seq_pos < next_seq.min(seq_len)).then_some(seq_pos)
}

/// Total length of the gapped view.
pub fn view_len(anchors: &[GapAnchor], seq_len: usize) -> usize {
    match anchors.last() {
        Some(last) if last.seq_pos == seq_len => last.gap_pos,
        Some(last) => seq_len + last.offset(),
        None => seq_len,
    }
}

pub fn expand(anchors: &[GapAnchor], seq_len: usize) -> Row {
    let mut row = vec![None; view_len(anchors, seq_len)];
    for k in 0..seq_len {
        row[to_view(anchors, k)] = Some(k);
    }
    row
}

/// Inverse of [`expand`]. Residues must appear in increasing order.
pub fn compact(row: &[Option<usize>]) -> Vec<GapAnchor> {
    let mut anchors = Vec::new();
    let mut offset = 0;
    let mut seq_len = 0;
    for (view_pos, cell) in row.iter().enumerate() {
        if let Some(k) = cell {
            if view_pos - k != offset {
                offset = view_pos - k;
                anchors.push(GapAnchor::new(*k, view_pos));
            }
            seq_len = k + 1;
        }
    }
    if row.len() > seq_len + offset {
        anchors.push(GapAnchor::new(seq_len, row.len()));
    }
    anchors
}

/// Checks that anchors are strictly increasing and never move residues left.
pub fn validate(anchors: &[GapAnchor], seq_len: usize) -> bool {
    let mut last_seq = 0;
    let mut last_offset = 0;
    for (i, a) in anchors.iter().enumerate() {
        if a.gap_pos < a.seq_pos || a.seq_pos > seq_len {
            return false;
        }
        if i > 0 && a.seq_pos <= last_seq {
            return false;
        }
        if a.offset() < last_offset {
            return false;
        }
        last_seq = a.seq_pos;
        last_offset = a.offset();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_then_expand_with_inner_gaps() {
        let row = vec![Some(0), Some(1), None, None, Some(2), Some(3), None, Some(4)];
        let anchors = compact(&row);
        assert_eq!(anchors, vec![GapAnchor::new(2, 4), GapAnchor::new(4, 7)]);
        assert_eq!(expand(&anchors, 5), row);
        assert_eq!(view_len(&anchors, 5), 8);
    }

    #[test]
    fn test_trailing_gaps_anchor() {
        let row = vec![Some(0), None, Some(1), None, None];
        let anchors = compact(&row);
        assert_eq!(anchors, vec![GapAnchor::new(1, 2), GapAnchor::new(2, 5)]);
        assert_eq!(expand(&anchors, 2), row);
    }

    #[test]
    fn test_leading_gaps() {
        let row = vec![None, None, Some(0), Some(1)];
        let anchors = compact(&row);
        assert_eq!(anchors, vec![GapAnchor::new(0, 2)]);
        assert_eq!(to_source(&anchors, 2, 0), None);
        assert_eq!(to_source(&anchors, 2, 2), Some(0));
        assert_eq!(expand(&anchors, 2), row);
    }

    #[test]
    fn test_to_view_and_to_source() {
        let anchors = vec![GapAnchor::new(2, 4)];
        assert_eq!(to_view(&anchors, 0), 0);
        assert_eq!(to_view(&anchors, 1), 1);
        assert_eq!(to_view(&anchors, 2), 4);
        assert_eq!(to_view(&anchors, 3), 5);
        assert_eq!(to_source(&anchors, 4, 1), Some(1));
        assert_eq!(to_source(&anchors, 4, 2), None);
        assert_eq!(to_source(&anchors, 4, 3), None);
        assert_eq!(to_source(&anchors, 4, 5), Some(3));
        assert_eq!(to_source(&anchors, 4, 6), None);
    }

    #[test]
    fn test_ungapped() {
        let row: Row = (0..4).map(Some).collect();
        assert!(compact(&row).is_empty());
        assert_eq!(expand(&[], 4), row);
        assert_eq!(to_source(&[], 4, 3), Some(3));
    }

    #[test]
    fn test_validate() {
        assert!(validate(&[GapAnchor::new(2, 4), GapAnchor::new(4, 7)], 5));
        assert!(!validate(&[GapAnchor::new(2, 1)], 5));
        assert!(!validate(&[GapAnchor::new(3, 5), GapAnchor::new(2, 6)], 5));
        assert!(!validate(&[GapAnchor::new(9, 10)], 5));
    }
}
