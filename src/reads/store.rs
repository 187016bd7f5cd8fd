//! In-memory alignment collection for one window.

use super::gaps::{self, GapAnchor};
use crate::model::alphabet::reverse_complement;
use crate::utils::Result;

/// Whether a read is the first sequenced mate or its reverse-complemented partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MateRole {
    Original,
    RightMate,
}

/// Read bases (ordinals) and Phred qualities, in sequenced orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadSeq {
    pub name: String,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
}

/// Placement of a read on the gapped window view.
///
/// `begin > end` marks a bottom-strand read. Gap anchors index the read in
/// reference orientation and are relative to `min(begin, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRead {
    pub read_id: usize,
    pub begin: usize,
    pub end: usize,
    pub gaps: Vec<GapAnchor>,
    pub role: MateRole,
    pub mapq: u8,
    pub has_indel: bool,
}

impl AlignedRead {
    pub fn is_top(&self) -> bool {
        self.begin < self.end
    }

    pub fn min_pos(&self) -> usize {
        self.begin.min(self.end)
    }

    pub fn max_pos(&self) -> usize {
        self.begin.max(self.end)
    }
}

/// Window reference: ordinal bases plus the gaps it picked up from insertions.
#[derive(Debug, Clone, PartialEq)]
pub struct Contig {
    pub name: String,
    /// Genomic coordinate of the first reference base.
    pub offset: u64,
    pub bases: Vec<u8>,
    pub gaps: Vec<GapAnchor>,
}

impl Contig {
    pub fn view_len(&self) -> usize {
        gaps::view_len(&self.gaps, self.bases.len())
    }

    /// Reference base at a view position, or `None` for a reference gap.
    pub fn base_at(&self, view_pos: usize) -> Option<u8> {
        gaps::to_source(&self.gaps, self.bases.len(), view_pos).map(|k| self.bases[k])
    }

    /// Genomic coordinate of the ungapped reference residue `seq_pos`.
    pub fn genomic_pos(&self, seq_pos: usize) -> u64 {
        self.offset + seq_pos as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentStore {
    pub contig: Contig,
    pub reads: Vec<ReadSeq>,
    pub alignments: Vec<AlignedRead>,
}

impl AlignmentStore {
    /// Bases and qualities of an alignment's read in reference orientation.
    pub fn oriented(&self, aln: &AlignedRead) -> (Vec<u8>, Vec<u8>) {
        let read = &self.reads[aln.read_id];
        if aln.is_top() {
            (read.bases.clone(), read.quals.clone())
        } else {
            let mut quals = read.quals.clone();
            quals.reverse();
            (reverse_complement(&read.bases), quals)
        }
    }

    /// Checks the cross-collection invariants the realigner and caller rely on.
    pub fn validate(&self) -> Result<()> {
        for (i, aln) in self.alignments.iter().enumerate() {
            let read = self
                .reads
                .get(aln.read_id)
                .ok_or_else(|| format!("Alignment {} refers to missing read {}", i, aln.read_id))?;
            if read.bases.len() != read.quals.len() {
                return Err(format!(
                    "Read {} has {} bases but {} qualities",
                    read.name,
                    read.bases.len(),
                    read.quals.len()
                ));
            }
            if read.bases.is_empty() {
                return Err(format!("Read {} is empty", read.name));
            }
            if !gaps::validate(&aln.gaps, read.bases.len()) {
                return Err(format!("Read {} has out-of-order gap anchors", read.name));
            }
            let span = aln.max_pos() - aln.min_pos();
            if gaps::view_len(&aln.gaps, read.bases.len()) != span {
                return Err(format!(
                    "Read {} spans {} view positions but its gaps cover {}",
                    read.name,
                    span,
                    gaps::view_len(&aln.gaps, read.bases.len())
                ));
            }
        }
        if !gaps::validate(&self.contig.gaps, self.contig.bases.len()) {
            return Err(format!("Contig {} has out-of-order gap anchors", self.contig.name));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::model::alphabet::encode_seq;

    /// Ungapped top-strand read placed at `begin`.
    pub fn top_read(store: &mut AlignmentStore, seq: &[u8], begin: usize, qual: u8) {
        push_read(store, seq, begin, qual, true, MateRole::Original);
    }

    /// Ungapped bottom-strand read whose reference-orientation sequence is `seq`.
    pub fn bottom_read(store: &mut AlignmentStore, seq: &[u8], begin: usize, qual: u8) {
        push_read(store, seq, begin, qual, false, MateRole::Original);
    }

    pub fn push_read(
        store: &mut AlignmentStore,
        seq: &[u8],
        begin: usize,
        qual: u8,
        top: bool,
        role: MateRole,
    ) {
        let forward = encode_seq(seq);
        let bases = if top {
            forward
        } else {
            reverse_complement(&forward)
        };
        let read_id = store.reads.len();
        store.reads.push(ReadSeq {
            name: format!("read{}", read_id),
            quals: vec![qual; bases.len()],
            bases,
        });
        let (b, e) = if top {
            (begin, begin + seq.len())
        } else {
            (begin + seq.len(), begin)
        };
        store.alignments.push(AlignedRead {
            read_id,
            begin: b,
            end: e,
            gaps: Vec::new(),
            role,
            mapq: 60,
            has_indel: false,
        });
    }

    pub fn store_for(reference: &[u8]) -> AlignmentStore {
        AlignmentStore {
            contig: Contig {
                name: "chr1".to_string(),
                offset: 0,
                bases: encode_seq(reference),
                gaps: Vec::new(),
            },
            reads: Vec::new(),
            alignments: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use crate::model::alphabet::{encode_seq, C, G};

    #[test]
    fn test_oriented_restores_reference_orientation() {
        let mut store = store_for(b"ACGTACGT");
        bottom_read(&mut store, b"CGTA", 1, 30);
        let aln = store.alignments[0].clone();
        assert!(!aln.is_top());
        assert_eq!(aln.min_pos(), 1);
        assert_eq!(aln.max_pos(), 5);
        let (bases, quals) = store.oriented(&aln);
        assert_eq!(bases, encode_seq(b"CGTA"));
        assert_eq!(quals, vec![30; 4]);
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_contig_base_at_gap() {
        let mut store = store_for(b"ACGT");
        store.contig.gaps = vec![GapAnchor::new(2, 3)];
        assert_eq!(store.contig.view_len(), 5);
        assert_eq!(store.contig.base_at(1), Some(C));
        assert_eq!(store.contig.base_at(2), None);
        assert_eq!(store.contig.base_at(3), Some(G));
    }

    #[test]
    fn test_validate_rejects_length_mismatch() {
        let mut store = store_for(b"ACGT");
        top_read(&mut store, b"ACG", 0, 30);
        store.reads[0].quals.pop();
        assert!(store.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_span_mismatch() {
        let mut store = store_for(b"ACGT");
        top_read(&mut store, b"ACG", 0, 30);
        store.alignments[0].end = 4;
        assert!(store.validate().is_err());
    }
}
