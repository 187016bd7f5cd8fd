pub type CigarOp = rust_htslib::bam::record::Cigar;

pub trait CigarOpExt {
    fn get_ref_len(&self) -> usize;
    fn get_query_len(&self) -> usize;
    fn is_indel(&self) -> bool;
}

impl CigarOpExt for CigarOp {
    fn get_ref_len(&self) -> usize {
        match self {
            CigarOp::Match(len)
            | CigarOp::RefSkip(len)
            | CigarOp::Del(len)
            | CigarOp::Equal(len)
            | CigarOp::Diff(len) => *len as usize,
            CigarOp::Ins(_) | CigarOp::SoftClip(_) | CigarOp::HardClip(_) | CigarOp::Pad(_) => 0,
        }
    }

    fn get_query_len(&self) -> usize {
        match self {
            CigarOp::Match(len)
            | CigarOp::Equal(len)
            | CigarOp::Diff(len)
            | CigarOp::Ins(len)
            | CigarOp::SoftClip(len) => *len as usize,
            CigarOp::RefSkip(_) | CigarOp::Del(_) | CigarOp::HardClip(_) | CigarOp::Pad(_) => 0,
        }
    }

    fn is_indel(&self) -> bool {
        matches!(self, CigarOp::Ins(_) | CigarOp::Del(_) | CigarOp::RefSkip(_))
    }
}

/// Number of query bases soft-clipped at the start and end of the alignment.
pub fn soft_clips(ops: &[CigarOp]) -> (usize, usize) {
    let clip = |op: Option<&CigarOp>| match op {
        Some(CigarOp::SoftClip(len)) => *len as usize,
        _ => 0,
    };
    let mut aligned = ops.iter().filter(|op| !matches!(op, CigarOp::HardClip(_)));
    let lead = clip(aligned.next());
    let trail = clip(aligned.next_back());
    (lead, trail)
}
