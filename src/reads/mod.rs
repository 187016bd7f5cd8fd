mod cigar;
pub mod gaps;
mod loader;
mod store;

pub use cigar::{CigarOp, CigarOpExt};
pub use gaps::GapAnchor;
pub use loader::{build_store, limit_piles, parse_record, strand_and_role, ParsedRead, ReadFilter};
pub use store::{AlignedRead, AlignmentStore, Contig, MateRole, ReadSeq};

#[cfg(test)]
pub(crate) use store::test_utils;
