mod bam_utils;
mod math;
mod readers;
mod region;
mod util;

pub use bam_utils::{get_bam_header, get_contig_lengths, get_sample_name, is_bam_mapped};
pub use math::{normalize_log_probs, phred_to_error};
pub use readers::{fetch_contig_slice, open_genome_reader, open_regions_reader};
pub use region::GenomicRegion;
pub use util::{create_writer, handle_error_and_exit, Result};
