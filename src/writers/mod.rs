mod bed;
mod vcf;

pub use bed::BedWriter;
pub use vcf::VcfWriter;
