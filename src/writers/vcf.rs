//! Writes SNP calls as VCF records.

use crate::calling::CallRecord;
use crate::model::alphabet::decode;
use crate::utils::Result;
use itertools::Itertools;
use rust_htslib::{
    bam,
    bcf::{self, record::GenotypeAllele, Format},
};
use std::env;

const VCF_LINES: [&str; 6] = [
    r#"##INFO=<ID=FB,Number=4,Type=Integer,Description="Top-strand A,C,G,T counts">"#,
    r#"##INFO=<ID=RB,Number=4,Type=Integer,Description="Bottom-strand A,C,G,T counts">"#,
    r#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#,
    r#"##FORMAT=<ID=DP,Number=1,Type=Integer,Description="Reads spanning the position">"#,
    r#"##FORMAT=<ID=GS,Number=1,Type=Float,Description="Log ratio of the two most likely genotype posteriors">"#,
    r#"##FORMAT=<ID=GP,Number=1,Type=Float,Description="Posterior probability of the genotype">"#,
];

pub struct VcfWriter {
    writer: bcf::Writer,
}

impl VcfWriter {
    /// Creates the output with contig lines taken from the BAM header.
    pub fn new(output_path: &str, sample_name: &str, bam_header: &bam::Header) -> Result<VcfWriter> {
        let mut vcf_header = bcf::header::Header::new();
        for line in VCF_LINES.iter() {
            vcf_header.push_record(line.as_bytes());
        }

        if let Some(records) = bam_header.to_hashmap().get("SQ") {
            for record in records {
                let (Some(name), Some(len)) = (record.get("SN"), record.get("LN")) else {
                    continue;
                };
                let contig_line = format!(r#"##contig=<ID={},length={}>"#, name, len);
                vcf_header.push_record(contig_line.as_bytes());
            }
        }

        let line = format!(
            "##{}Version={}",
            env!("CARGO_PKG_NAME"),
            *crate::cli::FULL_VERSION
        );
        vcf_header.push_record(line.as_bytes());

        let args: Vec<String> = env::args().collect();
        let line = format!("##{}Command={}", env!("CARGO_PKG_NAME"), args.join(" "));
        vcf_header.push_record(line.as_bytes());

        vcf_header.push_sample(sample_name.as_bytes());

        let uncompressed = !output_path.ends_with(".gz");
        let writer = bcf::Writer::from_path(output_path, &vcf_header, uncompressed, Format::Vcf)
            .map_err(|_| format!("Invalid VCF output path: {}", output_path))?;
        Ok(VcfWriter { writer })
    }

    /// Writes one SNP record.
    pub fn write(&mut self, contig: &str, call: &CallRecord) -> Result<()> {
        let ref_base = call.context.ref_base;
        let genotype = call.call.genotype;
        let alts = [genotype.first, genotype.second]
            .into_iter()
            .filter(|&b| b != ref_base)
            .unique()
            .collect_vec();
        let mut alleles = vec![vec![decode(ref_base)]];
        alleles.extend(alts.iter().map(|&b| vec![decode(b)]));
        let allele_index = |base: u8| {
            alts.iter()
                .position(|&b| b == base)
                .map_or(0, |i| i as i32 + 1)
        };

        let rid = self
            .writer
            .header()
            .name2rid(contig.as_bytes())
            .map_err(|_| format!("Contig {} is missing from the VCF header", contig))?;
        let mut record = self.writer.empty_record();
        record.set_rid(Some(rid));
        record.set_pos(call.context.pos as i64);
        let write_err = |e: rust_htslib::errors::Error| format!("Failed to build VCF record: {}", e);
        record.set_id(b"snp").map_err(write_err)?;
        let allele_refs = alleles.iter().map(|a| a.as_slice()).collect_vec();
        record.set_alleles(&allele_refs).map_err(write_err)?;
        record.push_filter("PASS".as_bytes()).map_err(write_err)?;

        let counts = |c: &[u32; 5]| c[..4].iter().map(|&n| n as i32).collect_vec();
        record
            .push_info_integer(b"FB", &counts(&call.top_counts))
            .map_err(write_err)?;
        record
            .push_info_integer(b"RB", &counts(&call.bottom_counts))
            .map_err(write_err)?;

        record
            .push_genotypes(&[
                GenotypeAllele::Unphased(allele_index(genotype.first)),
                GenotypeAllele::Unphased(allele_index(genotype.second)),
            ])
            .map_err(write_err)?;
        record
            .push_format_integer(b"DP", &[call.coverage as i32])
            .map_err(write_err)?;
        record
            .push_format_float(b"GS", &[call.call.score as f32])
            .map_err(write_err)?;
        record
            .push_format_float(b"GP", &[call.call.genotype_prob as f32])
            .map_err(write_err)?;

        self.writer
            .write(&record)
            .map_err(|e| format!("Failed to write VCF record: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::{CallRecord, Context, Genotype, MethCall, RefContext};
    use crate::model::alphabet::{A, T};
    use rust_htslib::bam::header::HeaderRecord;

    fn header() -> bam::Header {
        let mut header = bam::Header::new();
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", "chr1");
        sq.push_tag(b"LN", 1000);
        header.push_record(&sq);
        header
    }

    fn snp(pos: u64, genotype: Genotype) -> CallRecord {
        CallRecord {
            context: RefContext {
                pos,
                ref_base: A,
                fwd: Context::Chh,
                rev: Context::Chh,
            },
            coverage: 20,
            top_counts: [5, 0, 0, 5, 0],
            bottom_counts: [5, 0, 0, 5, 0],
            call: MethCall {
                genotype,
                score: 25.5,
                genotype_prob: 0.999,
                meth_level1: None,
                meth_level2: None,
                genotype_called: true,
                meth_called: false,
            },
            is_snp: true,
        }
    }

    #[test]
    fn test_write_snp_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.vcf");
        let path = path.to_str().unwrap();
        {
            let mut writer = VcfWriter::new(path, "sample", &header()).unwrap();
            writer.write("chr1", &snp(9, Genotype::new(A, T))).unwrap();
            writer.write("chr1", &snp(20, Genotype::hom(T))).unwrap();
            assert!(writer.write("chr2", &snp(3, Genotype::hom(T))).is_err());
        }
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("##contig=<ID=chr1,length=1000>"));
        let records: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(records.len(), 2);
        let fields: Vec<&str> = records[0].split('\t').collect();
        assert_eq!(&fields[..7], &["chr1", "10", "snp", "A", "T", ".", "PASS"]);
        assert_eq!(fields[7], "FB=5,0,0,5;RB=5,0,0,5");
        assert_eq!(fields[8], "GT:DP:GS:GP");
        assert!(fields[9].starts_with("0/1:20:25.5:"));
        assert!(records[1].split('\t').nth(9).unwrap().starts_with("1/1:"));
    }
}
