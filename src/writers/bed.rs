use crate::calling::CallRecord;
use crate::utils::Result;
use std::fs::File;
use std::io::{BufWriter, Write};

/// Writes one BED6 line per called methylation site.
pub struct BedWriter {
    writer: BufWriter<File>,
}

impl BedWriter {
    pub fn new(output_path: &str) -> Result<BedWriter> {
        let file = File::create(output_path)
            .map_err(|e| format!("Invalid BED output path {}: {}", output_path, e))?;
        Ok(BedWriter {
            writer: BufWriter::new(file),
        })
    }

    pub fn write(&mut self, contig: &str, call: &CallRecord) -> Result<()> {
        let pos = call.context.pos;
        for site in call.methylation_sites() {
            writeln!(
                self.writer,
                "{}\t{}\t{}\t{}:{:.3}\t{}\t{}",
                contig,
                pos,
                pos + 1,
                site.context.as_str(),
                site.level,
                (site.level * 1000.0).round() as u32,
                site.strand
            )
            .map_err(|e| format!("Failed to write BED line: {}", e))?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| format!("Failed to flush BED output: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calling::{Context, Genotype, MethCall, RefContext};
    use crate::model::alphabet::{C, G, T};

    fn record(genotype: Genotype, level1: f64, level2: Option<f64>, meth_called: bool) -> CallRecord {
        CallRecord {
            context: RefContext {
                pos: 41,
                ref_base: C,
                fwd: Context::Cg,
                rev: Context::Chh,
            },
            coverage: 12,
            top_counts: [0, 6, 0, 0, 0],
            bottom_counts: [0, 0, 6, 0, 0],
            call: MethCall {
                genotype,
                score: 12.0,
                genotype_prob: 0.99,
                meth_level1: Some(level1),
                meth_level2: level2,
                genotype_called: meth_called,
                meth_called,
            },
            is_snp: false,
        }
    }

    #[test]
    fn test_bed_lines_per_strand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bed");
        let path = path.to_str().unwrap();
        {
            let mut writer = BedWriter::new(path).unwrap();
            writer.write("chr1", &record(Genotype::hom(C), 0.8764, None, true)).unwrap();
            writer.write("chr1", &record(Genotype::new(C, G), 1.0, Some(0.25), true)).unwrap();
            writer.write("chr1", &record(Genotype::new(G, T), 0.5, None, true)).unwrap();
            writer.write("chr1", &record(Genotype::hom(C), 0.9, None, false)).unwrap();
            writer.flush().unwrap();
        }
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "chr1\t41\t42\tCG:0.876\t876\t+",
                "chr1\t41\t42\tCG:1.000\t1000\t+",
                "chr1\t41\t42\tCHH:0.250\t250\t-",
                "chr1\t41\t42\tCHH:0.500\t500\t-",
            ]
        );
    }
}
