use crate::utils::Result;

/// Half-open genomic interval `[start, end)` on a named contig.
#[derive(Debug, PartialEq, Clone)]
pub struct GenomicRegion {
    pub contig: String,
    pub start: u32,
    pub end: u32,
}

impl GenomicRegion {
    pub fn new(contig: impl Into<String>, start: u32, end: u32) -> Result<Self> {
        if start >= end {
            return Err(format!("Invalid region: start {} >= end {}", start, end));
        }

        Ok(Self {
            contig: contig.into(),
            start,
            end,
        })
    }

    /// Parses `contig:start-end`.
    pub fn from_string(encoding: &str) -> Result<Self> {
        let error_msg = || format!("Invalid region encoding: {}", encoding);
        let (contig, range) = encoding.rsplit_once(':').ok_or_else(error_msg)?;
        let (start, end) = range.split_once('-').ok_or_else(error_msg)?;
        if contig.is_empty() {
            return Err(error_msg());
        }

        let start: u32 = start.replace(',', "").parse().map_err(|_| error_msg())?;
        let end: u32 = end.replace(',', "").parse().map_err(|_| error_msg())?;

        Self::new(contig, start, end)
    }

    /// Parses the first three fields of a BED line.
    pub fn from_bed_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(format!(
                "Expected at least 3 fields in the format 'chrom start end', found {}: {}",
                fields.len(),
                line
            ));
        }
        let start: u32 = fields[1]
            .parse()
            .map_err(|_| format!("Invalid BED start: {}", line))?;
        let end: u32 = fields[2]
            .parse()
            .map_err(|_| format!("Invalid BED end: {}", line))?;
        Self::new(fields[0], start, end)
    }
}
