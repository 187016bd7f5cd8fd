use crate::utils::Result;
use rust_htslib::bam::{self, Read};
use std::{collections::HashSet, path::Path};

pub fn get_bam_header(bam_path: &Path) -> Result<bam::Header> {
    let bam = bam::IndexedReader::from_path(bam_path)
        .map_err(|e| format!("Failed to create bam reader: {}", e))?;
    Ok(bam::Header::from_template(bam.header()))
}

pub fn is_bam_mapped(bam_header: &bam::Header) -> bool {
    // Fetching by region requires @SQ lines.
    String::from_utf8_lossy(&bam_header.to_bytes())
        .lines()
        .any(|line| line.starts_with("@SQ"))
}

/// Returns `(name, length)` for every @SQ line, in header order.
pub fn get_contig_lengths(bam_header: &bam::Header) -> Result<Vec<(String, u64)>> {
    let header_hashmap = bam_header.to_hashmap();
    let mut contigs = Vec::new();
    if let Some(records) = header_hashmap.get("SQ") {
        for record in records {
            let name = record
                .get("SN")
                .ok_or("Malformed @SQ line without SN field")?
                .to_owned();
            let len = record
                .get("LN")
                .ok_or_else(|| format!("Malformed @SQ line for {} without LN field", name))?
                .parse::<u64>()
                .map_err(|e| format!("Invalid LN for {}: {}", name, e))?;
            contigs.push((name, len));
        }
    }
    Ok(contigs)
}

pub fn get_sample_name(reads_path: &Path, bam_header: &bam::Header) -> Result<String> {
    let header_hashmap = bam_header.to_hashmap();
    let mut sample_names = HashSet::new();

    if let Some(rg_fields) = header_hashmap.get("RG") {
        for rg_field in rg_fields {
            if let Some(sample_name) = rg_field.get("SM") {
                sample_names.insert(sample_name.to_owned());
            }
        }
    }

    if sample_names.len() == 1 {
        if let Some(name) = sample_names.into_iter().next() {
            return Ok(name);
        }
    } else if sample_names.is_empty() {
        log::warn!("No sample names found");
    } else {
        log::warn!("Multiple sample names found");
    }

    let sample = reads_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or("Invalid reads file name")?
        .to_string();

    Ok(sample)
}
