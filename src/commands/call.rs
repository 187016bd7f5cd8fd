use crate::calling::{call_window, CallParams, CallStats, WindowResult, CONTEXT_FLANK};
use crate::cli::CallArgs;
use crate::model::{alphabet::encode_seq, ScoringModel};
use crate::reads::{limit_piles, parse_record, ReadFilter};
use crate::realign::RealignParams;
use crate::utils::{
    create_writer, fetch_contig_slice, get_bam_header, get_contig_lengths, get_sample_name,
    is_bam_mapped, open_genome_reader, open_regions_reader, GenomicRegion, Result,
};
use crate::writers::{BedWriter, VcfWriter};
use crossbeam_channel::{bounded, Sender};
use rayon::{
    iter::{ParallelBridge, ParallelIterator},
    ThreadPoolBuilder,
};
use rust_htslib::{
    bam::{self, Read},
    faidx,
};
use std::{
    cell::RefCell,
    collections::HashMap,
    io::BufRead,
    path::PathBuf,
    sync::Arc,
    thread::{self},
};

const CHANNEL_BUFFER_SIZE: usize = 2048;

/// A stretch of one contig whose positions are called together.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub contig_len: u64,
}

/// Where the windows come from.
#[derive(Debug, Clone)]
pub enum RegionSource {
    AllContigs,
    Intervals(Vec<GenomicRegion>),
    Bed(PathBuf),
}

#[derive(Debug, Clone)]
struct ThreadContextParams {
    reads_path: PathBuf,
    genome_path: PathBuf,
}

struct ThreadReaders {
    bam: bam::IndexedReader,
    genome: faidx::Reader,
}

thread_local! {
    static CTX_PARAMS: RefCell<Option<ThreadContextParams>> = const { RefCell::new(None) };
    static THREAD_READERS: RefCell<Option<ThreadReaders>> = const { RefCell::new(None) };
}

fn open_thread_readers() -> Result<ThreadReaders> {
    let ctx = CTX_PARAMS
        .with(|cell| cell.borrow().clone())
        .ok_or("Thread context parameters not initialized")?;
    let bam = bam::IndexedReader::from_path(&ctx.reads_path).map_err(|e| {
        format!(
            "Failed to initialize BAM reader for path {}: {}",
            ctx.reads_path.display(),
            e
        )
    })?;
    let genome = open_genome_reader(&ctx.genome_path)?;
    Ok(ThreadReaders { bam, genome })
}

struct Params {
    filter: ReadFilter,
    call: CallParams,
    realign: RealignParams,
    model: ScoringModel,
}

pub fn call(args: CallArgs) -> Result<()> {
    let bam_header = get_bam_header(&args.reads_path)?;
    if !is_bam_mapped(&bam_header) {
        return Err("Input BAM is not mapped".into());
    }
    let contigs = get_contig_lengths(&bam_header)?;

    let sample_name = match &args.sample_name {
        Some(name) => name.clone(),
        None => get_sample_name(&args.reads_path, &bam_header)?,
    };

    let mut vcf_writer = create_writer(&args.output_prefix, "vcf", |path| {
        VcfWriter::new(path, &sample_name, &bam_header)
    })?;
    let mut bed_writer = create_writer(&args.output_prefix, "bed", BedWriter::new)?;

    let source = if let Some(path) = &args.regions_path {
        RegionSource::Bed(path.clone())
    } else if !args.intervals.is_empty() {
        RegionSource::Intervals(args.intervals.clone())
    } else {
        RegionSource::AllContigs
    };

    let (sender_window, receiver_window) = bounded(CHANNEL_BUFFER_SIZE);
    let window_size = args.window_size;
    let window_stream_thread = thread::spawn(move || {
        stream_windows_into_channel(&source, &contigs, window_size, sender_window)
    });

    let (sender_result, receiver_result) = bounded::<(Window, WindowResult)>(CHANNEL_BUFFER_SIZE);
    let writer_thread = thread::spawn(move || -> Result<CallStats> {
        let mut stats = CallStats::default();
        for (window, result) in &receiver_result {
            for record in &result.records {
                if record.is_snp {
                    vcf_writer.write(&window.contig, record)?;
                }
                bed_writer.write(&window.contig, record)?;
            }
            stats.merge(&result.stats);
        }
        bed_writer.flush()?;
        Ok(stats)
    });

    let model_params = args.model_params();
    let params = Arc::new(Params {
        filter: args.read_filter(),
        call: args.call_params(),
        realign: args.realign_params(),
        model: ScoringModel::new(&model_params),
    });

    log::debug!(
        "Initializing thread pool with {} threads...",
        args.num_threads
    );
    let pool = initialize_thread_pool(
        args.num_threads,
        ThreadContextParams {
            reads_path: args.reads_path.clone(),
            genome_path: args.genome_path.clone(),
        },
    )?;
    pool.install(|| {
        receiver_window
            .into_iter()
            .par_bridge()
            .for_each_with(&sender_result, |s, window| match window {
                Ok(window) => process_window(window, &params, s),
                Err(err) => log::error!("Window processing: {:#}", err),
            });
    });

    drop(sender_result);
    let stats = writer_thread
        .join()
        .map_err(|_| "Writer thread panicked".to_string())??;
    log::trace!("Writer thread finished");
    match window_stream_thread.join() {
        Ok(Ok(n)) => log::debug!("Streamed {} windows", n),
        Ok(Err(e)) => log::error!("Window streaming failed: {}", e),
        Err(_) => return Err("Window stream thread panicked".into()),
    }

    stats.log_summary();
    Ok(())
}

/// Sends every window of `source` and returns how many were sent.
fn stream_windows_into_channel(
    source: &RegionSource,
    contigs: &[(String, u64)],
    window_size: u64,
    sender: Sender<Result<Window>>,
) -> Result<usize> {
    let contig_lens: HashMap<&str, u64> = contigs.iter().map(|(n, l)| (n.as_str(), *l)).collect();
    let mut sent = 0;
    let mut send = |item: Result<Vec<Window>>| -> Result<()> {
        match item {
            Ok(windows) => {
                for window in windows {
                    sender
                        .send(Ok(window))
                        .map_err(|e| format!("Failed to send window: {}", e))?;
                    sent += 1;
                }
            }
            Err(err) => sender
                .send(Err(err))
                .map_err(|e| format!("Failed to send window error: {}", e))?,
        }
        Ok(())
    };

    match source {
        RegionSource::AllContigs => {
            for (name, len) in contigs {
                send(tile_region(name, 0, *len, *len, window_size))?;
            }
        }
        RegionSource::Intervals(regions) => {
            for region in regions {
                send(tile_genomic_region(region, &contig_lens, window_size))?;
            }
        }
        RegionSource::Bed(path) => {
            let reader = open_regions_reader(path)?;
            for line in reader.lines() {
                let line = line.map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
                if line.trim().is_empty() || line.starts_with('#') || line.starts_with("track") {
                    continue;
                }
                let windows = GenomicRegion::from_bed_line(&line)
                    .and_then(|region| tile_genomic_region(&region, &contig_lens, window_size));
                send(windows)?;
            }
        }
    }
    Ok(sent)
}

fn tile_genomic_region(
    region: &GenomicRegion,
    contig_lens: &HashMap<&str, u64>,
    window_size: u64,
) -> Result<Vec<Window>> {
    let len = *contig_lens
        .get(region.contig.as_str())
        .ok_or_else(|| format!("Contig {} is not in the BAM header", region.contig))?;
    tile_region(
        &region.contig,
        region.start as u64,
        region.end as u64,
        len,
        window_size,
    )
}

/// Splits `[start, end)` of a contig into windows of at most `window_size` bases.
fn tile_region(
    contig: &str,
    start: u64,
    end: u64,
    contig_len: u64,
    window_size: u64,
) -> Result<Vec<Window>> {
    let end = end.min(contig_len);
    if start >= end {
        return Err(format!(
            "Region {}:{}-{} lies outside the contig of length {}",
            contig, start, end, contig_len
        ));
    }
    let mut windows = Vec::new();
    let mut pos = start;
    while pos < end {
        let window_end = (pos + window_size).min(end);
        windows.push(Window {
            contig: contig.to_string(),
            start: pos,
            end: window_end,
            contig_len,
        });
        pos = window_end;
    }
    Ok(windows)
}

fn process_window(window: Window, params: &Arc<Params>, sender_result: &Sender<(Window, WindowResult)>) {
    let result = THREAD_READERS.with(|cell| {
        let mut readers = cell.borrow_mut();
        if readers.is_none() {
            *readers = Some(open_thread_readers()?);
        }
        match readers.as_mut() {
            Some(readers) => analyze_window(&window, params, readers),
            None => Err("Thread readers not initialized".to_string()),
        }
    });
    match result {
        Ok(result) => {
            if let Err(e) = sender_result.send((window, result)) {
                log::error!("Failed to send window result to writer thread: {}", e);
            }
        }
        Err(err) => log::error!(
            "Error calling window {}:{}-{}: {}",
            window.contig,
            window.start,
            window.end,
            err
        ),
    }
}

fn analyze_window(window: &Window, params: &Params, readers: &mut ThreadReaders) -> Result<WindowResult> {
    readers
        .bam
        .fetch((window.contig.as_str(), window.start as i64, window.end as i64))
        .map_err(|e| format!("Failed to fetch {}:{}-{}: {}", window.contig, window.start, window.end, e))?;

    let mut reads = Vec::new();
    let mut record = bam::Record::new();
    while let Some(status) = readers.bam.read(&mut record) {
        status.map_err(|e| format!("Failed to read BAM record: {}", e))?;
        if let Some(read) = parse_record(&record, &params.filter) {
            reads.push(read);
        }
    }
    let reads = limit_piles(reads, params.filter.max_pile);
    let (Some(reads_start), Some(reads_end)) = (
        reads.iter().map(|r| r.ref_start).min(),
        reads.iter().map(|r| r.ref_end()).max(),
    ) else {
        return Ok(WindowResult::default());
    };

    let border = params.call.realign_border + CONTEXT_FLANK;
    let ref_start = reads_start.saturating_sub(border);
    let ref_end = (reads_end + border).min(window.contig_len);
    let ref_bases = fetch_contig_slice(
        &readers.genome,
        &window.contig,
        ref_start as usize,
        ref_end as usize,
    )?;
    if ref_bases.len() as u64 != ref_end - ref_start {
        return Err(format!(
            "Reference is shorter than the reads on {} ({} of {} bases)",
            window.contig,
            ref_bases.len(),
            ref_end - ref_start
        ));
    }

    call_window(
        &window.contig,
        ref_start,
        &encode_seq(&ref_bases),
        reads,
        window.start..window.end,
        &params.call,
        &params.realign,
        &params.model,
    )
}

fn initialize_thread_pool(
    num_threads: usize,
    thread_context: ThreadContextParams,
) -> Result<rayon::ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("bscall-{}", i))
        .start_handler(move |_thread_index| {
            CTX_PARAMS.with(|cell| {
                *cell.borrow_mut() = Some(thread_context.clone());
            });
            log::trace!("Initialized thread {:?}", std::thread::current().id());
        })
        .exit_handler(|_thread_index| {
            CTX_PARAMS.with(|cell| {
                *cell.borrow_mut() = None;
            });
            THREAD_READERS.with(|cell| {
                *cell.borrow_mut() = None;
            });
        })
        .build()
        .map_err(|e| format!("Failed to initialize thread pool: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn contigs() -> Vec<(String, u64)> {
        vec![("chr1".to_string(), 250), ("chr2".to_string(), 40)]
    }

    fn collect(source: RegionSource, window_size: u64) -> (Vec<Window>, Vec<String>, usize) {
        let (sender, receiver) = bounded(CHANNEL_BUFFER_SIZE);
        let sent = stream_windows_into_channel(&source, &contigs(), window_size, sender).unwrap();
        let (mut windows, mut errors) = (Vec::new(), Vec::new());
        for item in receiver {
            match item {
                Ok(window) => windows.push(window),
                Err(err) => errors.push(err),
            }
        }
        (windows, errors, sent)
    }

    #[test]
    fn test_tile_region_splits_and_clamps() {
        let windows = tile_region("chr1", 10, 300, 250, 100).unwrap();
        let spans: Vec<(u64, u64)> = windows.iter().map(|w| (w.start, w.end)).collect();
        assert_eq!(spans, vec![(10, 110), (110, 210), (210, 250)]);
        assert!(windows.iter().all(|w| w.contig_len == 250));
        assert!(tile_region("chr1", 260, 300, 250, 100).is_err());
    }

    #[test]
    fn test_all_contigs_are_tiled() {
        let (windows, errors, sent) = collect(RegionSource::AllContigs, 100);
        assert!(errors.is_empty());
        assert_eq!(sent, 4);
        assert_eq!(windows.last().unwrap(), &Window {
            contig: "chr2".to_string(),
            start: 0,
            end: 40,
            contig_len: 40,
        });
    }

    #[test]
    fn test_unknown_interval_is_reported() {
        let regions = vec![
            GenomicRegion::new("chr3", 0, 10).unwrap(),
            GenomicRegion::new("chr2", 5, 25).unwrap(),
        ];
        let (windows, errors, sent) = collect(RegionSource::Intervals(regions), 100);
        assert_eq!(sent, 1);
        assert_eq!(windows[0].start, 5);
        assert_eq!(windows[0].end, 25);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("chr3"));
    }

    #[test]
    fn test_bed_regions_are_streamed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "chr1\t0\t150\tname").unwrap();
        writeln!(file, "chr1\tbad\t150").unwrap();
        writeln!(file, "chr2\t10\t20").unwrap();
        let (windows, errors, sent) = collect(RegionSource::Bed(file.path().to_path_buf()), 100);
        assert_eq!(sent, 3);
        assert_eq!(windows[1].start, 100);
        assert_eq!(windows[1].end, 150);
        assert_eq!(windows[2].contig, "chr2");
        assert_eq!(errors.len(), 1);
    }
}
