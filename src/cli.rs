use crate::calling::CallParams;
use crate::model::ModelParams;
use crate::reads::ReadFilter;
use crate::realign::RealignParams;
use crate::utils::{GenomicRegion, Result};
use chrono::Datelike;
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

pub static FULL_VERSION: Lazy<String> = Lazy::new(|| {
    format!(
        "{}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    )
});

#[derive(Parser)]
#[command(name="bscall",
          version=&**FULL_VERSION,
          long_about = None,
          disable_help_subcommand = true,
          after_help = format!("Copyright (C) 2013-{}
This program comes with ABSOLUTELY NO WARRANTY.", chrono::Utc::now().year()),
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = ArgAction::Count, help = "Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)")]
    pub verbosity: u8,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Bisulfite SNP and Methylation Caller")]
    Call(CallArgs),
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("call")))]
#[command(arg_required_else_help(true))]
pub struct CallArgs {
    #[clap(required = true)]
    #[clap(short = 'g')]
    #[clap(long = "genome")]
    #[clap(help = "Path to reference genome FASTA")]
    #[clap(value_name = "FASTA")]
    #[arg(value_parser = check_file_exists)]
    pub genome_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reads")]
    #[clap(help = "Indexed BAM file with aligned bisulfite reads")]
    #[clap(value_name = "READS")]
    #[arg(value_parser = check_file_exists)]
    pub reads_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-prefix")]
    #[clap(help = "Prefix for output files")]
    #[clap(value_name = "OUTPUT_PREFIX")]
    #[arg(value_parser = check_prefix_path)]
    pub output_prefix: String,

    #[clap(short = 'i')]
    #[clap(long = "intervals")]
    #[clap(value_name = "REGION")]
    #[clap(help = "Region to call, as chr:start-end (repeatable)")]
    #[arg(value_parser = GenomicRegion::from_string)]
    pub intervals: Vec<GenomicRegion>,

    #[clap(short = 'b')]
    #[clap(long = "regions")]
    #[clap(value_name = "BED")]
    #[clap(help = "BED file with regions to call")]
    #[clap(conflicts_with = "intervals")]
    #[arg(value_parser = check_file_exists)]
    pub regions_path: Option<PathBuf>,

    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(help = "Number of threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    #[arg(value_parser = threads_in_range)]
    pub num_threads: usize,

    #[clap(long = "sample-name")]
    #[clap(value_name = "SAMPLE_NAME")]
    #[clap(help = "Sample name")]
    #[clap(default_value = None)]
    #[arg(value_parser = check_sample_name_nonempty)]
    pub sample_name: Option<String>,

    #[clap(help_heading("Read filtering"))]
    #[clap(long = "min-map-quality")]
    #[clap(value_name = "MAPQ")]
    #[clap(help = "Minimum mapping quality of a read")]
    #[clap(default_value = "1")]
    pub min_mapq: u8,

    #[clap(help_heading("Read filtering"))]
    #[clap(long = "keep-suboptimal")]
    #[clap(help = "Keep secondary and supplementary alignments")]
    pub keep_suboptimal: bool,

    #[clap(help_heading("Read filtering"))]
    #[clap(long = "max-pile")]
    #[clap(value_name = "READS")]
    #[clap(help = "Maximum reads starting at the same position and strand (0 keeps all)")]
    #[clap(default_value = "0")]
    pub max_pile: usize,

    #[clap(help_heading("Calling"))]
    #[clap(long = "min-coverage")]
    #[clap(value_name = "COV")]
    #[clap(help = "Minimum coverage of a position")]
    #[clap(default_value = "6")]
    pub min_coverage: usize,

    #[clap(help_heading("Calling"))]
    #[clap(long = "max-coverage")]
    #[clap(value_name = "COV")]
    #[clap(help = "Maximum coverage of a position")]
    #[clap(default_value = "500")]
    pub max_coverage: usize,

    #[clap(help_heading("Calling"))]
    #[clap(long = "exclude-border")]
    #[clap(value_name = "BASES")]
    #[clap(help = "Read bases ignored at each read end when counting read positions")]
    #[clap(default_value = "0")]
    pub exclude_border: usize,

    #[clap(help_heading("Calling"))]
    #[clap(long = "min-diff-read-pos")]
    #[clap(value_name = "COUNT")]
    #[clap(help = "Minimum distinct read positions supporting a SNP")]
    #[clap(default_value = "0")]
    pub min_diff_read_pos: usize,

    #[clap(help_heading("Calling"))]
    #[clap(long = "min-score")]
    #[clap(value_name = "SCORE")]
    #[clap(help = "Minimum log posterior ratio to call a genotype")]
    #[clap(default_value = "9")]
    pub min_score: f64,

    #[clap(help_heading("Calling"))]
    #[clap(long = "min-prob")]
    #[clap(value_name = "PROB")]
    #[clap(help = "Minimum genotype posterior to report a SNP")]
    #[clap(default_value = "0.7")]
    #[arg(value_parser = ensure_unit_float)]
    pub min_prob: f64,

    #[clap(help_heading("Calling"))]
    #[clap(long = "bs-conv-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Bisulfite conversion rate of unmethylated cytosines")]
    #[clap(default_value = "0.998")]
    #[arg(value_parser = ensure_unit_float)]
    pub bs_conv_rate: f64,

    #[clap(help_heading("Calling"))]
    #[clap(long = "meth-conv-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Conversion rate of methylated cytosines")]
    #[clap(default_value = "0.0")]
    #[arg(value_parser = ensure_unit_float)]
    pub meth_conv_rate: f64,

    #[clap(help_heading("Calling"))]
    #[clap(long = "prob-hetero-snp")]
    #[clap(value_name = "PROB")]
    #[clap(help = "Prior probability of a heterozygous SNP")]
    #[clap(default_value = "0.005")]
    #[arg(value_parser = ensure_unit_float)]
    pub prob_het: f64,

    #[clap(help_heading("Calling"))]
    #[clap(long = "prob-homo-snp")]
    #[clap(value_name = "PROB")]
    #[clap(help = "Prior probability of a homozygous SNP")]
    #[clap(default_value = "0.0005")]
    #[arg(value_parser = ensure_unit_float)]
    pub prob_homo: f64,

    #[clap(help_heading("Calling"))]
    #[clap(long = "genotype-priors")]
    #[clap(help = "Use SNP-rate genotype priors instead of uniform ones")]
    pub genotype_priors: bool,

    #[clap(help_heading("Calling"))]
    #[clap(long = "beta-sampling")]
    #[clap(help = "Search methylation levels on a grid instead of Newton-Raphson")]
    pub beta_sampling: bool,

    #[clap(help_heading("Calling"))]
    #[clap(long = "use-mapq")]
    #[clap(help = "Mix mapping quality into base likelihoods")]
    pub use_mapq: bool,

    #[clap(help_heading("Calling"))]
    #[clap(long = "ns-errors-calling")]
    #[clap(help = "Use non-uniform sequencing errors when calling")]
    pub non_uniform_errors: bool,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "realign")]
    #[clap(help = "Realign read groups carrying indels")]
    pub realign: bool,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "indel-threshold")]
    #[clap(value_name = "READS")]
    #[clap(help = "Minimum reads with an indel to realign a group")]
    #[clap(default_value = "3")]
    pub indel_threshold: usize,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "band-width")]
    #[clap(value_name = "COLUMNS")]
    #[clap(help = "Band width around the previous placement of a read")]
    #[clap(default_value = "4")]
    pub band_width: usize,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "realign-border")]
    #[clap(value_name = "BASES")]
    #[clap(help = "Extra reference bases around each realigned group")]
    #[clap(default_value = "0")]
    pub realign_border: u64,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "realign-reference")]
    #[clap(help = "Realign the reference row as well")]
    pub realign_reference: bool,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "nse")]
    #[clap(help = "Use non-simple substitution errors")]
    pub non_simple_subst: bool,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "nsi")]
    #[clap(help = "Use non-simple insertion errors")]
    pub non_simple_ins: bool,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "nsd")]
    #[clap(help = "Use non-simple deletion errors")]
    pub non_simple_del: bool,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "del-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Deletion rate")]
    #[clap(default_value = "0.0025")]
    #[arg(value_parser = ensure_unit_float)]
    pub del_rate: f64,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "del-error-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Deletion sequencing error rate")]
    #[clap(default_value = "0.001")]
    #[arg(value_parser = ensure_unit_float)]
    pub del_error_rate: f64,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "ins-error-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Insertion sequencing error rate")]
    #[clap(default_value = "0.001")]
    #[arg(value_parser = ensure_unit_float)]
    pub ins_error_rate: f64,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "end-gap-score")]
    #[clap(value_name = "SCORE")]
    #[clap(help = "Score of the first and last gap of a read")]
    #[clap(default_value = "4.5")]
    pub end_gap_score: f64,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "score-limit")]
    #[clap(value_name = "SCORE")]
    #[clap(help = "Lower bound of any single log-odds score")]
    #[clap(default_value = "-10")]
    #[arg(allow_hyphen_values = true)]
    pub score_limit: f64,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "window-size")]
    #[clap(value_name = "BASES")]
    #[clap(help = "Length of the windows a contig is split into")]
    #[clap(default_value = "100000")]
    #[arg(value_parser = window_size_in_range)]
    pub window_size: u64,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "global-meth-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Global methylation rate assumed by the realignment model")]
    #[clap(default_value = "0.0")]
    #[arg(value_parser = ensure_unit_float)]
    pub global_meth_rate: f64,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "seq-identity")]
    #[clap(value_name = "FRAC")]
    #[clap(help = "Expected identity of reads to the reference")]
    #[clap(default_value = "0.99")]
    #[arg(value_parser = ensure_unit_float)]
    pub seq_identity: f64,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "ref-n-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Rate of N bases in the reference")]
    #[clap(default_value = "0.0")]
    #[arg(value_parser = ensure_unit_float)]
    pub ref_n_rate: f64,
}

impl CallArgs {
    pub fn read_filter(&self) -> ReadFilter {
        ReadFilter {
            min_mapq: self.min_mapq,
            keep_suboptimal: self.keep_suboptimal,
            max_pile: self.max_pile,
        }
    }

    pub fn call_params(&self) -> CallParams {
        CallParams {
            min_coverage: self.min_coverage,
            max_coverage: self.max_coverage,
            exclude_border: self.exclude_border,
            min_diff_read_pos: self.min_diff_read_pos,
            min_score: self.min_score,
            min_prob: self.min_prob,
            conv_rate: self.bs_conv_rate,
            meth_conv_rate: self.meth_conv_rate,
            prob_het: self.prob_het,
            prob_homo: self.prob_homo,
            genotype_priors: self.genotype_priors,
            beta_sampling: self.beta_sampling,
            use_mapq: self.use_mapq,
            non_uniform_errors: self.non_uniform_errors,
            realign: self.realign,
            indel_threshold: self.indel_threshold,
            realign_border: self.realign_border,
        }
    }

    pub fn realign_params(&self) -> RealignParams {
        RealignParams {
            band_width: self.band_width,
            realign_reference: self.realign_reference,
        }
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            global_meth_rate: self.global_meth_rate,
            bs_conv_rate: self.bs_conv_rate,
            seq_identity: self.seq_identity,
            ref_n_rate: self.ref_n_rate,
            non_simple_subst: self.non_simple_subst,
            non_simple_ins: self.non_simple_ins,
            non_simple_del: self.non_simple_del,
            del_rate: self.del_rate,
            del_error_rate: self.del_error_rate,
            ins_error_rate: self.ins_error_rate,
            end_gap_score: self.end_gap_score,
            score_limit: self.score_limit,
        }
    }
}

pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

fn check_prefix_path(s: &str) -> Result<String> {
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(format!("Path does not exist: {}", parent_dir.display()));
        }
    }
    Ok(s.to_string())
}

fn threads_in_range(s: &str) -> Result<usize> {
    let thread: usize = s
        .parse()
        .map_err(|_| format!("`{}` is not a valid thread number", s))?;
    if thread >= 1 {
        Ok(thread)
    } else {
        Err("Number of threads must be at least 1".into())
    }
}

fn window_size_in_range(s: &str) -> Result<u64> {
    let size: u64 = s
        .parse()
        .map_err(|_| format!("`{}` is not a valid window size", s))?;
    if size >= 1 {
        Ok(size)
    } else {
        Err("Window size must be at least 1".into())
    }
}

fn check_file_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        Err(format!("File does not exist: {}", path.display()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn check_sample_name_nonempty(s: &str) -> Result<String> {
    if s.trim().is_empty() {
        Err("Sample name cannot be an empty string".to_string())
    } else {
        Ok(s.to_string())
    }
}

fn ensure_unit_float(s: &str) -> Result<f64> {
    let value = s
        .parse::<f64>()
        .map_err(|e| format!("Could not parse float: {}", e))?;
    if !(0.0..=1.0).contains(&value) {
        Err(format!(
            "The value must be between 0.0 and 1.0, got: {}",
            value
        ))
    } else {
        Ok(value)
    }
}
