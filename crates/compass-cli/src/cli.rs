use clap::Parser;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

/// Every option is optional here; unset values fall back to the library defaults
/// and may be overridden by `--config-file`.
#[derive(Parser, Debug, Default)]
#[command(
    name = "compass",
    version,
    about = "Compass - Parallel, resumable scoring of metabolic flux potential for single-cell expression data.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    // --- Input ---
    /// Gene expression data: a tab-separated genes x samples matrix (optionally
    /// gzipped), or a Matrix Market file followed by its genes and barcodes files.
    #[arg(long, num_args = 1..=3, value_name = "FILE")]
    pub data: Vec<PathBuf>,

    /// Metabolic model to use [default: RECON2_mat]
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Directory containing `<MODEL>.json` or `<MODEL>.json.gz`
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Species used to match genes to the model [default: homo_sapiens]
    #[arg(long, value_name = "NAME")]
    pub species: Option<String>,

    /// Media to simulate the model with
    #[arg(long, value_name = "NAME")]
    pub media: Option<String>,

    // --- Locations ---
    /// Where to store aggregated results [default: .]
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Where to store per-sample results [default: <OUTPUT_DIR>/_tmp]
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Where to store flux range caches [default: <OUTPUT_DIR>/_cache]
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    // --- Execution ---
    /// Number of samples processed in parallel. Defaults to, and is capped at,
    /// the number of logical cores.
    #[arg(long, value_name = "NUM")]
    pub num_processes: Option<usize>,

    /// Submit one job per sample to this Torque queue and exit
    #[arg(long, value_name = "QUEUE")]
    pub torque_queue: Option<String>,

    /// Solver threads per sample [default: 1]
    #[arg(long, value_name = "NUM")]
    pub num_threads: Option<usize>,

    /// External solver executable [default: compass-solver]
    #[arg(long, value_name = "PATH")]
    pub solver: Option<PathBuf>,

    // --- Scoring ---
    /// Smoothing factor between 0 and 1 [default: 0]
    #[arg(long, value_name = "FLOAT")]
    pub lambda: Option<f64>,

    /// Skip reaction scores
    #[arg(long)]
    pub no_reactions: bool,

    /// Also compute secretion and uptake scores
    #[arg(long)]
    pub calc_metabolites: bool,

    /// Rebuild the flux range cache even if one is stored
    #[arg(long)]
    pub precache: bool,

    /// Write the model's genes to this file and exit
    #[arg(long, value_name = "FILE")]
    pub list_genes: Option<PathBuf>,

    // --- Internal modes used by queued jobs ---
    #[arg(long, hide = true, value_name = "INDEX")]
    pub single_sample: Option<usize>,

    #[arg(long, hide = true)]
    pub collect: bool,

    #[arg(long, hide = true)]
    pub generate_cache: bool,

    /// JSON or TOML file whose entries override the values above
    #[arg(long, hide = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    // --- Logging ---
    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to this file [default: <OUTPUT_DIR>/compass.log when --data is given]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}
