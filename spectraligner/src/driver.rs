use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Instant;

use clap::Parser;
use crossbeam_channel::bounded;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use mzdata::io::MassSpectrometryFormat;

use spectralign::{
    AlignmentConfig, AlignmentParams, ConfigurationError, ResidueModifications, ScoreTable,
};

use crate::args::{
    ArgModification, ArgPeakFilter, ColumnRef, DEFAULT_INTENSITY_RATE, DEFAULT_PEAK_COUNT,
};
use crate::input::{load_batch, BatchInputError};
use crate::proc::align_batch;
use crate::spectra::SpectrumLibrary;
use crate::types::BUFFER_SIZE;
use crate::write::{write_output, OutputSink};

fn non_negative_float_f64(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    if value < 0.0 {
        Err(format!("`{s}` is less than zero"))
    } else {
        Ok(value)
    }
}

#[derive(Debug, Error)]
pub enum SpectralAlignerError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(
        #[source]
        #[from]
        ConfigurationError,
    ),
    #[error("The input file format for {0} was either unknown or not supported ({1:?})")]
    FormatUnknownOrNotSupportedError(String, MassSpectrometryFormat),
    #[error("Failed to read the batch: {0}")]
    InputError(
        #[source]
        #[from]
        BatchInputError,
    ),
    #[error("Failed to read the configuration: {0}")]
    ConfigExtractError(
        #[source]
        #[from]
        figment::Error,
    ),
    #[error("Failed to start the thread pool: {0}")]
    ThreadPoolError(
        #[source]
        #[from]
        rayon::ThreadPoolBuildError,
    ),
}

/// Spectral alignment of peptide-spectrum matches.
///
/// Read the spectra of an MGF or mzML file and a table of spectrum titles and
/// candidate peptides, align each peptide against its spectrum, and write
/// one row per pair describing the mass offsets needed to explain it.
#[derive(Parser, Debug, Deserialize, Serialize)]
#[command(author, version)]
pub struct SpectralAligner {
    /// The path to read the spectra from, an MGF or mzML file, optionally gzip compressed
    #[arg()]
    pub spectra_file: String,

    /// The path to the `;` separated table of spectrum titles and peptides to align
    #[arg()]
    pub batch_file: PathBuf,

    /// The path to write the output table to, or if '-' is passed, write to STDOUT.
    ///
    /// Paths ending in `.gz` are gzip compressed.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: PathBuf,

    /// The path to write a log file to, in addition to STDERR
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// A TOML configuration file to read additional parameters from.
    ///
    /// Configurations are also read from `spectraligner.toml` in the working directory.
    /// Environment variables prefixed with `SPECTRALIGNER_` will be read too.
    #[arg(long = "config-file")]
    pub config_file: Option<PathBuf>,

    /// The number of threads to use, passing a value < 1 to use all available threads
    #[arg(
        short='t',
        long="threads",
        default_value_t=-1,
        allow_negative_numbers=true,
    )]
    pub threads: i32,

    /// The column of the batch holding spectrum titles, as a letter or a 1-based number
    #[arg(long = "title-column", default_value = "a", value_parser = ColumnRef::from_str)]
    pub title_column: ColumnRef,

    /// The column of the batch holding peptide sequences, as a letter or a 1-based number
    #[arg(long = "peptide-column", default_value = "b", value_parser = ColumnRef::from_str)]
    pub peptide_column: ColumnRef,

    /// The mass difference in Daltons below which two fragment masses are equal
    #[arg(
        short = 'p',
        long = "precision",
        default_value_t = spectralign::params::DEFAULT_PRECISION,
        value_parser = non_negative_float_f64
    )]
    pub precision: f64,

    /// How to select the experimental peaks to align against
    #[arg(short = 'f', long = "peak-filter", default_value = "intensity-rate")]
    pub peak_filter: ArgPeakFilter,

    /// The percentage of the most intense peak a peak must reach to be kept, for `intensity-rate`
    #[arg(
        long = "intensity-rate",
        default_value_t = DEFAULT_INTENSITY_RATE,
        value_parser = non_negative_float_f64
    )]
    pub intensity_rate: f64,

    /// The number of most intense peaks to keep, for `top-n`
    #[arg(short = 'n', long = "peak-count", default_value_t = DEFAULT_PEAK_COUNT)]
    pub peak_count: usize,

    /// The minimum alignment score for a pair to be written
    #[arg(
        short = 's',
        long = "min-score",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub min_score: i32,

    /// The number of decimals to write masses with
    #[arg(
        short = 'd',
        long = "decimals",
        default_value_t = spectralign::params::DEFAULT_DECIMALS
    )]
    pub decimals: usize,

    /// Score a re-alignment onto the last residue as a non-alignment followed by an alignment
    #[arg(long = "better-end-realign")]
    pub better_end_realign: bool,

    /// How many shared peaks removing a pair of opposite offsets may lose and still be kept
    #[arg(
        long = "complementary-drop-tolerance",
        default_value_t = spectralign::params::DEFAULT_COMPLEMENTARY_DROP_TOLERANCE
    )]
    pub complementary_drop_tolerance: usize,

    /// A fixed modification written as RESIDUE=MASS, with NT and CT naming the termini.
    ///
    /// May be repeated, and takes precedence over `fixed_modifications` read from a
    /// configuration file.
    #[arg(short = 'm', long = "modification", value_parser = ArgModification::from_str)]
    #[serde(default)]
    pub modifications: Vec<ArgModification>,

    /// Log the alignment matrices of every pair at the TRACE level
    #[arg(long = "debug")]
    pub debug: bool,

    #[arg(skip)]
    #[serde(default)]
    pub scores: ScoreTable,

    #[arg(skip)]
    #[serde(default)]
    pub fixed_modifications: ResidueModifications,
}

impl SpectralAligner {
    fn create_threadpool(&self) -> Result<rayon::ThreadPool, SpectralAlignerError> {
        let num_threads = if self.threads > 0 {
            self.threads as usize
        } else {
            thread::available_parallelism()?.into()
        };
        debug!("Using {} cores", num_threads);
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?)
    }

    /// Merge the modifications given on the command line over those read from
    /// a configuration file
    pub fn residue_modifications(&self) -> ResidueModifications {
        let mut modifications = self.fixed_modifications.clone();
        for m in self.modifications.iter() {
            match m.target.as_str() {
                "NT" => modifications.n_term = m.mass,
                "CT" => modifications.c_term = m.mass,
                residue => {
                    modifications.residues.insert(residue.to_string(), m.mass);
                }
            }
        }
        modifications
    }

    /// Build the validated configuration shared by every alignment
    pub fn alignment_config(&self) -> Result<AlignmentConfig, ConfigurationError> {
        let params = AlignmentParams {
            precision: self.precision,
            peak_filter: self.peak_filter.build(self.intensity_rate, self.peak_count)?,
            scores: self.scores,
            better_end_realign: self.better_end_realign,
            min_score: self.min_score,
            decimals: self.decimals,
            complementary_drop_tolerance: self.complementary_drop_tolerance,
            debug: self.debug,
        };
        AlignmentConfig::new(params, &self.residue_modifications())
    }

    pub fn main(&self) -> Result<(), SpectralAlignerError> {
        info!(
            "spectraligner v{}",
            option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
        );
        info!("Spectra: {}", self.spectra_file);
        info!("Batch: {}", self.batch_file.display());
        info!("Output: {}", self.output_file.display());
        let config = self.alignment_config()?;
        if !config.residues.fixed_modifications().is_empty() {
            info!(
                "Fixed modifications on {:?}",
                config.residues.fixed_modifications()
            );
        }
        let pool = self.create_threadpool()?;
        let workers = pool.current_num_threads();
        pool.install(|| self.run_workflow(&config, workers))
    }

    fn run_workflow(
        &self,
        config: &AlignmentConfig,
        workers: usize,
    ) -> Result<(), SpectralAlignerError> {
        let start = Instant::now();
        let library = SpectrumLibrary::open_path(&self.spectra_file)?;
        let items = load_batch(&self.batch_file, self.title_column, self.peptide_column)?;
        info!("Read {} pairs to align", items.len());

        let sink = OutputSink::create(&self.output_file)?;
        let (sender, receiver) = bounded(BUFFER_SIZE);
        let write_task = thread::spawn(move || write_output(sink, receiver));

        let prog = align_batch(config, &library, &items, workers, sender);
        info!(
            "Pairs: {} | Aligned: {} | Below Minimum Score: {}",
            prog.pairs, prog.aligned, prog.below_min_score
        );
        info!(
            "Missing Titles: {} | Unknown Residues: {} | Missing Precursors: {}",
            prog.missing_titles, prog.unknown_residues, prog.missing_precursors
        );
        if prog.charges_defaulted > 0 {
            warn!("Precursor Charges Defaulted: {}", prog.charges_defaulted);
        }
        let processing_elapsed = start.elapsed();

        match write_task.join() {
            Ok(o) => {
                o?;
            }
            Err(e) => {
                warn!("Failed to join writer task: {e:?}");
            }
        }

        let elapsed = start.elapsed();
        if (elapsed.as_secs_f64() - processing_elapsed.as_secs_f64()) > 2.0 {
            info!("Total Elapsed Time: {:0.3?}", elapsed);
        }
        Ok(())
    }
}
