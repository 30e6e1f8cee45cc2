//! Aligning a batch of peptide-spectrum pairs.
//!
//! A batch is split into contiguous chunks with [`partition_batch`], each of
//! which is processed by one [`AlignmentWorker`]. Workers only share the
//! [`AlignmentConfig`] and the [`SpectrumSource`], both read-only.
use std::collections::HashMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Range};

use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::AlignmentEngine;
use crate::params::AlignmentConfig;
use crate::spectrum::{ExperimentalSpectrum, PeakList, SpectrumError, TheoreticalSpectrum};

/// The matrix rows reserved up front, enough for most tryptic peptides
const INITIAL_ROWS: usize = 64;
/// The matrix columns reserved up front when the peak count is not bounded
const INITIAL_COLUMNS: usize = 512;

/// One peptide-spectrum match to align
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchItem {
    pub title: String,
    pub peptide: String,
}

impl BatchItem {
    pub fn new(title: impl Into<String>, peptide: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            peptide: peptide.into(),
        }
    }
}

/// The parts of an observed spectrum the alignment needs, before filtering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawScan {
    pub precursor_mz: Option<f64>,
    pub charge: Option<i32>,
    pub peaks: PeakList,
}

impl RawScan {
    pub fn new(precursor_mz: Option<f64>, charge: Option<i32>, peaks: PeakList) -> Self {
        Self {
            precursor_mz,
            charge,
            peaks,
        }
    }
}

/// Anything spectra can be looked up in by title
pub trait SpectrumSource {
    fn scan_by_title(&self, title: &str) -> Option<&RawScan>;
}

impl SpectrumSource for HashMap<String, RawScan> {
    fn scan_by_title(&self, title: &str) -> Option<&RawScan> {
        self.get(title)
    }
}

/// Why a pair produced an error row instead of an alignment. The message is
/// written verbatim in place of the record fields.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("Not Good Title")]
    NotGoodTitle,
    #[error("Unknown Residue {0}")]
    UnknownResidue(char),
    #[error("Missing Precursor")]
    MissingPrecursor,
}

/// Counters accumulated by workers and summed by the driver
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub pairs: usize,
    pub aligned: usize,
    pub below_min_score: usize,
    pub missing_titles: usize,
    pub unknown_residues: usize,
    pub missing_precursors: usize,
    pub charges_defaulted: usize,
    pub spectra_prepared: usize,
}

impl Add for BatchProgress {
    type Output = BatchProgress;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for BatchProgress {
    fn add_assign(&mut self, rhs: Self) {
        self.pairs += rhs.pairs;
        self.aligned += rhs.aligned;
        self.below_min_score += rhs.below_min_score;
        self.missing_titles += rhs.missing_titles;
        self.unknown_residues += rhs.unknown_residues;
        self.missing_precursors += rhs.missing_precursors;
        self.charges_defaulted += rhs.charges_defaulted;
        self.spectra_prepared += rhs.spectra_prepared;
    }
}

impl Sum for BatchProgress {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Split `0..len` into at most `workers` contiguous chunks. Every chunk holds
/// `len / workers` items except the last, which also takes the remainder.
pub fn partition_batch(len: usize, workers: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, len);
    let size = len / workers;
    (0..workers)
        .map(|i| {
            let start = i * size;
            let end = if i + 1 == workers { len } else { start + size };
            start..end
        })
        .collect()
}

/// Aligns a chunk of a batch with a single engine, reusing the prepared
/// experimental spectrum while consecutive pairs share a title.
pub struct AlignmentWorker<'a, S: SpectrumSource + ?Sized> {
    engine: AlignmentEngine<'a>,
    source: &'a S,
    cached: Option<(String, Result<ExperimentalSpectrum, RowError>)>,
    progress: BatchProgress,
}

impl<'a, S: SpectrumSource + ?Sized> AlignmentWorker<'a, S> {
    pub fn new(config: &'a AlignmentConfig, source: &'a S) -> Self {
        let columns = config
            .params
            .peak_filter
            .max_peaks()
            .map_or(INITIAL_COLUMNS, |n| 2 * n + 2);
        Self {
            engine: AlignmentEngine::new(config, INITIAL_ROWS, columns),
            source,
            cached: None,
            progress: BatchProgress::default(),
        }
    }

    pub fn progress(&self) -> &BatchProgress {
        &self.progress
    }

    fn prepare(&mut self, title: &str) -> Result<ExperimentalSpectrum, RowError> {
        let config = self.engine.config();
        let Some(scan) = self.source.scan_by_title(title) else {
            warn!("Title {title} does not match any spectrum");
            self.progress.missing_titles += 1;
            return Err(RowError::NotGoodTitle);
        };
        let Some(precursor_mz) = scan.precursor_mz.filter(|mz| mz.is_finite() && *mz > 0.0)
        else {
            warn!("Spectrum {title} has no usable precursor m/z");
            self.progress.missing_precursors += 1;
            return Err(RowError::MissingPrecursor);
        };
        let charge = match scan.charge {
            Some(z) if z > 0 => z,
            other => {
                warn!("Spectrum {title} has precursor charge {other:?}, assuming 1");
                self.progress.charges_defaulted += 1;
                1
            }
        };
        self.progress.spectra_prepared += 1;
        ExperimentalSpectrum::new(
            precursor_mz,
            charge,
            scan.peaks.clone(),
            &config.params,
            &config.residues,
        )
        .map_err(|_| RowError::MissingPrecursor)
    }

    fn refresh(&mut self, title: &str) {
        let stale = !matches!(&self.cached, Some((cached, _)) if cached == title);
        if stale {
            let spectrum = self.prepare(title);
            self.cached = Some((title.to_string(), spectrum));
        }
    }

    /// Align one pair, returning its output row. Pairs below the minimum
    /// score produce no row.
    pub fn align_item(&mut self, item: &BatchItem) -> Option<String> {
        self.progress.pairs += 1;
        self.refresh(&item.title);
        let experimental = match &self.cached {
            Some((_, Ok(spectrum))) => spectrum,
            Some((_, Err(err))) => return Some(error_row(item, err)),
            None => return Some(error_row(item, &RowError::NotGoodTitle)),
        };

        let config = self.engine.config();
        let theoretical = match TheoreticalSpectrum::new(&item.peptide, &config.residues) {
            Ok(theoretical) => theoretical,
            Err(SpectrumError::UnknownResidue(residue)) => {
                self.progress.unknown_residues += 1;
                return Some(error_row(item, &RowError::UnknownResidue(residue)));
            }
            Err(SpectrumError::InvalidCharge(_)) => {
                return Some(error_row(item, &RowError::MissingPrecursor));
            }
        };

        match self.engine.process(&theoretical, experimental) {
            Some(record) => {
                self.progress.aligned += 1;
                Some(format!(
                    "{};{};{}",
                    item.title,
                    item.peptide,
                    record.to_row(config.params.decimals)
                ))
            }
            None => {
                debug!("{} against {} produced no record", item.peptide, item.title);
                self.progress.below_min_score += 1;
                None
            }
        }
    }

    /// Align every pair of `items` in order, collecting their output rows
    pub fn run(&mut self, items: &[BatchItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| self.align_item(item))
            .collect()
    }
}

fn error_row(item: &BatchItem, err: &RowError) -> String {
    format!("{};{};{}", item.title, item.peptide, err)
}
