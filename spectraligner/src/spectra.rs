use std::collections::HashMap;
use std::fs;
use std::io;

use tracing::{debug, info, warn};

use mzdata::io::{
    infer_format,
    mgf::MGFReaderType,
    mzml::MzMLReaderType,
    MassSpectrometryFormat, RestartableGzDecoder,
};
use mzdata::prelude::*;
use mzdata::spectrum::SignalContinuity;

use spectralign::{Peak, PeakList, RawScan, SpectrumSource};

use crate::driver::SpectralAlignerError;
use crate::types::{CPeak, DPeak, SpectrumType, PEAK_COUNT_THRESHOLD_WARNING};

/// The MS2 spectra of a run, looked up by native id or by their 1-based MS2
/// ordinal written as a string.
#[derive(Debug, Default)]
pub struct SpectrumLibrary {
    scans: Vec<RawScan>,
    by_title: HashMap<String, usize>,
}

impl SpectrumSource for SpectrumLibrary {
    fn scan_by_title(&self, title: &str) -> Option<&RawScan> {
        self.by_title.get(title).map(|i| &self.scans[*i])
    }
}

impl SpectrumLibrary {
    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    /// Add `scan` under `native_id` and under its ordinal among MS2 spectra.
    /// A native id seen before keeps pointing at the first scan carrying it.
    pub fn push(&mut self, native_id: &str, scan: RawScan) {
        let index = self.scans.len();
        self.scans.push(scan);
        if self.by_title.contains_key(native_id) {
            warn!("Duplicate spectrum title {native_id}, keeping the first");
        } else {
            self.by_title.insert(native_id.to_string(), index);
        }
        self.by_title.entry((index + 1).to_string()).or_insert(index);
    }

    /// Collect the MS2 spectra of `reader`
    pub fn from_spectra<I: Iterator<Item = SpectrumType>>(reader: I) -> Self {
        let mut library = Self::default();
        let mut skipped = 0usize;
        for spectrum in reader {
            if spectrum.ms_level() != 2 {
                skipped += 1;
                continue;
            }
            let id = spectrum.id().to_string();
            match raw_scan(spectrum) {
                Some(scan) => library.push(&id, scan),
                None => {
                    warn!("Could not read peaks of {id}, it will not be aligned");
                    skipped += 1;
                }
            }
        }
        debug!("Skipped {skipped} spectra while indexing");
        library
    }

    /// Read every MS2 spectrum of the MGF or mzML file at `path`, which may be
    /// gzip compressed
    pub fn open_path(path: &str) -> Result<Self, SpectralAlignerError> {
        let (ms_format, compressed) = infer_format(path)?;
        debug!("Detected {ms_format:?} from path (compressed? {compressed})");
        let library = match ms_format {
            MassSpectrometryFormat::MGF => {
                if compressed {
                    let fh = RestartableGzDecoder::new(io::BufReader::new(fs::File::open(path)?));
                    Self::from_spectra(MGFReaderType::<_, CPeak, DPeak>::new(fh))
                } else {
                    Self::from_spectra(MGFReaderType::<_, CPeak, DPeak>::open_path(path)?)
                }
            }
            MassSpectrometryFormat::MzML => {
                if compressed {
                    let fh = RestartableGzDecoder::new(io::BufReader::new(fs::File::open(path)?));
                    Self::from_spectra(MzMLReaderType::<_, CPeak, DPeak>::new(fh))
                } else {
                    Self::from_spectra(MzMLReaderType::<_, CPeak, DPeak>::open_path(path)?)
                }
            }
            _ => {
                return Err(SpectralAlignerError::FormatUnknownOrNotSupportedError(
                    path.to_string(),
                    ms_format,
                ))
            }
        };
        info!("Indexed {} MS2 spectra from {path}", library.len());
        Ok(library)
    }
}

/// Centroid `spectrum` if needed and keep what alignment uses of it
fn raw_scan(mut spectrum: SpectrumType) -> Option<RawScan> {
    let (precursor_mz, charge) = match spectrum.precursor() {
        Some(prec) => (Some(prec.ion().mz), prec.charge()),
        None => (None, None),
    };
    let peaks: PeakList = match spectrum.signal_continuity() {
        SignalContinuity::Profile => {
            if let Err(e) = spectrum.pick_peaks(1.0) {
                warn!("An error occurred while picking peaks of {}: {e}", spectrum.id());
                return None;
            }
            spectrum
                .peaks
                .as_ref()?
                .iter()
                .map(|p| Peak::new(p.mz(), p.intensity() as f64))
                .collect()
        }
        _ => spectrum
            .try_build_centroids()
            .ok()?
            .iter()
            .map(|p| Peak::new(p.mz(), p.intensity() as f64))
            .collect(),
    };
    if peaks.len() > PEAK_COUNT_THRESHOLD_WARNING {
        debug!(
            "{} has {} peaks before filtering",
            spectrum.id(),
            peaks.len()
        );
    }
    Some(RawScan::new(precursor_mz, charge, peaks))
}
