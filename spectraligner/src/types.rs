use mzdata::spectrum::{utils::Collator, MultiLayerSpectrum};
use mzpeaks::{CentroidPeak, DeconvolutedPeak};

pub(crate) type CPeak = CentroidPeak;
pub(crate) type DPeak = DeconvolutedPeak;
pub(crate) type SpectrumType = MultiLayerSpectrum<CPeak, DPeak>;
pub(crate) type RowCollator = Collator<Vec<String>>;
pub(crate) const BUFFER_SIZE: usize = 1_000;
pub(crate) const PEAK_COUNT_THRESHOLD_WARNING: usize = 10_000;
