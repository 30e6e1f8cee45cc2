//! Peak lists and the two kinds of spectra that are aligned against each other.
//!
//! A [`TheoreticalSpectrum`] is the b-ion ladder of a candidate peptide. An
//! [`ExperimentalSpectrum`] is an observed fragmentation spectrum whose peaks
//! have been filtered and then symmetrized, so that a y-ion can be aligned as if
//! it were the complementary b-ion.
use std::cmp::Ordering;
use std::fmt::Display;

use mzpeaks::prelude::*;
use thiserror::Error;
use tracing::trace;

use crate::params::{AlignmentParams, PeakFilter};
use crate::residues::{ResidueMassTable, PROTON};

/// The intensity given to peaks injected to anchor the ends of the alignment
pub const BOOKKEEPING_INTENSITY: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("Unknown Residue {0}")]
    UnknownResidue(char),
    #[error("The precursor charge {0} is not a positive integer")]
    InvalidCharge(i32),
}

/// Test whether two masses are equal at `precision`
#[inline]
pub fn masses_match(a: f64, b: f64, precision: f64) -> bool {
    (a - b).abs() < precision
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peak {
    pub mass: f64,
    pub intensity: f64,
}

impl Peak {
    pub fn new(mass: f64, intensity: f64) -> Self {
        Self { mass, intensity }
    }
}

/// A mass-ascending list of peaks
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PeakList {
    peaks: Vec<Peak>,
}

impl FromIterator<Peak> for PeakList {
    fn from_iter<T: IntoIterator<Item = Peak>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl PeakList {
    pub fn new(mut peaks: Vec<Peak>) -> Self {
        peaks.sort_by(|a, b| a.mass.total_cmp(&b.mass));
        Self { peaks }
    }

    /// Merge runs of peaks closer than `precision` to the last kept peak,
    /// keeping the most intense peak of each run
    pub fn deduplicate(&mut self, precision: f64) {
        let mut kept: Vec<Peak> = Vec::with_capacity(self.peaks.len());
        for peak in self.peaks.drain(..) {
            match kept.last_mut() {
                Some(last) if masses_match(last.mass, peak.mass, precision) => {
                    if peak.intensity > last.intensity {
                        *last = peak;
                    }
                }
                _ => kept.push(peak),
            }
        }
        self.peaks = kept;
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Peak> {
        self.peaks.iter()
    }

    pub fn as_slice(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn masses(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.mass).collect()
    }

    pub fn total_intensity(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }

    pub fn max_intensity(&self) -> Option<f64> {
        self.peaks
            .iter()
            .map(|p| p.intensity)
            .max_by(|a, b| a.total_cmp(b))
    }

    /// Peak indices by descending intensity. Ties keep mass order.
    pub fn intensity_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.peaks.len()).collect();
        order.sort_by(|a, b| {
            self.peaks[*b]
                .intensity
                .partial_cmp(&self.peaks[*a].intensity)
                .unwrap_or(Ordering::Equal)
        });
        order
    }

    /// Keep only the `n` most intense peaks
    pub fn filter_top_n(&mut self, n: usize) {
        if self.peaks.len() <= n {
            return;
        }
        let mut keep = self.intensity_order();
        keep.truncate(n);
        keep.sort_unstable();
        self.peaks = keep.into_iter().map(|i| self.peaks[i]).collect();
    }

    /// Keep only peaks at least `percent` percent as intense as the base peak
    pub fn filter_by_intensity_ratio(&mut self, percent: f64) {
        let Some(max_intensity) = self.max_intensity() else {
            return;
        };
        let threshold = max_intensity * percent / 100.0;
        self.peaks.retain(|p| p.intensity >= threshold);
    }

    pub fn apply_filter(&mut self, filter: &PeakFilter) {
        match filter {
            PeakFilter::TopN(n) => self.filter_top_n(*n),
            PeakFilter::IntensityRatio(percent) => self.filter_by_intensity_ratio(*percent),
        }
    }
}

/// How a position on the experimental mass axis was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeakOrigin {
    /// An observed peak, or an injected bookkeeping peak
    Native,
    /// The mirror image of an observed peak
    Symmetric,
    /// An observed peak whose mirror was also observed
    Both,
}

impl Display for PeakOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::Native => "N",
            Self::Symmetric => "S",
            Self::Both => "B",
        };
        f.write_str(code)
    }
}

/// A position on the experimental mass axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricPeak {
    pub mass: f64,
    pub intensity: f64,
    pub origin: PeakOrigin,
}

/// The b-ion ladder of a candidate peptide, including the empty and full
/// length prefixes. Position `i` follows residue `i - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TheoreticalSpectrum {
    peptide: String,
    masses: Vec<f64>,
    main_mass: f64,
}

impl TheoreticalSpectrum {
    pub fn new(peptide: &str, table: &ResidueMassTable) -> Result<Self, SpectrumError> {
        let mut masses = Vec::with_capacity(peptide.len() + 1);
        let mut running = PROTON;
        masses.push(running);
        for residue in peptide.chars() {
            running += table
                .mass(residue)
                .ok_or(SpectrumError::UnknownResidue(residue))?;
            masses.push(running);
        }
        Ok(Self {
            peptide: peptide.to_string(),
            masses,
            main_mass: table.peptide_mass(peptide),
        })
    }

    pub fn peptide(&self) -> &str {
        &self.peptide
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// The neutral mass of the peptide
    pub fn main_mass(&self) -> f64 {
        self.main_mass
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }
}

/// An observed fragmentation spectrum prepared for alignment.
///
/// The observed peaks are filtered once. The alignment axis is then built from
/// the retained peaks, their mirror images about the precursor and two
/// bookkeeping peaks anchoring the N-terminus and the full length b-ion.
#[derive(Debug, Clone)]
pub struct ExperimentalSpectrum {
    precursor_mz: f64,
    charge: i32,
    main_mass: f64,
    peaks: PeakList,
    observed_masses: Vec<f64>,
    axis: Vec<SymmetricPeak>,
    masses: Vec<f64>,
}

impl ExperimentalSpectrum {
    pub fn new(
        precursor_mz: f64,
        charge: i32,
        mut peaks: PeakList,
        params: &AlignmentParams,
        table: &ResidueMassTable,
    ) -> Result<Self, SpectrumError> {
        if charge < 1 {
            return Err(SpectrumError::InvalidCharge(charge));
        }
        peaks.deduplicate(params.precision);
        peaks.apply_filter(&params.peak_filter);
        let z = charge as f64;
        let main_mass = precursor_mz * z - z * PROTON;
        let axis = symmetrize(&peaks, main_mass + 2.0 * PROTON, params.precision, table);
        trace!(
            "Symmetrized {} peaks into {} alignment positions",
            peaks.len(),
            axis.len()
        );
        let masses = axis.iter().map(|p| p.mass).collect();
        let observed_masses = peaks.masses();
        Ok(Self {
            precursor_mz,
            charge,
            main_mass,
            peaks,
            observed_masses,
            axis,
            masses,
        })
    }

    /// Build a spectrum from any centroided peak type
    pub fn from_centroids<C: CentroidLike>(
        precursor_mz: f64,
        charge: i32,
        peaks: &[C],
        params: &AlignmentParams,
        table: &ResidueMassTable,
    ) -> Result<Self, SpectrumError> {
        let peaks = peaks
            .iter()
            .map(|p| Peak::new(p.mz(), p.intensity() as f64))
            .collect();
        Self::new(precursor_mz, charge, peaks, params, table)
    }

    pub fn precursor_mz(&self) -> f64 {
        self.precursor_mz
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    /// The neutral mass of the precursor
    pub fn main_mass(&self) -> f64 {
        self.main_mass
    }

    /// The filtered observed peaks, without mirrors or bookkeeping peaks
    pub fn peaks(&self) -> &PeakList {
        &self.peaks
    }

    /// The masses of [`ExperimentalSpectrum::peaks`]
    pub fn observed_masses(&self) -> &[f64] {
        &self.observed_masses
    }

    /// The alignment axis
    pub fn axis(&self) -> &[SymmetricPeak] {
        &self.axis
    }

    /// The masses of the alignment axis, ascending
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    #[inline]
    pub fn origin(&self, index: usize) -> PeakOrigin {
        self.axis[index].origin
    }

    pub fn len(&self) -> usize {
        self.axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }
}

/// `reference` is the singly protonated precursor mass plus one proton, the
/// sum of a complementary b and y ion pair.
fn symmetrize(
    peaks: &PeakList,
    reference: f64,
    precision: f64,
    table: &ResidueMassTable,
) -> Vec<SymmetricPeak> {
    let observed = peaks.as_slice();
    let order = peaks.intensity_order();
    let mirrors: Vec<f64> = order.iter().map(|i| reference - observed[*i].mass).collect();
    let near_mirror = |mass: f64| mirrors.iter().any(|m| masses_match(mass, *m, precision));

    let mut axis = Vec::with_capacity(observed.len() * 2 + 2);
    for i in order.iter().copied() {
        let peak = observed[i];
        let origin = if near_mirror(peak.mass) {
            PeakOrigin::Both
        } else {
            PeakOrigin::Native
        };
        axis.push(SymmetricPeak {
            mass: peak.mass,
            intensity: peak.intensity,
            origin,
        });
    }

    for (i, mirror) in order.iter().zip(mirrors.iter()) {
        if !observed
            .iter()
            .any(|p| masses_match(p.mass, *mirror, precision))
        {
            axis.push(SymmetricPeak {
                mass: *mirror,
                intensity: observed[*i].intensity,
                origin: PeakOrigin::Symmetric,
            });
        }
    }

    for anchor in [table.n_terminal(), reference - table.y_base_mass()] {
        if !near_mirror(anchor) {
            axis.push(SymmetricPeak {
                mass: anchor,
                intensity: BOOKKEEPING_INTENSITY,
                origin: PeakOrigin::Native,
            });
        }
    }

    axis.sort_by(|a, b| a.mass.total_cmp(&b.mass));
    axis.dedup_by(|a, b| a.mass == b.mass);
    axis
}

#[cfg(test)]
mod test {
    use super::*;

    fn peak_list(peaks: &[(f64, f64)]) -> PeakList {
        peaks.iter().map(|(m, i)| Peak::new(*m, *i)).collect()
    }

    #[test]
    fn test_filter_top_n() {
        let mut peaks = peak_list(&[(100.0, 5.0), (200.0, 10.0), (300.0, 5.0), (400.0, 1.0)]);
        peaks.filter_top_n(2);
        assert_eq!(peaks.masses(), vec![100.0, 200.0]);

        let mut peaks = peak_list(&[(100.0, 5.0), (200.0, 10.0)]);
        peaks.filter_top_n(5);
        assert_eq!(peaks.len(), 2);
    }

    #[test]
    fn test_filter_intensity_ratio() {
        let mut peaks = peak_list(&[(100.0, 1.0), (200.0, 100.0), (300.0, 2.0), (400.0, 50.0)]);
        peaks.filter_by_intensity_ratio(2.0);
        assert_eq!(peaks.masses(), vec![200.0, 300.0, 400.0]);

        let mut empty = PeakList::default();
        empty.filter_by_intensity_ratio(2.0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_theoretical_spectrum() -> Result<(), SpectrumError> {
        let table = ResidueMassTable::default();
        let spec = TheoreticalSpectrum::new("GA", &table)?;
        let expected = [1.007276, 58.028740, 129.065854];
        assert_eq!(spec.len(), expected.len());
        for (a, b) in spec.masses().iter().zip(expected) {
            assert!((a - b).abs() < 1e-5, "{a} != {b}");
        }
        assert!((spec.main_mass() - 146.069142).abs() < 1e-5);
        assert_eq!(
            TheoreticalSpectrum::new("GBA", &table),
            Err(SpectrumError::UnknownResidue('B'))
        );
        Ok(())
    }

    #[test]
    fn test_symmetrization() -> Result<(), SpectrumError> {
        let table = ResidueMassTable::default();
        let params = AlignmentParams {
            peak_filter: PeakFilter::TopN(60),
            ..Default::default()
        };
        let mirror_of_100 = 500.0 + PROTON - 100.0;
        let peaks = peak_list(&[(100.0, 10.0), (200.0, 1.0), (mirror_of_100, 5.0)]);
        let spec = ExperimentalSpectrum::new(500.0, 1, peaks, &params, &table)?;

        assert!((spec.main_mass() - (500.0 - PROTON)).abs() < 1e-9);
        assert_eq!(spec.observed_masses().len(), 3);

        let tags: Vec<PeakOrigin> = spec.axis().iter().map(|p| p.origin).collect();
        assert_eq!(
            tags,
            vec![
                PeakOrigin::Native,
                PeakOrigin::Both,
                PeakOrigin::Native,
                PeakOrigin::Symmetric,
                PeakOrigin::Both,
                PeakOrigin::Native,
            ]
        );
        let masses = spec.masses();
        assert!((masses[0] - table.n_terminal()).abs() < 1e-9);
        assert!((masses[3] - (mirror_of_100 + 100.0 - 200.0)).abs() < 1e-9);
        assert!((masses[5] - (500.0 + PROTON - table.y_base_mass())).abs() < 1e-9);
        assert!(masses.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(spec.axis()[0].intensity, BOOKKEEPING_INTENSITY);
        Ok(())
    }

    #[test]
    fn test_deduplicate_within_precision() {
        let mut peaks = peak_list(&[
            (100.0, 5.0),
            (100.005, 3.0),
            (200.0, 1.0),
            (200.01, 8.0),
            (300.0, 2.0),
        ]);
        peaks.deduplicate(0.02);
        assert_eq!(peaks.len(), 3);
        assert_eq!(peaks.as_slice()[0], Peak::new(100.0, 5.0));
        assert_eq!(peaks.as_slice()[1], Peak::new(200.01, 8.0));
        assert_eq!(peaks.masses()[2], 300.0);
    }

    #[test]
    fn test_experimental_peaks_deduplicated() -> Result<(), SpectrumError> {
        let table = ResidueMassTable::default();
        let params = AlignmentParams::default();
        let peaks = peak_list(&[(150.0, 20.0), (150.004, 30.0), (250.0, 40.0)]);
        let spec = ExperimentalSpectrum::new(400.0, 2, peaks, &params, &table)?;
        assert_eq!(spec.observed_masses(), &[150.004, 250.0]);
        Ok(())
    }

    #[test]
    fn test_invalid_charge() {
        let table = ResidueMassTable::default();
        let params = AlignmentParams::default();
        let err = ExperimentalSpectrum::new(500.0, 0, PeakList::default(), &params, &table);
        assert!(matches!(err, Err(SpectrumError::InvalidCharge(0))));
    }

    #[test]
    fn test_from_centroids() -> Result<(), SpectrumError> {
        let table = ResidueMassTable::default();
        let params = AlignmentParams::default();
        let peaks = vec![
            mzpeaks::CentroidPeak::new(150.0, 20.0, 0),
            mzpeaks::CentroidPeak::new(250.0, 40.0, 1),
        ];
        let spec = ExperimentalSpectrum::from_centroids(400.0, 2, &peaks, &params, &table)?;
        assert_eq!(spec.peaks().len(), 2);
        assert_eq!(spec.peaks().total_intensity(), 60.0);
        assert!((spec.main_mass() - (800.0 - 2.0 * PROTON)).abs() < 1e-9);
        Ok(())
    }
}
