//! Tunable parameters for alignment and refinement
use thiserror::Error;

use crate::residues::{ResidueMassTable, ResidueModifications};
use crate::spectrum::PeakOrigin;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("The mass precision must be non-negative, got {0}")]
    NegativePrecision(f64),
    #[error("The mass precision must be a finite number")]
    NonFinitePrecision,
    #[error("The peak filter value {0} is not valid")]
    InvalidFilterValue(f64),
    #[error("No residue {0:?} exists to carry a fixed modification")]
    UnknownModifiedResidue(String),
    #[error("The fixed modification for {0:?} is not a finite number")]
    NonFiniteModification(String),
    #[error("Cannot display masses with {0} decimals")]
    InvalidDecimals(usize),
}

/// Score increments for each transition of the alignment recurrence.
///
/// The aligned and re-aligned increments depend on how the experimental peak
/// reached by the transition was observed, see [`PeakOrigin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScoreTable {
    pub non_align: i32,
    pub re_align_native: i32,
    pub re_align_sym: i32,
    pub re_align_both: i32,
    pub align_native: i32,
    pub align_sym: i32,
    pub align_both: i32,
    pub re_align_native_no_offset: i32,
    pub re_align_sym_no_offset: i32,
    pub re_align_both_no_offset: i32,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            non_align: -4,
            re_align_native: 2,
            re_align_sym: 1,
            re_align_both: 6,
            align_native: 5,
            align_sym: 4,
            align_both: 10,
            re_align_native_no_offset: 5,
            re_align_sym_no_offset: 4,
            re_align_both_no_offset: 10,
        }
    }
}

/// The increments that apply when a transition lands on a peak of a given origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionScores {
    pub align: i32,
    pub re_align: i32,
    pub re_align_no_offset: i32,
}

impl ScoreTable {
    pub fn for_origin(&self, origin: PeakOrigin) -> TransitionScores {
        match origin {
            PeakOrigin::Native => TransitionScores {
                align: self.align_native,
                re_align: self.re_align_native,
                re_align_no_offset: self.re_align_native_no_offset,
            },
            PeakOrigin::Symmetric => TransitionScores {
                align: self.align_sym,
                re_align: self.re_align_sym,
                re_align_no_offset: self.re_align_sym_no_offset,
            },
            PeakOrigin::Both => TransitionScores {
                align: self.align_both,
                re_align: self.re_align_both,
                re_align_no_offset: self.re_align_both_no_offset,
            },
        }
    }
}

/// How to thin out an experimental peak list before alignment
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeakFilter {
    /// Keep the `n` most intense peaks
    TopN(usize),
    /// Keep peaks at least this percentage of the most intense peak
    IntensityRatio(f64),
}

impl Default for PeakFilter {
    fn default() -> Self {
        Self::IntensityRatio(2.0)
    }
}

impl PeakFilter {
    /// The number of peaks that survive filtering, if it is bounded
    pub fn max_peaks(&self) -> Option<usize> {
        match self {
            Self::TopN(n) => Some(*n),
            Self::IntensityRatio(_) => None,
        }
    }
}

pub const DEFAULT_PRECISION: f64 = 0.02;
pub const DEFAULT_DECIMALS: usize = 2;
pub const DEFAULT_COMPLEMENTARY_DROP_TOLERANCE: usize = 2;

/// The immutable set of parameters shared by every alignment in a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AlignmentParams {
    /// The mass difference below which two masses are considered equal, in Daltons
    pub precision: f64,
    pub peak_filter: PeakFilter,
    pub scores: ScoreTable,
    /// Re-aligning onto the last residue costs a non-alignment plus an alignment
    pub better_end_realign: bool,
    /// The minimum best score for a pair to be reported
    pub min_score: i32,
    /// The number of decimals used when writing masses
    pub decimals: usize,
    /// How many shared peaks complementary offset elimination may lose and still be kept
    pub complementary_drop_tolerance: usize,
    /// Log the alignment matrices of every pair
    pub debug: bool,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
            peak_filter: PeakFilter::default(),
            scores: ScoreTable::default(),
            better_end_realign: false,
            min_score: 0,
            decimals: DEFAULT_DECIMALS,
            complementary_drop_tolerance: DEFAULT_COMPLEMENTARY_DROP_TOLERANCE,
            debug: false,
        }
    }
}

impl AlignmentParams {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.precision.is_finite() {
            return Err(ConfigurationError::NonFinitePrecision);
        }
        if self.precision < 0.0 {
            return Err(ConfigurationError::NegativePrecision(self.precision));
        }
        match self.peak_filter {
            PeakFilter::TopN(0) => return Err(ConfigurationError::InvalidFilterValue(0.0)),
            PeakFilter::IntensityRatio(r) if !(0.0..=100.0).contains(&r) => {
                return Err(ConfigurationError::InvalidFilterValue(r))
            }
            _ => {}
        }
        if self.decimals > 12 {
            return Err(ConfigurationError::InvalidDecimals(self.decimals));
        }
        Ok(())
    }
}

/// Everything an alignment needs that does not change between pairs: the
/// parameters and the residue mass table derived from the fixed modifications.
#[derive(Debug, Default, Clone)]
pub struct AlignmentConfig {
    pub params: AlignmentParams,
    pub residues: ResidueMassTable,
}

impl AlignmentConfig {
    /// Validate `params` and build the residue table, failing before any
    /// alignment work can start.
    pub fn new(
        params: AlignmentParams,
        modifications: &ResidueModifications,
    ) -> Result<Self, ConfigurationError> {
        params.validate()?;
        let residues = ResidueMassTable::with_modifications(modifications)?;
        Ok(Self { params, residues })
    }

    #[inline]
    pub fn precision(&self) -> f64 {
        self.params.precision
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reject_negative_precision() {
        let params = AlignmentParams {
            precision: -0.02,
            ..Default::default()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigurationError::NegativePrecision(-0.02))
        );
        assert!(AlignmentConfig::new(params, &ResidueModifications::default()).is_err());

        let params = AlignmentParams {
            precision: f64::NAN,
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ConfigurationError::NonFinitePrecision));
    }

    #[test]
    fn test_filter_validation() {
        let params = AlignmentParams {
            peak_filter: PeakFilter::TopN(0),
            ..Default::default()
        };
        assert!(params.validate().is_err());
        let params = AlignmentParams {
            peak_filter: PeakFilter::IntensityRatio(120.0),
            ..Default::default()
        };
        assert!(params.validate().is_err());
        assert!(AlignmentParams::default().validate().is_ok());
    }

    #[test]
    fn test_score_lookup() {
        let scores = ScoreTable::default();
        let native = scores.for_origin(PeakOrigin::Native);
        assert_eq!(native.align, 5);
        assert_eq!(native.re_align, 2);
        let both = scores.for_origin(PeakOrigin::Both);
        assert_eq!(both.align, 10);
        assert_eq!(both.re_align, 6);
    }
}
