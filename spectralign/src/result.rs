//! The per-pair output of an alignment
use itertools::Itertools;

use crate::annotation::{format_mass, AnnotatedSequence};

/// The column names of the alignment report, in order. `Title` and `Peptide`
/// identify the pair, the rest are the fields of [`AlignmentRecord`].
pub const REPORT_COLUMNS: [&str; 11] = [
    "Title",
    "Peptide",
    "MassDelta",
    "SharedPeaksBeforeAlign",
    "SharedPeaksAfterAlign",
    "PreAlignedPeptide",
    "AlignedPeptide",
    "NbShift",
    "NotAlignedMass",
    "ScoreAlign",
    "IntensityExplained",
];

pub fn report_header() -> String {
    REPORT_COLUMNS.iter().join(";")
}

/// Everything reported about one peptide-spectrum match
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    /// Precursor neutral mass minus peptide neutral mass
    pub true_delta_mass: f64,
    pub shared_peaks_before: usize,
    pub shared_peaks_after: usize,
    /// The sequence as reconstructed by backtracking, residual included
    pub pre_aligned: AnnotatedSequence,
    /// The refined sequence after bracket stripping
    pub aligned: AnnotatedSequence,
    pub modification_count: usize,
    /// The mass left unexplained by the refined sequence
    pub total_delta_mass: f64,
    pub score: i32,
    pub confidence_rate: f64,
}

impl AlignmentRecord {
    /// The `;`-separated record fields, masses written with `decimals` digits
    pub fn to_row(&self, decimals: usize) -> String {
        [
            format_mass(self.true_delta_mass, decimals),
            self.shared_peaks_before.to_string(),
            self.shared_peaks_after.to_string(),
            self.pre_aligned.display(decimals).to_string(),
            self.aligned.display(decimals).to_string(),
            self.modification_count.to_string(),
            format_mass(self.total_delta_mass, decimals),
            self.score.to_string(),
            self.confidence_rate.to_string(),
        ]
        .iter()
        .join(";")
    }
}
