//! Spectral alignment of tandem mass spectra against candidate peptides.
//!
//! The b-ion ladder of a peptide is aligned against a symmetrized view of an
//! observed spectrum, tolerating mass offsets anywhere along the sequence. The
//! best alignment is then refined so that offsets are placed where they explain
//! the most fragment peaks.
pub mod annotation;
pub mod batch;
pub mod engine;
pub mod matrix;
pub mod params;
pub mod peaks;
pub mod refine;
pub mod residues;
pub mod result;
pub mod spectrum;

pub use annotation::{format_mass, AnnotatedSequence, AnnotationError, Token};
pub use batch::{
    partition_batch, AlignmentWorker, BatchItem, BatchProgress, RawScan, RowError,
    SpectrumSource,
};
pub use engine::{Alignment, AlignmentEngine, BestCell};
pub use params::{AlignmentConfig, AlignmentParams, ConfigurationError, PeakFilter, ScoreTable};
pub use residues::{ResidueMassTable, ResidueModifications, PROTON};
pub use result::{report_header, AlignmentRecord, REPORT_COLUMNS};
pub use spectrum::{
    ExperimentalSpectrum, Peak, PeakList, PeakOrigin, SpectrumError, TheoreticalSpectrum,
};
