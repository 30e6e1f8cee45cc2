//! The spectral alignment recurrence, its backtrack, and the per-pair pipeline.
//!
//! The theoretical b-ion ladder of the candidate peptide is aligned against
//! the symmetrized experimental mass axis. A theoretical step aligns with an
//! experimental step when both differ by the same residue mass. A step may
//! also be *re-aligned*, jumping to a new mass offset, or left *non-aligned*,
//! which marks the residue as skipped.
use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::annotation::{AnnotatedSequence, Token};
use crate::matrix::{AlignType, AlignmentMatrices, Origin};
use crate::params::{AlignmentConfig, TransitionScores};
use crate::peaks::{count_shared_peaks, explained_intensity_rate};
use crate::refine::{Refinement, Refiner};
use crate::result::AlignmentRecord;
use crate::spectrum::{ExperimentalSpectrum, PeakOrigin, TheoreticalSpectrum};

/// The highest scoring cell of the last theoretical row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestCell {
    pub score: i32,
    pub row: usize,
    pub column: usize,
}

/// A backtracked alignment, before refinement
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub best: BestCell,
    /// Precursor neutral mass minus peptide neutral mass
    pub true_delta_mass: f64,
    /// The reconstructed sequence, ending with the unexplained part of
    /// `true_delta_mass`
    pub sequence: AnnotatedSequence,
    pub modification_count: usize,
}

/// Aligns peptides against spectra, reusing one set of matrices.
///
/// An engine is not shared between threads; each worker owns one.
#[derive(Debug)]
pub struct AlignmentEngine<'a> {
    config: &'a AlignmentConfig,
    matrices: AlignmentMatrices,
}

impl<'a> AlignmentEngine<'a> {
    pub fn new(
        config: &'a AlignmentConfig,
        max_theoretical: usize,
        max_experimental: usize,
    ) -> Self {
        Self {
            config,
            matrices: AlignmentMatrices::new(max_theoretical, max_experimental),
        }
    }

    pub fn config(&self) -> &'a AlignmentConfig {
        self.config
    }

    pub fn matrices(&self) -> &AlignmentMatrices {
        &self.matrices
    }

    #[inline]
    fn precision(&self) -> f64 {
        self.config.params.precision
    }

    /// Fill the matrices for `theoretical` against an experimental axis of
    /// `experimental` masses tagged by `origins`, returning the best cell of
    /// the last row.
    ///
    /// There is no best cell when either axis has nothing to align.
    pub fn fill(
        &mut self,
        theoretical: &[f64],
        experimental: &[f64],
        origins: &[PeakOrigin],
    ) -> Option<BestCell> {
        debug_assert_eq!(experimental.len(), origins.len());
        self.matrices.prepare(theoretical, experimental);
        let last_row = theoretical.len().checked_sub(1)?;
        let mut best: Option<BestCell> = None;
        for i in 1..theoretical.len() {
            for j in 1..experimental.len() {
                self.fill_cell(i, j, theoretical, experimental, origins[j]);
                if i == last_row {
                    let score = self.matrices.score.get(i, j);
                    if best.map_or(true, |b| score > b.score) {
                        best = Some(BestCell {
                            score,
                            row: i,
                            column: j,
                        });
                    }
                }
            }
        }
        best
    }

    fn transition_scores(
        &self,
        row: usize,
        last_row: usize,
        origin: PeakOrigin,
    ) -> TransitionScores {
        let params = &self.config.params;
        let mut scores = params.scores.for_origin(origin);
        if params.better_end_realign && row == last_row {
            scores.re_align = params.scores.non_align + scores.align;
        }
        scores
    }

    /// The column `k <= j` whose distance to `j` matches the residue between
    /// rows `i - 1` and `i`
    fn find_k(
        &self,
        i: usize,
        j: usize,
        theoretical: &[f64],
        experimental: &[f64],
    ) -> Option<usize> {
        let precision = self.precision();
        let step = theoretical[i] - theoretical[i - 1];
        for k in (0..=j).rev() {
            let distance = experimental[j] - experimental[k];
            if (step - distance).abs() < precision {
                return Some(k);
            } else if distance > step + precision {
                return None;
            }
        }
        None
    }

    fn fill_cell(
        &mut self,
        i: usize,
        j: usize,
        theoretical: &[f64],
        experimental: &[f64],
        origin: PeakOrigin,
    ) {
        let precision = self.precision();
        let non_align = self.config.params.scores.non_align;
        let scores = self.transition_scores(i, theoretical.len() - 1, origin);
        let mats = &self.matrices;

        let Some(k) = self.find_k(i, j, theoretical, experimental) else {
            let score = mats.score.get(i - 1, j) + non_align;
            self.set_cell(i, j, score, Origin::new(j, AlignType::NonAligned));
            return;
        };

        let current_delta = mats.delta_mass.get(i, j);
        let mut aligned = mats.score.get(i - 1, k) + scores.align;
        if mats.origin.get(i - 1, k).is_non_aligned() {
            let mut l = i - 1;
            while l > 0 && mats.origin.get(l, k).column == k {
                l -= 1;
            }
            if (mats.delta_mass.get(l, k) - current_delta).abs() > precision {
                aligned = mats.score.get(i - 1, k) + scores.re_align;
            }
        }

        let realigned = if i > 1 {
            Some(self.best_realignment(i, k, &scores))
        } else {
            None
        };

        match realigned {
            Some((score, origin)) if score > aligned => self.set_cell(i, j, score, origin),
            _ => self.set_cell(i, j, aligned, Origin::new(k, AlignType::Aligned)),
        }
    }

    /// The best re-alignment into row `i` from any column `m <= k` of row `i - 1`
    fn best_realignment(&self, i: usize, k: usize, scores: &TransitionScores) -> (i32, Origin) {
        let mats = &self.matrices;
        let mut best_m = k;
        let mut best_score = mats.score.get(i - 1, k);
        for m in (0..k).rev() {
            let score = mats.score.get(i - 1, m);
            if score > best_score {
                best_score = score;
                best_m = m;
            }
        }

        let last_align = (1..i)
            .rev()
            .find(|l| !mats.origin.get(*l, best_m).is_non_aligned())
            .unwrap_or(i - 1);
        if last_align != i - 1
            && (mats.delta_mass.get(i - 1, k) - mats.delta_mass.get(last_align, best_m)).abs()
                < self.precision()
        {
            (
                best_score + scores.re_align_no_offset,
                Origin::new(best_m, AlignType::Aligned),
            )
        } else {
            (
                best_score + scores.re_align,
                Origin::new(best_m, AlignType::ReAligned),
            )
        }
    }

    #[inline]
    fn set_cell(&mut self, i: usize, j: usize, score: i32, origin: Origin) {
        self.matrices.score.set(i, j, score);
        self.matrices.origin.set(i, j, origin);
    }

    /// Walk the origin chain from `best` back to the boundary row, rebuilding
    /// the peptide with its skipped residues and mass offsets.
    pub fn backtrack(&self, best: BestCell, peptide: &str, true_delta_mass: f64) -> Alignment {
        let precision = self.precision();
        let residues: Vec<char> = peptide.chars().collect();
        let mats = &self.matrices;

        let mut tokens: VecDeque<Token> = VecDeque::with_capacity(residues.len() + 4);
        let mut modification_count = 0;
        let mut explained = 0.0;
        let (mut i, mut j) = (best.row, best.column);

        while i > 0 {
            let current_delta = mats.delta_mass.get(i, j);
            let origin = mats.origin.get(i, j);
            let mut p = i - 1;
            let column = origin.column;
            let mut segment: VecDeque<Token> = VecDeque::new();

            if origin.is_non_aligned() {
                segment.push_front(Token::SkippedResidue(residues[i - 1]));
                while p > 0 && mats.origin.get(p, column).is_non_aligned() {
                    segment.push_front(Token::SkippedResidue(residues[p - 1]));
                    p -= 1;
                }
            } else {
                segment.push_back(Token::Residue(residues[i - 1]));
                if p > 0 && mats.origin.get(p, column).is_non_aligned() {
                    let mut previous_delta = mats.delta_mass.get(p, column);
                    let mut run: VecDeque<Token> = VecDeque::new();
                    while p > 0 && mats.origin.get(p, column).is_non_aligned() {
                        run.push_front(Token::SkippedResidue(residues[p - 1]));
                        p -= 1;
                        previous_delta = if p == 0 {
                            0.0
                        } else {
                            mats.delta_mass.get(p, column)
                        };
                    }
                    let shift = current_delta - previous_delta;
                    if shift.abs() > precision {
                        segment.push_front(Token::Offset(shift));
                        explained += shift;
                        modification_count += 1;
                    }
                    for token in run.into_iter().rev() {
                        segment.push_front(token);
                    }
                } else if origin.kind == AlignType::ReAligned {
                    let shift = current_delta - mats.delta_mass.get(p, column);
                    segment.push_front(Token::Offset(shift));
                    explained += shift;
                    modification_count += 1;
                } else if i == 1 && current_delta.abs() > precision {
                    segment.push_front(Token::Offset(current_delta));
                    explained += current_delta;
                    modification_count += 1;
                }
            }

            for token in segment.into_iter().rev() {
                tokens.push_front(token);
            }
            i = p;
            j = column;
        }

        tokens.push_back(Token::TrailingResidual(true_delta_mass - explained));
        Alignment {
            best,
            true_delta_mass,
            sequence: AnnotatedSequence::new(tokens.into()),
            modification_count,
        }
    }

    /// Align `theoretical` against `experimental` and backtrack from the best cell
    pub fn align(
        &mut self,
        theoretical: &TheoreticalSpectrum,
        experimental: &ExperimentalSpectrum,
    ) -> Option<Alignment> {
        let origins: Vec<PeakOrigin> = experimental.axis().iter().map(|p| p.origin).collect();
        let best = self.fill(theoretical.masses(), experimental.masses(), &origins)?;
        if self.config.params.debug {
            trace!(
                "Best score {} at row {} column {} for {}\n{}",
                best.score,
                best.row,
                best.column,
                theoretical.peptide(),
                self.matrices.dump()
            );
        }
        let true_delta_mass = experimental.main_mass() - theoretical.main_mass();
        Some(self.backtrack(best, theoretical.peptide(), true_delta_mass))
    }

    /// Align, refine and summarize one peptide-spectrum pair. Pairs scoring
    /// below the configured minimum produce no record.
    pub fn process(
        &mut self,
        theoretical: &TheoreticalSpectrum,
        experimental: &ExperimentalSpectrum,
    ) -> Option<AlignmentRecord> {
        let alignment = self.align(theoretical, experimental)?;
        let params = &self.config.params;
        if alignment.best.score < params.min_score {
            return None;
        }
        let table = &self.config.residues;
        let observed = experimental.observed_masses();

        let refiner = Refiner::new(self.config, experimental);
        let refinement = refine_or_keep(&refiner, theoretical.peptide(), &alignment.sequence);

        let plain = AnnotatedSequence::from_peptide(theoretical.peptide());
        let shared_peaks_before = count_shared_peaks(&plain, observed, table, params.precision);
        let confidence_rate = explained_intensity_rate(
            &refinement.sequence,
            experimental.peaks(),
            table,
            params.precision,
        );

        Some(AlignmentRecord {
            true_delta_mass: alignment.true_delta_mass,
            shared_peaks_before,
            shared_peaks_after: refinement.shared_peaks,
            pre_aligned: alignment.sequence,
            aligned: refinement.aligned,
            modification_count: alignment.modification_count,
            total_delta_mass: refinement.residual,
            score: alignment.best.score,
            confidence_rate,
        })
    }
}

/// Refine `sequence`, reporting it unrefined when it cannot be rewritten
fn refine_or_keep(refiner: &Refiner, peptide: &str, sequence: &AnnotatedSequence) -> Refinement {
    match refiner.refine(sequence) {
        Ok(refinement) => refinement,
        Err(err) => {
            debug!("Could not refine {peptide} aligned as {sequence:?}: {err}");
            refiner.unrefined(sequence)
        }
    }
}
