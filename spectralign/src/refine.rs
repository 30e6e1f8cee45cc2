//! Rewrites of a backtracked alignment which try to explain more observed
//! peaks with the same total mass.
//!
//! Each step proposes a rewritten sequence and keeps it only if the number of
//! shared peaks with the observed spectrum does not drop below that step's
//! threshold.
use tracing::trace;

use crate::annotation::{AnnotatedSequence, AnnotationError, Token};
use crate::params::{AlignmentConfig, AlignmentParams};
use crate::peaks::{b_ion_mass, count_shared_peaks, y_ion_mass};
use crate::residues::ResidueMassTable;
use crate::spectrum::{masses_match, ExperimentalSpectrum};

/// The outcome of refining one backtracked sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    /// The refined sequence, carrying the residual when it is not negligible
    pub sequence: AnnotatedSequence,
    /// [`Refinement::sequence`] with observed skipped residues made literal
    pub aligned: AnnotatedSequence,
    pub residual: f64,
    /// The shared peak count after the residual was placed
    pub baseline_shared_peaks: usize,
    pub shared_peaks: usize,
}

/// Remove offsets that cancel out.
///
/// An offset within `precision` of zero is dropped. Any other offset is paired
/// with the first earlier unpaired offset it sums to zero with, and both are
/// dropped.
pub fn eliminate_complementary_deltas(
    sequence: &AnnotatedSequence,
    precision: f64,
) -> AnnotatedSequence {
    let offsets: Vec<(usize, f64)> = sequence.offsets().collect();
    let mut removed = vec![false; offsets.len()];
    for (a, (_, value)) in offsets.iter().enumerate() {
        if value.abs() < precision {
            removed[a] = true;
            continue;
        }
        let partner =
            (0..a).find(|b| !removed[*b] && masses_match(*value, -offsets[*b].1, precision));
        if let Some(b) = partner {
            removed[a] = true;
            removed[b] = true;
        }
    }
    let drop: Vec<usize> = offsets
        .iter()
        .zip(removed)
        .filter_map(|((i, _), r)| r.then_some(*i))
        .collect();
    sequence
        .tokens()
        .iter()
        .enumerate()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, t)| *t)
        .collect()
}

/// Explain negative offsets by residues that were never observed.
///
/// For each negative offset, the run of skipped residues directly before it is
/// walked from its start, and each residue whose mass still fits in the offset
/// is removed from the sequence and subtracted from the offset's magnitude.
pub fn eliminate_negative_offsets(
    sequence: &AnnotatedSequence,
    table: &ResidueMassTable,
    precision: f64,
) -> AnnotatedSequence {
    let mut tokens = sequence.tokens().to_vec();
    let mut position = 0;
    while position < tokens.len() {
        let value = match tokens[position] {
            Token::Offset(v) if v < 0.0 => v,
            _ => {
                position += 1;
                continue;
            }
        };
        let run_start = tokens[..position]
            .iter()
            .rposition(|t| !t.is_skipped())
            .map_or(0, |i| i + 1);

        let mut remaining = -value;
        let mut absorbed = run_start;
        while remaining > precision && absorbed < position {
            let mass = tokens[absorbed].mass(table);
            if remaining - mass > -precision {
                remaining -= mass;
                absorbed += 1;
            } else {
                break;
            }
        }

        tokens.drain(run_start..absorbed);
        let offset_at = position - (absorbed - run_start);
        if remaining.abs() > precision {
            tokens[offset_at] = Token::Offset(-remaining);
            position = offset_at + 1;
        } else {
            tokens.remove(offset_at);
            position = offset_at;
        }
    }
    AnnotatedSequence::new(tokens)
}

/// Turn skipped residues into literal residues when the b-ion or y-ion that
/// flanks them was observed.
pub fn strip_brackets(
    sequence: &AnnotatedSequence,
    observed: &[f64],
    table: &ResidueMassTable,
    precision: f64,
) -> AnnotatedSequence {
    sequence
        .tokens()
        .iter()
        .enumerate()
        .map(|(i, token)| match token {
            Token::SkippedResidue(c) => {
                let b = b_ion_mass(sequence, i, table);
                let y = y_ion_mass(sequence, i, table);
                if observed
                    .iter()
                    .any(|m| masses_match(*m, b, precision) || masses_match(*m, y, precision))
                {
                    Token::Residue(*c)
                } else {
                    *token
                }
            }
            _ => *token,
        })
        .collect()
}

/// Scores candidate rewrites against one experimental spectrum
#[derive(Debug, Clone, Copy)]
pub struct Refiner<'a> {
    params: &'a AlignmentParams,
    table: &'a ResidueMassTable,
    observed: &'a [f64],
    precursor_mass: f64,
}

impl<'a> Refiner<'a> {
    pub fn new(config: &'a AlignmentConfig, spectrum: &'a ExperimentalSpectrum) -> Self {
        Self {
            params: &config.params,
            table: &config.residues,
            observed: spectrum.observed_masses(),
            precursor_mass: spectrum.main_mass(),
        }
    }

    #[inline]
    fn precision(&self) -> f64 {
        self.params.precision
    }

    pub fn shared_peaks(&self, sequence: &AnnotatedSequence) -> usize {
        count_shared_peaks(sequence, self.observed, self.table, self.precision())
    }

    /// The mass the precursor carries beyond `sequence`
    pub fn residual(&self, sequence: &AnnotatedSequence) -> f64 {
        self.precursor_mass - sequence.modified_mass(self.table)
    }

    /// Run every refinement step on a backtracked sequence
    pub fn refine(&self, backtracked: &AnnotatedSequence) -> Result<Refinement, AnnotationError> {
        backtracked.validate()?;
        let precision = self.precision();

        let (mut current, baseline) = self.fold_residual(backtracked);
        trace!("Baseline {baseline} shared peaks for {current}");

        let candidate = eliminate_complementary_deltas(&current, precision);
        if candidate != current
            && self.shared_peaks(&candidate) + self.params.complementary_drop_tolerance >= baseline
        {
            trace!("Removed complementary offsets: {candidate}");
            current = candidate;
        }

        let candidate = eliminate_negative_offsets(&current, self.table, precision);
        if candidate != current && self.shared_peaks(&candidate) >= baseline {
            trace!("Explained negative offsets: {candidate}");
            current = candidate;
        }

        // Relocation and neutral loss removal are measured against the count
        // before any rewrite, not against what the earlier steps kept.
        let (mut current, best) = self.relocate_offsets(current, baseline);

        let mut residual = self.residual(&current);
        if residual.abs() > precision {
            current = self.cumulate_residual(current, residual, best);
            residual = self.residual(&current);
        }
        current.validate()?;

        let shared_peaks = self.shared_peaks(&current);
        let sequence = if residual.abs() > precision {
            current.with_residual(residual)
        } else {
            current
        };
        let aligned = strip_brackets(&sequence, self.observed, self.table, precision);
        Ok(Refinement {
            sequence,
            aligned,
            residual,
            baseline_shared_peaks: baseline,
            shared_peaks,
        })
    }

    /// Report a backtracked sequence without rewriting it
    pub fn unrefined(&self, backtracked: &AnnotatedSequence) -> Refinement {
        let shared_peaks = self.shared_peaks(backtracked);
        Refinement {
            sequence: backtracked.clone(),
            aligned: strip_brackets(backtracked, self.observed, self.table, self.precision()),
            residual: backtracked.trailing_residual().unwrap_or(0.0),
            baseline_shared_peaks: shared_peaks,
            shared_peaks,
        }
    }

    /// Drop the trailing residual, or fold it onto the end of the sequence as
    /// an offset when that explains strictly more peaks.
    fn fold_residual(&self, sequence: &AnnotatedSequence) -> (AnnotatedSequence, usize) {
        let (body, residual) = sequence.split_residual();
        let unfolded = self.shared_peaks(&body);
        match residual {
            Some(r) => {
                let mut folded = body.clone();
                folded.push(Token::Offset(r));
                let count = self.shared_peaks(&folded);
                if count > unfolded {
                    (folded, count)
                } else {
                    (body, unfolded)
                }
            }
            None => (body, unfolded),
        }
    }

    /// Try each offset before the skipped residues preceding it, then without it
    fn relocate_offsets(
        &self,
        mut current: AnnotatedSequence,
        mut best: usize,
    ) -> (AnnotatedSequence, usize) {
        let mut ordinal = 0;
        loop {
            let Some((position, _)) = current.offsets().nth(ordinal) else {
                break;
            };
            let tokens = current.tokens();
            let run = tokens[..position]
                .iter()
                .rev()
                .take_while(|t| t.is_skipped())
                .count();

            let mut relocated: Option<(AnnotatedSequence, usize)> = None;
            for shift in 1..=run {
                let mut moved = tokens.to_vec();
                let offset = moved.remove(position);
                moved.insert(position - shift, offset);
                let candidate = AnnotatedSequence::new(moved);
                let count = self.shared_peaks(&candidate);
                if count > relocated.as_ref().map_or(best, |(_, c)| *c) {
                    relocated = Some((candidate, count));
                }
            }
            let mut position = position;
            if let Some((candidate, count)) = relocated {
                trace!("Relocated offset: {candidate} with {count} shared peaks");
                position = candidate
                    .offsets()
                    .nth(ordinal)
                    .map_or(position, |(i, _)| i);
                current = candidate;
                best = count;
            }

            let mut without = current.tokens().to_vec();
            without.remove(position);
            let candidate = AnnotatedSequence::new(without);
            let count = self.shared_peaks(&candidate);
            if count >= best {
                trace!("Dropped offset as a neutral loss: {candidate}");
                current = candidate;
                best = count;
            } else {
                ordinal += 1;
            }
        }
        (current, best)
    }

    /// Add the unexplained precursor mass to the first offset that can carry it
    /// without losing shared peaks
    fn cumulate_residual(
        &self,
        current: AnnotatedSequence,
        residual: f64,
        best: usize,
    ) -> AnnotatedSequence {
        for (position, value) in current.offsets() {
            let mut tokens = current.tokens().to_vec();
            tokens[position] = Token::Offset(value + residual);
            let candidate = AnnotatedSequence::new(tokens);
            if self.shared_peaks(&candidate) >= best {
                trace!("Cumulated residual {residual} into {candidate}");
                return candidate;
            }
        }
        current
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::residues::PROTON;
    use crate::spectrum::{Peak, PeakList};

    const PRECISION: f64 = 0.02;

    #[test]
    fn test_complementary_deltas() -> Result<(), AnnotationError> {
        let seq: AnnotatedSequence = "[150.00]SDS[-150.00]KR".parse()?;
        let result = eliminate_complementary_deltas(&seq, PRECISION);
        assert_eq!(result.display(2).to_string(), "SDSKR");

        let seq: AnnotatedSequence = "[10.00]S[0.01]D[-10.00]S[-10.00]K".parse()?;
        let result = eliminate_complementary_deltas(&seq, PRECISION);
        assert_eq!(result.display(2).to_string(), "SDS[-10.00]K");
        Ok(())
    }

    #[test]
    fn test_negative_offsets() -> Result<(), AnnotationError> {
        let table = ResidueMassTable::default();
        let g = table.mass('G').unwrap();
        let a = table.mass('A').unwrap();

        let seq = AnnotatedSequence::new(vec![
            Token::Residue('K'),
            Token::SkippedResidue('G'),
            Token::SkippedResidue('A'),
            Token::Offset(-(g + a)),
            Token::Residue('R'),
        ]);
        let result = eliminate_negative_offsets(&seq, &table, PRECISION);
        assert_eq!(result.display(2).to_string(), "KR");
        assert!((result.modified_mass(&table) - seq.modified_mass(&table)).abs() < 1e-9);

        let seq = AnnotatedSequence::new(vec![
            Token::Residue('K'),
            Token::SkippedResidue('G'),
            Token::SkippedResidue('A'),
            Token::Offset(-(g + 10.0)),
            Token::Residue('R'),
        ]);
        let result = eliminate_negative_offsets(&seq, &table, PRECISION);
        assert_eq!(result.display(2).to_string(), "K[A][-10.00]R");

        let seq: AnnotatedSequence = "K[A][-10.00]R".parse()?;
        let result = eliminate_negative_offsets(&seq, &table, PRECISION);
        assert_eq!(result, seq);
        Ok(())
    }

    #[test]
    fn test_strip_brackets() -> Result<(), AnnotationError> {
        let table = ResidueMassTable::default();
        let seq: AnnotatedSequence = "G[A][K]_[1.00]".parse()?;
        let b_after_a = PROTON + table.mass('G').unwrap() + table.mass('A').unwrap();
        let result = strip_brackets(&seq, &[b_after_a], &table, PRECISION);
        assert_eq!(result.display(2).to_string(), "GA[K]_[1.00]");

        let y_from_k = table.y_base_mass() + table.mass('K').unwrap();
        let result = strip_brackets(&seq, &[y_from_k], &table, PRECISION);
        assert_eq!(result.display(2).to_string(), "G[A]K_[1.00]");
        Ok(())
    }

    #[test_log::test]
    fn test_refine_folds_residual() -> Result<(), Box<dyn std::error::Error>> {
        let config = AlignmentConfig::default();
        let table = &config.residues;
        let shift = 42.010565;
        let peptide = "GAK";
        let body = AnnotatedSequence::from_peptide(peptide);
        let mut modified = body.clone();
        modified.push(Token::Offset(shift));
        let generated =
            crate::peaks::generate_theoretical_peaks(&modified, table, config.params.precision);
        let peaks: PeakList = generated.iter().map(|m| Peak::new(*m, 50.0)).collect();
        let precursor = table.peptide_mass(peptide) + shift + PROTON;
        let spectrum = ExperimentalSpectrum::new(precursor, 1, peaks, &config.params, table)?;

        let refiner = Refiner::new(&config, &spectrum);
        let backtracked = body.with_residual(shift);
        let refinement = refiner.refine(&backtracked)?;
        assert!(refinement.residual.abs() < PRECISION);
        assert!(refinement.sequence.trailing_residual().is_none());
        assert!(refinement.shared_peaks >= refiner.shared_peaks(&body));
        assert_eq!(refinement.shared_peaks, refinement.baseline_shared_peaks);
        Ok(())
    }

    #[test]
    fn test_unrefined() -> Result<(), Box<dyn std::error::Error>> {
        let config = AlignmentConfig::default();
        let peaks: PeakList = [Peak::new(100.0, 10.0)].into_iter().collect();
        let spectrum = ExperimentalSpectrum::new(300.0, 1, peaks, &config.params, &config.residues)?;
        let refiner = Refiner::new(&config, &spectrum);
        let backtracked: AnnotatedSequence = "[G]AK_[3.00]".parse()?;
        let refinement = refiner.unrefined(&backtracked);
        assert_eq!(refinement.sequence, backtracked);
        assert_eq!(refinement.residual, 3.0);
        Ok(())
    }

    /// A spectrum holding exactly the fragment peaks generated for `truth`
    fn spectrum_of(config: &AlignmentConfig, truth: &AnnotatedSequence) -> ExperimentalSpectrum {
        let table = &config.residues;
        let generated =
            crate::peaks::generate_theoretical_peaks(truth, table, config.params.precision);
        let peaks: PeakList = generated.iter().map(|m| Peak::new(*m, 50.0)).collect();
        let precursor = truth.modified_mass(table) + PROTON;
        ExperimentalSpectrum::new(precursor, 1, peaks, &config.params, table).unwrap()
    }

    #[test_log::test]
    fn test_offset_relocated_before_skipped_run() {
        let config = AlignmentConfig::default();
        let shift = 79.966331;
        let truth = AnnotatedSequence::new(vec![
            Token::Residue('K'),
            Token::Offset(shift),
            Token::Residue('G'),
            Token::Residue('A'),
            Token::Residue('R'),
        ]);
        let spectrum = spectrum_of(&config, &truth);
        let refiner = Refiner::new(&config, &spectrum);

        let misplaced = AnnotatedSequence::new(vec![
            Token::Residue('K'),
            Token::SkippedResidue('G'),
            Token::SkippedResidue('A'),
            Token::Offset(shift),
            Token::Residue('R'),
        ]);
        let before = refiner.shared_peaks(&misplaced);
        let (relocated, best) = refiner.relocate_offsets(misplaced, before);
        assert_eq!(
            relocated,
            AnnotatedSequence::new(vec![
                Token::Residue('K'),
                Token::Offset(shift),
                Token::SkippedResidue('G'),
                Token::SkippedResidue('A'),
                Token::Residue('R'),
            ])
        );
        assert!(best > before, "{best} <= {before}");
        assert_eq!(best, refiner.shared_peaks(&relocated));
    }

    #[test_log::test]
    fn test_offset_dropped_as_neutral_loss() {
        let config = AlignmentConfig::default();
        let truth = AnnotatedSequence::from_peptide("GAKR");
        let spectrum = spectrum_of(&config, &truth);
        let refiner = Refiner::new(&config, &spectrum);

        let with_offset = AnnotatedSequence::new(vec![
            Token::Residue('G'),
            Token::Residue('A'),
            Token::Offset(50.0),
            Token::Residue('K'),
            Token::Residue('R'),
        ]);
        let before = refiner.shared_peaks(&with_offset);
        let (result, best) = refiner.relocate_offsets(with_offset, before);
        assert_eq!(result, truth);
        assert_eq!(best, refiner.shared_peaks(&truth));
        assert!(best > before);
    }

    #[test_log::test]
    fn test_residual_cumulated_onto_first_offset() {
        let config = AlignmentConfig::default();
        let shift = 79.966331;
        let truth = AnnotatedSequence::new(vec![
            Token::Residue('G'),
            Token::Residue('A'),
            Token::Offset(shift),
            Token::Residue('K'),
            Token::Residue('R'),
        ]);
        let spectrum = spectrum_of(&config, &truth);
        let refiner = Refiner::new(&config, &spectrum);

        let partial = AnnotatedSequence::new(vec![
            Token::Residue('G'),
            Token::Residue('A'),
            Token::Offset(70.0),
            Token::Residue('K'),
            Token::Residue('R'),
        ]);
        let residual = refiner.residual(&partial);
        assert!((residual - (shift - 70.0)).abs() < 1e-6, "{residual}");
        let best = refiner.shared_peaks(&partial);
        let result = refiner.cumulate_residual(partial, residual, best);
        let offsets: Vec<(usize, f64)> = result.offsets().collect();
        assert_eq!(offsets.len(), 1);
        assert_eq!(offsets[0].0, 2);
        assert!((offsets[0].1 - shift).abs() < 1e-6);
        assert!(refiner.shared_peaks(&result) >= best);
        assert!(refiner.residual(&result).abs() < 1e-6);
    }
}
