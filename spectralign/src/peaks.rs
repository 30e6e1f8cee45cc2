//! Fragment peak generation for annotated sequences, and matching of those
//! peaks against an observed peak list.
use crate::annotation::{AnnotatedSequence, Token};
use crate::residues::{ResidueMassTable, PROTON};
use crate::spectrum::PeakList;

/// Added to the precision when matching generated peaks, to absorb residue
/// mass rounding
pub const MATCH_SLACK: f64 = 0.005;

/// Extra tolerance used for explained intensity once fragments reach
/// [`HIGH_MASS_THRESHOLD`]
pub const HIGH_MASS_SLACK: f64 = 0.05;
pub const HIGH_MASS_THRESHOLD: f64 = 1000.0;

/// Build the b-ion ladder of the body of `sequence`, returning the ladder and
/// the final running b-ion mass.
///
/// The running mass starts at [`PROTON`], so an offset opening the sequence is
/// pushed as `PROTON + offset` rather than the bare offset. Every generated
/// fragment is a protonated b or y ion, and the bare value would match nothing.
fn b_ion_ladder(
    sequence: &AnnotatedSequence,
    table: &ResidueMassTable,
    precision: f64,
) -> (Vec<f64>, f64) {
    let mut b = PROTON;
    let mut ladder: Vec<f64> = Vec::with_capacity(sequence.len() * 2);
    for token in sequence.body() {
        match token {
            Token::SkippedResidue(_) | Token::Offset(_) => {
                b += token.mass(table);
                ladder.push(b);
            }
            Token::Residue(_) => {
                if ladder.last().map_or(true, |last| (last - b).abs() > precision) {
                    ladder.push(b);
                }
                b += token.mass(table);
                ladder.push(b);
            }
            Token::TrailingResidual(_) => {}
        }
    }
    (ladder, b)
}

/// Generate the b and y fragment masses of `sequence`, ascending, with values
/// within `precision` of the previously visited value removed.
///
/// The trailing residual, if any, is ignored.
pub fn generate_theoretical_peaks(
    sequence: &AnnotatedSequence,
    table: &ResidueMassTable,
    precision: f64,
) -> Vec<f64> {
    let (ladder, b) = b_ion_ladder(sequence, table, precision);
    let total = b + table.y_base_mass();

    let mut peaks = Vec::with_capacity(ladder.len() * 2 + 1);
    peaks.extend_from_slice(&ladder);
    peaks.push(total - PROTON);
    if let Some((_, rest)) = ladder.split_last() {
        peaks.extend(rest.iter().map(|m| total - m));
    }
    peaks.sort_by(|a, b| a.total_cmp(b));

    let mut deduplicated = Vec::with_capacity(peaks.len());
    let mut previous: Option<f64> = None;
    for peak in peaks {
        match previous {
            Some(p) if (peak - p).abs() < precision => {}
            _ => deduplicated.push(peak),
        }
        previous = Some(peak);
    }
    deduplicated
}

/// Walk `generated` peaks against ascending `observed` masses, calling
/// `on_match` with the index of the observed mass each generated peak matched.
/// An observed mass is consumed by the first generated peak it matches.
fn match_peaks<F, T>(
    generated: &[f64],
    observed: &[f64],
    precision: f64,
    tolerance_for: T,
    mut on_match: F,
) where
    F: FnMut(usize),
    T: Fn(f64) -> f64,
{
    let mut consumed = vec![false; observed.len()];
    let mut last_matched = 0.0;
    for peak in generated.iter().copied() {
        let tolerance = tolerance_for(peak) + precision;
        if (peak - last_matched).abs() <= tolerance {
            continue;
        }
        for (i, mass) in observed.iter().copied().enumerate() {
            if mass > peak + tolerance {
                break;
            }
            if !consumed[i] && (peak - mass).abs() < tolerance {
                consumed[i] = true;
                on_match(i);
                last_matched = peak;
                break;
            }
        }
    }
}

/// Count the generated fragment peaks of `sequence` which match an observed
/// mass. `observed` must be sorted ascending.
///
/// The count never exceeds the number of generated peaks, nor the number of
/// observed masses.
pub fn count_shared_peaks(
    sequence: &AnnotatedSequence,
    observed: &[f64],
    table: &ResidueMassTable,
    precision: f64,
) -> usize {
    let generated = generate_theoretical_peaks(sequence, table, precision);
    let mut count = 0;
    match_peaks(&generated, observed, precision, |_| MATCH_SLACK, |_| count += 1);
    count
}

/// The fraction of the total observed intensity carried by peaks matching a
/// generated fragment of `sequence`. Zero when the peak list carries no
/// intensity.
pub fn explained_intensity_rate(
    sequence: &AnnotatedSequence,
    peaks: &PeakList,
    table: &ResidueMassTable,
    precision: f64,
) -> f64 {
    let total = peaks.total_intensity();
    if total <= 0.0 {
        return 0.0;
    }
    let generated = generate_theoretical_peaks(sequence, table, precision);
    let observed = peaks.masses();
    let mut explained = 0.0;
    match_peaks(
        &generated,
        &observed,
        precision,
        |mass| {
            if mass >= HIGH_MASS_THRESHOLD {
                HIGH_MASS_SLACK
            } else {
                0.0
            }
        },
        |i| explained += peaks.as_slice()[i].intensity,
    );
    explained / total
}

/// The b-ion mass of the prefix of `sequence` ending at token `index`, inclusive
pub fn b_ion_mass(sequence: &AnnotatedSequence, index: usize, table: &ResidueMassTable) -> f64 {
    let body = sequence.body();
    let end = (index + 1).min(body.len());
    PROTON + body[..end].iter().map(|t| t.mass(table)).sum::<f64>()
}

/// The y-ion mass of the suffix of `sequence` starting at token `index`
pub fn y_ion_mass(sequence: &AnnotatedSequence, index: usize, table: &ResidueMassTable) -> f64 {
    let body = sequence.body();
    let start = index.min(body.len());
    table.y_base_mass() + body[start..].iter().map(|t| t.mass(table)).sum::<f64>()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::annotation::AnnotationError;
    use crate::spectrum::{Peak, TheoreticalSpectrum};

    const PRECISION: f64 = 0.02;

    #[test]
    fn test_generated_peaks_plain() -> Result<(), Box<dyn std::error::Error>> {
        let table = ResidueMassTable::default();
        let peptide = "PEPTIDE";
        let seq = AnnotatedSequence::from_peptide(peptide);
        let peaks = generate_theoretical_peaks(&seq, &table, PRECISION);
        assert!(peaks.windows(2).all(|w| w[0] < w[1]));

        let theo = TheoreticalSpectrum::new(peptide, &table)?;
        for mass in theo.masses() {
            assert!(
                peaks.iter().any(|p| (p - mass).abs() < 1e-9),
                "b-ion {mass} missing from {peaks:?}"
            );
        }
        let y_full = table.y_base_mass() + table.sequence_mass(peptide);
        assert!(peaks.iter().any(|p| (p - y_full).abs() < 1e-9));

        let again = generate_theoretical_peaks(&seq, &table, PRECISION);
        assert_eq!(peaks, again);
        Ok(())
    }

    #[test]
    fn test_generated_peaks_ignore_residual() -> Result<(), AnnotationError> {
        let table = ResidueMassTable::default();
        let with: AnnotatedSequence = "PEP[12.00]TIDE_[4.00]".parse()?;
        let without: AnnotatedSequence = "PEP[12.00]TIDE".parse()?;
        assert_eq!(
            generate_theoretical_peaks(&with, &table, PRECISION),
            generate_theoretical_peaks(&without, &table, PRECISION)
        );
        Ok(())
    }

    #[test]
    fn test_shared_peak_bound() -> Result<(), AnnotationError> {
        let table = ResidueMassTable::default();
        let seq: AnnotatedSequence = "[G]A[15.99]SK".parse()?;
        let generated = generate_theoretical_peaks(&seq, &table, PRECISION);
        let mut observed = generated.clone();
        observed.extend(generated.iter().map(|m| m + 0.001));
        observed.sort_by(|a, b| a.total_cmp(b));
        let count = count_shared_peaks(&seq, &observed, &table, PRECISION);
        assert!(count <= generated.len());
        assert!(count > 0);
        assert_eq!(count_shared_peaks(&seq, &[], &table, PRECISION), 0);
        Ok(())
    }

    #[test]
    fn test_observed_mass_consumed_once() {
        let table = ResidueMassTable::default();
        let seq = AnnotatedSequence::new(vec![Token::Offset(100.0), Token::Offset(0.03)]);
        let observed = [PROTON + 100.015];
        let count = count_shared_peaks(&seq, &observed, &table, PRECISION);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_explained_intensity() {
        let table = ResidueMassTable::default();
        let seq = AnnotatedSequence::from_peptide("GA");
        let generated = generate_theoretical_peaks(&seq, &table, PRECISION);
        let mut peaks: Vec<Peak> = generated.iter().map(|m| Peak::new(*m, 10.0)).collect();
        peaks.push(Peak::new(500.0, 10.0 * generated.len() as f64));
        let peaks = PeakList::new(peaks);
        let rate = explained_intensity_rate(&seq, &peaks, &table, PRECISION);
        assert!((rate - 0.5).abs() < 1e-9, "{rate}");
        assert_eq!(
            explained_intensity_rate(&seq, &PeakList::default(), &table, PRECISION),
            0.0
        );
    }

    #[test]
    fn test_flanking_ions() -> Result<(), AnnotationError> {
        let table = ResidueMassTable::default();
        let seq: AnnotatedSequence = "G[A]K_[1.00]".parse()?;
        let g = table.mass('G').unwrap();
        let a = table.mass('A').unwrap();
        let k = table.mass('K').unwrap();
        assert!((b_ion_mass(&seq, 1, &table) - (PROTON + g + a)).abs() < 1e-9);
        assert!((y_ion_mass(&seq, 1, &table) - (table.y_base_mass() + a + k)).abs() < 1e-9);
        Ok(())
    }
}
