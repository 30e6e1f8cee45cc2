//! A basic demonstration of how to use [`spectralign::AlignmentEngine`] to
//! localize an unexpected mass offset on a peptide.

use spectralign::{
    report_header, AlignmentConfig, AlignmentEngine, ExperimentalSpectrum, Peak, PeakList,
    TheoreticalSpectrum, PROTON,
};

const WATER: f64 = 18.0105646837;

fn main() {
    // The default parameters: 0.02 Da precision and peaks above 2% of the base peak.
    let config = AlignmentConfig::default();
    let peptide = "PEPTIDE";
    let residues: Vec<f64> = peptide
        .chars()
        .map(|c| config.residues.mass(c).unwrap())
        .collect();

    // Simulate a phosphorylation on the threonine: every b ion from b4 on and
    // every y ion from y4 on carries the extra mass.
    let shift = 79.966331;
    let site = 3;
    let mut peaks = Vec::new();
    let mut b = PROTON;
    for (i, mass) in residues[..residues.len() - 1].iter().enumerate() {
        b += mass;
        let offset = if i >= site { shift } else { 0.0 };
        peaks.push(Peak::new(b + offset, 1000.0 + 100.0 * i as f64));
    }
    let mut y = WATER + PROTON;
    for (i, mass) in residues[1..].iter().rev().enumerate() {
        y += mass;
        let offset = if residues.len() - 1 - i <= site { shift } else { 0.0 };
        peaks.push(Peak::new(y + offset, 2000.0 + 100.0 * i as f64));
    }

    let neutral_mass = residues.iter().sum::<f64>() + WATER + shift;
    let precursor_mz = (neutral_mass + 2.0 * PROTON) / 2.0;

    let experimental = ExperimentalSpectrum::new(
        precursor_mz,
        2,
        PeakList::new(peaks),
        &config.params,
        &config.residues,
    )
    .unwrap();
    let theoretical = TheoreticalSpectrum::new(peptide, &config.residues).unwrap();

    // The engine may be reused for any number of pairs, growing its matrices as needed.
    let mut engine = AlignmentEngine::new(&config, 16, 64);
    match engine.process(&theoretical, &experimental) {
        Some(record) => {
            println!("{}", report_header());
            println!(
                "synthetic;{peptide};{}",
                record.to_row(config.params.decimals)
            );
        }
        None => println!("{peptide} scored below the minimum score"),
    }
}
