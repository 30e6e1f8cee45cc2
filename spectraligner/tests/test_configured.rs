use std::fs;

use figment::{
    providers::{Format, Toml},
    Figment,
};

#[test_log::test]
#[test_log(default_log_filter = "debug")]
fn test_configured() {
    fs::create_dir_all("./tmp").unwrap();
    let mut config = Figment::new();
    config = config.merge(Toml::file_exact("./tests/data/config.toml"));
    let driver: spectraligner::SpectralAligner = config.extract().unwrap();
    assert_eq!(driver.fixed_modifications.residues.get("C"), Some(&57.021464));
    driver.main().unwrap();

    let text = fs::read_to_string("./tmp/configured_alignment.csv").unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], spectralign::report_header());
    assert!(lines[1].starts_with("PEPTIDE.2.2;PEPTIDE;0.00;"));
    assert_eq!(lines[4], "MISSING.9.9;PEPTIDE;Not Good Title");
    assert_eq!(lines[5], "PEPTIDE.2.2;PEPTJDE;Unknown Residue J");
}
