use std::{error::Error, process::Command};

use assert_cmd::prelude::*;
use predicates::prelude::*;

#[test]
fn test_file_missing() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("spectraligner")?;

    cmd.arg("not_real.mgf")
        .arg("./tests/data/batch.csv")
        .args(["-o", "-"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("An IO error occurred"));
    Ok(())
}

#[test]
fn test_malformed_column() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("spectraligner")?;

    cmd.arg("./tests/data/small.mgf")
        .arg("./tests/data/batch.csv")
        .args(["--title-column", "0"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Column numbers start at 1"));

    let mut cmd = Command::cargo_bin("spectraligner")?;

    cmd.arg("./tests/data/small.mgf")
        .arg("./tests/data/batch.csv")
        .args(["--peptide-column", "?"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("is not a letter from A to Z"));
    Ok(())
}

#[test]
fn test_unknown_modified_residue() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("spectraligner")?;

    cmd.arg("./tests/data/small.mgf")
        .arg("./tests/data/batch.csv")
        .args(["-m", "B=15.99"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No residue \"B\" exists"));
    Ok(())
}

#[test]
fn test_run_batch() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("spectraligner")?;
    cmd.env("RUST_LOG", "info");
    cmd.arg("./tests/data/small.mgf")
        .arg("./tests/data/batch.csv")
        .args(["-o", "-", "-t", "2"]);
    let result = cmd.assert().success();
    result
        .stdout(predicate::str::starts_with(
            "Title;Peptide;MassDelta;SharedPeaksBeforeAlign",
        ))
        .stdout(predicate::str::contains("PEPTIDE.2.2;PEPTIDE;0.00;"))
        .stdout(predicate::str::contains("SAMPLER.3.3;SAMPLER;0.00;"))
        .stdout(predicate::str::contains("2;SAMPLER;0.00;"))
        .stdout(predicate::str::contains("MISSING.9.9;PEPTIDE;Not Good Title"))
        .stdout(predicate::str::contains(
            "PEPTIDE.2.2;PEPTJDE;Unknown Residue J",
        ))
        .stderr(predicate::str::contains("Indexed 2 MS2 spectra"))
        .stderr(predicate::str::contains("Pairs: 5"))
        .stderr(predicate::str::contains("Missing Titles: 1 | Unknown Residues: 1"));

    Ok(())
}
