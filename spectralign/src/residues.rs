//! Monoisotopic residue masses and fixed modifications
use std::collections::{BTreeMap, HashMap};

use crate::params::ConfigurationError;

/// The mass of a proton
pub const PROTON: f64 = 1.007276466879;

/// The mass of a hydrogen atom, the unmodified N-terminal group
pub const HYDROGEN: f64 = 1.007825032241;

/// The mass of a hydroxyl group, the unmodified C-terminal group
pub const HYDROXYL: f64 = 15.99491461956 + HYDROGEN;

/// The residues whose masses may carry a fixed modification offset
pub const STANDARD_RESIDUES: [(char, f64); 22] = [
    ('G', 57.021463721083),
    ('A', 71.037113785565),
    ('S', 87.032028405125),
    ('P', 97.052763850047),
    ('V', 99.068413914529),
    ('T', 101.047678469607),
    ('C', 103.009184785565),
    ('I', 113.084063979011),
    ('L', 113.084063979011),
    ('N', 114.042927442166),
    ('D', 115.026943024685),
    ('Q', 128.058577506648),
    ('K', 128.094963016052),
    ('E', 129.042593089167),
    ('M', 131.040484914529),
    ('H', 137.058911859647),
    ('F', 147.068413914529),
    ('R', 156.101111025652),
    ('Y', 163.063328534089),
    ('W', 186.07931295157),
    ('U', 168.964198469607),
    ('O', 255.158291550141),
];

/// Placeholder residues which contribute no mass
pub const PLACEHOLDER_RESIDUES: [char; 2] = ['X', '*'];

/// Fixed mass offsets applied to residues and peptide termini.
///
/// Residue keys are single letter codes. They are kept as strings so that they
/// read naturally from a configuration file.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResidueModifications {
    pub residues: BTreeMap<String, f64>,
    pub n_term: f64,
    pub c_term: f64,
}

impl ResidueModifications {
    pub fn new(residues: BTreeMap<String, f64>, n_term: f64, c_term: f64) -> Self {
        Self {
            residues,
            n_term,
            c_term,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.n_term == 0.0 && self.c_term == 0.0 && self.residues.values().all(|v| *v == 0.0)
    }
}

/// A lookup table from residue letter to monoisotopic mass, including any
/// fixed modifications, and the terminal group masses.
///
/// The table is built once and then only read, so a single instance may be
/// shared by every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueMassTable {
    masses: HashMap<char, f64>,
    fixed: Vec<char>,
    n_terminal: f64,
    c_terminal: f64,
}

impl Default for ResidueMassTable {
    fn default() -> Self {
        let masses = STANDARD_RESIDUES
            .iter()
            .copied()
            .chain(PLACEHOLDER_RESIDUES.iter().map(|c| (*c, 0.0)))
            .collect();
        Self {
            masses,
            fixed: Vec::new(),
            n_terminal: HYDROGEN,
            c_terminal: HYDROXYL,
        }
    }
}

impl ResidueMassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table with `modifications` added to the standard residue and
    /// terminal masses.
    ///
    /// # Errors
    /// A modification keyed by anything other than one of [`STANDARD_RESIDUES`]
    /// is rejected with [`ConfigurationError::UnknownModifiedResidue`].
    pub fn with_modifications(
        modifications: &ResidueModifications,
    ) -> Result<Self, ConfigurationError> {
        let mut table = Self::default();
        for (key, offset) in modifications.residues.iter() {
            let mut chars = key.trim().chars();
            let residue = match (chars.next(), chars.next()) {
                (Some(c), None) => c.to_ascii_uppercase(),
                _ => return Err(ConfigurationError::UnknownModifiedResidue(key.clone())),
            };
            if !STANDARD_RESIDUES.iter().any(|(c, _)| *c == residue) {
                return Err(ConfigurationError::UnknownModifiedResidue(key.clone()));
            }
            if !offset.is_finite() {
                return Err(ConfigurationError::NonFiniteModification(key.clone()));
            }
            if *offset != 0.0 {
                if let Some(mass) = table.masses.get_mut(&residue) {
                    *mass += offset;
                }
                table.fixed.push(residue);
            }
        }
        table.n_terminal += modifications.n_term;
        table.c_terminal += modifications.c_term;
        Ok(table)
    }

    /// The mass of `residue`, or `None` if the letter is not in the table.
    #[inline]
    pub fn mass(&self, residue: char) -> Option<f64> {
        self.masses.get(&residue).copied()
    }

    #[inline]
    pub fn n_terminal(&self) -> f64 {
        self.n_terminal
    }

    #[inline]
    pub fn c_terminal(&self) -> f64 {
        self.c_terminal
    }

    #[inline]
    pub fn proton(&self) -> f64 {
        PROTON
    }

    /// The mass a y-ion ladder starts from: both termini and a proton
    #[inline]
    pub fn y_base_mass(&self) -> f64 {
        self.c_terminal + PROTON + self.n_terminal
    }

    /// Residues carrying a non-zero fixed modification
    pub fn fixed_modifications(&self) -> &[char] {
        &self.fixed
    }

    /// Sum the residue masses of `sequence`. Unknown letters are skipped.
    pub fn sequence_mass(&self, sequence: &str) -> f64 {
        sequence.chars().filter_map(|c| self.mass(c)).sum()
    }

    /// The neutral mass of an unmodified peptide
    pub fn peptide_mass(&self, sequence: &str) -> f64 {
        self.sequence_mass(sequence) + self.n_terminal + self.c_terminal
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unknown_residue() {
        let table = ResidueMassTable::default();
        assert!(table.mass('B').is_none());
        assert!(table.mass('Z').is_none());
        assert_eq!(table.mass('X'), Some(0.0));
        assert_eq!(table.mass('*'), Some(0.0));
    }

    #[test]
    fn test_peptide_mass() {
        let table = ResidueMassTable::default();
        let mass = table.peptide_mass("GA");
        assert!((mass - 146.069142).abs() < 1e-5, "{mass}");
        assert!((table.y_base_mass() - 19.017841).abs() < 1e-5);
        assert_eq!(table.sequence_mass("GBA"), table.sequence_mass("GA"));
    }

    #[test]
    fn test_modifications() -> Result<(), ConfigurationError> {
        let mut residues = BTreeMap::new();
        residues.insert("C".to_string(), 57.021464);
        residues.insert("m".to_string(), 0.0);
        let mods = ResidueModifications::new(residues, 42.010565, 0.0);
        let table = ResidueMassTable::with_modifications(&mods)?;
        let cys = table.mass('C').unwrap();
        assert!((cys - 160.030649).abs() < 1e-5);
        assert_eq!(table.mass('M'), ResidueMassTable::default().mass('M'));
        assert_eq!(table.fixed_modifications(), &['C']);
        assert!((table.n_terminal() - (HYDROGEN + 42.010565)).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_bad_modification() {
        let mut residues = BTreeMap::new();
        residues.insert("CT".to_string(), 1.0);
        let mods = ResidueModifications::new(residues, 0.0, 0.0);
        assert!(matches!(
            ResidueMassTable::with_modifications(&mods),
            Err(ConfigurationError::UnknownModifiedResidue(_))
        ));

        let mut residues = BTreeMap::new();
        residues.insert("X".to_string(), 1.0);
        let mods = ResidueModifications::new(residues, 0.0, 0.0);
        assert!(ResidueMassTable::with_modifications(&mods).is_err());
    }
}
