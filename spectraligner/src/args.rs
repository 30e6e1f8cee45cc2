use std::fmt::Display;
use std::num::ParseIntError;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use spectralign::{ConfigurationError, PeakFilter};

/// The default percentage of the base peak intensity a peak must reach
pub const DEFAULT_INTENSITY_RATE: f64 = 2.0;
/// The default number of most intense peaks to keep
pub const DEFAULT_PEAK_COUNT: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgPeakFilter {
    #[default]
    /// Keep peaks whose intensity is at least a percentage of the most intense peak
    IntensityRate,
    /// Keep the most intense peaks
    TopN,
}

impl Display for ArgPeakFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ArgPeakFilter {
    pub fn build(
        &self,
        intensity_rate: f64,
        peak_count: usize,
    ) -> Result<PeakFilter, ConfigurationError> {
        match self {
            Self::IntensityRate => Ok(PeakFilter::IntensityRatio(intensity_rate)),
            Self::TopN if peak_count == 0 => Err(ConfigurationError::InvalidFilterValue(0.0)),
            Self::TopN => Ok(PeakFilter::TopN(peak_count)),
        }
    }
}

/// A column of the batch input table, written either as a spreadsheet letter
/// or as a 1-based number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef(pub usize);

impl ColumnRef {
    /// The 0-based index of the column
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub enum ColumnRefParseError {
    Empty,
    NotALetter(char),
    ZeroColumn,
    MalformedNumber(ParseIntError),
}

impl Display for ColumnRefParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRefParseError::Empty => write!(f, "Column reference is empty"),
            ColumnRefParseError::NotALetter(c) => {
                write!(f, "Column reference {c:?} is not a letter from A to Z")
            }
            ColumnRefParseError::ZeroColumn => write!(f, "Column numbers start at 1"),
            ColumnRefParseError::MalformedNumber(e) => {
                write!(f, "Failed to parse column number {e}")
            }
        }
    }
}

impl std::error::Error for ColumnRefParseError {}

impl FromStr for ColumnRef {
    type Err = ColumnRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let first = s.chars().next().ok_or(ColumnRefParseError::Empty)?;
        if first.is_ascii_digit() {
            let number: usize = s.parse().map_err(ColumnRefParseError::MalformedNumber)?;
            if number == 0 {
                return Err(ColumnRefParseError::ZeroColumn);
            }
            Ok(ColumnRef(number - 1))
        } else if first.is_ascii_alphabetic() {
            Ok(ColumnRef((first.to_ascii_uppercase() as u8 - b'A') as usize))
        } else {
            Err(ColumnRefParseError::NotALetter(first))
        }
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = ColumnRefParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        value.to_string()
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0 + 1)
    }
}

/// A fixed modification given on the command line as `RESIDUE=MASS`, where the
/// residue may also be `NT` or `CT` for the peptide termini
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgModification {
    pub target: String,
    pub mass: f64,
}

impl FromStr for ArgModification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, mass) = s
            .split_once('=')
            .ok_or_else(|| format!("`{s}` is not of the form RESIDUE=MASS"))?;
        let target = target.trim().to_ascii_uppercase();
        if target.is_empty() {
            return Err(format!("`{s}` does not name a residue"));
        }
        let mass: f64 = mass
            .trim()
            .parse()
            .map_err(|e| format!("Failed to parse modification mass {e}"))?;
        Ok(Self { target, mass })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_column_fromstr() -> Result<(), ColumnRefParseError> {
        let c: ColumnRef = "a".parse()?;
        assert_eq!(c.index(), 0);
        let c: ColumnRef = "B".parse()?;
        assert_eq!(c.index(), 1);
        let c: ColumnRef = "3".parse()?;
        assert_eq!(c.index(), 2);
        let c: ColumnRef = " 12 ".parse()?;
        assert_eq!(c.index(), 11);
        assert_eq!(c.to_string(), "12");
        Ok(())
    }

    #[test]
    fn test_column_fromstr_malformed() {
        assert!(matches!(
            "".parse::<ColumnRef>(),
            Err(ColumnRefParseError::Empty)
        ));
        assert!(matches!(
            "0".parse::<ColumnRef>(),
            Err(ColumnRefParseError::ZeroColumn)
        ));
        assert!(matches!(
            "1x".parse::<ColumnRef>(),
            Err(ColumnRefParseError::MalformedNumber(_))
        ));
        assert!(matches!(
            "#".parse::<ColumnRef>(),
            Err(ColumnRefParseError::NotALetter('#'))
        ));
    }

    #[test]
    fn test_modification_fromstr() -> Result<(), String> {
        let m: ArgModification = "c=57.021464".parse()?;
        assert_eq!(m.target, "C");
        assert_eq!(m.mass, 57.021464);
        let m: ArgModification = "NT=42.010565".parse()?;
        assert_eq!(m.target, "NT");
        assert!("C57".parse::<ArgModification>().is_err());
        assert!("C=abc".parse::<ArgModification>().is_err());
        Ok(())
    }

    #[test]
    fn test_peak_filter_build() {
        assert_eq!(
            ArgPeakFilter::IntensityRate.build(2.0, 60).unwrap(),
            PeakFilter::IntensityRatio(2.0)
        );
        assert_eq!(
            ArgPeakFilter::TopN.build(2.0, 60).unwrap(),
            PeakFilter::TopN(60)
        );
        assert!(ArgPeakFilter::TopN.build(2.0, 0).is_err());
    }
}
