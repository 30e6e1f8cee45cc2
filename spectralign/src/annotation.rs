//! The annotated sequence produced by alignment and rewritten by refinement.
//!
//! Internally an [`AnnotatedSequence`] is a list of [`Token`]s. The bracketed
//! text form (`[S]DS[-150.00]KR_[0.02]`) is only produced for output and read
//! back for testing.
use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

use crate::residues::ResidueMassTable;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnnotationError {
    #[error("A bracket opened at {0} is never closed")]
    UnclosedBracket(usize),
    #[error("The bracket at {0} is empty")]
    EmptyBracket(usize),
    #[error("Could not read a mass offset from {0:?}")]
    InvalidOffset(String),
    #[error("The trailing residual must be the last element of the sequence")]
    MisplacedResidual,
    #[error("Mass offsets must be finite")]
    NonFiniteOffset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    /// A residue whose flanking peaks were aligned
    Residue(char),
    /// A residue whose flanking peaks were not observed
    SkippedResidue(char),
    /// A localized mass shift
    Offset(f64),
    /// The part of the precursor mass difference that was not localized
    TrailingResidual(f64),
}

impl Token {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedResidue(_))
    }

    /// The mass this token contributes to a fragment ladder. Letters missing
    /// from `table` contribute nothing.
    pub fn mass(&self, table: &ResidueMassTable) -> f64 {
        match self {
            Self::Residue(c) | Self::SkippedResidue(c) => table.mass(*c).unwrap_or(0.0),
            Self::Offset(v) => *v,
            Self::TrailingResidual(_) => 0.0,
        }
    }
}

/// Format a mass with `decimals` digits, never rendering a negative zero
pub fn format_mass(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AnnotatedSequence {
    tokens: Vec<Token>,
}

impl From<Vec<Token>> for AnnotatedSequence {
    fn from(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }
}

impl FromIterator<Token> for AnnotatedSequence {
    fn from_iter<T: IntoIterator<Item = Token>>(iter: T) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl AnnotatedSequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// An unmodified peptide, every residue literal
    pub fn from_peptide(peptide: &str) -> Self {
        peptide.chars().map(Token::Residue).collect()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token)
    }

    /// The tokens before the trailing residual, if there is one
    pub fn body(&self) -> &[Token] {
        match self.tokens.last() {
            Some(Token::TrailingResidual(_)) => &self.tokens[..self.tokens.len() - 1],
            _ => &self.tokens,
        }
    }

    pub fn trailing_residual(&self) -> Option<f64> {
        match self.tokens.last() {
            Some(Token::TrailingResidual(r)) => Some(*r),
            _ => None,
        }
    }

    /// Split off the trailing residual
    pub fn split_residual(&self) -> (AnnotatedSequence, Option<f64>) {
        (Self::new(self.body().to_vec()), self.trailing_residual())
    }

    /// A copy of the body with `residual` attached at the end
    pub fn with_residual(&self, residual: f64) -> Self {
        let mut tokens = self.body().to_vec();
        tokens.push(Token::TrailingResidual(residual));
        Self { tokens }
    }

    /// Positions and values of every offset in the body
    pub fn offsets(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.body().iter().enumerate().filter_map(|(i, t)| match t {
            Token::Offset(v) => Some((i, *v)),
            _ => None,
        })
    }

    /// Check that the trailing residual, if any, is last and that every mass is finite
    pub fn validate(&self) -> Result<(), AnnotationError> {
        let n = self.tokens.len();
        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::TrailingResidual(r) => {
                    if i + 1 != n {
                        return Err(AnnotationError::MisplacedResidual);
                    }
                    if !r.is_finite() {
                        return Err(AnnotationError::NonFiniteOffset);
                    }
                }
                Token::Offset(v) if !v.is_finite() => return Err(AnnotationError::NonFiniteOffset),
                _ => {}
            }
        }
        Ok(())
    }

    /// The neutral mass of the sequence: every residue, every offset and both
    /// termini. The trailing residual is not included.
    pub fn modified_mass(&self, table: &ResidueMassTable) -> f64 {
        self.body().iter().map(|t| t.mass(table)).sum::<f64>()
            + table.n_terminal()
            + table.c_terminal()
    }

    /// The residue letters alone
    pub fn peptide(&self) -> String {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Residue(c) | Token::SkippedResidue(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn display(&self, decimals: usize) -> AnnotationDisplay<'_> {
        AnnotationDisplay {
            sequence: self,
            decimals,
        }
    }
}

/// Renders an [`AnnotatedSequence`] in its bracketed text form
#[derive(Debug, Clone, Copy)]
pub struct AnnotationDisplay<'a> {
    sequence: &'a AnnotatedSequence,
    decimals: usize,
}

impl Display for AnnotationDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in self.sequence.tokens.iter() {
            match token {
                Token::Residue(c) => write!(f, "{c}")?,
                Token::SkippedResidue(c) => write!(f, "[{c}]")?,
                Token::Offset(v) => write!(f, "[{}]", format_mass(*v, self.decimals))?,
                Token::TrailingResidual(v) => write!(f, "_[{}]", format_mass(*v, self.decimals))?,
            }
        }
        Ok(())
    }
}

impl Display for AnnotatedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display(crate::params::DEFAULT_DECIMALS))
    }
}

fn parse_offset(text: &str) -> Result<f64, AnnotationError> {
    let value: f64 = text
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| AnnotationError::InvalidOffset(text.to_string()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AnnotationError::NonFiniteOffset)
    }
}

impl FromStr for AnnotatedSequence {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '[' | '_' => {
                    let trailing = chars[i] == '_';
                    let open = if trailing { i + 1 } else { i };
                    if trailing && chars.get(open) != Some(&'[') {
                        return Err(AnnotationError::MisplacedResidual);
                    }
                    let close = chars[open..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|p| p + open)
                        .ok_or(AnnotationError::UnclosedBracket(open))?;
                    let content: String = chars[open + 1..close].iter().collect();
                    if content.is_empty() {
                        return Err(AnnotationError::EmptyBracket(open));
                    }
                    let mut inner = content.chars();
                    let token = match (inner.next(), inner.next()) {
                        (Some(c), None) if !trailing && (c.is_alphabetic() || c == '*') => {
                            Token::SkippedResidue(c)
                        }
                        _ if trailing => Token::TrailingResidual(parse_offset(&content)?),
                        _ => Token::Offset(parse_offset(&content)?),
                    };
                    tokens.push(token);
                    i = close + 1;
                }
                ']' => return Err(AnnotationError::UnclosedBracket(i)),
                c => {
                    tokens.push(Token::Residue(c));
                    i += 1;
                }
            }
        }
        let seq = Self { tokens };
        seq.validate()?;
        Ok(seq)
    }
}
