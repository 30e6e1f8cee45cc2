//! Dense grids backing the alignment recurrence.
//!
//! Rows index the theoretical spectrum, columns the experimental alignment
//! axis. The grids are allocated once and reused for every pair, only the
//! active `rows x cols` rectangle is meaningful after [`AlignmentMatrices::prepare`].
use std::fmt::{self, Display, Write};

use itertools::Itertools;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignType {
    #[default]
    NonAligned,
    ReAligned,
    Aligned,
}

impl Display for AlignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NonAligned => "NA",
            Self::ReAligned => "RA",
            Self::Aligned => "AL",
        })
    }
}

/// The predecessor of a cell: the column in the previous row it was reached
/// from, and how.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub column: usize,
    pub kind: AlignType,
}

impl Origin {
    pub fn new(column: usize, kind: AlignType) -> Self {
        Self { column, kind }
    }

    #[inline]
    pub fn is_non_aligned(&self) -> bool {
        self.kind == AlignType::NonAligned
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.column, self.kind)
    }
}

/// A row-major grid with a fixed capacity and a smaller active region
#[derive(Debug, Clone)]
pub struct Grid<T> {
    data: Vec<T>,
    capacity: (usize, usize),
    active: (usize, usize),
}

impl<T: Copy + Default> Grid<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            capacity: (rows, cols),
            active: (0, 0),
        }
    }

    /// Make `rows x cols` the active region, growing the allocation when it
    /// does not fit, and fill it with the default value.
    pub fn reset(&mut self, rows: usize, cols: usize) {
        let (cap_rows, cap_cols) = self.capacity;
        if rows > cap_rows || cols > cap_cols {
            let capacity = (rows.max(cap_rows), cols.max(cap_cols));
            self.data = vec![T::default(); capacity.0 * capacity.1];
            self.capacity = capacity;
        } else {
            let stride = self.capacity.1;
            for row in 0..rows {
                self.data[row * stride..row * stride + cols].fill(T::default());
            }
        }
        self.active = (rows, cols);
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.active.0 && col < self.active.1);
        row * self.capacity.1 + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[self.offset(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        let i = self.offset(row, col);
        self.data[i] = value;
    }

    /// The active row `row`
    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.capacity.1;
        &self.data[start..start + self.active.1]
    }

    pub fn active_size(&self) -> (usize, usize) {
        self.active
    }

    pub fn capacity(&self) -> (usize, usize) {
        self.capacity
    }
}

/// The three grids of a spectral alignment
#[derive(Debug, Clone)]
pub struct AlignmentMatrices {
    pub delta_mass: Grid<f64>,
    pub score: Grid<i32>,
    pub origin: Grid<Origin>,
}

impl AlignmentMatrices {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            delta_mass: Grid::new(rows, cols),
            score: Grid::new(rows, cols),
            origin: Grid::new(rows, cols),
        }
    }

    /// Activate a `theoretical.len() x experimental.len()` region, fill the
    /// mass differences and seed the boundary row.
    pub fn prepare(&mut self, theoretical: &[f64], experimental: &[f64]) {
        let (rows, cols) = (theoretical.len(), experimental.len());
        self.delta_mass.reset(rows, cols);
        self.score.reset(rows, cols);
        self.origin.reset(rows, cols);
        for (i, theo) in theoretical.iter().enumerate() {
            for (j, exp) in experimental.iter().enumerate() {
                self.delta_mass.set(i, j, exp - theo);
            }
        }
        if rows > 0 {
            for j in 0..cols {
                self.score.set(0, j, 0);
                self.origin.set(0, j, Origin::new(j, AlignType::NonAligned));
            }
        }
    }

    pub fn active_size(&self) -> (usize, usize) {
        self.score.active_size()
    }

    /// Render the active region of all three grids
    pub fn dump(&self) -> String {
        let (rows, _) = self.active_size();
        let mut buffer = String::new();
        let _ = writeln!(buffer, "Score");
        for i in 0..rows {
            let _ = writeln!(buffer, "{i}\t{}", self.score.row(i).iter().join("\t"));
        }
        let _ = writeln!(buffer, "Origin");
        for i in 0..rows {
            let _ = writeln!(buffer, "{i}\t{}", self.origin.row(i).iter().join("\t"));
        }
        let _ = writeln!(buffer, "DeltaMass");
        for i in 0..rows {
            let _ = writeln!(
                buffer,
                "{i}\t{}",
                self.delta_mass
                    .row(i)
                    .iter()
                    .map(|d| format!("{d:.3}"))
                    .join("\t")
            );
        }
        buffer
    }
}
