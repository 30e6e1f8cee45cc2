mod args;
mod driver;
mod input;
mod proc;
mod spectra;
mod types;
mod write;

pub use args::*;
pub use driver::{SpectralAligner, SpectralAlignerError};
pub use input::{load_batch, read_batch, BatchInputError};
pub use spectra::SpectrumLibrary;
