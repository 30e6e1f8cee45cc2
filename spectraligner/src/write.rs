use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use crossbeam_channel::Receiver;
use flate2::write::GzEncoder;
use flate2::Compression;
use itertools::Itertools;
use tracing::{debug, info};

use spectralign::report_header;

use crate::types::RowCollator;

/// Where the report goes: STDOUT, a plain file or a gzip compressed file
pub enum OutputSink {
    Stdout(io::BufWriter<io::Stdout>),
    File(io::BufWriter<fs::File>),
    Gzip(GzEncoder<io::BufWriter<fs::File>>),
}

impl OutputSink {
    /// Open `path` for writing, `-` meaning STDOUT. Paths ending in `.gz` are
    /// compressed.
    pub fn create(path: &Path) -> io::Result<Self> {
        if path == Path::new("-") {
            return Ok(Self::Stdout(io::BufWriter::new(io::stdout())));
        }
        let handle = io::BufWriter::new(fs::File::create(path)?);
        if path.extension().is_some_and(|ext| ext == "gz") {
            Ok(Self::Gzip(GzEncoder::new(handle, Compression::best())))
        } else {
            Ok(Self::File(handle))
        }
    }

    /// Flush everything, writing the gzip trailer if there is one
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Stdout(mut handle) => handle.flush(),
            Self::File(mut handle) => handle.flush(),
            Self::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(handle) => handle.write(buf),
            Self::File(handle) => handle.write(buf),
            Self::Gzip(handle) => handle.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(handle) => handle.flush(),
            Self::File(handle) => handle.flush(),
            Self::Gzip(handle) => handle.flush(),
        }
    }
}

fn write_chunk<W: Write>(writer: &mut W, chunk_idx: usize, rows: Vec<String>) -> io::Result<usize> {
    let n = rows.len();
    for row in rows {
        writer.write_all(row.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    debug!("Wrote chunk {chunk_idx} with {n} rows");
    Ok(n)
}

/// Write the report header, then the rows of every chunk received in chunk
/// order, returning the number of rows written
pub fn write_output_rows<W: Write>(
    writer: &mut W,
    receiver: Receiver<(usize, Vec<String>)>,
) -> io::Result<usize> {
    writeln!(writer, "{}", report_header())?;
    let mut collator = RowCollator::default();
    let mut rows_written = 0usize;
    while let Ok((chunk_idx, rows)) = receiver.recv() {
        collator.receive(chunk_idx, rows);
        while let Some((chunk_idx, rows)) = collator.try_next() {
            rows_written += write_chunk(writer, chunk_idx, rows)?;
        }
    }
    collator.done = true;
    let n = collator.waiting.len();
    if n > 0 {
        debug!("Draining output queue, {n} chunks");
        let waiting = std::mem::take(&mut collator.waiting)
            .into_iter()
            .sorted_by_key(|(i, _)| *i);
        for (chunk_idx, rows) in waiting {
            rows_written += write_chunk(writer, chunk_idx, rows)?;
        }
    }
    info!("Finished | Rows={rows_written}");
    Ok(rows_written)
}

/// Write the report to `sink` and close it
pub fn write_output(
    mut sink: OutputSink,
    receiver: Receiver<(usize, Vec<String>)>,
) -> io::Result<usize> {
    let rows_written = write_output_rows(&mut sink, receiver)?;
    sink.finish()?;
    Ok(rows_written)
}

#[cfg(test)]
mod test {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_rows_in_chunk_order() -> io::Result<()> {
        let (sender, receiver) = unbounded();
        sender
            .send((2, vec!["c;1".to_string()]))
            .map_err(io::Error::other)?;
        sender
            .send((0, vec!["a;1".to_string(), "a;2".to_string()]))
            .map_err(io::Error::other)?;
        sender.send((1, vec![])).map_err(io::Error::other)?;
        drop(sender);

        let mut buffer: Vec<u8> = Vec::new();
        let n = write_output_rows(&mut buffer, receiver)?;
        assert_eq!(n, 3);
        let text = String::from_utf8(buffer).map_err(io::Error::other)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], report_header());
        assert_eq!(&lines[1..], &["a;1", "a;2", "c;1"]);
        Ok(())
    }
}
