use std::ops::Add;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::Sender;
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use spectralign::{
    partition_batch, AlignmentConfig, AlignmentWorker, BatchItem, BatchProgress, SpectrumSource,
};

/// Align `items` in `workers` contiguous chunks on the current thread pool,
/// sending each chunk's rows to `sender` tagged with the chunk index.
pub fn align_batch<S: SpectrumSource + Sync + ?Sized>(
    config: &AlignmentConfig,
    source: &S,
    items: &[BatchItem],
    workers: usize,
    sender: Sender<(usize, Vec<String>)>,
) -> BatchProgress {
    let init_counter = AtomicU32::new(0);
    let started = Instant::now();
    let chunks = partition_batch(items.len(), workers);
    debug!("Split {} pairs into {} chunks", items.len(), chunks.len());

    let prog = chunks
        .into_par_iter()
        .enumerate()
        .map(|(chunk_idx, range)| {
            init_counter.fetch_add(1, Ordering::AcqRel);
            trace!(
                "{:?}: Aligning chunk {chunk_idx} covering {range:?}",
                thread::current().id()
            );
            let mut worker = AlignmentWorker::new(config, source);
            let rows = worker.run(&items[range]);
            if let Err(e) = sender.send((chunk_idx, rows)) {
                warn!("Failed to send chunk {chunk_idx}: {e}");
            }
            *worker.progress()
        })
        .reduce(BatchProgress::default, BatchProgress::add);

    let elapsed = started.elapsed();
    debug!(
        "{} workers run for alignment",
        init_counter.load(Ordering::SeqCst)
    );
    let pairs_per_second = prog.pairs as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        "Elapsed Time: {:0.3?} ({:0.2} pairs/sec)",
        elapsed, pairs_per_second
    );
    prog
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    use crossbeam_channel::unbounded;
    use spectralign::RawScan;

    #[test_log::test]
    fn test_chunks_are_tagged() {
        let config = AlignmentConfig::default();
        let source: HashMap<String, RawScan> = HashMap::new();
        let items: Vec<BatchItem> = (0..7)
            .map(|i| BatchItem::new(format!("scan={i}"), "PEPTIDE"))
            .collect();
        let (sender, receiver) = unbounded();
        let prog = align_batch(&config, &source, &items, 3, sender);
        assert_eq!(prog.pairs, 7);
        assert_eq!(prog.missing_titles, 7);

        let mut chunks: Vec<(usize, Vec<String>)> = receiver.iter().collect();
        chunks.sort_by_key(|(i, _)| *i);
        let rows: Vec<String> = chunks.into_iter().flat_map(|(_, rows)| rows).collect();
        let expected: Vec<String> = (0..7)
            .map(|i| format!("scan={i};PEPTIDE;Not Good Title"))
            .collect();
        assert_eq!(rows, expected);
    }
}
