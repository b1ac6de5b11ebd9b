//! Background sample writer, installed as a pipeline sink per task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use gaze_core::{EyeSample, GazeError, GazeResult};
use gaze_plugin_api::EyeSink;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::record::EyeSampleRecord;
use crate::session::TaskGroup;
use crate::h5_error;

/// Records buffered before each append.
const WRITE_CHUNK: usize = 1024;

/// Owns one task's `eye_data` dataset and the worker that appends to it.
///
/// The sink side only enqueues, so `consume` never touches the storage
/// backend. [`stop`](Self::stop) detaches the sink, drains the queue to disk
/// and joins the worker; after it returns no further appends occur.
pub struct SampleWriter {
    shared: Arc<WriterShared>,
    worker: Option<JoinHandle<()>>,
}

struct WriterShared {
    tx: Mutex<Option<Sender<EyeSample>>>,
    dropped: AtomicU64,
}

impl SampleWriter {
    pub fn spawn(group: &TaskGroup, queue_capacity: usize) -> GazeResult<Self> {
        let dataset = group
            .group
            .new_dataset::<EyeSampleRecord>()
            .chunk(WRITE_CHUNK)
            .shape(0..)
            .create("eye_data")
            .map_err(h5_error)?;

        let (tx, rx) = bounded(queue_capacity);
        let worker = std::thread::Builder::new()
            .name(format!("writer-{}", group.name()))
            .spawn(move || drain_loop(dataset, rx))
            .map_err(GazeError::Io)?;

        Ok(Self {
            shared: Arc::new(WriterShared {
                tx: Mutex::new(Some(tx)),
                dropped: AtomicU64::new(0),
            }),
            worker: Some(worker),
        })
    }

    /// Sink view to register with the pipeline.
    pub fn sink(&self) -> Arc<dyn EyeSink> {
        Arc::new(WriterSink {
            shared: self.shared.clone(),
        })
    }

    /// Detach the sink, drain the queue and join the worker.
    pub fn stop(mut self) {
        self.shared.tx.lock().take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("sample writer worker panicked");
            }
        }
        let dropped = self.shared.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!("sample writer dropped {dropped} samples on a full queue");
        }
    }
}

struct WriterSink {
    shared: Arc<WriterShared>,
}

impl EyeSink for WriterSink {
    fn consume(&self, sample: &EyeSample) -> GazeResult<()> {
        let guard = self.shared.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(GazeError::Busy("sample writer already stopped".into()));
        };
        if tx.try_send(*sample).is_err() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(GazeError::Busy("persistence queue full".into()));
        }
        Ok(())
    }
}

fn drain_loop(dataset: hdf5::Dataset, rx: Receiver<EyeSample>) {
    let mut buffer: Vec<EyeSampleRecord> = Vec::with_capacity(WRITE_CHUNK);
    let mut written: usize = 0;

    // Runs until every sender is gone, then flushes the tail. The channel
    // itself holds whatever arrived before stop().
    while let Ok(sample) = rx.recv() {
        buffer.push(sample.into());
        if buffer.len() >= WRITE_CHUNK {
            append(&dataset, &mut buffer, &mut written);
        }
    }
    append(&dataset, &mut buffer, &mut written);
    debug!("sample writer flushed {written} records");
}

fn append(dataset: &hdf5::Dataset, buffer: &mut Vec<EyeSampleRecord>, written: &mut usize) {
    if buffer.is_empty() {
        return;
    }
    let end = *written + buffer.len();
    let result = dataset
        .resize(end)
        .and_then(|_| dataset.write_slice(buffer.as_slice(), *written..end));
    match result {
        Ok(()) => *written = end,
        Err(err) => warn!("failed to append eye data: {err}"),
    }
    buffer.clear();
}
