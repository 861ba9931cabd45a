use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::buffer::BufferError;
use crate::buffer::DoubleBuffer;
use crate::buffer::Frame;
use crate::buffer::FrameReader;
use crate::buffer::FrameWriter;
use crate::grid::Grid;
use crate::grid::GridError;
use crate::rle::SeedPattern;
use crate::rules::Rule;

/// How long an idle reader waits before looking for a new generation again.
const IDLE_BACKOFF: Duration = Duration::from_micros(200);

/// Something observing generations as they are published, typically a renderer.
pub trait Consumer: Send {
    /// Called once for every new generation this reader sees. Generations may be skipped, but
    /// never repeated or reordered.
    ///
    /// `simulated` is the number of generations the writer has finished so far. The frame cannot
    /// outlive the call.
    fn consume(&mut self, frame: &Frame<'_>, simulated: u64) -> anyhow::Result<ControlFlow<()>>;
}

#[derive(Debug, Clone, Default)]
pub struct SequencerConfig {
    /// Generations to simulate
    pub ticks: u64,

    /// Pause between generations
    pub tick_interval: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Simulation failed: {0}")]
    Buffer(#[from] BufferError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Simulation thread panicked")]
    WriterPanicked,
}

/// Why a reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStop {
    /// Its consumer asked to stop
    Consumer,

    /// The writer is done and the last generation has been seen
    WriterFinished,

    /// The consumer returned an error or panicked, or the buffer was poisoned
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderReport {
    /// Frames handed to the consumer
    pub frames: u64,

    pub last_generation: Option<u64>,

    pub stop: ReaderStop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Generation published last
    pub generation: u64,

    /// One per consumer, in order
    pub readers: Vec<ReaderReport>,
}

/// Runs a simulation on one thread while consumers watch on others.
#[derive(Debug)]
pub struct FrameSequencer {
    writer: FrameWriter,
    reader: FrameReader,

    /// Generations simulated across all runs. Only observational.
    simulated: AtomicU64,
}

impl FrameSequencer {
    pub fn new(initial: Grid) -> Self {
        let (writer, reader) = DoubleBuffer::from_grid(initial).split();

        Self {
            writer,
            reader,
            simulated: AtomicU64::new(0),
        }
    }

    /// Stamp `seed` onto a grid of the given size, and start from there.
    pub fn from_seed(seed: &SeedPattern, width: usize, height: usize) -> Result<Self, GridError> {
        let initial = seed.allocate(width, height)?;

        Ok(Self::new(initial))
    }

    /// A handle on the latest published generation.
    pub fn reader(&self) -> FrameReader {
        self.reader.clone()
    }

    pub fn simulated(&self) -> u64 {
        self.simulated.load(Ordering::Relaxed)
    }

    /// Simulate `config.ticks` generations under `rule`, with one reader thread per consumer.
    ///
    /// Returns once every thread has been joined. A failing consumer only stops its own reader,
    /// but a failing writer fails the whole run.
    pub fn run<R: Rule + ?Sized>(
        &mut self,
        rule: &R,
        config: &SequencerConfig,
        consumers: &mut [&mut dyn Consumer],
    ) -> Result<RunReport, SequencerError> {
        let start = Instant::now();
        let done = AtomicBool::new(false);

        info!(
            ticks = config.ticks,
            readers = consumers.len(),
            "Starting simulation"
        );

        let writer = &mut self.writer;
        let reader = &self.reader;
        let simulated = &self.simulated;
        let done = &done;

        let (generation, readers) = thread::scope(|s| {
            let sim = thread::Builder::new()
                .name("simulation".to_string())
                .spawn_scoped(s, move || {
                    let _done = SetOnDrop(done);

                    simulate(writer, rule, config, simulated)
                })
                .map_err(|e| {
                    done.store(true, Ordering::Release);
                    SequencerError::Spawn(e)
                })?;

            let mut handles = Vec::with_capacity(consumers.len());

            for (i, consumer) in consumers.iter_mut().enumerate() {
                let consumer = &mut **consumer;
                let handle = thread::Builder::new()
                    .name(format!("reader-{i}"))
                    .spawn_scoped(s, move || observe(reader, consumer, simulated, done));

                match handle {
                    Ok(handle) => handles.push(Some(handle)),
                    Err(e) => {
                        error!(reader = i, "Failed to spawn reader: {e}");
                        handles.push(None);
                    }
                }
            }

            let readers = handles
                .into_iter()
                .enumerate()
                .map(|(i, handle)| reader_report(i, handle.map(|h| h.join())))
                .collect::<Vec<_>>();

            let generation = sim
                .join()
                .map_err(|_| SequencerError::WriterPanicked)??;

            Ok::<_, SequencerError>((generation, readers))
        })?;

        info!(
            generation,
            elapsed = ?start.elapsed(),
            "Simulation finished"
        );

        Ok(RunReport {
            generation,
            readers,
        })
    }
}

impl ReaderReport {
    fn failed() -> Self {
        Self {
            frames: 0,
            last_generation: None,
            stop: ReaderStop::Failed,
        }
    }
}

/// Report of reader `i`, given how its thread ended. `None` if it never started.
fn reader_report(i: usize, joined: Option<thread::Result<ReaderReport>>) -> ReaderReport {
    match joined {
        Some(Ok(report)) => report,
        Some(Err(_)) => {
            error!(reader = i, "Reader panicked");
            ReaderReport::failed()
        }
        None => ReaderReport::failed(),
    }
}

/// Raises the flag when the writer returns, even by panicking.
struct SetOnDrop<'a>(&'a AtomicBool);

impl Drop for SetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

fn simulate<R: Rule + ?Sized>(
    writer: &mut FrameWriter,
    rule: &R,
    config: &SequencerConfig,
    simulated: &AtomicU64,
) -> Result<u64, BufferError> {
    let mut generation = writer.generation();

    for tick in 0..config.ticks {
        generation = writer.apply_and_swap(rule).inspect_err(|e| {
            error!(tick, "Simulation failed: {e}");
        })?;

        simulated.fetch_add(1, Ordering::Relaxed);

        if let Some(interval) = config.tick_interval.filter(|_| tick + 1 < config.ticks) {
            thread::sleep(interval);
        }
    }

    Ok(generation)
}

fn observe(
    reader: &FrameReader,
    consumer: &mut dyn Consumer,
    simulated: &AtomicU64,
    done: &AtomicBool,
) -> ReaderReport {
    let mut report = ReaderReport {
        frames: 0,
        last_generation: None,
        stop: ReaderStop::Failed,
    };

    loop {
        // Checked before pinning, so that once the writer is done the pinned frame is its last
        let writer_done = done.load(Ordering::Acquire);

        let frame = match reader.active() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Reader failed to pin a frame: {e}");
                break;
            }
        };

        let generation = frame.generation();

        if report.last_generation.is_some_and(|last| last >= generation) {
            drop(frame);

            if writer_done {
                report.stop = ReaderStop::WriterFinished;
                break;
            }

            thread::sleep(IDLE_BACKOFF);
            continue;
        }

        let flow = consumer.consume(&frame, simulated.load(Ordering::Relaxed));
        drop(frame);

        report.frames += 1;
        report.last_generation = Some(generation);

        match flow {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => {
                report.stop = ReaderStop::Consumer;
                break;
            }
            Err(e) => {
                error!(generation, "Consumer failed: {e:#}");
                break;
            }
        }
    }

    debug!(
        frames = report.frames,
        last_generation = report.last_generation,
        stop = ?report.stop,
        "Reader stopped"
    );

    report
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::ALIVE;
    use crate::rules::LookupTableRule;

    /// Stops once it has seen `cap`.
    struct Cap {
        cap: u64,
        seen: Vec<u64>,
    }

    impl Consumer for Cap {
        fn consume(&mut self, frame: &Frame<'_>, _: u64) -> anyhow::Result<ControlFlow<()>> {
            self.seen.push(frame.generation());

            if frame.generation() >= self.cap {
                Ok(ControlFlow::Break(()))
            } else {
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    fn blinker() -> Grid {
        let mut grid = Grid::new(5, 5).unwrap();
        for x in 1..4 {
            grid.set(x, 2, ALIVE).unwrap();
        }

        grid
    }

    #[test]
    fn zero_ticks() {
        let mut seq = FrameSequencer::new(blinker());
        let mut cap = Cap {
            cap: 10,
            seen: Vec::new(),
        };

        let report = seq
            .run(
                &LookupTableRule::default(),
                &SequencerConfig::default(),
                &mut [&mut cap],
            )
            .unwrap();

        assert_eq!(report.generation, 0);
        assert_eq!(report.readers[0].stop, ReaderStop::WriterFinished);
        assert_eq!(cap.seen, [0]);
        assert_eq!(seq.simulated(), 0);
    }

    #[test]
    fn one_report_per_consumer() {
        let finished = ReaderReport {
            frames: 3,
            last_generation: Some(4),
            stop: ReaderStop::WriterFinished,
        };

        assert_eq!(reader_report(0, Some(Ok(finished.clone()))), finished);
        assert_eq!(
            reader_report(1, Some(Err(Box::new("panicked")))),
            ReaderReport::failed()
        );
        assert_eq!(reader_report(2, None), ReaderReport::failed());
    }

    #[test]
    fn counts_generations_across_runs() {
        let mut seq = FrameSequencer::new(blinker());
        let config = SequencerConfig {
            ticks: 3,
            tick_interval: None,
        };

        let report = seq.run(&LookupTableRule::default(), &config, &mut []).unwrap();
        assert_eq!(report.generation, 3);

        let report = seq.run(&LookupTableRule::default(), &config, &mut []).unwrap();
        assert_eq!(report.generation, 6);
        assert_eq!(seq.simulated(), 6);

        let reader = seq.reader();
        let frame = reader.active().unwrap();
        assert_eq!(frame.generation(), 6);
        assert_eq!(*frame, blinker());
    }
}
