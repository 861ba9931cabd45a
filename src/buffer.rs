//! Two grids and a tag saying which one readers may look at.
//!
//! The writer only ever mutates the page that is *not* tagged active, then publishes it by storing
//! the tag with `Release` ordering. Readers load the tag with `Acquire` ordering and pin the page it
//! names for a whole pass.
//!
//! Each page sits behind its own `RwLock`, which is never taken per cell. Readers pin a page with
//! `try_read` and never wait on the writer. The writer takes the inactive page with `write`, which
//! waits only when a lagging reader still pins it from two generations ago. So a reader can never
//! see a page while it is being rewritten.

use std::hint;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::TryLockError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;

use thiserror::Error;
use tracing::trace;

use crate::grid::Grid;
use crate::grid::GridError;
use crate::rules::Rule;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("A buffer was poisoned by a panicking thread")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for BufferError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

#[derive(Debug)]
struct Page {
    /// Generation held by `grid`, `0` being the seed
    generation: u64,
    grid: Grid,
}

#[derive(Debug)]
pub struct DoubleBuffer {
    pages: [RwLock<Page>; 2],

    /// Index of the active page
    active: AtomicUsize,

    width: usize,
    height: usize,
}

impl DoubleBuffer {
    /// Both pages start out as copies of `initial`.
    pub fn from_grid(initial: Grid) -> Self {
        let (width, height) = initial.dimensions();
        let page = |grid| RwLock::new(Page { generation: 0, grid });

        Self {
            pages: [page(initial.clone()), page(initial)],
            active: AtomicUsize::new(0),
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Share the buffer between a single writer and any number of readers.
    pub fn split(self) -> (FrameWriter, FrameReader) {
        let shared = Arc::new(self);

        let writer = FrameWriter {
            shared: Arc::clone(&shared),
            generation: 0,
        };
        let reader = FrameReader { shared };

        (writer, reader)
    }
}

/// The only handle able to advance the buffer. Not `Clone`.
#[derive(Debug)]
pub struct FrameWriter {
    shared: Arc<DoubleBuffer>,

    /// Generation of the active page
    generation: u64,
}

impl FrameWriter {
    /// Apply `rule` to the active page, writing into the inactive one, then publish it.
    ///
    /// Returns the generation just published.
    pub fn apply_and_swap<R: Rule + ?Sized>(&mut self, rule: &R) -> Result<u64, BufferError> {
        // Only this handle ever stores the tag
        let read = self.shared.active.load(Ordering::Relaxed);
        let write = read ^ 1;

        self.generation = {
            let front = self.shared.pages[read].read()?;
            // Waits for any reader still holding this page
            let mut back = self.shared.pages[write].write()?;

            rule.apply(&front.grid, &mut back.grid)?;
            back.generation = front.generation + 1;

            back.generation
        };

        self.shared.active.store(write, Ordering::Release);

        trace!(generation = self.generation, page = write, "Published generation");

        Ok(self.generation)
    }

    /// Generation most recently published, `0` before the first swap.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A new reader of the same buffer.
    pub fn reader(&self) -> FrameReader {
        FrameReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read-only access to the latest published generation.
#[derive(Debug, Clone)]
pub struct FrameReader {
    shared: Arc<DoubleBuffer>,
}

impl FrameReader {
    pub fn dimensions(&self) -> (usize, usize) {
        self.shared.dimensions()
    }

    /// Pin the active page.
    ///
    /// The writer cannot reuse the page until the returned [`Frame`] is dropped, so it should be
    /// dropped once the pass over it is done.
    pub fn active(&self) -> Result<Frame<'_>, BufferError> {
        loop {
            let tag = self.shared.active.load(Ordering::Acquire);

            match self.shared.pages[tag].try_read() {
                // The tag may have moved on while pinning, making this page the writer's next
                // target. Only hand out the page if it is still the active one.
                Ok(guard) if self.shared.active.load(Ordering::Acquire) == tag => {
                    return Ok(Frame { guard });
                }
                Ok(_) | Err(TryLockError::WouldBlock) => {}
                Err(TryLockError::Poisoned(_)) => return Err(BufferError::Poisoned),
            }

            hint::spin_loop();
            thread::yield_now();
        }
    }
}

/// A pinned, fully written generation.
#[derive(Debug)]
pub struct Frame<'a> {
    guard: RwLockReadGuard<'a, Page>,
}

impl Frame<'_> {
    pub fn generation(&self) -> u64 {
        self.guard.generation
    }

    pub fn grid(&self) -> &Grid {
        &self.guard.grid
    }
}

impl Deref for Frame<'_> {
    type Target = Grid;

    fn deref(&self) -> &Grid {
        &self.guard.grid
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::grid::ALIVE;
    use crate::rules::LookupTableRule;

    fn blinker() -> Grid {
        let mut grid = Grid::new(5, 5).unwrap();
        for x in 1..4 {
            grid.set(x, 2, ALIVE).unwrap();
        }

        grid
    }

    #[test]
    fn seed_is_visible_before_first_tick() {
        let (_writer, reader) = DoubleBuffer::from_grid(blinker()).split();
        let frame = reader.active().unwrap();

        assert_eq!(frame.generation(), 0);
        assert_eq!(*frame, blinker());
    }

    #[test]
    fn readers_share_dimensions() {
        let (writer, reader) = DoubleBuffer::from_grid(Grid::new(7, 3).unwrap()).split();

        assert_eq!(reader.dimensions(), (7, 3));
        assert_eq!(writer.reader().dimensions(), (7, 3));
        assert_eq!(writer.generation(), 0);
    }

    #[test]
    fn swap_publishes_next_generation() {
        let rule = LookupTableRule::default();
        let (mut writer, reader) = DoubleBuffer::from_grid(blinker()).split();

        let mut expected = blinker();
        let mut next = blinker();

        for generation in 1..=5 {
            assert_eq!(writer.apply_and_swap(&rule).unwrap(), generation);

            rule.apply(&expected, &mut next).unwrap();
            std::mem::swap(&mut expected, &mut next);

            let frame = reader.active().unwrap();
            assert_eq!(frame.generation(), generation);
            assert_eq!(frame.grid(), &expected);
        }
    }

    #[test]
    fn lagging_reader_holds_back_writer() {
        let rule = LookupTableRule::default();
        let (mut writer, reader) = DoubleBuffer::from_grid(blinker()).split();

        thread::scope(|s| {
            let pinned = reader.active().unwrap();
            assert_eq!(pinned.generation(), 0);

            let handle = s.spawn(|| {
                writer.apply_and_swap(&rule).unwrap();
                writer.apply_and_swap(&rule).unwrap()
            });

            thread::sleep(Duration::from_millis(50));

            // The second swap would overwrite the pinned page
            assert!(reader.active().unwrap().generation() <= 1);
            assert_eq!(*pinned, blinker());
            assert!(!handle.is_finished());

            drop(pinned);

            assert_eq!(handle.join().unwrap(), 2);
        });

        assert_eq!(reader.active().unwrap().generation(), 2);
    }
}
