use std::io;
use std::io::Write;
use std::ops::ControlFlow;
use std::time::Duration;
use std::time::Instant;

use crossterm::cursor;
use crossterm::queue;
use crossterm::style;
use crossterm::terminal;
use tracing::info;

use crate::buffer::Frame;
use crate::grid::Grid;
use crate::sequencer::Consumer;

/// Hex values of braille dots
///
/// ```text
///  1   8
///  2  10
///  4  20
/// 40  80
/// ```
///
/// Where the base blank pattern is codepoint `0x2800` (or U+2800)
///
/// To get other configurations, just add the numbers above.
const BRAILLE_EMPTY: u32 = 0x2800;

fn get_hex_value(x: usize, y: usize) -> u32 {
    match (x % 2, y % 4) {
        (0, 0) => 0x1,
        (1, 0) => 0x8,
        (0, 1) => 0x2,
        (1, 1) => 0x10,
        (0, 2) => 0x4,
        (1, 2) => 0x20,
        (0, 3) => 0x40,
        (1, 3) => 0x80,
        _ => unreachable!(),
    }
}

/// Draw `grid` with one braille character per 2x4 block of cells, one line per 4 rows.
pub fn braille(grid: &Grid) -> String {
    let (w, h) = grid.dimensions();
    let (bw, bh) = (w.div_ceil(2), h.div_ceil(4));

    let mut cp = vec![BRAILLE_EMPTY; bw * bh];

    for (x, y) in grid.live_cells() {
        cp[(y / 4) * bw + (x / 2)] += get_hex_value(x, y);
    }

    // Each braille character is 3 bytes, plus the newlines
    let mut fb = String::with_capacity(3 * (bw * bh) + bh);

    for (i, &c) in cp.iter().enumerate() {
        if i > 0 && i % bw == 0 {
            fb.push('\n');
        }

        fb.push(char::from_u32(c).unwrap_or(' '));
    }

    fb
}

/// Draws every frame to the terminal, until generation `cap` has been drawn.
pub struct TerminalRenderer {
    stdout: io::Stdout,
    cap: u64,

    /// Minimum time between two draws
    frame_time: Duration,
    last_draw: Option<Instant>,
}

impl TerminalRenderer {
    pub fn new(cap: u64, framerate: u32) -> io::Result<Self> {
        let mut stdout = io::stdout();

        queue!(stdout, terminal::EnterAlternateScreen, cursor::Hide)?;
        stdout.flush()?;

        Ok(Self {
            stdout,
            cap,
            frame_time: Duration::from_secs(1) / framerate.max(1),
            last_draw: None,
        })
    }

    fn draw(&mut self, frame: &Frame<'_>, simulated: u64) -> io::Result<()> {
        let s = braille(frame);

        queue!(
            self.stdout,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0),
        )?;

        for line in s.lines() {
            queue!(self.stdout, style::Print(line), cursor::MoveToNextLine(1))?;
        }

        queue!(
            self.stdout,
            style::Print(format!(
                "generation {} / {}  (simulated {simulated}, population {})",
                frame.generation(),
                self.cap,
                frame.population()
            )),
        )?;

        self.stdout.flush()
    }
}

impl Consumer for TerminalRenderer {
    fn consume(&mut self, frame: &Frame<'_>, simulated: u64) -> anyhow::Result<ControlFlow<()>> {
        let last = frame.generation() >= self.cap;
        let due = self
            .last_draw
            .is_none_or(|t| t.elapsed() >= self.frame_time);

        // Frames arriving faster than the framerate are dropped, except the last one
        if due || last {
            self.draw(frame, simulated)?;
            self.last_draw = Some(Instant::now());
        }

        if last {
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        let _ = queue!(self.stdout, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = self.stdout.flush();
    }
}

/// Logs the population of every frame, until generation `cap` has been seen.
pub struct Headless {
    name: String,
    cap: u64,
}

impl Headless {
    pub fn new(name: impl Into<String>, cap: u64) -> Self {
        Self {
            name: name.into(),
            cap,
        }
    }
}

impl Consumer for Headless {
    fn consume(&mut self, frame: &Frame<'_>, simulated: u64) -> anyhow::Result<ControlFlow<()>> {
        info!(
            reader = %self.name,
            generation = frame.generation(),
            simulated,
            population = frame.population(),
            "Frame"
        );

        if frame.generation() >= self.cap {
            Ok(ControlFlow::Break(()))
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rle::SeedPattern;

    #[test]
    fn braille_glider() {
        let seed: SeedPattern = "x = 3, y = 3\nbo$2bo$3o!".parse().unwrap();
        let grid = seed.allocate(3, 3).unwrap();

        insta::assert_snapshot!(braille(&grid), @"⠬⠆");
    }

    #[test]
    fn braille_blocks() {
        let mut grid = Grid::new(4, 8).unwrap();
        grid.fill(1);
        grid.set(3, 7, 0).unwrap();

        insta::assert_snapshot!(braille(&grid), @r"
        ⣿⣿
        ⣿⡿
        ");
    }
}
