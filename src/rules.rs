//! Transition rules. Each rule reads one generation and writes the next.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::grid::ALIVE;
use crate::grid::DEAD;
use crate::grid::Grid;
use crate::grid::GridError;
use crate::rule_set::RuleSet;

/// Bit of the center cell in a neighborhood pattern.
const CENTER: usize = 4;

/// Every possible 3x3 neighborhood.
pub const PATTERNS: usize = 1 << 9;

/// A transition rule, advancing `read` by one generation into `write`.
///
/// `read` and `write` can never alias, and `read` is never modified.
pub trait Rule: Send + Sync {
    fn apply(&self, read: &Grid, write: &mut Grid) -> Result<(), GridError>;
}

/// What lies past the edges of the grid.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Cells outside the grid are permanently dead.
    #[default]
    Dead,

    /// Opposite edges are joined.
    Torus,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown boundary \"{0}\", expected \"dead\" or \"torus\"")]
pub struct BoundaryError(String);

impl FromStr for Boundary {
    type Err = BoundaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dead" => Ok(Self::Dead),
            "torus" | "toroidal" | "wrap" => Ok(Self::Torus),
            _ => Err(BoundaryError(s.to_string())),
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dead => write!(f, "dead"),
            Self::Torus => write!(f, "torus"),
        }
    }
}

impl Boundary {
    /// State of the cell at `(x, y)`, which may lie one step outside of `grid`.
    #[inline]
    fn sample(self, grid: &Grid, x: isize, y: isize) -> u8 {
        let (w, h) = (grid.width() as isize, grid.height() as isize);

        let (x, y) = match self {
            Self::Dead => {
                if x < 0 || y < 0 || x >= w || y >= h {
                    return DEAD;
                }

                (x, y)
            }
            Self::Torus => (x.rem_euclid(w), y.rem_euclid(h)),
        };

        grid.row(y as usize)[x as usize]
    }

    /// The 3 cells of column `x`, centered on row `y`, packed top to bottom into the low bits.
    #[inline]
    fn column(self, grid: &Grid, x: isize, y: isize) -> usize {
        (self.sample(grid, x, y - 1) as usize)
            | (self.sample(grid, x, y) as usize) << 1
            | (self.sample(grid, x, y + 1) as usize) << 2
    }

    /// The neighborhood of `(x, y)` as a 9-bit pattern, see [`LookupTableRule`].
    pub fn pattern(self, grid: &Grid, x: usize, y: usize) -> usize {
        let (x, y) = (x as isize, y as isize);

        self.column(grid, x - 1, y) | self.column(grid, x, y) << 3 | self.column(grid, x + 1, y) << 6
    }
}

/// Counts the live neighbors of every cell directly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NeighborCountRule {
    set: RuleSet,
    boundary: Boundary,
}

impl NeighborCountRule {
    pub fn new(set: RuleSet, boundary: Boundary) -> Self {
        Self { set, boundary }
    }

    pub fn rule_set(&self) -> RuleSet {
        self.set
    }

    pub fn neighbors(&self, grid: &Grid, x: usize, y: usize) -> u32 {
        let (x, y) = (x as isize, y as isize);
        let mut n = 0;

        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx, dy) != (0, 0) {
                    n += self.boundary.sample(grid, x + dx, y + dy) as u32;
                }
            }
        }

        n
    }
}

impl Rule for NeighborCountRule {
    fn apply(&self, read: &Grid, write: &mut Grid) -> Result<(), GridError> {
        read.check_dimensions(write)?;

        for y in 0..read.height() {
            let row = write.row_mut(y);

            for (x, cell) in row.iter_mut().enumerate() {
                let alive = read.row(y)[x] == ALIVE;
                let n = self.neighbors(read, x, y);

                *cell = u8::from(self.set.next(alive, n));
            }
        }

        Ok(())
    }
}

/// Looks up the next state of every cell in a table of all 512 neighborhoods.
///
/// A neighborhood is packed column by column, top to bottom:
/// ```notrust
///   0 3 6
///   1 4 7
///   2 5 8
/// ```
/// so bit 4 is the center cell. Moving one cell to the right shifts the pattern down by 3 bits.
#[derive(Clone, PartialEq, Eq)]
pub struct LookupTableRule {
    table: Box<[u8; PATTERNS]>,
    set: RuleSet,
    boundary: Boundary,
}

impl LookupTableRule {
    /// Build the table for `set`.
    pub fn new(set: RuleSet, boundary: Boundary) -> Self {
        let mut table = Box::new([DEAD; PATTERNS]);

        for (pattern, next) in table.iter_mut().enumerate() {
            let alive = pattern & (1 << CENTER) != 0;
            let n = (pattern & !(1 << CENTER)).count_ones();

            *next = u8::from(set.next(alive, n));
        }

        Self {
            table,
            set,
            boundary,
        }
    }

    pub fn rule_set(&self) -> RuleSet {
        self.set
    }

    /// Next state of the center cell of `pattern`.
    #[inline]
    pub fn lookup(&self, pattern: usize) -> u8 {
        self.table[pattern & (PATTERNS - 1)]
    }
}

impl Default for LookupTableRule {
    fn default() -> Self {
        Self::new(RuleSet::default(), Boundary::default())
    }
}

impl fmt::Debug for LookupTableRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupTableRule")
            .field("set", &self.set)
            .field("boundary", &self.boundary)
            .finish_non_exhaustive()
    }
}

impl Rule for LookupTableRule {
    fn apply(&self, read: &Grid, write: &mut Grid) -> Result<(), GridError> {
        read.check_dimensions(write)?;

        for y in 0..read.height() {
            let yi = y as isize;
            let row = write.row_mut(y);

            // Slide the window along the row, one column at a time
            let mut window = self.boundary.column(read, -1, yi) | self.boundary.column(read, 0, yi) << 3;

            for (x, cell) in row.iter_mut().enumerate() {
                window |= self.boundary.column(read, x as isize + 1, yi) << 6;
                *cell = self.lookup(window);
                window >>= 3;
            }
        }

        Ok(())
    }
}

/// Which rule implementation to run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    #[default]
    Table,
    Count,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown engine \"{0}\", expected \"table\" or \"count\"")]
pub struct EngineError(String);

impl FromStr for EngineKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" | "lookup" => Ok(Self::Table),
            "count" | "direct" => Ok(Self::Count),
            _ => Err(EngineError(s.to_string())),
        }
    }
}

/// A rule selected at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    NeighborCount(NeighborCountRule),
    LookupTable(LookupTableRule),
}

impl Engine {
    pub fn new(kind: EngineKind, set: RuleSet, boundary: Boundary) -> Self {
        match kind {
            EngineKind::Table => Self::LookupTable(LookupTableRule::new(set, boundary)),
            EngineKind::Count => Self::NeighborCount(NeighborCountRule::new(set, boundary)),
        }
    }

    pub fn rule_set(&self) -> RuleSet {
        match self {
            Self::NeighborCount(rule) => rule.rule_set(),
            Self::LookupTable(rule) => rule.rule_set(),
        }
    }
}

impl Rule for Engine {
    fn apply(&self, read: &Grid, write: &mut Grid) -> Result<(), GridError> {
        match self {
            Self::NeighborCount(rule) => rule.apply(read, write),
            Self::LookupTable(rule) => rule.apply(read, write),
        }
    }
}
