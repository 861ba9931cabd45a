use std::fmt;

use thiserror::Error;

/// Cell state of a dead cell
pub const DEAD: u8 = 0;

/// Cell state of a live cell
pub const ALIVE: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("Grid dimensions must be non-zero, got {width}x{height}")]
    Empty { width: usize, height: usize },

    #[error("Cell ({x}, {y}) is outside of a {width}x{height} grid")]
    IndexOutOfRange {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("Grid of {width}x{height} cells does not fit in memory")]
    TooLarge { width: usize, height: usize },

    #[error("Grid dimensions differ: {left:?} and {right:?}")]
    DimensionMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
}

/// A fixed size 2D array of cells, stored row-major with one byte per cell.
///
/// Every cell holds either [`DEAD`] or [`ALIVE`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    cells: Vec<u8>,
    width: usize,
    height: usize,
}

impl Grid {
    /// Create a new, entirely dead grid.
    pub fn new(width: usize, height: usize) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::Empty { width, height });
        }

        let len = width
            .checked_mul(height)
            .filter(|&n| n <= isize::MAX as usize)
            .ok_or(GridError::TooLarge { width, height })?;

        Ok(Self {
            cells: vec![DEAD; len],
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn get(&self, x: usize, y: usize) -> Result<u8, GridError> {
        let i = self.index(x, y)?;

        Ok(self.cells[i])
    }

    /// Set the cell at `(x, y)`. Any non-zero `v` is stored as [`ALIVE`].
    pub fn set(&mut self, x: usize, y: usize, v: u8) -> Result<(), GridError> {
        let i = self.index(x, y)?;

        self.cells[i] = u8::from(v != DEAD);

        Ok(())
    }

    /// Overwrite every cell with the contents of `other`.
    pub fn copy_from(&mut self, other: &Grid) -> Result<(), GridError> {
        self.check_dimensions(other)?;

        self.cells.copy_from_slice(&other.cells);

        Ok(())
    }

    pub fn fill(&mut self, v: u8) {
        self.cells.fill(u8::from(v != DEAD));
    }

    /// Number of live cells
    pub fn population(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }

    /// Coordinates of every live cell, row by row.
    pub fn live_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == ALIVE)
            .map(|(i, _)| (i % self.width, i / self.width))
    }

    /// A single row of cells.
    ///
    /// Panics if `y` is out of bounds.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;

        &self.cells[start..start + self.width]
    }

    pub(crate) fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.width;

        &mut self.cells[start..start + self.width]
    }

    pub(crate) fn check_dimensions(&self, other: &Grid) -> Result<(), GridError> {
        if self.dimensions() != other.dimensions() {
            return Err(GridError::DimensionMismatch {
                left: self.dimensions(),
                right: other.dimensions(),
            });
        }

        Ok(())
    }

    fn index(&self, x: usize, y: usize) -> Result<usize, GridError> {
        if x >= self.width || y >= self.height {
            return Err(GridError::IndexOutOfRange {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }

        Ok(y * self.width + x)
    }
}

/// One line per row, `O` for live cells and `.` for dead ones.
impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.height {
            if y > 0 {
                writeln!(f)?;
            }

            for &c in self.row(y) {
                let c = if c == ALIVE { 'O' } else { '.' };
                write!(f, "{c}")?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid {}x{}", self.width, self.height)?;
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_is_dead() {
        let grid = Grid::new(3, 2).unwrap();

        assert_eq!(grid.dimensions(), (3, 2));
        assert_eq!(grid.population(), 0);
    }

    #[test]
    fn zero_sized() {
        assert_eq!(
            Grid::new(0, 4),
            Err(GridError::Empty {
                width: 0,
                height: 4
            })
        );
    }

    #[test]
    fn too_large() {
        let half = usize::MAX / 2 + 1;

        // Overflows
        assert_eq!(
            Grid::new(half, 2),
            Err(GridError::TooLarge {
                width: half,
                height: 2
            })
        );

        // Fits in a usize, not in an allocation
        assert!(matches!(
            Grid::new(isize::MAX as usize, 2),
            Err(GridError::TooLarge { .. })
        ));
    }

    #[test]
    fn get_set() {
        let mut grid = Grid::new(4, 4).unwrap();
        grid.set(3, 1, ALIVE).unwrap();
        grid.set(0, 0, 7).unwrap();

        assert_eq!(grid.get(3, 1), Ok(ALIVE));
        assert_eq!(grid.get(0, 0), Ok(ALIVE));
        assert_eq!(grid.get(1, 1), Ok(DEAD));
        assert_eq!(grid.live_cells().collect::<Vec<_>>(), [(0, 0), (3, 1)]);
    }

    #[test]
    fn out_of_range() {
        let mut grid = Grid::new(2, 3).unwrap();

        assert!(matches!(
            grid.get(2, 0),
            Err(GridError::IndexOutOfRange { x: 2, y: 0, .. })
        ));
        assert!(matches!(
            grid.set(0, 3, ALIVE),
            Err(GridError::IndexOutOfRange { x: 0, y: 3, .. })
        ));
    }

    #[test]
    fn copy_from() {
        let mut src = Grid::new(2, 2).unwrap();
        src.set(1, 1, ALIVE).unwrap();

        let mut dst = Grid::new(2, 2).unwrap();
        dst.copy_from(&src).unwrap();
        assert_eq!(dst, src);

        let mut other = Grid::new(3, 2).unwrap();
        assert_eq!(
            other.copy_from(&src),
            Err(GridError::DimensionMismatch {
                left: (3, 2),
                right: (2, 2)
            })
        );
    }

    #[test]
    fn fill_and_display() {
        let mut grid = Grid::new(3, 2).unwrap();
        grid.fill(ALIVE);
        assert_eq!(grid.population(), 6);

        grid.set(1, 0, DEAD).unwrap();
        insta::assert_snapshot!(grid.to_string(), @r"
        O.O
        OOO
        ");
    }
}
