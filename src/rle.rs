use std::str::FromStr;

use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::grid::ALIVE;
use crate::grid::DEAD;
use crate::grid::Grid;
use crate::grid::GridError;
use crate::parse_util;
use crate::parse_util::ConvertError;
use crate::parse_util::ParseError;

/// A seed pattern in the RLE file format.
///
/// The pattern owns no grid, it only knows how to stamp itself onto one. See
/// [`SeedPattern::allocate`].
///
/// See: https://conwaylife.com/wiki/Run_Length_Encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPattern {
    width: usize,
    height: usize,
    tokens: Vec<Token>,

    /// `#N` line
    pub name: Option<String>,

    /// `#O` line
    pub author: Option<String>,

    /// Raw `rule = ...` field of the header. The pattern itself never interprets it.
    pub rule: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    /// `len` cells of `state`
    Run { state: u8, len: usize },

    /// Move down `len` rows, back to the first column
    EndRow { len: usize },
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Missing header line \"x = <width>, y = <height>\"")]
    MissingHeader,

    #[error("Line {line}: invalid header: {source}")]
    Header {
        line: usize,
        #[source]
        source: HeaderError,
    },

    #[error("Line {line}: unrecognized byte 0x{got:02X}")]
    UnrecognizedByte { line: usize, got: u8 },

    #[error("Line {line}: run length is not followed by a tag")]
    DanglingCount { line: usize },

    #[error("Line {line}: invalid run length: {source}")]
    RunLength {
        line: usize,
        #[source]
        source: ConvertError,
    },
}

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    #[error("Expected a value for '{axis}'")]
    NoValue { axis: char },

    #[error("Failed to parse '{axis}': {source}")]
    Convert {
        axis: char,
        #[source]
        source: ConvertError,
    },

    #[error("'{axis}' must be positive, got {value}")]
    NonPositive { axis: char, value: i64 },

    #[error("Invalid token: expected ',' or end of line, found '{got}'")]
    InvalidToken { got: char },
}

struct Header {
    width: usize,
    height: usize,
    rule: Option<String>,
}

impl SeedPattern {
    /// Parse an RLE pattern. Assumes the bytes are valid Ascii.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut header: Option<Header> = None;
        let mut name = None;
        let mut author = None;
        let mut tokens = Vec::new();
        let mut count = RunCount::default();

        for (i, line) in bytes.split(|&b| b == b'\n').enumerate() {
            let lineno = i + 1;
            let line = line.trim_ascii();

            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix(b"#") {
                match read_line_comment(comment) {
                    Some(RleCommentLine::Name(n)) => {
                        if name.is_some() {
                            warn!("RLE file name already defined. Using latest");
                        }

                        name = Some(n);
                    }
                    Some(RleCommentLine::Author(a)) => {
                        if author.is_some() {
                            warn!("RLE author already defined. Using latest");
                        }

                        author = Some(a);
                    }
                    None => {}
                }

                continue;
            }

            if header.is_none() {
                let h = read_line_header(line).map_err(|source| FormatError::Header {
                    line: lineno,
                    source,
                })?;

                header = Some(h);
                continue;
            }

            if read_encoding(line, lineno, &mut count, &mut tokens)? == Encoding::Done {
                break;
            }
        }

        if let Some(line) = count.line {
            return Err(FormatError::DanglingCount { line });
        }

        let Some(Header {
            width,
            height,
            rule,
        }) = header
        else {
            return Err(FormatError::MissingHeader);
        };

        debug!(
            width,
            height,
            tokens = tokens.len(),
            name = name.as_deref().unwrap_or("<unnamed>"),
            "Parsed RLE pattern"
        );

        Ok(Self {
            width,
            height,
            tokens,
            name,
            author,
            rule,
        })
    }

    /// Width declared by the header
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height declared by the header
    pub fn height(&self) -> usize {
        self.height
    }

    /// A fresh grid of the given size with the pattern stamped at its origin.
    ///
    /// The size need not match the declared one. Cells falling outside of the grid are dropped.
    pub fn allocate(&self, width: usize, height: usize) -> Result<Grid, GridError> {
        let mut grid = Grid::new(width, height)?;

        self.decode_into(&mut grid);

        Ok(grid)
    }

    /// Stamp the pattern at the origin of `grid`, overwriting the cells it covers.
    pub fn decode_into(&self, grid: &mut Grid) {
        let (w, h) = grid.dimensions();
        let (mut cx, mut cy) = (0usize, 0usize);

        for &token in &self.tokens {
            match token {
                Token::Run { state, len } => {
                    if cx < w && cy < h {
                        let n = len.min(w - cx);
                        grid.row_mut(cy)[cx..cx + n].fill(state);
                    }

                    cx = cx.saturating_add(len);
                }
                Token::EndRow { len } => {
                    cy = cy.saturating_add(len);
                    cx = 0;
                }
            }
        }
    }
}

impl FromStr for SeedPattern {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.as_bytes())
    }
}

enum RleCommentLine {
    Name(String),
    Author(String),
}

/// Pulls metadata out of a comment line. Every other comment is skipped.
fn read_line_comment(bytes: &[u8]) -> Option<RleCommentLine> {
    let (Some(b), bytes) = parse_util::take_1(bytes) else {
        return None;
    };

    let text = || String::from_utf8_lossy(bytes.trim_ascii()).to_string();

    match b {
        // Pattern name
        b'N' => Some(RleCommentLine::Name(text())),

        // Pattern author
        b'O' => Some(RleCommentLine::Author(text())),

        _ => None,
    }
}

/// Parses `x = <int>, y = <int>[, rule = <rule>]`.
fn read_line_header(bytes: &[u8]) -> Result<Header, HeaderError> {
    let (width, bytes) = read_dimension(b'x', bytes)?;

    let bytes = parse_util::take_ws(bytes);
    let bytes = parse_util::expect(b',', bytes)?;
    let bytes = parse_util::take_ws(bytes);

    let (height, bytes) = read_dimension(b'y', bytes)?;

    let bytes = parse_util::take_ws(bytes);
    let (b, bytes) = parse_util::take_1(bytes);

    let rule = match b {
        None => None,
        Some(b',') => {
            let bytes = parse_util::take_ws(bytes);
            let bytes = parse_util::expect_slice(b"rule", bytes)?;
            let bytes = parse_util::take_ws(bytes);
            let bytes = parse_util::expect(b'=', bytes)?;
            let rule = bytes.trim_ascii();

            (!rule.is_empty()).then(|| String::from_utf8_lossy(rule).to_string())
        }
        Some(b) => return Err(HeaderError::InvalidToken { got: b as char }),
    };

    Ok(Header {
        width,
        height,
        rule,
    })
}

/// Parses `<axis> = <positive int>`
fn read_dimension(axis: u8, bytes: &[u8]) -> Result<(usize, &[u8]), HeaderError> {
    let bytes = parse_util::expect(axis, bytes)?;
    let bytes = parse_util::take_ws(bytes);
    let bytes = parse_util::expect(b'=', bytes)?;
    let bytes = parse_util::take_ws(bytes);

    let axis = axis as char;

    let (negative, bytes) = match parse_util::expect(b'-', bytes) {
        Ok(rest) => (true, rest),
        Err(_) => (false, bytes),
    };

    let (Some(digits), bytes) = parse_util::take_digits(bytes) else {
        return Err(HeaderError::NoValue { axis });
    };

    let value: i64 =
        parse_util::convert(digits).map_err(|source| HeaderError::Convert { axis, source })?;
    let value = if negative { -value } else { value };

    if value <= 0 {
        return Err(HeaderError::NonPositive { axis, value });
    }

    let value = usize::try_from(value).map_err(|_| HeaderError::Convert {
        axis,
        source: ConvertError {
            str: value.to_string(),
        },
    })?;

    Ok((value, bytes))
}

#[derive(Debug, PartialEq, Eq)]
enum Encoding {
    /// The line was consumed, keep reading
    More,

    /// `!` was reached
    Done,
}

/// Digits of a run length whose tag has not been read yet. A count may be split across lines.
#[derive(Debug, Default)]
struct RunCount {
    digits: Vec<u8>,

    /// Line the count started on
    line: Option<usize>,
}

impl RunCount {
    fn push(&mut self, digits: &[u8], line: usize) {
        self.line.get_or_insert(line);
        self.digits.extend_from_slice(digits);
    }

    /// The pending run length, `1` if there is none. Explicit counts of 0 are also read as 1.
    fn take(&mut self) -> Result<usize, FormatError> {
        let Some(line) = self.line.take() else {
            return Ok(1);
        };

        let len: usize = parse_util::convert(&self.digits)
            .map_err(|source| FormatError::RunLength { line, source })?;
        self.digits.clear();

        Ok(len.max(1))
    }
}

fn read_encoding(
    mut bytes: &[u8],
    line: usize,
    count: &mut RunCount,
    tokens: &mut Vec<Token>,
) -> Result<Encoding, FormatError> {
    while let Some(b) = parse_util::peek_1(bytes) {
        if let (Some(digits), rest) = parse_util::take_digits(bytes) {
            count.push(digits, line);
            bytes = rest;
            continue;
        }

        if b.is_ascii_whitespace() && count.line.is_none() {
            bytes = parse_util::take_ws(bytes);
            continue;
        }

        let (_, rest) = parse_util::take_1(bytes);
        bytes = rest;

        match b {
            // Dead cells
            b'b' => tokens.push(Token::Run {
                state: DEAD,
                len: count.take()?,
            }),

            // Live cells
            b'o' => tokens.push(Token::Run {
                state: ALIVE,
                len: count.take()?,
            }),

            // End of line
            b'$' => tokens.push(Token::EndRow {
                len: count.take()?,
            }),

            // End of input
            b'!' => {
                count.take()?;
                return Ok(Encoding::Done);
            }

            // Trailing comment
            b'%' => break,

            b => return Err(FormatError::UnrecognizedByte { line, got: b }),
        }
    }

    Ok(Encoding::More)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_header() {
        let header = read_line_header(b"x = 3, y = 2").unwrap();
        assert_eq!((header.width, header.height), (3, 2));
        assert_eq!(header.rule, None);

        let header = read_line_header(b"x=36,y=9,rule=B3/S23").unwrap();
        assert_eq!((header.width, header.height), (36, 9));
        assert_eq!(header.rule.as_deref(), Some("B3/S23"));
    }

    #[test]
    fn read_header_errors() {
        assert!(matches!(
            read_line_header(b"x = 0, y = 2"),
            Err(HeaderError::NonPositive { axis: 'x', value: 0 })
        ));
        assert!(matches!(
            read_line_header(b"x = 4, y = -2"),
            Err(HeaderError::NonPositive {
                axis: 'y',
                value: -2
            })
        ));
        assert!(matches!(
            read_line_header(b"x = , y = 2"),
            Err(HeaderError::NoValue { axis: 'x' })
        ));
        assert!(matches!(
            read_line_header(b"x = 1, y = 2; rule"),
            Err(HeaderError::InvalidToken { got: ';' })
        ));
        assert!(matches!(
            read_line_header(b"2o$2o!"),
            Err(HeaderError::ParseError(_))
        ));
    }

    #[test]
    fn tokens() {
        let mut tokens = Vec::new();
        let mut count = RunCount::default();
        let res = read_encoding(b"2bo 3$o % comment !", 1, &mut count, &mut tokens).unwrap();

        assert_eq!(res, Encoding::More);
        assert_eq!(
            tokens,
            [
                Token::Run { state: DEAD, len: 2 },
                Token::Run {
                    state: ALIVE,
                    len: 1
                },
                Token::EndRow { len: 3 },
                Token::Run {
                    state: ALIVE,
                    len: 1
                },
            ]
        );

        assert_eq!(
            read_encoding(b"o!3o", 2, &mut count, &mut tokens).unwrap(),
            Encoding::Done
        );
    }

    #[test]
    fn token_errors() {
        let mut tokens = Vec::new();
        let mut count = RunCount::default();

        assert!(matches!(
            read_encoding(b"2o$x", 7, &mut count, &mut tokens),
            Err(FormatError::UnrecognizedByte { line: 7, got: b'x' })
        ));
        assert!(matches!(
            read_encoding(b"3 o", 8, &mut count, &mut tokens),
            Err(FormatError::UnrecognizedByte { line: 8, got: b' ' })
        ));
    }

    #[test]
    fn count_carries_over_lines() {
        let mut tokens = Vec::new();
        let mut count = RunCount::default();

        assert_eq!(
            read_encoding(b"bo1", 3, &mut count, &mut tokens).unwrap(),
            Encoding::More
        );
        assert_eq!(count.line, Some(3));

        read_encoding(b"2b", 4, &mut count, &mut tokens).unwrap();
        assert_eq!(tokens.last(), Some(&Token::Run { state: DEAD, len: 12 }));
        assert_eq!(count.line, None);
    }

    #[test]
    fn dangling_count() {
        assert!(matches!(
            "x = 2, y = 2\nbo\n12".parse::<SeedPattern>(),
            Err(FormatError::DanglingCount { line: 3 })
        ));
    }

    #[test]
    fn metadata() {
        let seed: SeedPattern = "#N Glider\n#O Richard K. Guy\n#C A comment\nx = 3, y = 3, rule = B3/S23\nbob$2bo$3o!"
            .parse()
            .unwrap();

        assert_eq!(seed.name.as_deref(), Some("Glider"));
        assert_eq!(seed.author.as_deref(), Some("Richard K. Guy"));
        assert_eq!(seed.rule.as_deref(), Some("B3/S23"));
        assert_eq!((seed.width(), seed.height()), (3, 3));
    }

    #[test]
    fn missing_header() {
        assert!(matches!(
            "# only comments\n\n".parse::<SeedPattern>(),
            Err(FormatError::MissingHeader)
        ));
        assert!(matches!(
            "bo$2bo$3o!\n".parse::<SeedPattern>(),
            Err(FormatError::Header { line: 1, .. })
        ));
    }

    #[test]
    fn stops_at_bang() {
        let seed: SeedPattern = "x = 2, y = 2\no!\n$o\n".parse().unwrap();
        let grid = seed.allocate(2, 2).unwrap();

        assert_eq!(grid.live_cells().collect::<Vec<_>>(), [(0, 0)]);
    }
}
