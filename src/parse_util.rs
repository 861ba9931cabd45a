use std::str::FromStr;

use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected end of input, expected '{exp}'")]
    UnexpectedEof { exp: char },

    #[error("Expected '{exp}', but got '{got}'")]
    UnexpectedToken { exp: char, got: char },

    #[error("Expected \"{exp}\", but got \"{got}\"")]
    UnexpectedSlice { exp: String, got: String },
}

/// Consumes the slice until a non-ascii whitespace character is reached.
pub fn take_ws(bytes: &[u8]) -> &[u8] {
    let (_, bytes) = take_while_fn(|b| b.is_ascii_whitespace(), bytes);

    bytes
}

/// Takes the next character from the slice. If none is found, the slice is left as-is.
pub const fn take_1(bytes: &[u8]) -> (Option<u8>, &[u8]) {
    let [b, bytes @ ..] = bytes else {
        return (None, bytes);
    };

    (Some(*b), bytes)
}

/// Like `take_1`, but doesn't consume the token
pub fn peek_1(bytes: &[u8]) -> Option<u8> {
    bytes.first().copied()
}

/// Expects the next character in `bytes` to be `b`.
pub fn expect(b: u8, bytes: &[u8]) -> ParseResult<&[u8]> {
    let (Some(a), bytes) = take_1(bytes) else {
        return Err(ParseError::UnexpectedEof { exp: b as char });
    };

    if a != b {
        return Err(ParseError::UnexpectedToken {
            exp: b as char,
            got: a as char,
        });
    }

    Ok(bytes)
}

/// Expects `bytes` to start with `bs`, ignoring ascii case.
pub fn expect_slice<'a>(bs: &[u8], bytes: &'a [u8]) -> ParseResult<&'a [u8]> {
    match bytes.split_at_checked(bs.len()) {
        Some((head, rest)) if head.eq_ignore_ascii_case(bs) => Ok(rest),
        _ => {
            let n = bs.len().min(bytes.len());

            Err(ParseError::UnexpectedSlice {
                exp: String::from_utf8_lossy(bs).to_string(),
                got: String::from_utf8_lossy(&bytes[..n]).to_string(),
            })
        }
    }
}

/// Splits `bytes` at the first byte not satisfying `p`. The head may be empty.
#[inline]
pub fn take_while_fn<P>(p: P, bytes: &[u8]) -> (&[u8], &[u8])
where
    P: Fn(u8) -> bool,
{
    let i = bytes.iter().position(|&b| !p(b)).unwrap_or(bytes.len());

    bytes.split_at(i)
}

/// Takes a run of ascii digits, if there is one.
pub fn take_digits(bytes: &[u8]) -> (Option<&[u8]>, &[u8]) {
    match take_while_fn(|b| b.is_ascii_digit(), bytes) {
        ([], bytes) => (None, bytes),
        (digits, bytes) => (Some(digits), bytes),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Failed to convert \"{str}\"")]
pub struct ConvertError {
    pub str: String,
}

/// Converts `&[u8]` to `T` if `T: FromStr`.
pub fn convert<T: FromStr>(bytes: &[u8]) -> Result<T, ConvertError> {
    let err = || ConvertError {
        str: String::from_utf8_lossy(bytes).to_string(),
    };

    let str = std::str::from_utf8(bytes).map_err(|_| err())?;

    str.parse::<T>().map_err(|_| err())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_take_ws_full_ws() {
        let bytes = b"  ";

        let res = super::take_ws(bytes);

        assert_eq!(res, b"")
    }

    #[test]
    fn test_take_digits() {
        let (digits, rest) = super::take_digits(b"12o$");

        assert_eq!(digits, Some(b"12".as_slice()));
        assert_eq!(rest, b"o$");

        let (digits, rest) = super::take_digits(b"o$");

        assert_eq!(digits, None);
        assert_eq!(rest, b"o$");
    }

    #[test]
    fn test_expect_slice_ignores_case() {
        let rest = super::expect_slice(b"rule", b"RULE = B3/S23").unwrap();

        assert_eq!(rest, b" = B3/S23");
        assert!(super::expect_slice(b"rule", b"ru").is_err());
    }

    #[test]
    fn test_convert() {
        assert_eq!(super::convert::<usize>(b"42"), Ok(42));
        assert!(super::convert::<usize>(b"-1").is_err());
    }
}
