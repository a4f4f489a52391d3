//! Text scanning with the `Scanner` type.

use std::str;

type Result<T> = std::result::Result<T, Error>;

/// A line and column pair inside the scanned input.
#[derive(Debug, Clone, Copy)]
pub struct Position {
    /// Current line.
    line: usize,
    /// Current column.
    col: usize,
}

impl Position {
    /// Returns the current line, starting from 1.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the current column, starting from 1.
    pub fn col(&self) -> usize {
        self.col
    }
}

/// Reads a byte slice while keeping track of line and column.
#[derive(Debug)]
pub struct Scanner<'a> {
    /// The input bytes slice to be read.
    src: &'a [u8],
    /// Current position.
    pos: Position,
    /// Current index.
    idx: usize,
}

impl<'a> Scanner<'a> {
    /// Create a `Scanner` from a byte slice.
    ///
    /// The `line` and `col` will always start from 1.
    pub const fn new(src: &'a [u8]) -> Self {
        Scanner {
            src,
            pos: Position { line: 1, col: 1 },
            idx: 0,
        }
    }

    /// Returns the current position of the scanner.
    pub fn position(&self) -> &Position {
        &self.pos
    }

    /// Returns `true` if all bytes were read.
    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        self.idx >= self.src.len()
    }

    /// Get the next byte without advancing.
    #[inline]
    pub fn peek_byte(&self) -> Option<&u8> {
        self.src.get(self.idx)
    }

    /// Get the next `n` bytes without advancing.
    pub fn peek_bytes(&self, n: usize) -> Option<&'a [u8]> {
        self.src.get(self.idx..self.idx + n)
    }

    /// Peek bytes while the closure returns `true`, without advancing.
    pub fn peek_while<F>(&self, func: F) -> &'a [u8]
    where
        F: Fn(u8) -> bool,
    {
        let rem = &self.src[self.idx..];
        let n = rem.iter().position(|&b| !func(b)).unwrap_or(rem.len());

        &rem[..n]
    }

    /// Read the next byte, advancing the scanner.
    #[inline]
    pub fn next_byte(&mut self) -> Option<u8> {
        self.src.get(self.idx).copied().inspect(|&byte| self.bump(byte))
    }

    /// Advance the scanner by `n` bytes.
    pub fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.next_byte();
        }
    }

    /// Read the next byte if it is equal to `byte`.
    #[inline]
    pub fn advance_if_eq(&mut self, byte: u8) -> Option<u8> {
        self.consume_if(|b| b == byte)
    }

    /// Call the `func` closure for the next byte and read it if
    /// the closure returns `true`.
    ///
    /// # Returns
    ///
    /// The byte read.
    #[inline(always)]
    pub fn consume_if<F>(&mut self, func: F) -> Option<u8>
    where
        F: FnOnce(u8) -> bool,
    {
        match self.peek_byte() {
            Some(&matched) if func(matched) => {
                self.bump(matched);
                Some(matched)
            }
            _ => None,
        }
    }

    /// `read_while()` will call the `func` closure for
    /// each element in the slice and advance
    /// while the closure returns `true`.
    ///
    /// # Returns
    ///
    /// A slice of bytes from the starting position to the position
    /// where the closure `func` returns `false` or the end of the slice
    /// is reached.
    #[inline(always)]
    pub fn read_while<F>(&mut self, func: F) -> &'a [u8]
    where
        F: Fn(u8) -> bool,
    {
        let start = self.idx;
        let src = self.src;
        let len = src.len();

        while self.idx < len && func(src[self.idx]) {
            self.bump(src[self.idx]);
        }

        &src[start..self.idx]
    }

    /// Same as [`Scanner::read_while`] but returns the bytes as a
    /// string slice.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `func` only accepts valid UTF-8
    /// byte sequences.
    #[inline]
    pub unsafe fn read_while_as_str_unchecked<F>(&mut self, func: F) -> &'a str
    where
        F: Fn(u8) -> bool,
    {
        let bytes = self.read_while(func);

        // SAFETY: guaranteed by the caller.
        unsafe { str::from_utf8_unchecked(bytes) }
    }

    /// Read until `byte` is found or the end of the slice is reached.
    ///
    /// The terminating byte is not consumed.
    pub fn read_until(&mut self, byte: u8) -> &'a [u8] {
        self.read_while(|b| b != byte)
    }

    /// Read the content between two `delim` bytes.
    ///
    /// The scanner must sit on the opening delimiter. Bytes escaped
    /// with a backslash are skipped, so an escaped delimiter does not
    /// terminate the read. Returns `None` if the closing delimiter is
    /// missing.
    pub fn read_between(&mut self, delim: u8) -> Option<&'a [u8]> {
        self.advance_if_eq(delim)?;
        let start = self.idx;

        loop {
            match self.src.get(self.idx).copied() {
                None => return None,
                Some(b'\\') => {
                    self.bump(b'\\');
                    if let Some(&escaped) = self.src.get(self.idx) {
                        self.bump(escaped);
                    }
                }
                Some(b) if b == delim => {
                    let content = &self.src[start..self.idx];
                    self.bump(b);
                    return Some(content);
                }
                Some(b) => self.bump(b),
            }
        }
    }

    /// Read the next byte if it equals `byte`.
    ///
    /// # Errors
    ///
    /// This method will return an error if the byte is not
    /// equal to `byte` or the slice reached the end.
    pub fn must_read(&mut self, byte: u8) -> Result<()> {
        let Some(&next) = self.peek_byte() else {
            return self.error(ErrorKind::Eof);
        };
        if byte != next {
            return self.error(ErrorKind::Char {
                expected: byte,
                found: next,
            });
        }
        self.next_byte();

        Ok(())
    }

    /// Read the given bytes, erroring out if the input does not
    /// start with them.
    pub fn must_read_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.starts_with(bytes) {
            return self.error(ErrorKind::Tag);
        }
        self.advance_by(bytes.len());

        Ok(())
    }

    /// Checks whether the remaining input starts with `pat`.
    #[inline]
    pub fn starts_with(&self, pat: &[u8]) -> bool {
        self.src.get(self.idx..).is_some_and(|rem| rem.starts_with(pat))
    }

    /// Read a `u32` number from the slice.
    ///
    /// This method reads until an invalid digit is found.
    pub fn read_u32(&mut self) -> Result<u32> {
        let digits = self.read_while(|b| b.is_ascii_digit());
        // SAFETY: ascii digits are valid UTF-8.
        let digits = unsafe { str::from_utf8_unchecked(digits) };

        match digits.parse() {
            Ok(num) => Ok(num),
            Err(_) => self.error(ErrorKind::Num),
        }
    }

    /// Read a `u16` number from the slice.
    ///
    /// This method reads until an invalid digit is found.
    pub fn read_u16(&mut self) -> Result<u16> {
        let digits = self.read_while(|b| b.is_ascii_digit());
        // SAFETY: ascii digits are valid UTF-8.
        let digits = unsafe { str::from_utf8_unchecked(digits) };

        match digits.parse() {
            Ok(num) => Ok(num),
            Err(_) => self.error(ErrorKind::Num),
        }
    }

    /// Get the remaining bytes in the scanner.
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        &self.src[self.idx..]
    }

    #[inline(always)]
    fn bump(&mut self, byte: u8) {
        if byte == b'\n' {
            self.pos.col = 1;
            self.pos.line += 1;
        } else {
            self.pos.col += 1;
        }
        self.idx += 1;
    }

    fn error<T>(&self, kind: ErrorKind) -> Result<T> {
        Err(Error {
            kind,
            line: self.pos.line,
            col: self.pos.col,
        })
    }
}

/// The kinds of errors that can occur while scanning.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ErrorKind {
    /// End of input reached.
    Eof,
    /// An unexpected byte was found.
    Char {
        /// The byte that was expected.
        expected: u8,
        /// The byte that was found.
        found: u8,
    },
    /// An invalid number was found.
    Num,
    /// The input did not match the expected byte sequence.
    Tag,
}

/// Errors that can occur while reading the src.
#[derive(Debug, PartialEq)]
pub struct Error {
    /// The kind of error.
    pub kind: ErrorKind,
    /// The line where the error occurred.
    pub line: usize,
    /// The column where the error occurred.
    pub col: usize,
}
