//! The i32 token stream driving reconstruction.
//!
//! A positive token announces that many literal bytes; a negative token
//! `-(i + 1)` tells the receiver to copy block `i` from its basis file;
//! zero ends the stream and is followed by the whole-file checksum.

use std::io::{self, Read, Write};

use rsync_protocol::{WireRead, WireWrite};

/// One decoded token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Token {
    /// `len` literal bytes follow on the wire.
    Literal(u32),
    /// Copy the given block from the local basis file.
    Block(u32),
    /// End of the token stream.
    End,
}

impl Token {
    /// Reads the next token.
    pub fn read_from<R: Read>(rd: &mut R) -> io::Result<Self> {
        let raw = rd.read_i32()?;
        Ok(match raw.cmp(&0) {
            std::cmp::Ordering::Greater => Self::Literal(raw as u32),
            std::cmp::Ordering::Less => Self::Block(-(raw + 1) as u32),
            std::cmp::Ordering::Equal => Self::End,
        })
    }

    /// Writes this token.
    pub fn write_to<W: Write>(self, wr: &mut W) -> io::Result<()> {
        let raw = match self {
            Self::Literal(len) => len as i32,
            Self::Block(index) => -(index as i32 + 1),
            Self::End => 0,
        };
        wr.write_i32(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn block_reference_mapping() {
        for (raw, token) in [
            (-1, Token::Block(0)),
            (-6, Token::Block(5)),
            (0, Token::End),
            (17, Token::Literal(17)),
        ] {
            let decoded = Token::read_from(&mut Cursor::new(raw_bytes(raw))).unwrap();
            assert_eq!(decoded, token);

            let mut wire = Vec::new();
            token.write_to(&mut wire).unwrap();
            assert_eq!(wire, raw_bytes(raw));
        }
    }

    fn raw_bytes(raw: i32) -> Vec<u8> {
        raw.to_le_bytes().to_vec()
    }
}
