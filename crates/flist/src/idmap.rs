//! The user/group name tables trailing the file list.
//!
//! Each table is a sequence of `(i32 id, u8 name-length, name bytes)`
//! records terminated by an i32 zero, which is why id 0 is never listed:
//! root needs no mapping.

use std::io::{self, Read, Write};

use rsync_protocol::{WireRead, WireWrite};

use crate::FlistError;

/// An id → name table, in transmission order.
pub type IdMap = Vec<(u32, Vec<u8>)>;

/// Encodes one id map, skipping id 0 and empty names.
pub fn write_id_map<W: Write>(out: &mut W, map: &IdMap) -> io::Result<()> {
    for (id, name) in map {
        if *id == 0 || name.is_empty() || name.len() > usize::from(u8::MAX) {
            continue;
        }
        out.write_i32(*id as i32)?;
        out.write_u8(name.len() as u8)?;
        out.write_all(name)?;
    }
    out.write_i32(0)
}

/// Decodes one id map.
pub fn read_id_map<R: Read>(rd: &mut R) -> Result<IdMap, FlistError> {
    let mut map = IdMap::new();
    loop {
        let id = rd.read_i32()?;
        if id == 0 {
            return Ok(map);
        }
        let len = rd.read_u8()?;
        if len == 0 {
            return Err(FlistError::BadLength {
                what: "id map name",
                len: 0,
            });
        }
        map.push((id as u32, rd.read_bytes(usize::from(len))?));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn maps_round_trip() {
        let map: IdMap = vec![(1000, b"michael".to_vec()), (1001, b"build".to_vec())];
        let mut wire = Vec::new();
        write_id_map(&mut wire, &map).unwrap();
        let decoded = read_id_map(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn root_is_never_transmitted() {
        let map: IdMap = vec![(0, b"root".to_vec()), (7, b"lp".to_vec())];
        let mut wire = Vec::new();
        write_id_map(&mut wire, &map).unwrap();
        let decoded = read_id_map(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decoded, vec![(7, b"lp".to_vec())]);
    }

    #[test]
    fn empty_map_is_a_single_terminator() {
        let mut wire = Vec::new();
        write_id_map(&mut wire, &IdMap::new()).unwrap();
        assert_eq!(wire, 0i32.to_le_bytes());
    }
}
