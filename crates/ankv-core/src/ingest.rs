//! Readers for the external little-endian binary file formats: raw vector /
//! id / list-id / centroid arrays, and the `bvecs`/`ivecs` query and
//! groundtruth formats.
//!
//! These are used by [`crate::storage::InvertedListStore::bulk_insert_entries`]
//! and by the router's centroid loader; the command-line driver that
//! discovers which files to pass them is out of scope.

use std::io::{self, Read};
use std::path::Path;

use crate::error::Result;

/// Reads exactly `count` little-endian `f32` values.
///
/// # Errors
///
/// Returns an error if fewer than `count * 4` bytes are available.
pub fn read_f32_chunk<R: Read>(reader: &mut R, count: usize) -> io::Result<Vec<f32>> {
    let mut buf = vec![0u8; count * std::mem::size_of::<f32>()];
    reader.read_exact(&mut buf)?;
    Ok(buf
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Reads exactly `count` little-endian `i64` values.
///
/// # Errors
///
/// Returns an error if fewer than `count * 8` bytes are available.
pub fn read_i64_chunk<R: Read>(reader: &mut R, count: usize) -> io::Result<Vec<i64>> {
    let mut buf = vec![0u8; count * std::mem::size_of::<i64>()];
    reader.read_exact(&mut buf)?;
    Ok(buf
        .chunks_exact(8)
        .map(|c| i64::from_le_bytes(c.try_into().expect("chunks_exact(8) yields 8 bytes")))
        .collect())
}

/// Reads an entire centroid file: `n_lists * dim` row-major `f32`s.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is shorter than
/// expected.
pub fn read_centroids(path: &Path, n_lists: usize, dim: usize) -> Result<Vec<f32>> {
    let mut file = std::fs::File::open(path)?;
    Ok(read_f32_chunk(&mut file, n_lists * dim)?)
}

/// Reads one query vector from a `bvecs`-format stream: a 4-byte
/// little-endian dimension header followed by that many unsigned bytes,
/// each converted to `f32`.
///
/// Returns `Ok(None)` at a clean end-of-stream (no bytes read for the
/// header).
///
/// # Errors
///
/// Returns an error if a header is read but the body is short.
pub fn read_bvecs_query<R: Read>(reader: &mut R) -> io::Result<Option<Vec<f32>>> {
    let mut dim_buf = [0u8; 4];
    match reader.read_exact(&mut dim_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let dim = u32::from_le_bytes(dim_buf) as usize;
    let mut body = vec![0u8; dim];
    reader.read_exact(&mut body)?;
    Ok(Some(body.into_iter().map(f32::from).collect()))
}

/// Reads one query's groundtruth ids from an `ivecs`-format stream: a
/// 4-byte little-endian `i32` count followed by that many `i32` vector ids.
///
/// Returns `Ok(None)` at a clean end-of-stream.
///
/// # Errors
///
/// Returns an error if a count is read but the body is short.
pub fn read_ivecs_groundtruth<R: Read>(reader: &mut R) -> io::Result<Option<Vec<i64>>> {
    let mut count_buf = [0u8; 4];
    match reader.read_exact(&mut count_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let count = i32::from_le_bytes(count_buf) as usize;
    let mut body = vec![0u8; count * 4];
    reader.read_exact(&mut body)?;
    Ok(Some(
        body.chunks_exact(4)
            .map(|c| i64::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_f32_chunk_little_endian() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1.5f32.to_le_bytes());
        buf.extend_from_slice(&(-2.5f32).to_le_bytes());
        let mut cursor = Cursor::new(buf);
        let values = read_f32_chunk(&mut cursor, 2).unwrap();
        assert_eq!(values, vec![1.5, -2.5]);
    }

    #[test]
    fn reads_i64_chunk_little_endian() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&42i64.to_le_bytes());
        buf.extend_from_slice(&(-7i64).to_le_bytes());
        let mut cursor = Cursor::new(buf);
        let values = read_i64_chunk(&mut cursor, 2).unwrap();
        assert_eq!(values, vec![42, -7]);
    }

    #[test]
    fn f32_chunk_errors_on_short_read() {
        let mut cursor = Cursor::new(vec![0u8; 3]);
        assert!(read_f32_chunk(&mut cursor, 1).is_err());
    }

    #[test]
    fn bvecs_reads_header_and_body_then_eof() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&[10u8, 20, 30, 40]);
        let mut cursor = Cursor::new(buf);

        let v = read_bvecs_query(&mut cursor).unwrap().unwrap();
        assert_eq!(v, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(read_bvecs_query(&mut cursor).unwrap(), None);
    }

    #[test]
    fn ivecs_reads_count_and_ids_then_eof() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3i32.to_le_bytes());
        buf.extend_from_slice(&7i32.to_le_bytes());
        buf.extend_from_slice(&8i32.to_le_bytes());
        buf.extend_from_slice(&9i32.to_le_bytes());
        let mut cursor = Cursor::new(buf);

        let ids = read_ivecs_groundtruth(&mut cursor).unwrap().unwrap();
        assert_eq!(ids, vec![7, 8, 9]);
        assert_eq!(read_ivecs_groundtruth(&mut cursor).unwrap(), None);
    }
}
