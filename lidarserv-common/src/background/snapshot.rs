use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use libflate::gzip::{Decoder, Encoder};

use super::cell::BackgroundCell;

/// Per-cell record size on the wire: `avg_range_m: f32, spread_m: f32,
/// times_seen: u32, last_update_ns: i64, frozen_until_ns: i64`.
const RECORD_SIZE: usize = 4 + 4 + 4 + 8 + 8;

/// Encodes `cells` (row-major) as a length-prefixed array of fixed-size
/// records, gzip-compressed. This is the `grid_blob` of the `BgSnapshot` wire
/// format; locking state is not persisted (it is reconstructible from the
/// plain statistics and is not load-bearing for restore correctness).
pub fn encode_cells(cells: &[BackgroundCell]) -> std::io::Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(4 + cells.len() * RECORD_SIZE);
    raw.write_u32::<LittleEndian>(cells.len() as u32)?;
    for cell in cells {
        raw.write_f32::<LittleEndian>(cell.avg_range_m as f32)?;
        raw.write_f32::<LittleEndian>(cell.spread_m as f32)?;
        raw.write_u32::<LittleEndian>(cell.times_seen)?;
        raw.write_i64::<LittleEndian>(cell.last_update_ns)?;
        raw.write_i64::<LittleEndian>(cell.frozen_until_ns)?;
    }

    let mut encoder = Encoder::new(Vec::new())?;
    encoder.write_all(&raw)?;
    encoder.finish().into_result()
}

/// Decodes a blob produced by [`encode_cells`] back into a flat cell vector.
/// Returns an error (never panics) on truncated or corrupt input.
pub fn decode_cells(blob: &[u8]) -> std::io::Result<Vec<BackgroundCell>> {
    let mut decoder = Decoder::new(blob)?;
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;

    let mut cursor = std::io::Cursor::new(raw);
    let count = cursor.read_u32::<LittleEndian>()? as usize;
    let mut cells = Vec::with_capacity(count);
    for _ in 0..count {
        let avg_range_m = cursor.read_f32::<LittleEndian>()? as f64;
        let spread_m = cursor.read_f32::<LittleEndian>()? as f64;
        let times_seen = cursor.read_u32::<LittleEndian>()?;
        let last_update_ns = cursor.read_i64::<LittleEndian>()?;
        let frozen_until_ns = cursor.read_i64::<LittleEndian>()?;
        cells.push(BackgroundCell {
            avg_range_m,
            spread_m,
            times_seen,
            last_update_ns,
            frozen_until_ns,
            locked_baseline: None,
            locked_spread: None,
            locked_at_count: None,
            recent_foreground_count: 0,
        });
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let cells = vec![
            BackgroundCell {
                avg_range_m: 10.5,
                spread_m: 0.2,
                times_seen: 42,
                last_update_ns: 123,
                frozen_until_ns: 456,
                ..Default::default()
            },
            BackgroundCell::default(),
        ];
        let blob = encode_cells(&cells).unwrap();
        let decoded = decode_cells(&blob).unwrap();
        assert_eq!(decoded.len(), cells.len());
        assert_eq!(decoded[0].times_seen, 42);
        assert!((decoded[0].avg_range_m - 10.5).abs() < 1e-5);
    }

    #[test]
    fn garbage_blob_errors() {
        assert!(decode_cells(b"not a gzip stream").is_err());
    }
}
