// rust/weights-core/src/emit/format.rs

//! Weight file format.
//!
//! ```text
//! +------------------------------+
//! | outer  (u32 little-endian)   |
//! | middle (u32 little-endian)   |
//! | inner  (u32 little-endian)   |  <- 12-byte shape header
//! +------------------------------+
//! | outer*middle*inner f32 (LE)  |  <- row-major payload
//! +------------------------------+
//! ```
//!
//! There is no magic, version or checksum; readers know the format out of
//! band.

use std::io::{Read, Write};

/// Size of the shape header in bytes.
pub const HEADER_LEN: usize = 3 * 4;

/// Shape header of a weight file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinHeader {
    pub shape: [u32; 3],
}

impl BinHeader {
    /// Builds a header, failing if a dimension does not fit in `u32`.
    pub fn from_shape(shape: [usize; 3]) -> Option<Self> {
        Some(Self {
            shape: [
                u32::try_from(shape[0]).ok()?,
                u32::try_from(shape[1]).ok()?,
                u32::try_from(shape[2]).ok()?,
            ],
        })
    }

    pub fn numel(&self) -> u64 {
        self.shape.iter().map(|&d| u64::from(d)).product()
    }

    /// Number of payload bytes that must follow this header.
    pub fn payload_len(&self) -> u64 {
        self.numel() * 4
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        for (chunk, dim) in out.chunks_exact_mut(4).zip(self.shape) {
            chunk.copy_from_slice(&dim.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        let dim = |i: usize| {
            u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
        };
        Self {
            shape: [dim(0), dim(1), dim(2)],
        }
    }

    pub fn read_from(reader: &mut impl Read) -> std::io::Result<Self> {
        let mut bytes = [0u8; HEADER_LEN];
        reader.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(&bytes))
    }
}

/// Writes header and payload. The caller is responsible for flushing.
pub fn write_tensor(
    writer: &mut impl Write,
    header: &BinHeader,
    data: &[f32],
) -> std::io::Result<()> {
    writer.write_all(&header.to_bytes())?;
    for value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// A weight file decoded back into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct BinTensor {
    pub header: BinHeader,
    pub data: Vec<f32>,
}

impl BinTensor {
    /// Reads a complete weight file. Trailing bytes after the payload are
    /// not consumed.
    pub fn read_from(reader: &mut impl Read) -> std::io::Result<Self> {
        let header = BinHeader::read_from(reader)?;

        let payload_len = usize::try_from(header.payload_len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "payload too large")
        })?;
        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;

        let data = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self { header, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = BinHeader::from_shape([1, 768, 2304]).unwrap();
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &768u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2304u32.to_le_bytes());
        assert_eq!(BinHeader::from_bytes(&bytes), header);
        assert_eq!(header.payload_len(), 768 * 2304 * 4);
    }

    #[test]
    fn test_header_rejects_oversized_dimension() {
        assert!(BinHeader::from_shape([1, 1, usize::MAX]).is_none());
    }

    #[test]
    fn test_write_then_read() {
        let header = BinHeader::from_shape([1, 2, 3]).unwrap();
        let data = vec![0.0, -1.5, 2.25, f32::MIN_POSITIVE, 1e30, -0.0];

        let mut buf = Vec::new();
        write_tensor(&mut buf, &header, &data).unwrap();
        assert_eq!(buf.len(), HEADER_LEN + data.len() * 4);

        let decoded = BinTensor::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded.header, header);
        assert_eq!(
            decoded.data.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            data.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_read_truncated_payload() {
        let header = BinHeader::from_shape([1, 1, 4]).unwrap();
        let mut buf = header.to_bytes().to_vec();
        buf.extend_from_slice(&1.0f32.to_le_bytes());

        let result = BinTensor::read_from(&mut Cursor::new(&buf));
        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
