//! Post-run memory comparisons

use crate::error::{BenchError, Region};
use crate::spec::MemoryBlob;
use serde::Serialize;
use std::fmt;

/// A byte that differs from the expected content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub offset: u16,
    pub expected: u8,
    pub actual: u8,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}: {:02X} {:02X}", self.offset, self.expected, self.actual)
    }
}

/// Compare each blob against `storage`, blob by blob in the order given.
///
/// Indices past the end of `storage` are an error, never wrapped.
pub fn compare_region(
    region: Region,
    storage: &[u8],
    comparisons: &[MemoryBlob],
) -> Result<Vec<Mismatch>, BenchError> {
    let mut mismatches = Vec::new();
    for blob in comparisons {
        for (i, &expected) in blob.data().iter().enumerate() {
            let offset = blob.offset() as usize + i;
            let actual = *storage
                .get(offset)
                .ok_or(BenchError::ComparisonOutOfRange { region, offset })?;
            if actual != expected {
                mismatches.push(Mismatch {
                    offset: offset as u16,
                    expected,
                    actual,
                });
            }
        }
    }
    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_display() {
        let m = Mismatch {
            offset: 0x0010,
            expected: 0xAB,
            actual: 0x0C,
        };
        assert_eq!(m.to_string(), "0010: AB 0C");
    }

    #[test]
    fn test_matching_region_has_no_mismatches() {
        let storage = [1, 2, 3, 4];
        let blobs = vec![MemoryBlob::new(1, vec![2, 3]).unwrap()];
        assert!(compare_region(Region::Ram, &storage, &blobs).unwrap().is_empty());
    }

    #[test]
    fn test_mismatches_in_blob_then_offset_order() {
        let storage = [0u8; 16];
        let blobs = vec![
            MemoryBlob::new(8, vec![0, 5]).unwrap(),
            MemoryBlob::new(2, vec![7, 0, 9]).unwrap(),
        ];
        let found = compare_region(Region::Vram, &storage, &blobs).unwrap();
        let offsets: Vec<u16> = found.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![9, 2, 4]);
        assert_eq!(found[0].expected, 5);
        assert_eq!(found[0].actual, 0);
    }

    #[test]
    fn test_vram_comparison_past_end_fails() {
        let vram = [0u8; 0x4000];
        let blobs = vec![MemoryBlob::new(0x3FFF, vec![0, 0]).unwrap()];
        let err = compare_region(Region::Vram, &vram, &blobs).unwrap_err();
        assert!(matches!(
            err,
            BenchError::ComparisonOutOfRange {
                region: Region::Vram,
                offset: 0x4000
            }
        ));
    }
}
