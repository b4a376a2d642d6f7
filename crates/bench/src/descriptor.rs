//! `filename[@hexoffset]` descriptors as accepted on the command line

use crate::error::BenchError;
use std::path::PathBuf;
use std::str::FromStr;

/// A file to load (or compare against) at a 16-bit offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub filename: PathBuf,
    pub offset: u16,
}

impl FromStr for FileDescriptor {
    type Err = BenchError;

    /// `name` or `name@offset`; the name may not contain `@`, the offset is
    /// bare hex (no `0x`) and defaults to 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || BenchError::ParameterFormat(s.to_string());

        let (filename, offset) = match s.split_once('@') {
            Some((name, hex)) => (name, parse_hex_u16(hex).map_err(|_| malformed())?),
            None => (s, 0),
        };
        if filename.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            filename: PathBuf::from(filename),
            offset,
        })
    }
}

/// Parse bare, case-insensitive hex into a 16-bit value
pub fn parse_hex_u16(s: &str) -> Result<u16, BenchError> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BenchError::ParameterFormat(s.to_string()));
    }
    // Leading zeros are fine; the value itself must fit
    let digits = s.trim_start_matches('0');
    if digits.len() > 4 {
        return Err(BenchError::ParameterFormat(s.to_string()));
    }
    u16::from_str_radix(if digits.is_empty() { "0" } else { digits }, 16)
        .map_err(|_| BenchError::ParameterFormat(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_filename_loads_at_zero() {
        let d: FileDescriptor = "program.bin".parse().unwrap();
        assert_eq!(d.filename, PathBuf::from("program.bin"));
        assert_eq!(d.offset, 0);
    }

    #[test]
    fn test_hex_offset_is_case_insensitive() {
        let d: FileDescriptor = "tiles.bin@4000".parse().unwrap();
        assert_eq!(d.offset, 0x4000);
        let d: FileDescriptor = "data.bin@c0De".parse().unwrap();
        assert_eq!(d.offset, 0xC0DE);
    }

    #[test]
    fn test_path_with_directories() {
        let d: FileDescriptor = "out/vram.bin@0".parse().unwrap();
        assert_eq!(d.filename, PathBuf::from("out/vram.bin"));
        assert_eq!(d.offset, 0);
    }

    #[test]
    fn test_malformed_descriptors_are_rejected() {
        for bad in ["", "@100", "file@", "file@0x100", "file@12g", "a@1@2", "file@10000"] {
            let err = bad.parse::<FileDescriptor>().unwrap_err();
            assert!(
                matches!(err, BenchError::ParameterFormat(ref p) if p == bad),
                "{:?} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_parse_hex_u16() {
        assert_eq!(parse_hex_u16("dff0").unwrap(), 0xDFF0);
        assert_eq!(parse_hex_u16("0").unwrap(), 0);
        assert_eq!(parse_hex_u16("0000ffff").unwrap(), 0xFFFF);
        assert!(parse_hex_u16("").is_err());
        assert!(parse_hex_u16("-1").is_err());
        assert!(parse_hex_u16("12345").is_err());
    }
}
