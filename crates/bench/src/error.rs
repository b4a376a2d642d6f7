use std::path::PathBuf;
use thiserror::Error;

/// Which memory a comparison reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Ram,
    Vram,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Ram => write!(f, "RAM"),
            Region::Vram => write!(f, "VRAM"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Could not parse parameter \"{0}\"")]
    ParameterFormat(String),
    #[error("Emulator stopped due to running for too long ({cycles} cycles)")]
    RunawayExecution { cycles: u64 },
    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No program supplied")]
    MissingProgram,
    #[error("Blob of {len} bytes at {offset:04X} does not fit in 64 KiB")]
    BlobOutOfRange { offset: u16, len: usize },
    #[error("{region} comparison reads past the end of memory at {offset:X}")]
    ComparisonOutOfRange { region: Region, offset: usize },
}
