mod client;
pub mod hash;
pub mod progress;

pub use client::{write_atomic, Artifact, ArtifactFetcher, BatchReport, FetchJob, FetchOutcome};
pub use hash::{ContentHash, HashAlgorithm};
pub use progress::{
    ByteCounter, ChannelProgressSink, NoopProgress, ProgressEvent, ProgressPump, ProgressSink,
};
