//! Test helpers for functions dealing with on-wire protocols
// (c) 2025 Ross Younger

use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};

type TestStreamPair = (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>);

const STREAM_BUFFER_SIZE: usize = 16_384;

/// In order to test a streaming function we need a bi-directional stream.
/// Each side of the function under test takes one (reader, writer) pair;
/// whatever one side writes, the other side reads.
pub(crate) fn test_plumbing() -> (TestStreamPair, TestStreamPair) {
    let (a, b) = duplex(STREAM_BUFFER_SIZE);
    (split(a), split(b))
}
