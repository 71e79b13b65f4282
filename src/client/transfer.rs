//! Incoming file transfers
// (c) 2025 Ross Younger

use std::{
    collections::{HashMap, HashSet},
    ffi::OsStr,
    fmt::Display,
    path::{Path, PathBuf},
};

use human_repr::HumanCount as _;
use tokio::{fs::File, io::AsyncWriteExt as _};
use tracing::{debug, warn};

use crate::protocol::OpenWrite;

/// Things that can go wrong with an incoming transfer
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Data or a close arrived for an id with no open transfer
    #[error("no transfer is open with id {0}")]
    Unknown(u16),
    /// Data or a close arrived for a transfer that was already refused or abandoned
    #[error("transfer {0} was abandoned; ignoring")]
    Abandoned(u16),
    /// More data arrived than the transfer declared
    #[error("transfer {id} overran its declared size of {final_size} bytes; abandoned")]
    Overrun {
        /// Transfer id
        id: u16,
        /// Declared size
        final_size: u32,
    },
    /// The server proposed a filename that isn't a plain file name
    #[error("refusing to save to '{0}': not a plain file name")]
    BadFilename(String),
    /// Local file I/O failed
    #[error("transfer {id}: {source}")]
    Io {
        /// Transfer id
        id: u16,
        /// The underlying problem
        #[source]
        source: std::io::Error,
    },
}

/// A point-in-time view of one transfer's progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Transfer id
    pub id: u16,
    /// Name the file is being saved under
    pub filename: String,
    /// Bytes received so far
    pub received: u32,
    /// Bytes expected in total
    pub final_size: u32,
}

impl TransferProgress {
    /// Percentage complete. An empty file counts as complete.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.final_size == 0 {
            100.0
        } else {
            f64::from(self.received) * 100.0 / f64::from(self.final_size)
        }
    }
}

impl Display for TransferProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}/{} ({:.0}%)",
            self.filename,
            u64::from(self.received).human_count_bytes(),
            u64::from(self.final_size).human_count_bytes(),
            self.percent()
        )
    }
}

/// An incoming file, open for writing
#[derive(Debug)]
struct Transfer {
    id: u16,
    path: PathBuf,
    filename: String,
    final_size: u32,
    received: u32,
    file: File,
}

impl Transfer {
    fn progress(&self) -> TransferProgress {
        TransferProgress {
            id: self.id,
            filename: self.filename.clone(),
            received: self.received,
            final_size: self.final_size,
        }
    }
}

/// Outcome of a transfer that was closed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransfer {
    /// Where the file was written
    pub path: PathBuf,
    /// Bytes actually received
    pub received: u32,
    /// Bytes the server said it would send
    pub final_size: u32,
}

impl CompletedTransfer {
    /// Did we get every byte we were promised?
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received == self.final_size
    }
}

/// All of a connection's open transfers, keyed by id.
///
/// Each transfer owns its output file; removing a transfer from the map releases the file.
/// Ids of refused or abandoned transfers are remembered until their close arrives.
#[derive(Debug)]
pub struct TransferMap {
    dir: PathBuf,
    active: HashMap<u16, Transfer>,
    dead: HashSet<u16>,
}

/// Is this a bare file name, with no directory components?
fn is_plain_filename(name: &str) -> bool {
    Path::new(name).file_name() == Some(OsStr::new(name)) && !name.contains(['/', '\\'])
}

impl TransferMap {
    /// Files will be created in `dir`
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            active: HashMap::new(),
            dead: HashSet::new(),
        }
    }

    /// Starts a transfer: creates (or truncates) the output file.
    ///
    /// If a transfer with the same id is already open, it is abandoned.
    /// If this one is refused, later data for its id is [`TransferError::Abandoned`].
    pub async fn open(
        &mut self,
        id: u16,
        header: OpenWrite,
    ) -> Result<TransferProgress, TransferError> {
        let _ = self.dead.remove(&id);
        if let Some(old) = self.abandon(id) {
            warn!(
                "transfer {id} reopened; abandoning {} after {} bytes",
                old.filename, old.received
            );
        }
        if !is_plain_filename(&header.filename) {
            let _ = self.dead.insert(id);
            return Err(TransferError::BadFilename(header.filename));
        }
        let path = self.dir.join(&header.filename);
        let file = match File::create(&path).await {
            Ok(f) => f,
            Err(source) => {
                let _ = self.dead.insert(id);
                return Err(TransferError::Io { id, source });
            }
        };
        debug!("transfer {id}: writing {}", path.display());
        let transfer = Transfer {
            id,
            path,
            filename: header.filename,
            final_size: header.final_size,
            received: 0,
            file,
        };
        let progress = transfer.progress();
        let _ = self.active.insert(id, transfer);
        Ok(progress)
    }

    /// Appends data to a transfer. Returns the new received count.
    ///
    /// A transfer that would overrun its declared size, or whose file write fails, is abandoned.
    pub async fn append(&mut self, id: u16, data: &[u8]) -> Result<u32, TransferError> {
        if self.dead.contains(&id) {
            return Err(TransferError::Abandoned(id));
        }
        let transfer = self
            .active
            .get_mut(&id)
            .ok_or(TransferError::Unknown(id))?;
        let new_total = u32::try_from(data.len())
            .ok()
            .and_then(|n| transfer.received.checked_add(n))
            .filter(|&total| total <= transfer.final_size);
        let Some(new_total) = new_total else {
            let final_size = transfer.final_size;
            let _ = self.abandon(id);
            let _ = self.dead.insert(id);
            return Err(TransferError::Overrun { id, final_size });
        };
        let written = transfer.file.write_all(data).await;
        if let Err(source) = written {
            let _ = self.abandon(id);
            let _ = self.dead.insert(id);
            return Err(TransferError::Io { id, source });
        }
        transfer.received = new_total;
        Ok(new_total)
    }

    /// Finishes a transfer: flushes and releases its file.
    pub async fn close(&mut self, id: u16) -> Result<CompletedTransfer, TransferError> {
        if self.dead.remove(&id) {
            return Err(TransferError::Abandoned(id));
        }
        let mut transfer = self.active.remove(&id).ok_or(TransferError::Unknown(id))?;
        transfer
            .file
            .flush()
            .await
            .map_err(|source| TransferError::Io { id, source })?;
        Ok(CompletedTransfer {
            path: transfer.path,
            received: transfer.received,
            final_size: transfer.final_size,
        })
    }

    /// Forgets a transfer, releasing its file. Whatever was written stays on disk.
    pub fn abandon(&mut self, id: u16) -> Option<TransferProgress> {
        self.active.remove(&id).as_ref().map(Transfer::progress)
    }

    /// Looks up an open transfer
    #[must_use]
    pub fn progress(&self, id: u16) -> Option<TransferProgress> {
        self.active.get(&id).map(Transfer::progress)
    }

    /// Progress of every open transfer, in id order
    #[must_use]
    pub fn snapshot(&self) -> Vec<TransferProgress> {
        let mut all: Vec<_> = self.active.values().map(Transfer::progress).collect();
        all.sort_by_key(|t| t.id);
        all
    }

    /// Number of open transfers
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Are there no open transfers?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Drop for TransferMap {
    fn drop(&mut self) {
        for t in self.active.values() {
            warn!(
                "abandoning incomplete transfer of {} ({}/{} bytes)",
                t.filename, t.received, t.final_size
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use assertables::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{TransferError, TransferMap, TransferProgress, is_plain_filename};
    use crate::protocol::OpenWrite;

    fn header(name: &str, size: u32) -> OpenWrite {
        OpenWrite {
            final_size: size,
            filename: name.into(),
        }
    }

    #[rstest]
    #[case("a.txt", true)]
    #[case("..hidden", true)]
    #[case("", false)]
    #[case(".", false)]
    #[case("..", false)]
    #[case("../x", false)]
    #[case("/etc/passwd", false)]
    #[case("sub/file", false)]
    #[case("sub\\file", false)]
    fn filenames(#[case] name: &str, #[case] ok: bool) {
        assert_eq!(is_plain_filename(name), ok);
    }

    #[test]
    fn percent() {
        let mut p = TransferProgress {
            id: 1,
            filename: "f".into(),
            received: 250,
            final_size: 1000,
        };
        assert!((p.percent() - 25.0).abs() < f64::EPSILON);
        p.final_size = 0;
        p.received = 0;
        assert!((p.percent() - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn whole_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        let _ = map.open(3, header("out.bin", 6)).await.unwrap();
        assert_eq!(map.append(3, b"abc").await.unwrap(), 3);
        assert_eq!(map.progress(3).unwrap().received, 3);
        assert_eq!(map.append(3, b"def").await.unwrap(), 6);
        let done = map.close(3).await.unwrap();
        assert!(done.is_complete());
        assert!(map.is_empty());
        assert_eq!(std::fs::read(dir.path().join("out.bin")).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn short_close_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        let _ = map.open(1, header("short", 10)).await.unwrap();
        let _ = map.append(1, b"1234").await.unwrap();
        let done = map.close(1).await.unwrap();
        assert!(!done.is_complete());
        assert_eq!(done.received, 4);
    }

    #[tokio::test]
    async fn overrun_abandons() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        let _ = map.open(1, header("f", 4)).await.unwrap();
        let _ = map.append(1, b"123").await.unwrap();
        let err = map.append(1, b"45").await.unwrap_err();
        assert_matches!(err, TransferError::Overrun { id: 1, final_size: 4 });
        assert!(map.is_empty());
        assert_matches!(map.append(1, b"6").await, Err(TransferError::Abandoned(1)));
        assert_matches!(map.close(1).await, Err(TransferError::Abandoned(1)));
        // forgotten once closed
        assert_matches!(map.close(1).await, Err(TransferError::Unknown(1)));
    }

    #[tokio::test]
    async fn refused_transfer_is_remembered_until_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        assert_matches!(
            map.open(5, header("../escape", 3)).await,
            Err(TransferError::BadFilename(_))
        );
        for _ in 0..3 {
            assert_matches!(map.append(5, b"x").await, Err(TransferError::Abandoned(5)));
        }
        assert_matches!(map.close(5).await, Err(TransferError::Abandoned(5)));
        assert_matches!(map.append(5, b"x").await, Err(TransferError::Unknown(5)));

        // a fresh open of the same id starts over
        let _ = map.open(5, header("ok", 1)).await.unwrap();
        assert_eq!(map.append(5, b"x").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn received_never_decreases() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        let _ = map.open(2, header("growing", 1000)).await.unwrap();
        let mut previous = 0;
        for size in [1, 0, 100, 499, 0, 250, 150] {
            let total = map.append(2, &vec![b'z'; size]).await.unwrap();
            assert!(total >= previous, "{total} < {previous}");
            assert!(total <= 1000);
            assert_eq!(map.progress(2).unwrap().received, total);
            previous = total;
        }
        assert_eq!(previous, 1000);
    }

    #[tokio::test]
    async fn five_chunk_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        let _ = map.open(7, header("report.txt", 5000)).await.unwrap();
        let mut totals = Vec::new();
        for _ in 0..5 {
            totals.push(map.append(7, &[b'r'; 1000]).await.unwrap());
        }
        assert_eq!(totals, vec![1000, 2000, 3000, 4000, 5000]);
        let done = map.close(7).await.unwrap();
        assert!(done.is_complete());
        assert_eq!(map.progress(7), None);
        assert!(map.snapshot().is_empty());
        assert_eq!(
            std::fs::read(dir.path().join("report.txt")).unwrap().len(),
            5000
        );
    }

    #[tokio::test]
    async fn unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        assert_matches!(map.append(9, b"x").await, Err(TransferError::Unknown(9)));
        assert_matches!(map.close(9).await, Err(TransferError::Unknown(9)));
    }

    #[tokio::test]
    async fn reopen_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        let _ = map.open(1, header("first", 10)).await.unwrap();
        let _ = map.append(1, b"aaaa").await.unwrap();
        let _ = map.open(1, header("second", 2)).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.progress(1).unwrap().filename, "second");
        assert_eq!(map.progress(1).unwrap().received, 0);
    }

    #[tokio::test]
    async fn refuses_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        assert_matches!(
            map.open(1, header("../escape", 1)).await,
            Err(TransferError::BadFilename(_))
        );
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn existing_file_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"old contents").unwrap();
        let mut map = TransferMap::new(dir.path().to_path_buf());
        let _ = map.open(1, header("f", 3)).await.unwrap();
        let _ = map.append(1, b"new").await.unwrap();
        let _ = map.close(1).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("f")).unwrap(), b"new");
    }
}
