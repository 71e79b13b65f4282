//! Client-side handling of everything the server sends
// (c) 2025 Ross Younger

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use human_repr::HumanCount as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::transfer::{TransferError, TransferMap, TransferProgress};
use crate::protocol::{Action, Dispatcher, OpenWrite, Outbox, Packet};

/// Somewhere to put the text the server sends us
pub trait TextSink: Send {
    /// Deliver one message
    fn text(&mut self, message: &str);
}

impl TextSink for mpsc::UnboundedSender<String> {
    fn text(&mut self, message: &str) {
        // the receiver may have gone away; that's fine
        let _ = self.send(message.to_owned());
    }
}

/// The client's view of a connection: routes incoming text to a [`TextSink`] and
/// writes incoming transfers to disk.
#[derive(Debug)]
pub struct ClientSession<T> {
    transfers: TransferMap,
    progress: watch::Sender<Vec<TransferProgress>>,
    sink: T,
}

impl<T: TextSink> ClientSession<T> {
    /// Downloads will be saved into `download_dir`.
    ///
    /// The receiver sees a fresh snapshot of all open transfers whenever one changes.
    pub fn new(download_dir: PathBuf, sink: T) -> (Self, watch::Receiver<Vec<TransferProgress>>) {
        let (progress, rx) = watch::channel(Vec::new());
        let session = Self {
            transfers: TransferMap::new(download_dir),
            progress,
            sink,
        };
        (session, rx)
    }

    fn publish(&self) {
        let _ = self.progress.send_replace(self.transfers.snapshot());
    }

    async fn open(&mut self, id: u16, body: &[u8]) {
        let header = match OpenWrite::decode(body) {
            Ok(h) => h,
            Err(e) => {
                warn!("malformed OPEN_WRITE for transfer {id}: {e}");
                return;
            }
        };
        let (name, size) = (header.filename.clone(), header.final_size);
        match self.transfers.open(id, header).await {
            Ok(_) => info!(
                "Beginning download of {name} ({})",
                u64::from(size).human_count_bytes()
            ),
            Err(e) => warn!("{e}"),
        }
    }

    async fn close(&mut self, id: u16) {
        match self.transfers.close(id).await {
            Ok(done) if done.is_complete() => info!(
                "Download complete: {} ({})",
                done.path.display(),
                u64::from(done.received).human_count_bytes()
            ),
            Ok(done) => warn!(
                "Download of {} incomplete: got {} of {} bytes",
                done.path.display(),
                done.received,
                done.final_size
            ),
            Err(e) => report(&e),
        }
    }
}

/// Problems with a transfer we've already given up on were reported when it happened
fn report(e: &TransferError) {
    if matches!(e, TransferError::Abandoned(_)) {
        debug!("{e}");
    } else {
        warn!("{e}");
    }
}

#[async_trait]
impl<T: TextSink> Dispatcher for ClientSession<T> {
    async fn dispatch(&mut self, packet: Packet, _outbox: &Outbox) -> Result<()> {
        let id = packet.id();
        match packet.action() {
            Some(Action::OpenWrite) => self.open(id, packet.body()).await,
            Some(Action::WriteChunk) => {
                if let Err(e) = self.transfers.append(id, packet.body()).await {
                    report(&e);
                }
            }
            Some(Action::Close) => self.close(id).await,
            Some(Action::PlainText) | None => {
                self.sink.text(&packet.body_text());
                return Ok(());
            }
            Some(other) => {
                // a request we'd normally send; show it rather than drop it
                debug!("server sent {other}");
                self.sink.text(&packet.body_text());
                return Ok(());
            }
        }
        self.publish();
        Ok(())
    }

    async fn finish(&mut self, _outbox: &Outbox) {
        if !self.transfers.is_empty() {
            warn!(
                "server closed the connection with {} transfer(s) outstanding",
                self.transfers.len()
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use tokio::{io::AsyncWriteExt as _, sync::mpsc};

    use super::ClientSession;
    use crate::{
        protocol::{Action, Channel, ChannelOutcome, OpenWrite, Packet},
        util::test_protocol::test_plumbing,
    };

    async fn feed(
        dir: &std::path::Path,
        packets: Vec<Packet>,
    ) -> (Vec<String>, ChannelOutcome, Vec<Vec<super::TransferProgress>>) {
        let (near, far) = test_plumbing();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (session, mut progress) = ClientSession::new(dir.to_path_buf(), tx);
        let channel = Channel::new(near.0, near.1, 8);
        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while progress.changed().await.is_ok() {
                seen.push(progress.borrow_and_update().clone());
            }
            seen
        });
        let task = tokio::spawn(channel.run(session));
        let (_far_reader, mut far_writer) = far;
        for p in &packets {
            far_writer.write_all(&p.to_wire()).await.unwrap();
        }
        far_writer.shutdown().await.unwrap();
        let outcome = task.await.unwrap();
        let mut texts = Vec::new();
        while let Some(t) = rx.recv().await {
            texts.push(t);
        }
        (texts, outcome, watcher.await.unwrap())
    }

    fn open(id: u16, name: &str, size: u32) -> Packet {
        OpenWrite {
            final_size: size,
            filename: name.into(),
        }
        .to_packet(id)
        .unwrap()
    }

    fn chunk(id: u16, data: &'static [u8]) -> Packet {
        Packet::new(Action::WriteChunk, id, Bytes::from_static(data)).unwrap()
    }

    #[tokio::test]
    async fn interleaved_downloads_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let (texts, outcome, _) = feed(
            dir.path(),
            vec![
                open(0, "one", 6),
                Packet::text("hello").unwrap(),
                open(1, "two", 3),
                chunk(0, b"abc"),
                chunk(1, b"xyz"),
                chunk(0, b"def"),
                Packet::empty(Action::Close, 1),
                Packet::empty(Action::Close, 0),
                Packet::with_raw_action(55, 0, Bytes::from_static(b"mystery")).unwrap(),
            ],
        )
        .await;
        assert!(matches!(outcome, ChannelOutcome::PeerClosed));
        assert_eq!(texts, vec!["hello".to_string(), "mystery".to_string()]);
        assert_eq!(std::fs::read(dir.path().join("one")).unwrap(), b"abcdef");
        assert_eq!(std::fs::read(dir.path().join("two")).unwrap(), b"xyz");
    }

    #[tokio::test]
    async fn stray_and_overrunning_chunks_are_survivable() {
        let dir = tempfile::tempdir().unwrap();
        let (texts, outcome, _) = feed(
            dir.path(),
            vec![
                chunk(4, b"nobody wants this"),
                open(2, "small", 2),
                chunk(2, b"too much"),
                Packet::empty(Action::Close, 2),
                Packet::text("still alive").unwrap(),
            ],
        )
        .await;
        assert!(outcome.is_clean());
        assert_eq!(texts, vec!["still alive".to_string()]);
    }

    #[tokio::test]
    async fn refused_download_is_ignored_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let (texts, outcome, snapshots) = feed(
            dir.path(),
            vec![
                open(3, "../outside", 4),
                chunk(3, b"ab"),
                chunk(3, b"cd"),
                Packet::empty(Action::Close, 3),
                Packet::text("done").unwrap(),
            ],
        )
        .await;
        assert!(outcome.is_clean());
        assert_eq!(texts, vec!["done".to_string()]);
        assert!(snapshots.iter().all(Vec::is_empty));
        assert!(!dir.path().parent().unwrap().join("outside").exists());
    }

    #[tokio::test]
    async fn progress_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, snapshots) = feed(
            dir.path(),
            vec![
                open(0, "f", 4),
                chunk(0, b"ab"),
                chunk(0, b"cd"),
                Packet::empty(Action::Close, 0),
            ],
        )
        .await;
        // the watcher may coalesce updates, but it always sees the last one
        assert!(!snapshots.is_empty());
        assert!(snapshots.last().unwrap().is_empty());
        let mut previous = 0;
        for snap in &snapshots[..snapshots.len() - 1] {
            assert_eq!(snap.len(), 1);
            assert!(snap[0].received >= previous);
            assert!(snap[0].received <= 4);
            previous = snap[0].received;
        }
    }
}
