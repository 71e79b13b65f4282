//! Per-connection server state and request dispatch
// (c) 2025 Ross Younger

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{Instrument as _, debug, debug_span, info, warn};

use super::{listing, send};
use crate::protocol::{Action, Dispatcher, Outbox, Packet};

/// A request from the client, as the server understands it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    OpenRead(String),
    ListDir(String),
    ChangeDir(String),
    PrintDir,
    /// Text, or anything we don't recognise
    Text(String),
    /// A packet only a server should send
    Unexpected(Action),
}

impl Request {
    pub(crate) fn from_packet(packet: &Packet) -> Self {
        let arg = || packet.body_text().trim_end_matches('\0').to_owned();
        match packet.action() {
            Some(Action::OpenRead) => Self::OpenRead(arg()),
            Some(Action::ListDir) => Self::ListDir(arg()),
            Some(Action::ChangeDir) => Self::ChangeDir(arg()),
            Some(Action::PrintDir) => Self::PrintDir,
            Some(a @ (Action::OpenWrite | Action::WriteChunk | Action::Close)) => {
                Self::Unexpected(a)
            }
            Some(Action::PlainText) | None => Self::Text(arg()),
        }
    }
}

/// The server's view of one client connection
#[derive(Debug)]
pub struct ServerSession {
    cwd: PathBuf,
    next_id: u16,
    workers: JoinSet<()>,
}

impl ServerSession {
    /// Creates a session whose working directory starts at `root`
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            cwd: root,
            next_id: 0,
            workers: JoinSet::new(),
        }
    }

    /// The session's current working directory
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn allocate_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Moves the working directory, if the target exists and is a directory.
    /// Returns whether it moved.
    async fn change_dir(&mut self, target: &str) -> bool {
        let candidate = self.cwd.join(target);
        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(p) => p,
            Err(e) => {
                debug!("cd {}: {e}", candidate.display());
                return false;
            }
        };
        match tokio::fs::metadata(&resolved).await {
            Ok(m) if m.is_dir() => {
                self.cwd = resolved;
                true
            }
            _ => {
                debug!("cd {}: not a directory", resolved.display());
                false
            }
        }
    }

    async fn print_dir(&self, outbox: &Outbox) -> Result<()> {
        let message = format!("CWD is now {}", self.cwd.display());
        outbox.enqueue(Packet::text(&message)?).await?;
        Ok(())
    }

    fn reap(&mut self) {
        while let Some(result) = self.workers.try_join_next() {
            if let Err(e) = result {
                warn!("worker failed: {e}");
            }
        }
    }
}

async fn list_worker(outbox: Outbox, path: PathBuf, requested: String) {
    let listing = match tokio::task::spawn_blocking(move || listing::list_directory(&path)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!("listdir {requested}: {e}");
            format!("listdir Error: Directory not found '{requested}'\n")
        }
        Err(e) => {
            warn!("listing task failed: {e}");
            return;
        }
    };
    for packet in Packet::text_packets(&listing) {
        if outbox.enqueue(packet).await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Dispatcher for ServerSession {
    async fn dispatch(&mut self, packet: Packet, outbox: &Outbox) -> Result<()> {
        self.reap();
        match Request::from_packet(&packet) {
            Request::OpenRead(name) => {
                let id = self.allocate_id();
                let path = self.cwd.join(&name);
                info!("get {name} (transfer {id})");
                let outbox = outbox.clone();
                let _ = self.workers.spawn(
                    async move { send::send_file(outbox, id, &path, &name).await }
                        .instrument(debug_span!("get", id)),
                );
            }
            Request::ListDir(name) => {
                let path = self.cwd.join(&name);
                debug!("ls {}", path.display());
                let _ = self
                    .workers
                    .spawn(list_worker(outbox.clone(), path, name).instrument(debug_span!("ls")));
            }
            Request::ChangeDir(name) => {
                if self.change_dir(&name).await {
                    info!("cwd now {}", self.cwd.display());
                }
                self.print_dir(outbox).await?;
            }
            Request::PrintDir => self.print_dir(outbox).await?,
            Request::Text(text) => info!("client says: {}", text.trim_end()),
            Request::Unexpected(action) => warn!("ignoring unexpected {action} from client"),
        }
        Ok(())
    }

    async fn finish(&mut self, _outbox: &Outbox) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                warn!("worker failed: {e}");
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use std::path::PathBuf;

    use assertables::assert_starts_with;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::io::AsyncWriteExt as _;

    use super::{Request, ServerSession};
    use crate::{
        protocol::{Action, Channel, ChannelOutcome, OpenWrite, Packet, read_packet},
        util::test_protocol::test_plumbing,
    };

    fn request(action: Action, body: &'static str) -> Packet {
        Packet::new(action, 0, Bytes::from_static(body.as_bytes())).unwrap()
    }

    #[rstest]
    #[case(request(Action::OpenRead, "a.txt"), Request::OpenRead("a.txt".into()))]
    #[case(request(Action::ListDir, "."), Request::ListDir(".".into()))]
    #[case(request(Action::ChangeDir, "sub\0"), Request::ChangeDir("sub".into()))]
    #[case(request(Action::PrintDir, ""), Request::PrintDir)]
    #[case(request(Action::PlainText, "hi"), Request::Text("hi".into()))]
    #[case(request(Action::WriteChunk, "x"), Request::Unexpected(Action::WriteChunk))]
    #[case(Packet::with_raw_action(77, 0, Bytes::from_static(b"?")).unwrap(), Request::Text("?".into()))]
    fn classify(#[case] packet: Packet, #[case] expected: Request) {
        assert_eq!(Request::from_packet(&packet), expected);
    }

    #[test]
    fn ids_wrap() {
        let mut s = ServerSession::new(PathBuf::from("/"));
        s.next_id = u16::MAX;
        assert_eq!(s.allocate_id(), u16::MAX);
        assert_eq!(s.allocate_id(), 0);
        assert_eq!(s.allocate_id(), 1);
    }

    /// Runs a whole conversation: sends the requests, half-closes, collects every reply.
    async fn converse(root: PathBuf, requests: Vec<Packet>) -> (Vec<Packet>, ChannelOutcome) {
        let (near, mut far) = test_plumbing();
        let channel = Channel::new(near.0, near.1, 8);
        let task = tokio::spawn(channel.run(ServerSession::new(root)));
        for r in &requests {
            far.1.write_all(&r.to_wire()).await.unwrap();
        }
        far.1.shutdown().await.unwrap();
        let mut replies = Vec::new();
        while let Some(p) = read_packet(&mut far.0).await.unwrap() {
            replies.push(p);
        }
        (replies, task.await.unwrap())
    }

    #[tokio::test]
    async fn cd_then_pwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (replies, outcome) = converse(
            root.clone(),
            vec![
                request(Action::ChangeDir, "sub"),
                request(Action::ChangeDir, "does-not-exist"),
                request(Action::ChangeDir, ".."),
                request(Action::PrintDir, ""),
            ],
        )
        .await;
        assert!(outcome.is_clean());
        let texts: Vec<_> = replies.iter().map(|p| p.body_text().into_owned()).collect();
        let sub = root.join("sub");
        assert_eq!(
            texts,
            vec![
                format!("CWD is now {}", sub.display()),
                format!("CWD is now {}", sub.display()),
                format!("CWD is now {}", root.display()),
                format!("CWD is now {}", root.display()),
            ]
        );
    }

    #[tokio::test]
    async fn cd_to_a_file_stays_put() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"x").unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (replies, _) = converse(root.clone(), vec![request(Action::ChangeDir, "f")]).await;
        assert_eq!(
            replies[0].body_text(),
            format!("CWD is now {}", root.display())
        );
    }

    #[tokio::test]
    async fn listing_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), b"12345").unwrap();
        let (replies, _) = converse(
            dir.path().to_path_buf(),
            vec![
                request(Action::ListDir, "."),
                request(Action::ListDir, "missing"),
            ],
        )
        .await;
        assert_eq!(replies.len(), 2);
        // workers run concurrently, so the replies may come in either order
        let mut texts: Vec<_> = replies.iter().map(|p| p.body_text().into_owned()).collect();
        texts.sort();
        assert_eq!(texts[0], "Directory Contents:\n5\tx.txt\n");
        assert_eq!(texts[1], "listdir Error: Directory not found 'missing'\n");
    }

    #[tokio::test]
    async fn gets_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"aaaa").unwrap();
        std::fs::write(dir.path().join("b"), vec![b'b'; 10_000]).unwrap();
        let (replies, outcome) = converse(
            dir.path().to_path_buf(),
            vec![
                request(Action::OpenRead, "a"),
                request(Action::OpenRead, "b"),
                request(Action::OpenRead, "c"),
            ],
        )
        .await;
        assert!(outcome.is_clean());

        let opens: Vec<_> = replies
            .iter()
            .filter(|p| p.action() == Some(Action::OpenWrite))
            .map(|p| (p.id(), OpenWrite::decode(p.body()).unwrap()))
            .collect();
        assert_eq!(opens.len(), 2);
        let id_a = opens.iter().find(|(_, o)| o.filename == "a").unwrap().0;
        let id_b = opens.iter().find(|(_, o)| o.filename == "b").unwrap().0;
        assert_eq!((id_a, id_b), (0, 1));

        // each transfer is in order: open, chunks, close
        for id in [id_a, id_b] {
            let mine: Vec<_> = replies
                .iter()
                .filter(|p| p.id() == id && p.action() != Some(Action::PlainText))
                .collect();
            assert_eq!(mine.first().unwrap().action(), Some(Action::OpenWrite));
            assert_eq!(mine.last().unwrap().action(), Some(Action::Close));
            let total: usize = mine[1..mine.len() - 1].iter().map(|p| p.body().len()).sum();
            assert_eq!(total, if id == id_a { 4 } else { 10_000 });
        }

        let error = replies
            .iter()
            .find(|p| p.action() == Some(Action::PlainText))
            .unwrap();
        assert_starts_with!(error.body_text().as_ref(), "get Error: File not found 'c'");
    }
}
