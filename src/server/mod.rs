//! server-side event loop
// (c) 2025 Ross Younger

mod listing;
mod send;
mod session;

pub use session::ServerSession;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context as _, Result};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};
use tracing::{Instrument as _, debug, error, info, info_span, warn};

use crate::{
    config::Configuration,
    protocol::{Channel, ChannelOutcome},
};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Runs one client conversation over an arbitrary stream pair, to completion.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    root: PathBuf,
    queue_depth: usize,
) -> ChannelOutcome
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let channel = Channel::new(reader, writer, queue_depth);
    channel.run(ServerSession::new(root)).await
}

/// Runs one client conversation over a TCP connection
pub async fn serve_connection(
    stream: TcpStream,
    root: PathBuf,
    queue_depth: usize,
) -> ChannelOutcome {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay: {e}");
    }
    let (reader, writer) = stream.into_split();
    serve(reader, writer, root, queue_depth).await
}

/// Server event loop: accepts connections until the process is stopped.
pub async fn server_main(config: &Configuration) -> Result<()> {
    let root = tokio::fs::canonicalize(&config.root)
        .await
        .with_context(|| format!("server root {}", config.root.display()))?;
    anyhow::ensure!(
        tokio::fs::metadata(&root).await?.is_dir(),
        "server root {} is not a directory",
        root.display()
    );

    let bind = config.bind_address();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding to {bind}"))?;
    info!(
        "serving {} on {}",
        root.display(),
        listener.local_addr().map_or(bind, |a| a.to_string())
    );

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(t) => t,
            Err(e) => {
                // usually transient (e.g. out of file descriptors)
                warn!("accept failed: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        info!("connection from {peer}");
        let root = root.clone();
        let queue_depth = config.queue_depth;
        let _ = tokio::spawn(
            async move {
                match serve_connection(stream, root, queue_depth).await {
                    ChannelOutcome::Failed(e) => error!("connection failed: {e}"),
                    outcome => debug!("connection ended: {outcome:?}"),
                }
                info!("disconnected");
            }
            .instrument(info_span!("client", %peer)),
        );
    }
}
