//! Sending a file to the client
// (c) 2025 Ross Younger

use std::path::Path;

use anyhow::Result;
use bytes::Bytes;
use tokio::{fs::File, io::AsyncReadExt as _};
use tracing::{debug, trace, warn};

use crate::protocol::{Action, MAX_BODY, OpenWrite, Outbox, Packet};

/// Sends a file as a transfer with the given id.
///
/// Problems with the file itself are reported to the client as text.
/// If the connection goes away part way through, the transfer is silently abandoned.
pub(crate) async fn send_file(outbox: Outbox, id: u16, path: &Path, requested: &str) {
    if let Err(e) = send_file_inner(&outbox, id, path, requested).await {
        debug!("transfer {id} abandoned: {e}");
    }
}

async fn report(outbox: &Outbox, message: String) -> Result<()> {
    debug!("{}", message.trim_end());
    outbox.enqueue(Packet::text(&message)?).await?;
    Ok(())
}

/// Opens the file and checks it is something we can send
async fn prepare(path: &Path, requested: &str) -> std::result::Result<(File, OpenWrite), String> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(format!("get Error: File not found '{requested}'\n"));
        }
        Err(e) => return Err(format!("get Error: cannot open '{requested}': {e}\n")),
    };
    if meta.is_dir() {
        return Err(format!("get Error: '{requested}' is a directory\n"));
    }
    let Ok(final_size) = u32::try_from(meta.len()) else {
        return Err(format!("get Error: '{requested}' is too large\n"));
    };
    let Some(filename) = path.file_name() else {
        return Err(format!("get Error: File not found '{requested}'\n"));
    };
    let file = File::open(path)
        .await
        .map_err(|e| format!("get Error: cannot open '{requested}': {e}\n"))?;
    Ok((
        file,
        OpenWrite {
            final_size,
            filename: filename.to_string_lossy().into_owned(),
        },
    ))
}

/// Reads until `buf` is full or the file ends
async fn fill_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn send_file_inner(outbox: &Outbox, id: u16, path: &Path, requested: &str) -> Result<()> {
    let (mut file, header) = match prepare(path, requested).await {
        Ok(t) => t,
        Err(message) => return report(outbox, message).await,
    };
    let open = match header.to_packet(id) {
        Ok(p) => p,
        Err(e) => return report(outbox, format!("get Error: '{requested}': {e}\n")).await,
    };
    debug!(
        "sending {} ({} bytes) as transfer {id}",
        path.display(),
        header.final_size
    );
    outbox.enqueue(open).await?;

    let mut chunk = vec![0u8; MAX_BODY];
    let mut remaining = u64::from(header.final_size);
    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(MAX_BODY, |r| r.min(MAX_BODY));
        let n = match fill_chunk(&mut file, &mut chunk[..want]).await {
            Ok(0) => {
                warn!("{} shrank while sending; transfer {id} will be short", path.display());
                break;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("reading {}: {e}", path.display());
                report(outbox, format!("get Error: reading '{requested}' failed: {e}\n")).await?;
                break;
            }
        };
        trace!("transfer {id}: chunk of {n}");
        outbox
            .enqueue(Packet::new(
                Action::WriteChunk,
                id,
                Bytes::copy_from_slice(&chunk[..n]),
            )?)
            .await?;
        remaining -= n as u64;
    }

    outbox.enqueue(Packet::empty(Action::Close, id)).await?;
    debug!("transfer {id} complete");
    Ok(())
}
