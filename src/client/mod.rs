//! client-side (_initiator_) main loop and supporting structures
// (c) 2025 Ross Younger

mod command;
mod options;
mod progress;
mod session;
mod transfer;

pub use options::Parameters;
pub(crate) use progress::MAX_UPDATE_FPS;
pub use session::{ClientSession, TextSink};
pub use transfer::{CompletedTransfer, TransferError, TransferMap, TransferProgress};

use anyhow::{Context as _, Result};
use indicatif::MultiProgress;
use tokio::{net::TcpStream, sync::mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    config::Configuration,
    protocol::{Channel, ChannelOutcome, Outbox},
};
use command::{HELP, UserCommand};

/// Prints text for the user without disturbing any progress bars
#[derive(Debug, Clone)]
struct Console(MultiProgress);

impl TextSink for Console {
    fn text(&mut self, message: &str) {
        let message = message.trim_end_matches('\n');
        if self.0.is_hidden() || self.0.println(message).is_err() {
            println!("{message}");
        }
    }
}

/// Reads stdin on a thread of its own, one line at a time.
///
/// The thread is never joined; it ends with the process.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("could not read from stdin: {e}");
    }
    rx
}

/// Turns user input into requests until the user quits or input ends,
/// then half-closes the connection.
async fn command_loop(mut lines: mpsc::Receiver<String>, outbox: Outbox, mut console: Console) {
    while let Some(line) = lines.recv().await {
        let cmd = match UserCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                console.text(&e.to_string());
                continue;
            }
        };
        match cmd {
            UserCommand::Quit => break,
            UserCommand::Help => console.text(HELP),
            _ => match cmd.to_packet() {
                Ok(Some(packet)) => {
                    if outbox.enqueue(packet).await.is_err() {
                        return;
                    }
                }
                Ok(None) => (),
                Err(e) => console.text(&e.to_string()),
            },
        }
    }
    debug!("end of input; closing our side");
    let _ = outbox.shutdown().await;
}

/// Main client mode event loop
///
/// Returns whether the connection ended cleanly.
pub async fn client_main(
    config: &Configuration,
    params: &Parameters,
    display: MultiProgress,
) -> Result<bool> {
    let address = params.server_address(config.port)?;
    anyhow::ensure!(
        tokio::fs::metadata(&config.download_dir)
            .await
            .is_ok_and(|m| m.is_dir()),
        "download directory {} does not exist",
        config.download_dir.display()
    );

    let stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("connecting to {address}"))?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay: {e}");
    }
    info!("Connected to {address}");

    let (reader, writer) = stream.into_split();
    let channel = Channel::new(reader, writer, config.queue_depth);
    let console = Console(display.clone());
    let (session, updates) = ClientSession::new(config.download_dir.clone(), console.clone());
    let progress = tokio::spawn(progress::show_progress(updates, display, params.quiet));
    let input = tokio::spawn(command_loop(stdin_lines(), channel.outbox(), console));

    let outcome = channel.run(session).await;
    input.abort();
    let _ = progress.await;

    match outcome {
        ChannelOutcome::PeerClosed => {
            info!("Server closed the connection");
            Ok(true)
        }
        ChannelOutcome::Closed => Ok(true),
        ChannelOutcome::Failed(e) => {
            error!("{e}");
            Ok(false)
        }
    }
}
