//! Interactive shell bridged onto a remote pseudo-terminal.
//!
//! The local terminal is switched into raw mode for the duration of the
//! session and restored on every exit path by a scoped guard. Local input
//! and remote output are multiplexed in a single select loop.

use crossterm::terminal;
use log::debug;
use russh::ChannelMsg;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::NodeLink;
use crate::error::ControlError;

/// Restores the terminal's cooked mode when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self, ControlError> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Opens a login shell on the host and bridges it to the local terminal.
///
/// Returns when the remote shell exits or the channel closes.
pub async fn interactive_shell(link: &NodeLink) -> Result<(), ControlError> {
    let mut channel = link.handle.channel_open_session().await?;
    let (cols, rows) = terminal::size().unwrap_or((80, 24));
    let term = std::env::var("TERM").unwrap_or_else(|_| "xterm".to_string());
    channel
        .request_pty(false, &term, u32::from(cols), u32::from(rows), 0, 0, &[])
        .await?;
    channel.request_shell(false).await?;

    let _raw = RawModeGuard::enable()?;
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut input = [0u8; 1024];
    loop {
        tokio::select! {
            read = stdin.read(&mut input) => {
                match read {
                    Ok(0) => {
                        channel.eof().await?;
                    }
                    Ok(n) => {
                        channel.data(&input[..n]).await?;
                    }
                    Err(err) => {
                        debug!("local stdin closed: {err}");
                        channel.eof().await?;
                    }
                }
            }
            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { ref data }) => {
                        stdout.write_all(data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::ExtendedData { ref data, ext: 1 }) => {
                        stdout.write_all(data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        debug!("remote shell exited with status {exit_status}");
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
