//! SSH dialing and remote command execution for a single node.
//!
//! Direct hosts are dialed straight at their address; tunneled hosts are
//! dialed through a `direct-tcpip` channel opened on their master's
//! transport. Both paths end in the same [`NodeLink`].

use std::sync::Arc;
use std::time::Duration;

use colored::Color;
use log::debug;
use russh::client::{self, Handle};
use russh::keys::PublicKey;
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;

use super::NodeLink;
use crate::config;
use crate::error::ControlError;
use crate::inventory::HostRecord;
use crate::logging::scribe_host;

/// Client-side connection handler.
///
/// Host keys are accepted unconditionally, matching the trust model of a
/// closed fleet where nodes are provisioned by the operator.
#[derive(Debug, Clone, Default)]
pub struct NodeClient;

impl client::Handler for NodeClient {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Output captured from a non-interactive remote command.
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<u32>,
}

fn client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        ..Default::default()
    })
}

/// Dials a host directly and authenticates by password.
pub async fn dial_direct(callsign: &str, record: &HostRecord) -> Result<Handle<NodeClient>, ControlError> {
    let dial = async {
        let mut handle = client::connect(
            client_config(),
            (record.ip.as_str(), record.port),
            NodeClient,
        )
        .await?;
        authenticate(&mut handle, callsign, record).await?;
        Ok::<_, ControlError>(handle)
    };
    match tokio::time::timeout(config::DIRECT_DIAL_TIMEOUT, dial).await {
        Ok(result) => result,
        Err(_) => Err(ControlError::DialTimeout(callsign.to_string())),
    }
}

/// Dials a host through a `direct-tcpip` channel opened on its master.
///
/// The channel targets `(child.ip, child.port)` and declares the master's
/// address as the originator, mirroring what the master itself would open.
pub async fn dial_via_master(
    callsign: &str,
    record: &HostRecord,
    master_handle: &Handle<NodeClient>,
    master_record: &HostRecord,
) -> Result<Handle<NodeClient>, ControlError> {
    let channel = master_handle
        .channel_open_direct_tcpip(
            record.ip.as_str(),
            u32::from(record.port),
            master_record.ip.as_str(),
            u32::from(master_record.port),
        )
        .await?;
    let dial = async {
        let mut handle =
            client::connect_stream(client_config(), channel.into_stream(), NodeClient).await?;
        authenticate(&mut handle, callsign, record).await?;
        Ok::<_, ControlError>(handle)
    };
    match tokio::time::timeout(config::TUNNEL_DIAL_TIMEOUT, dial).await {
        Ok(result) => result,
        Err(_) => Err(ControlError::DialTimeout(callsign.to_string())),
    }
}

async fn authenticate(
    handle: &mut Handle<NodeClient>,
    callsign: &str,
    record: &HostRecord,
) -> Result<(), ControlError> {
    let auth = handle
        .authenticate_password(record.user.clone(), record.password.clone())
        .await?;
    if !auth.success() {
        return Err(ControlError::AuthRejected(callsign.to_string()));
    }
    debug!("{callsign} authenticated as {}", record.user);
    Ok(())
}

/// Opens the SFTP subsystem on an authenticated transport.
pub async fn open_sftp(handle: &Handle<NodeClient>) -> Result<SftpSession, ControlError> {
    let mut channel = handle.channel_open_session().await?;
    channel.request_subsystem(true, "sftp").await?;
    let sftp = SftpSession::new(channel.into_stream()).await?;
    Ok(sftp)
}

impl NodeLink {
    /// Runs a command and collects its stdout, stderr and exit status.
    pub async fn exec_capture(&self, command: &str) -> Result<CommandOutput, ControlError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => {
                    stdout.push_str(&String::from_utf8_lossy(data));
                }
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    stderr.push_str(&String::from_utf8_lossy(data));
                }
                ChannelMsg::ExitStatus { exit_status: status } => {
                    exit_status = Some(status);
                }
                ChannelMsg::Eof | ChannelMsg::Close => {}
                _ => {}
            }
        }
        Ok(CommandOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    /// Runs a command on a pseudo-terminal and mirrors its output to the
    /// operator, stdout in green and stderr in red, each line annotated
    /// with the host callsign. Returns the remote exit status.
    pub async fn exec_streamed(&self, callsign: &str, command: &str) -> Result<Option<u32>, ControlError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel
            .request_pty(false, "xterm", 80, 24, 0, 0, &[])
            .await?;
        channel.exec(true, command).await?;

        let mut out_lines = LineMirror::new(callsign, Color::Green);
        let mut err_lines = LineMirror::new(callsign, Color::Red);
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => {
                    out_lines.push(&String::from_utf8_lossy(data));
                }
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    err_lines.push(&String::from_utf8_lossy(data));
                }
                ChannelMsg::ExitStatus { exit_status: status } => {
                    exit_status = Some(status);
                }
                _ => {}
            }
        }
        out_lines.flush();
        err_lines.flush();
        Ok(exit_status)
    }
}

/// Accumulates streamed chunks and scribes them one whole line at a time.
struct LineMirror {
    callsign: String,
    color: Color,
    buffer: String,
}

impl LineMirror {
    fn new(callsign: &str, color: Color) -> Self {
        Self {
            callsign: callsign.to_string(),
            color,
            buffer: String::new(),
        }
    }

    fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            scribe_host(&self.callsign, line.trim_end_matches(['\r', '\n']), Some(self.color));
        }
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            scribe_host(&self.callsign, line.trim_end_matches(['\r', '\n']), Some(self.color));
        }
    }
}
