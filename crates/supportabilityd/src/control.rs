//! Admin control socket

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Result, SupportabilityError};

/// How long a connected client may take to send its command
pub const COMMAND_READ_TIMEOUT: Duration = Duration::from_secs(1);

const MAX_COMMAND_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Exit,
    Unknown(String),
}

impl ControlCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "exit" => ControlCommand::Exit,
            other => ControlCommand::Unknown(other.to_string()),
        }
    }

    fn reply(&self) -> String {
        match self {
            ControlCommand::Exit => "OK\n".to_string(),
            ControlCommand::Unknown(cmd) => format!("ERROR unknown command '{}'\n", cmd),
        }
    }
}

/// Unix stream socket accepting one command per connection
#[derive(Debug)]
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Binds the socket, replacing a stale socket file left by a previous run
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let socket_error = |source| SupportabilityError::ControlSocket {
            path: path.clone(),
            source,
        };

        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale control socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(socket_error(e)),
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(socket_error)?;
            }
        }

        let listener = UnixListener::bind(&path).map_err(socket_error)?;
        info!("Control socket listening on {}", path.display());

        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Reads one command, replies, and returns the command.
    ///
    /// Returns `None` when the client sent nothing in time or hung up.
    pub async fn serve(stream: UnixStream) -> Option<ControlCommand> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half.take(MAX_COMMAND_LEN as u64));
        let mut line = String::new();

        match timeout(COMMAND_READ_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(Ok(0)) => return None,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("Control socket read failed: {}", e);
                return None;
            }
            Err(_) => {
                warn!("Control socket client timed out");
                return None;
            }
        }

        let command = ControlCommand::parse(&line);
        debug!(command = ?command, "Control command");

        if let Err(e) = write_half.write_all(command.reply().as_bytes()).await {
            warn!("Control socket reply failed: {}", e);
        }
        let _ = write_half.shutdown().await;

        Some(command)
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Sends one command and returns the reply line
pub async fn send_command(path: &Path, command: &str) -> io::Result<String> {
    let mut stream = UnixStream::connect(path).await?;
    stream.write_all(format!("{}\n", command).as_bytes()).await?;

    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply).await?;
    Ok(reply.trim_end().to_string())
}
