//! FTP delivery of claimed submissions to the external file store.
//!
//! `suppaftp`'s blocking client runs on tokio's blocking pool. The caller
//! bounds the delivery with its own timeout, and the control socket carries
//! read and write timeouts sized to the same deadline so the blocking task
//! ends once the caller has given up on it.

use std::io::Cursor;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::{debug, warn};

use crate::config::FtpConfig;
use crate::kernel::{BaseRemoteDelivery, DeliveryReceipt};

/// One authenticated FTP control connection.
struct FtpSession {
    stream: FtpStream,
}

impl FtpSession {
    fn connect(config: &FtpConfig, deadline: Instant) -> Result<Self> {
        let addr = resolve(&config.host, config.port)?;
        let socket = TcpStream::connect_timeout(&addr, remaining(deadline)?)
            .with_context(|| format!("failed to connect to {}", addr))?;
        // Armed before the server greeting is read
        arm_socket(&socket, deadline)?;
        let stream = FtpStream::connect_with_stream(socket)
            .with_context(|| format!("no FTP greeting from {}", addr))?;
        let mut session = Self { stream };
        session
            .stream
            .login(config.user.as_str(), config.password.as_str())
            .context("FTP login rejected")?;
        session.arm(deadline)?;
        session
            .stream
            .transfer_type(FileType::Binary)
            .context("failed to switch to binary mode")?;
        if let Some(dir) = &config.remote_dir {
            session.arm(deadline)?;
            session
                .stream
                .cwd(dir.as_str())
                .with_context(|| format!("failed to change into {}", dir))?;
        }
        Ok(session)
    }

    /// Cap the next control-socket read or write at the time left.
    fn arm(&self, deadline: Instant) -> Result<()> {
        arm_socket(self.stream.get_ref(), deadline)
    }

    fn upload(&mut self, name: &str, bytes: &[u8], deadline: Instant) -> Result<u64> {
        self.arm(deadline)?;
        let mut reader = Cursor::new(bytes);
        let written = self
            .stream
            .put_file(name, &mut reader)
            .with_context(|| format!("STOR {} failed", name))?;
        Ok(written)
    }

    fn disconnect(mut self) -> Result<()> {
        self.stream.quit().context("QUIT failed")?;
        Ok(())
    }
}

fn arm_socket(socket: &TcpStream, deadline: Instant) -> Result<()> {
    let left = remaining(deadline)?;
    socket
        .set_read_timeout(Some(left))
        .context("failed to set FTP read timeout")?;
    socket
        .set_write_timeout(Some(left))
        .context("failed to set FTP write timeout")?;
    Ok(())
}

/// Time left before `deadline`, or an error once it has passed.
fn remaining(deadline: Instant) -> Result<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or_else(|| anyhow!("FTP delivery deadline exceeded"))
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}:{}", host, port))?
        .next()
        .ok_or_else(|| anyhow!("{}:{} resolved to no addresses", host, port))
}

/// Remote delivery over plain FTP.
pub struct FtpDelivery {
    config: FtpConfig,
    timeout: Duration,
}

impl FtpDelivery {
    /// `timeout` bounds the whole session: connect, login, STOR and QUIT.
    pub fn new(config: FtpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn deliver_blocking(
        config: &FtpConfig,
        timeout: Duration,
        name: &str,
        bytes: &[u8],
    ) -> Result<DeliveryReceipt> {
        let deadline = Instant::now() + timeout;
        let mut session = FtpSession::connect(config, deadline)?;
        let uploaded = session.upload(name, bytes, deadline);

        // The transfer is confirmed by the STOR reply; a failed QUIT does not undo it
        let disconnected = session.arm(deadline).and_then(|()| session.disconnect());
        if let Err(e) = disconnected {
            warn!(error = %e, remote_name = %name, "FTP disconnect failed");
        }

        let bytes = uploaded?;
        debug!(remote_name = %name, bytes, "FTP upload confirmed");
        Ok(DeliveryReceipt {
            remote_name: name.to_string(),
            bytes,
        })
    }
}

#[async_trait]
impl BaseRemoteDelivery for FtpDelivery {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<DeliveryReceipt> {
        let config = self.config.clone();
        let timeout = self.timeout;
        let name = name.to_string();
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || Self::deliver_blocking(&config, timeout, &name, &bytes))
        .await
        .context("FTP delivery task aborted")?
    }
}
