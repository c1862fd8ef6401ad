//! Holding-register reads over Modbus TCP.
//!
//! [`RegisterReader`] is the seam between the poller and the device; the
//! poller is tested against a fake implementation.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thermogate_core::registers::RegisterBlock;
use tokio_modbus::client::{tcp, Context, Reader};
use tokio_modbus::Slave;

use crate::error::ReadError;

#[async_trait]
pub trait RegisterReader: Send {
    /// Read `block.count` holding registers starting at `block.start`.
    async fn read(&mut self, block: RegisterBlock) -> Result<Vec<u16>, ReadError>;
}

/// Modbus TCP client with a lazily established connection.
///
/// The connection is opened on the first read and dropped after any
/// failure, so the next read reconnects.
pub struct ModbusTcpReader {
    host: String,
    port: u16,
    unit_id: u8,
    timeout: Duration,
    ctx: Option<Context>,
}

impl ModbusTcpReader {
    pub fn new(host: impl Into<String>, port: u16, unit_id: u8, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
            timeout,
            ctx: None,
        }
    }

    async fn connect(&mut self) -> Result<&mut Context, ReadError> {
        if self.ctx.is_none() {
            let addr = resolve(self.host.clone(), self.port).await?;
            let ctx = tokio::time::timeout(self.timeout, tcp::connect_slave(addr, Slave(self.unit_id)))
                .await
                .map_err(|_| ReadError::Timeout(self.timeout))?
                .map_err(ReadError::Connect)?;
            tracing::info!(%addr, unit_id = self.unit_id, "Connected to Modbus device");
            self.ctx = Some(ctx);
        }
        self.ctx.as_mut().ok_or_else(|| {
            ReadError::Connect(std::io::Error::from(std::io::ErrorKind::NotConnected))
        })
    }

    async fn read_block(&mut self, block: RegisterBlock) -> Result<Vec<u16>, ReadError> {
        let timeout = self.timeout;
        let ctx = self.connect().await?;
        let words = tokio::time::timeout(timeout, ctx.read_holding_registers(block.start, block.count))
            .await
            .map_err(|_| ReadError::Timeout(timeout))?
            .map_err(|e| ReadError::Transport(e.to_string()))?
            .map_err(|code| ReadError::Exception(format!("{code:?}")))?;

        if words.len() != usize::from(block.count) {
            return Err(ReadError::ShortRead {
                expected: usize::from(block.count),
                got: words.len(),
            });
        }
        Ok(words)
    }
}

/// First socket address `host:port` resolves to.
async fn resolve(host: String, port: u16) -> Result<SocketAddr, ReadError> {
    tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(ReadError::Connect)?
        .next()
        .ok_or_else(|| {
            ReadError::Connect(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{host} did not resolve"),
            ))
        })
}

#[async_trait]
impl RegisterReader for ModbusTcpReader {
    async fn read(&mut self, block: RegisterBlock) -> Result<Vec<u16>, ReadError> {
        let result = self.read_block(block).await;
        if result.is_err() && self.ctx.take().is_some() {
            tracing::warn!(host = %self.host, port = self.port, "Dropping Modbus connection after failed read");
        }
        result
    }
}
