//! Outbound transport
//!
//! One plain TCP stream per session. Dialing goes through the `Dialer` trait
//! so the pool can be pointed at something other than the public network.

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Opens the stream a session runs on
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to `address:port`, failing with `TimedOut` after `timeout`
    async fn dial(&self, address: &str, port: u16, timeout: Duration) -> io::Result<TcpStream>;
}

/// Dials peers over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
        let target = format!("{}:{}", address, port);
        debug!("Dialing {}", target);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out after {:?}", target, timeout),
                )
            })??;

        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
