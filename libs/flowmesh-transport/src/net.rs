use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use crate::error::TransportError;

/// Blanket trait over the two concrete stream types so publisher/subscriber
/// code can hold `Box<dyn Stream>` regardless of transport (§4.2 "point-to-point
/// ... and IPC transports").
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);
const CONNECT_MAX_ATTEMPTS: u32 = 25;

pub async fn connect_tcp_retrying(host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let mut last_err = None;
    for _ in 0..CONNECT_MAX_ATTEMPTS {
        match TcpStream::connect((host, port)).await {
            Ok(s) => return Ok(s),
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
    }
    Err(TransportError::Io(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::TimedOut, "connect retries exhausted")
    })))
}

pub async fn connect_unix_retrying(path: &Path) -> Result<UnixStream, TransportError> {
    let mut last_err = None;
    for _ in 0..CONNECT_MAX_ATTEMPTS {
        match UnixStream::connect(path).await {
            Ok(s) => return Ok(s),
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
    }
    Err(TransportError::Io(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::TimedOut, "connect retries exhausted")
    })))
}
