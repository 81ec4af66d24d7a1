//! Serial boundary: opening the device port and splitting its byte stream
//! into lines.

use std::io;

use async_stream::stream;
use futures_core::stream::Stream;
use serial2_tokio::SerialPort;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::SerialConfig;
use crate::monitor::MonitorError;
use crate::protocol::RawLine;

/// Open the device port at the configured baud rate.
pub fn open_port(config: &SerialConfig) -> Result<SerialPort, MonitorError> {
    tracing::info!("Opening {} @ {} baud", config.port, config.baud);
    SerialPort::open(&config.port, config.baud).map_err(|source| {
        tracing::error!("Failed to open serial port '{}': {}", config.port, source);
        MonitorError::Serial {
            port: config.port.clone(),
            source,
        }
    })
}

/// Split `reader` into lines terminated by `\n`, terminator included.
///
/// A trailing fragment without a terminator is yielded when the reader
/// reaches EOF. A read error is yielded once and ends the stream.
pub fn line_stream<R>(mut reader: R) -> impl Stream<Item = io::Result<RawLine>>
where
    R: AsyncBufRead + Unpin,
{
    stream! {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    tracing::info!("Serial boundary closed");
                    break;
                }
                Ok(n) => {
                    tracing::trace!("Read {} bytes from serial", n);
                    yield Ok(RawLine::new(std::mem::take(&mut buf)));
                }
                Err(e) => {
                    tracing::error!("Serial read error: {}", e);
                    yield Err(e);
                    break;
                }
            }
        }
    }
}
