//! Serial transport over any async byte stream.
//!
//! In production the stream is a `tokio_serial::SerialStream` opened 8N1 without
//! flow control; in tests it is one half of `tokio::io::duplex`.

use super::{DynSerial, Framing, SendPacer, SerialPortIO, Transport};
use crate::config::GaugeConfig;
use crate::error::{AppResult, GaugeError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

/// Upper bound on a single command write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport writing command frames to a serial stream and reading framed replies.
pub struct SerialTransport<S = DynSerial> {
    port: BufReader<S>,
    pacer: SendPacer,
    closed: bool,
}

impl<S: SerialPortIO> SerialTransport<S> {
    /// Wrap an already open stream.
    pub fn new(stream: S, min_delay: Duration) -> Self {
        Self {
            port: BufReader::new(stream),
            pacer: SendPacer::new(min_delay),
            closed: false,
        }
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.closed {
            Err(GaugeError::Transport("serial port is closed".into()))
        } else {
            Ok(())
        }
    }

    /// Drop bytes that arrived since the last exchange (late replies, line noise).
    async fn discard_stale_input(&mut self) -> AppResult<()> {
        let buffered = self.port.buffer().len();
        self.port.consume(buffered);

        let mut scratch = [0u8; 64];
        let mut discarded = buffered;
        loop {
            match tokio::time::timeout(Duration::ZERO, self.port.get_mut().read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(GaugeError::Transport(format!("read failed: {e}"))),
            }
        }
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "discarded stale serial input");
        }
        Ok(())
    }

    async fn read_frame(&mut self, framing: Framing) -> AppResult<Vec<u8>> {
        let mut frame = Vec::new();
        match framing {
            Framing::Terminated(terminator) => {
                let n = self
                    .port
                    .read_until(terminator, &mut frame)
                    .await
                    .map_err(|e| GaugeError::Transport(format!("read failed: {e}")))?;
                if n == 0 || frame.last() != Some(&terminator) {
                    return Err(GaugeError::Transport(
                        "serial port closed before a complete response".into(),
                    ));
                }
                frame.pop();
            }
            Framing::FixedLength(len) => {
                frame.resize(len, 0);
                self.port.read_exact(&mut frame).await.map_err(|e| {
                    if e.kind() == ErrorKind::UnexpectedEof {
                        GaugeError::Transport("serial port closed before a complete response".into())
                    } else {
                        GaugeError::Transport(format!("read failed: {e}"))
                    }
                })?;
            }
        }
        Ok(frame)
    }
}

impl SerialTransport<DynSerial> {
    /// Open the configured serial port (8 data bits, no parity, 1 stop bit, no flow control).
    #[cfg(feature = "serial")]
    pub async fn open(config: &GaugeConfig) -> AppResult<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let port_name = config.port.clone();
        let baudrate = config.baudrate;

        // Opening the device node can block, keep it off the runtime threads
        let stream = tokio::task::spawn_blocking(move || {
            tokio_serial::new(&port_name, baudrate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
        })
        .await
        .map_err(|e| GaugeError::Transport(format!("serial open task failed: {e}")))?
        .map_err(|e| {
            GaugeError::Transport(format!(
                "failed to open {} at {} baud: {e} (available ports: {})",
                config.port,
                config.baudrate,
                available_port_names()
            ))
        })?;

        tracing::info!(port = %config.port, baudrate = config.baudrate, "serial port opened");
        Ok(Self::new(Box::new(stream), config.min_delay))
    }

    /// Serial support was not compiled in.
    #[cfg(not(feature = "serial"))]
    pub async fn open(_config: &GaugeConfig) -> AppResult<Self> {
        Err(GaugeError::FeatureNotEnabled("serial".into()))
    }
}

#[cfg(feature = "serial")]
fn available_port_names() -> String {
    match serialport::available_ports() {
        Ok(ports) if !ports.is_empty() => ports
            .into_iter()
            .map(|p| p.port_name)
            .collect::<Vec<_>>()
            .join(", "),
        Ok(_) => "none".to_string(),
        Err(e) => format!("unknown ({e})"),
    }
}

#[async_trait]
impl<S: SerialPortIO> Transport for SerialTransport<S> {
    async fn send(&mut self, frame: &[u8]) -> AppResult<()> {
        self.ensure_open()?;
        self.pacer.wait_turn().await;
        self.discard_stale_input().await?;

        let port = self.port.get_mut();
        let write = async {
            port.write_all(frame).await?;
            port.flush().await
        };
        match tokio::time::timeout(WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(GaugeError::Transport(format!("write failed: {e}"))),
            Err(_) => {
                return Err(GaugeError::Transport(format!(
                    "write did not complete within {WRITE_TIMEOUT:?}"
                )))
            }
        }
        self.pacer.mark_sent();
        tracing::trace!(frame = ?frame, "sent");
        Ok(())
    }

    async fn receive(&mut self, framing: Framing, timeout: Duration) -> AppResult<Vec<u8>> {
        self.ensure_open()?;
        let frame = tokio::time::timeout(timeout, self.read_frame(framing))
            .await
            .map_err(|_| GaugeError::Timeout(timeout))??;
        tracing::trace!(frame = ?frame, "received");
        Ok(frame)
    }

    async fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.port
            .get_mut()
            .shutdown()
            .await
            .map_err(|e| GaugeError::Transport(format!("close failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};
    use tokio::time::Instant;

    const CR: Framing = Framing::Terminated(b'\r');

    fn pair(min_delay: Duration) -> (SerialTransport<DuplexStream>, DuplexStream) {
        let (host, device) = duplex(256);
        (SerialTransport::new(host, min_delay), device)
    }

    #[tokio::test]
    async fn test_send_and_receive_terminated_frame() {
        let (mut transport, mut device) = pair(Duration::ZERO);

        transport.send(b"#01RDIG\r").await.unwrap();
        let mut cmd = [0u8; 8];
        device.read_exact(&mut cmd).await.unwrap();
        assert_eq!(&cmd, b"#01RDIG\r");

        device.write_all(b"*01 1.30E-06\r").await.unwrap();
        let frame = transport.receive(CR, Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame, b"*01 1.30E-06");
    }

    #[tokio::test]
    async fn test_receive_fixed_length_frame() {
        let (mut transport, mut device) = pair(Duration::ZERO);
        device.write_all(&[1, 2, 3, 4, 5, 6]).await.unwrap();

        let frame = transport
            .receive(Framing::FixedLength(4), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame, vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let (mut transport, _device) = pair(Duration::ZERO);
        let result = transport.receive(CR, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(GaugeError::Timeout(t)) if t == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_partial_frame_then_disconnect_is_transport_error() {
        let (mut transport, mut device) = pair(Duration::ZERO);
        device.write_all(b"*01 1.3").await.unwrap();
        drop(device);

        let result = transport.receive(CR, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(GaugeError::Transport(_))));
    }

    #[tokio::test]
    async fn test_stale_input_is_discarded_before_send() {
        let (mut transport, mut device) = pair(Duration::ZERO);
        device.write_all(b"*01 9.99E-01\r").await.unwrap();

        transport.send(b"#01RDCG1\r").await.unwrap();
        let mut cmd = [0u8; 9];
        device.read_exact(&mut cmd).await.unwrap();
        device.write_all(b"*01 7.60E+02\r").await.unwrap();

        let frame = transport.receive(CR, Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame, b"*01 7.60E+02");
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_sends_respect_min_delay() {
        let (mut transport, _device) = pair(Duration::from_millis(50));
        let start = Instant::now();

        transport.send(b"#01RDIG\r").await.unwrap();
        let first = start.elapsed();
        transport.send(b"#01RDCG1\r").await.unwrap();
        let second = start.elapsed();

        assert_eq!(first, Duration::ZERO);
        assert!(second - first >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_use() {
        let (mut transport, _device) = pair(Duration::ZERO);
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(matches!(
            transport.send(b"#01RDIG\r").await,
            Err(GaugeError::Transport(_))
        ));
        assert!(matches!(
            transport.receive(CR, Duration::from_secs(1)).await,
            Err(GaugeError::Transport(_))
        ));
    }
}
