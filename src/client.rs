//! Gauge client: one request/response exchange per channel.
//!
//! The client owns its [`Transport`] by value and talks to exactly one gauge.
//! Polling is strictly sequential and never retries; the first failure of a
//! cycle is returned as-is and no partial result escapes.

use crate::config::GaugeConfig;
use crate::error::AppResult;
use crate::measurement::{Channel, ChannelReadings, Reading};
use crate::protocol::{DeviceAddress, GaugeCodec};
use crate::transport::Transport;
use std::time::Duration;
use tracing::instrument;

/// Polls the three channels of one gauge over a transport.
pub struct GaugeClient<T: Transport> {
    transport: T,
    codec: Box<dyn GaugeCodec>,
    address: DeviceAddress,
    timeout: Duration,
}

impl<T: Transport> GaugeClient<T> {
    /// Client for the gauge described by `config`, using the codec its model selects.
    pub fn new(transport: T, config: &GaugeConfig) -> Self {
        Self::with_codec(transport, config.model.codec(), config.address, config.timeout)
    }

    /// Client with an explicit codec.
    pub fn with_codec(
        transport: T,
        codec: Box<dyn GaugeCodec>,
        address: DeviceAddress,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            codec,
            address,
            timeout,
        }
    }

    /// Read one channel.
    #[instrument(skip(self), fields(address = %self.address, model = %self.codec.model()))]
    pub async fn poll(&mut self, channel: Channel) -> AppResult<Reading> {
        let command = self.codec.encode_command(self.address, channel);
        self.transport.send(&command).await?;

        let frame = self
            .transport
            .receive(self.codec.framing(), self.timeout)
            .await?;
        tracing::debug!(frame = %String::from_utf8_lossy(&frame), "response");

        self.codec.decode_response(self.address, channel, &frame)
    }

    /// Read ionization, channel 1 and channel 2, in that order.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn poll_all(&mut self) -> AppResult<ChannelReadings> {
        let ionization = self.poll(Channel::Ionization).await?;
        let channel1 = self.poll(Channel::Channel1).await?;
        let channel2 = self.poll(Channel::Channel2).await?;
        Ok(ChannelReadings {
            ionization,
            channel1,
            channel2,
        })
    }

    /// Release the link to the gauge.
    pub async fn close(&mut self) -> AppResult<()> {
        self.transport.close().await
    }

    /// Address this client polls.
    pub fn address(&self) -> DeviceAddress {
        self.address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GaugeError;
    use crate::protocol::{Ascii354Codec, Binary392Codec, GaugeModel};
    use crate::transport::{MockReply, MockTransport};

    fn gauge_config(model: GaugeModel) -> GaugeConfig {
        GaugeConfig {
            port: "/dev/null".into(),
            baudrate: 19200,
            address: DeviceAddress::new(0x01),
            timeout: Duration::from_secs(1),
            min_delay: Duration::from_millis(50),
            model,
        }
    }

    #[tokio::test]
    async fn test_poll_all_with_constant_answer() {
        let mock = MockTransport::always(MockReply::Frame(b"01 1.3E-6".to_vec()));
        let log = mock.log();
        let mut client = GaugeClient::new(mock, &gauge_config(GaugeModel::Series354));

        let readings = client.poll_all().await.unwrap();
        for channel in Channel::ALL {
            assert_eq!(readings.get(channel), Reading::Pressure(1.3e-6));
        }
        assert_eq!(
            log.sent(),
            vec![b"#01RDIG\r".to_vec(), b"#01RDCG1\r".to_vec(), b"#01RDCG2\r".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_missing_payload_is_not_an_error() {
        let mock = MockTransport::new([
            MockReply::Frame(b"*01 5.0E-8".to_vec()),
            MockReply::Frame(b"*01 ".to_vec()),
            MockReply::Frame(b"*01 9.90E+09".to_vec()),
        ]);
        let mut client = GaugeClient::new(mock, &gauge_config(GaugeModel::Series354));

        let readings = client.poll_all().await.unwrap();
        assert_eq!(readings.ionization, Reading::Pressure(5.0e-8));
        assert_eq!(readings.channel1, Reading::Unavailable);
        assert_eq!(readings.channel2, Reading::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_the_cycle() {
        let mock = MockTransport::new([
            MockReply::Frame(b"*01 5.0E-8".to_vec()),
            MockReply::Silence,
            MockReply::Frame(b"*01 5.0E-8".to_vec()),
        ]);
        let log = mock.log();
        let mut client = GaugeClient::new(mock, &gauge_config(GaugeModel::Series354));

        let result = client.poll_all().await;
        assert!(matches!(result, Err(GaugeError::Timeout(_))));
        // Channel 2 is never asked for
        assert_eq!(log.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_and_protocol_failures_propagate() {
        let mut client = GaugeClient::new(
            MockTransport::always(MockReply::Fail("unplugged".into())),
            &gauge_config(GaugeModel::Series354),
        );
        assert!(matches!(
            client.poll(Channel::Ionization).await,
            Err(GaugeError::Transport(_))
        ));

        let mut client = GaugeClient::new(
            MockTransport::always(MockReply::Frame(b"*02 1.0E-6".to_vec())),
            &gauge_config(GaugeModel::Series354),
        );
        assert!(matches!(
            client.poll(Channel::Ionization).await,
            Err(GaugeError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_binary_gauge_round_trip() {
        let codec = Binary392Codec;
        let mock = MockTransport::responding(move |cmd| match codec.decode_command(cmd) {
            Ok((address, channel)) => {
                MockReply::Frame(Binary392Codec::encode_response(address, channel, 0, 4.0e-9))
            }
            Err(e) => MockReply::Fail(e.to_string()),
        });
        let mut client = GaugeClient::new(mock, &gauge_config(GaugeModel::Series392));

        let readings = client.poll_all().await.unwrap();
        assert_eq!(readings.channel2, Reading::Pressure(f64::from(4.0e-9_f32)));
    }

    #[tokio::test]
    async fn test_close_releases_transport() {
        let mock = MockTransport::always(MockReply::Frame(b"*01 1.0E-6".to_vec()));
        let log = mock.log();
        let mut client = GaugeClient::with_codec(
            mock,
            Box::new(Ascii354Codec),
            DeviceAddress::new(0x01),
            Duration::from_secs(1),
        );

        client.close().await.unwrap();
        assert!(log.is_closed());
        assert!(client.poll(Channel::Ionization).await.is_err());
    }
}
