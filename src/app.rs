//! Wiring for a real recording run: serial port, client, console, recorder.
use crate::client::GaugeClient;
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::recorder::{Recorder, RunSummary, StopSignal};
use crate::sink::ConsoleSink;
use crate::transport::SerialTransport;

/// Record from the configured gauge until the run completes, fails or is stopped.
///
/// The serial port is opened first; the store is opened by the recorder before
/// the first cycle. Both are released on every exit path.
pub async fn record(config: &AppConfig, stop: StopSignal) -> AppResult<RunSummary> {
    tracing::info!(
        port = %config.gauge.port,
        baudrate = config.gauge.baudrate,
        address = %config.gauge.address,
        model = %config.gauge.model,
        "connecting to gauge"
    );
    let transport = SerialTransport::open(&config.gauge).await?;
    let client = GaugeClient::new(transport, &config.gauge);

    Recorder::new(
        client,
        config.recording.clone(),
        Box::new(ConsoleSink::stdout()),
        stop,
    )
    .run()
    .await
}
