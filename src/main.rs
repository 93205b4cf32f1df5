#[macro_use]
extern crate lazy_static;

mod aws;
mod config;
mod docker;
mod errors;
mod models;
mod utilities;

use std::time::SystemTime;

use aws::{CloudWatchSink, EventSink};
use aws_sdk_cloudwatchlogs::Client;
use clap::Parser;
use config::AppConfig;
use docker::LogLines;
use errors::{Disposition, DockwatchError};
use log::{error, info};
use models::LogEvent;

pub fn setup_logger() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339_seconds(SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = setup_logger() {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let app_config = AppConfig::parse();
    if let Err(err) = run(&app_config).await {
        error!("{}", err);
        std::process::exit(1);
    }
}

/// Strictly ordered startup: resolve the destination, make sure it exists,
/// then start the container, then forward. No log line is ever produced
/// with nowhere to go.
async fn run(app_config: &AppConfig) -> Result<(), DockwatchError> {
    let destination = app_config.destination()?;
    let spec = app_config.container_spec();
    info!(
        "forwarding output of '{}' to {}/{} in {}",
        spec.image, destination.group_name, destination.stream_name, destination.region
    );

    let sdk_config = aws::build_config(&destination).await;
    let sink = CloudWatchSink::new(Client::new(&sdk_config), destination);
    sink.ensure_destination().await?;

    let docker = docker::connect().await?;
    let container_id = docker::run_container(&docker, &spec).await?;

    let result = forward_logs(&sink, docker::log_lines(&docker, &container_id)).await;

    // Reap the container on every exit path, success or not.
    docker::remove_container(&docker, &container_id).await;
    result
}

/// One event per line, synchronously and in order: each send completes
/// before the next line is read, so backend backpressure directly throttles
/// how fast the container's output is drained.
async fn forward_logs<S: EventSink>(
    sink: &S,
    mut lines: LogLines,
) -> Result<(), DockwatchError> {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handling available; keep forwarding until the
            // stream ends.
            futures_util::future::pending::<()>().await;
        }
    };
    tokio::pin!(ctrl_c);

    let mut forwarded = 0u64;
    loop {
        let next = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut ctrl_c => {
                info!(
                    "interrupt received, stopping after {} forwarded event(s)",
                    forwarded
                );
                return Ok(());
            }
        };

        match next {
            Some(Ok(message)) => {
                let event = LogEvent {
                    timestamp_millis: utilities::now_millis(),
                    message,
                };
                if let Err(err) = sink.send(event).await {
                    match err.disposition() {
                        Disposition::Ignore => continue,
                        Disposition::Fatal => return Err(err),
                    }
                }
                forwarded += 1;
            }
            Some(Err(err)) => match err.disposition() {
                Disposition::Ignore => continue,
                Disposition::Fatal => return Err(err),
            },
            None => {
                info!("container output ended, forwarded {} event(s)", forwarded);
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;
    use std::sync::Mutex;

    /// In-memory stand-in for the CloudWatch sink, enforcing the same
    /// non-empty-message contract.
    struct RecordingSink {
        events: Mutex<Vec<LogEvent>>,
        fail_after: Option<usize>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail_after: None,
            }
        }

        fn failing_after(n: usize) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail_after: Some(n),
            }
        }

        fn messages(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.message.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, event: LogEvent) -> Result<(), DockwatchError> {
            if event.message.is_empty() {
                return Err(DockwatchError::EmptyMessage);
            }
            let mut events = self.events.lock().unwrap();
            if self.fail_after.is_some_and(|n| events.len() >= n) {
                return Err(DockwatchError::Rejected("throttled".to_string()));
            }
            events.push(event);
            Ok(())
        }
    }

    fn lines_from(chunks: Vec<Result<Bytes, DockwatchError>>) -> LogLines {
        LogLines::new(stream::iter(chunks))
    }

    #[tokio::test]
    async fn forwards_lines_in_order_with_nondecreasing_timestamps() {
        let sink = RecordingSink::new();
        let lines = lines_from(vec![
            Ok(Bytes::from_static(b"0\n")),
            Ok(Bytes::from_static(b"1\n2\n")),
        ]);

        forward_logs(&sink, lines).await.expect("loop should finish");

        assert_eq!(sink.messages(), vec!["0", "1", "2"]);
        let events = sink.events.lock().unwrap();
        assert!(events
            .windows(2)
            .all(|pair| pair[0].timestamp_millis <= pair[1].timestamp_millis));
    }

    #[tokio::test]
    async fn an_empty_output_line_is_fatal() {
        let sink = RecordingSink::new();
        let lines = lines_from(vec![Ok(Bytes::from_static(b"a\n\nb\n"))]);

        let err = forward_logs(&sink, lines).await.unwrap_err();

        assert!(matches!(err, DockwatchError::EmptyMessage));
        assert_eq!(sink.messages(), vec!["a"]);
    }

    #[tokio::test]
    async fn a_fatal_sink_error_stops_the_loop() {
        let sink = RecordingSink::failing_after(1);
        let lines = lines_from(vec![Ok(Bytes::from_static(b"a\nb\nc\n"))]);

        let err = forward_logs(&sink, lines).await.unwrap_err();

        assert!(matches!(err, DockwatchError::Rejected(_)));
        assert_eq!(sink.messages(), vec!["a"]);
    }

    #[tokio::test]
    async fn a_streaming_error_terminates_without_resuming() {
        let sink = RecordingSink::new();
        let lines = lines_from(vec![
            Ok(Bytes::from_static(b"before\n")),
            Err(DockwatchError::Streaming("connection reset".to_string())),
        ]);

        let err = forward_logs(&sink, lines).await.unwrap_err();

        assert!(matches!(err, DockwatchError::Streaming(_)));
        assert_eq!(sink.messages(), vec!["before"]);
    }
}
