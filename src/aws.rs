use async_trait::async_trait;
use aws_config::{Region, SdkConfig};
use aws_sdk_cloudwatchlogs::config::Credentials;
use aws_sdk_cloudwatchlogs::error::SdkError;
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use aws_sdk_cloudwatchlogs::Client;
use log::{debug, info};

use crate::errors::{Disposition, DockwatchError};
use crate::models::{Destination, LogEvent};

lazy_static! {
    static ref AWS_REGIONS: Vec<&'static str> = vec![
        "us-east-1", "us-east-2", "us-west-1", "us-west-2",
        "af-south-1", "ap-east-1", "ap-south-1", "ap-south-2",
        "ap-southeast-1", "ap-southeast-2", "ap-southeast-3",
        "ap-northeast-1", "ap-northeast-2", "ap-northeast-3",
        "ca-central-1", "eu-central-1", "eu-central-2",
        "eu-west-1", "eu-west-2", "eu-west-3", "eu-south-1",
        "eu-south-2", "eu-north-1", "me-central-1", "me-south-1",
        "sa-east-1",
    ];
}

pub fn find_region(input: &str) -> Option<&'static str> {
    AWS_REGIONS.iter().find(|&&region| region == input).copied()
}

/// Build an SDK config from the explicit credentials and region supplied on
/// the command line. Nothing is read from profiles or instance metadata.
pub async fn build_config(dest: &Destination) -> SdkConfig {
    let credentials = Credentials::new(
        dest.access_key_id.clone(),
        dest.secret_access_key.clone(),
        None,
        None,
        "dockwatch-cli",
    );

    aws_config::from_env()
        .region(Region::new(dest.region.clone()))
        .credentials_provider(credentials)
        .load()
        .await
}

/// Anything the forwarding loop can push log events into.
#[async_trait]
pub trait EventSink {
    async fn send(&self, event: LogEvent) -> Result<(), DockwatchError>;
}

pub struct CloudWatchSink {
    client: Client,
    dest: Destination,
}

impl CloudWatchSink {
    pub fn new(client: Client, dest: Destination) -> Self {
        Self { client, dest }
    }

    /// Idempotently create the log group, then the log stream. "Already
    /// exists" carries the `Ignore` disposition and is swallowed here; every
    /// other failure propagates and ends the run before a container starts.
    pub async fn ensure_destination(&self) -> Result<(), DockwatchError> {
        if let Err(err) = self.create_group().await {
            match err.disposition() {
                Disposition::Ignore => debug!("{}", err),
                Disposition::Fatal => return Err(err),
            }
        }

        if let Err(err) = self.create_stream().await {
            match err.disposition() {
                Disposition::Ignore => debug!("{}", err),
                Disposition::Fatal => return Err(err),
            }
        }

        info!(
            "log destination {}/{} is ready",
            self.dest.group_name, self.dest.stream_name
        );
        Ok(())
    }

    async fn create_group(&self) -> Result<(), DockwatchError> {
        match self
            .client
            .create_log_group()
            .log_group_name(&self.dest.group_name)
            .send()
            .await
        {
            Ok(_) => {
                info!("created log group '{}'", self.dest.group_name);
                Ok(())
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_already_exists_exception())
                {
                    return Err(DockwatchError::ResourceConflict(format!(
                        "log group '{}' already exists",
                        self.dest.group_name
                    )));
                }
                if is_connectivity(&err) {
                    return Err(self.connectivity_error());
                }
                debug!("create_log_group failed: {:?}", err);
                Err(DockwatchError::Rejected(
                    "failed to create log group: please check your AWS permissions and parameters"
                        .to_string(),
                ))
            }
        }
    }

    async fn create_stream(&self) -> Result<(), DockwatchError> {
        match self
            .client
            .create_log_stream()
            .log_group_name(&self.dest.group_name)
            .log_stream_name(&self.dest.stream_name)
            .send()
            .await
        {
            Ok(_) => {
                info!("created log stream '{}'", self.dest.stream_name);
                Ok(())
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_already_exists_exception())
                {
                    return Err(DockwatchError::ResourceConflict(format!(
                        "log stream '{}' already exists",
                        self.dest.stream_name
                    )));
                }
                if is_connectivity(&err) {
                    return Err(self.connectivity_error());
                }
                debug!("create_log_stream failed: {:?}", err);
                Err(DockwatchError::Rejected(
                    "failed to create log stream: please check your AWS permissions and parameters"
                        .to_string(),
                ))
            }
        }
    }

    /// The endpoint could not be reached at all, which means one of the
    /// supplied identity inputs is wrong. The secret is named as a suspect
    /// but its value is never printed.
    fn connectivity_error(&self) -> DockwatchError {
        DockwatchError::Configuration(format!(
            "could not connect to the CloudWatch endpoint: one of the region '{}', \
             the access key id '{}', or the secret access key is incorrect or unavailable",
            self.dest.region, self.dest.access_key_id
        ))
    }
}

#[async_trait]
impl EventSink for CloudWatchSink {
    async fn send(&self, event: LogEvent) -> Result<(), DockwatchError> {
        if event.message.is_empty() {
            return Err(DockwatchError::EmptyMessage);
        }

        let input = InputLogEvent::builder()
            .timestamp(event.timestamp_millis)
            .message(event.message)
            .build()
            .map_err(|e| DockwatchError::Rejected(format!("invalid log event: {}", e)))?;

        match self
            .client
            .put_log_events()
            .log_group_name(&self.dest.group_name)
            .log_stream_name(&self.dest.stream_name)
            .log_events(input)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                if is_connectivity(&err) {
                    return Err(self.connectivity_error());
                }
                debug!("put_log_events failed: {:?}", err);
                Err(DockwatchError::Rejected(
                    "error sending log data: please check your AWS permissions, log group, and log stream"
                        .to_string(),
                ))
            }
        }
    }
}

fn is_connectivity<E, R>(err: &SdkError<E, R>) -> bool {
    matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    )
}
