use clap::Parser;

use crate::aws::find_region;
use crate::errors::DockwatchError;
use crate::models::{ContainerSpec, Destination};

#[derive(Parser, Debug)]
#[command(
    name = "dockwatch",
    version,
    about = "Run a Docker container and stream its output to AWS CloudWatch Logs."
)]
pub struct AppConfig {
    /// Docker image name
    #[arg(long)]
    pub docker_image: String,

    /// Bash command to execute in the Docker container
    #[arg(long)]
    pub bash_command: String,

    /// AWS CloudWatch log group name, created if it does not exist
    #[arg(long)]
    pub aws_cloudwatch_group: String,

    /// AWS CloudWatch log stream name, created if it does not exist
    #[arg(long)]
    pub aws_cloudwatch_stream: String,

    /// AWS Access Key ID
    #[arg(long)]
    pub aws_access_key_id: String,

    /// AWS Secret Access Key
    #[arg(long)]
    pub aws_secret_access_key: String,

    /// AWS Region
    #[arg(long)]
    pub aws_region: String,
}

impl AppConfig {
    /// Resolve and validate the logging destination. The region must be one
    /// the table in `aws` knows about; everything else is checked by the
    /// backend itself when the group and stream are created.
    pub fn destination(&self) -> Result<Destination, DockwatchError> {
        let region = find_region(&self.aws_region).ok_or_else(|| {
            DockwatchError::Configuration(format!(
                "unknown AWS region '{}': please check and try again",
                self.aws_region
            ))
        })?;

        Ok(Destination {
            region: region.to_string(),
            group_name: self.aws_cloudwatch_group.clone(),
            stream_name: self.aws_cloudwatch_stream.clone(),
            access_key_id: self.aws_access_key_id.clone(),
            secret_access_key: self.aws_secret_access_key.clone(),
        })
    }

    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            image: self.docker_image.clone(),
            command: self.bash_command.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(region: &str) -> AppConfig {
        AppConfig::try_parse_from([
            "dockwatch",
            "--docker-image",
            "python:3.8",
            "--bash-command",
            "echo hello",
            "--aws-cloudwatch-group",
            "test-group",
            "--aws-cloudwatch-stream",
            "test-stream",
            "--aws-access-key-id",
            "AKIAEXAMPLE",
            "--aws-secret-access-key",
            "secret",
            "--aws-region",
            region,
        ])
        .expect("args should parse")
    }

    #[test]
    fn all_flags_are_required() {
        let result = AppConfig::try_parse_from(["dockwatch", "--docker-image", "python:3.8"]);
        assert!(result.is_err());
    }

    #[test]
    fn resolves_a_valid_destination() {
        let config = parse_args("eu-west-1");
        let dest = config.destination().expect("destination should resolve");
        assert_eq!(dest.region, "eu-west-1");
        assert_eq!(dest.group_name, "test-group");
        assert_eq!(dest.stream_name, "test-stream");
    }

    #[test]
    fn rejects_an_unknown_region() {
        let config = parse_args("mars-north-1");
        let err = config.destination().unwrap_err();
        assert!(matches!(err, DockwatchError::Configuration(_)));
    }

    #[test]
    fn builds_the_container_spec() {
        let config = parse_args("us-east-1");
        let spec = config.container_spec();
        assert_eq!(spec.image, "python:3.8");
        assert_eq!(spec.command, "echo hello");
    }
}
