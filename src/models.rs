use std::fmt;

/// Identifies exactly one log group/stream pair in one account/region.
/// Built once from the CLI inputs and immutable for the run.
#[derive(Clone)]
pub struct Destination {
    pub region: String,
    pub group_name: String,
    pub stream_name: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("region", &self.region)
            .field("group_name", &self.group_name)
            .field("stream_name", &self.stream_name)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// One captured output line, stamped with wall-clock millis at observation
/// time. The backend rejects empty messages.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp_millis: i64,
    pub message: String,
}

/// What to launch: an image and the shell command to run inside it.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub command: String,
}

impl ContainerSpec {
    /// The Docker API takes an argv, so the command string runs under sh.
    pub fn command_argv(&self) -> Vec<String> {
        vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            self.command.clone(),
        ]
    }
}
