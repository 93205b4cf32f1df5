use std::collections::VecDeque;
use std::pin::Pin;

use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, CreateImageOptionsBuilder, LogsOptions,
    LogsOptionsBuilder, RemoveContainerOptions, RemoveContainerOptionsBuilder,
    StartContainerOptions,
};
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use log::{debug, info, warn};

use crate::errors::DockwatchError;
use crate::models::ContainerSpec;

/// Connect to the local Docker daemon. The connection itself is lazy, so a
/// ping follows immediately to surface an unreachable daemon as its own
/// cause rather than as a failure of the first real request.
pub async fn connect() -> Result<Docker, DockwatchError> {
    let docker = Docker::connect_with_local_defaults()
        .map_err(|e| DockwatchError::RuntimeUnavailable(e.to_string()))?;

    docker
        .ping()
        .await
        .map_err(|e| DockwatchError::RuntimeUnavailable(e.to_string()))?;

    Ok(docker)
}

/// Create and start a container in detached mode, returning its id without
/// waiting for the command to finish. A locally missing image is pulled
/// once; an image that cannot be resolved at all is a distinct failure.
pub async fn run_container(
    docker: &Docker,
    spec: &ContainerSpec,
) -> Result<String, DockwatchError> {
    let body = ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command_argv()),
        ..Default::default()
    };

    let created = match docker
        .create_container(None::<CreateContainerOptions>, body.clone())
        .await
    {
        Ok(response) => response,
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {
            pull_image(docker, &spec.image).await?;
            docker
                .create_container(None::<CreateContainerOptions>, body)
                .await
                .map_err(|e| DockwatchError::ProcessApi(e.to_string()))?
        }
        Err(e) => return Err(DockwatchError::ProcessApi(e.to_string())),
    };

    docker
        .start_container(&created.id, None::<StartContainerOptions>)
        .await
        .map_err(|e| DockwatchError::ProcessApi(e.to_string()))?;

    info!(
        "started container {} from image '{}'",
        short_id(&created.id),
        spec.image
    );
    Ok(created.id)
}

async fn pull_image(docker: &Docker, image: &str) -> Result<(), DockwatchError> {
    info!("image '{}' not present locally, pulling", image);
    let (name, tag) = parse_image_reference(image);

    let options: CreateImageOptions = CreateImageOptionsBuilder::new()
        .from_image(name)
        .tag(tag)
        .build();

    let mut progress = docker.create_image(Some(options), None, None);
    while let Some(step) = progress.next().await {
        match step {
            Ok(update) => {
                if let Some(status) = update.status {
                    debug!("pull status: {}", status);
                }
            }
            Err(e) => {
                debug!("pull of '{}' failed: {}", image, e);
                return Err(DockwatchError::ImageNotFound(image.to_string()));
            }
        }
    }

    info!("image '{}' pulled", image);
    Ok(())
}

/// Follow the container's combined stdout and stderr as a lazy sequence of
/// newline-stripped lines. The sequence ends when the container exits.
pub fn log_lines(docker: &Docker, container_id: &str) -> LogLines {
    let options: LogsOptions = LogsOptionsBuilder::new()
        .follow(true)
        .stdout(true)
        .stderr(true)
        .build();

    let chunks = docker.logs(container_id, Some(options)).map(|item| {
        item.map(|output| output.into_bytes())
            .map_err(|e| DockwatchError::Streaming(e.to_string()))
    });

    LogLines::new(chunks)
}

/// Best-effort cleanup. Runs on every exit path once a container has been
/// started, so failures are reported but never fatal.
pub async fn remove_container(docker: &Docker, container_id: &str) {
    let options: RemoveContainerOptions = RemoveContainerOptionsBuilder::new().force(true).build();

    match docker.remove_container(container_id, Some(options)).await {
        Ok(_) => info!("removed container {}", short_id(container_id)),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {
            debug!("container {} already gone", short_id(container_id));
        }
        Err(e) => warn!(
            "failed to remove container {}: {}",
            short_id(container_id),
            e
        ),
    }
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, DockwatchError>> + Send>>;

/// Lazy line sequence over a raw chunk stream. The daemon delivers output in
/// frames that usually, but not always, align with lines; chunks are
/// re-segmented here so callers only ever see complete lines.
pub struct LogLines {
    chunks: ChunkStream,
    buffer: LineBuffer,
    pending: VecDeque<String>,
    done: bool,
}

impl LogLines {
    pub(crate) fn new(
        chunks: impl Stream<Item = Result<Bytes, DockwatchError>> + Send + 'static,
    ) -> Self {
        Self {
            chunks: Box::pin(chunks),
            buffer: LineBuffer::default(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// The next complete output line, or None once the stream has ended and
    /// every buffered line has been handed out. A stream error is yielded
    /// once and ends the sequence.
    pub async fn next_line(&mut self) -> Option<Result<String, DockwatchError>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.done {
                return None;
            }
            match self.chunks.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.buffer.push(&chunk)),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    self.pending.extend(self.buffer.take_partial());
                }
            }
        }
    }
}

#[derive(Default)]
struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completes. Lines split on
    /// '\n'; a trailing '\r' is stripped; invalid UTF-8 is replaced.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(Self::decode(std::mem::take(&mut self.partial)));
            } else {
                self.partial.push(byte);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends, so an unterminated final line
    /// is not lost.
    fn take_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(Self::decode(std::mem::take(&mut self.partial)))
        }
    }

    fn decode(mut bytes: Vec<u8>) -> String {
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn short_id(container_id: &str) -> &str {
    &container_id[..container_id.len().min(12)]
}

/// Split an image reference into name and tag, defaulting to "latest".
/// A colon inside the registry host (localhost:5000/app) is not a tag.
fn parse_image_reference(image: &str) -> (&str, &str) {
    if let Some(at) = image.find('@') {
        return (&image[..at], &image[at..]);
    }
    if let Some(colon) = image.rfind(':') {
        if !image[colon + 1..].contains('/') {
            return (&image[..colon], &image[colon + 1..]);
        }
    }
    (image, "latest")
}
