#[cfg(test)]
mod tests;

use std::{path::Path, sync::Arc};

use crate::{
    error_code::ErrorCode,
    process::{Process, ProcessError},
};

pub(crate) type ArcProber = Arc<dyn Prober>;

/// Geometry of the first video stream in an upload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ProbeResult {
    pub(crate) width: u32,
    pub(crate) height: u32,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProbeError {
    #[error("Error in ffprobe process")]
    Process(#[source] ProcessError),

    #[error("Invalid file path")]
    Path,

    #[error("Error parsing ffprobe output")]
    Json(#[source] serde_json::Error),

    #[error("No video stream in uploaded media")]
    NoStreams,

    #[error("Video stream is missing dimensions")]
    MissingDimensions,

    #[error("Invalid video dimensions {width}x{height}")]
    Dimensions { width: i64, height: i64 },
}

impl ProbeError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Process(e) if e.is_timeout() => ErrorCode::PROBE_TIMEOUT,
            _ => ErrorCode::METADATA_UNAVAILABLE,
        }
    }

    pub(crate) const fn is_timeout(&self) -> bool {
        matches!(self, Self::Process(e) if e.is_timeout())
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait Prober: std::fmt::Debug + Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError>;
}

#[derive(Debug)]
pub(crate) struct FfProbe {
    command: String,
    timeout: u64,
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeOutput {
    #[serde(default)]
    streams: Vec<FfProbeStream>,
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeStream {
    #[allow(dead_code)]
    codec_type: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
}

impl FfProbe {
    pub(crate) fn new(command: String, timeout: u64) -> Self {
        FfProbe { command, timeout }
    }
}

#[async_trait::async_trait(?Send)]
impl Prober for FfProbe {
    #[tracing::instrument(skip(self))]
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        let path_str = path.to_str().ok_or(ProbeError::Path)?;

        let output = Process::run(
            &self.command,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_type,width,height",
                "-print_format",
                "json",
                path_str,
            ],
            self.timeout,
        )
        .map_err(ProbeError::Process)?
        .output()
        .await
        .map_err(ProbeError::Process)?;

        parse_probe(&output)
    }
}

fn parse_probe(output: &[u8]) -> Result<ProbeResult, ProbeError> {
    let output: FfProbeOutput = serde_json::from_slice(output).map_err(ProbeError::Json)?;

    let Some(stream) = output.streams.into_iter().next() else {
        return Err(ProbeError::NoStreams);
    };

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(ProbeError::MissingDimensions);
    };

    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok(ProbeResult {
            width: w,
            height: h,
        }),
        _ => Err(ProbeError::Dimensions { width, height }),
    }
}
