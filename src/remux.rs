use std::sync::Arc;

use crate::{
    error_code::ErrorCode,
    process::{Process, ProcessError},
    tmp_file::TmpFile,
};

pub(crate) type ArcRemuxer = Arc<dyn Remuxer>;

/// Suffix appended to a staged upload to name its remuxed copy
pub(crate) const PROCESSING_SUFFIX: &str = ".processing";

#[derive(Debug, thiserror::Error)]
pub(crate) enum RemuxError {
    #[error("Error in ffmpeg process")]
    Process(#[source] ProcessError),

    #[error("Invalid file path")]
    Path,

    #[error("ffmpeg did not produce an output file")]
    MissingOutput(#[source] std::io::Error),
}

impl RemuxError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Process(e) if e.is_timeout() => ErrorCode::REMUX_TIMEOUT,
            _ => ErrorCode::REMUX_FAILED,
        }
    }

    pub(crate) const fn is_timeout(&self) -> bool {
        matches!(self, Self::Process(e) if e.is_timeout())
    }
}

/// Rewrites a staged upload so its index sits at the front of the file
///
/// The returned file is distinct from `input` and carries its own cleanup obligation.
#[async_trait::async_trait(?Send)]
pub(crate) trait Remuxer: std::fmt::Debug + Send + Sync {
    async fn remux(&self, input: &TmpFile) -> Result<TmpFile, RemuxError>;
}

#[derive(Debug)]
pub(crate) struct FfMpeg {
    command: String,
    timeout: u64,
}

impl FfMpeg {
    pub(crate) fn new(command: String, timeout: u64) -> Self {
        FfMpeg { command, timeout }
    }
}

#[async_trait::async_trait(?Send)]
impl Remuxer for FfMpeg {
    #[tracing::instrument(skip(self))]
    async fn remux(&self, input: &TmpFile) -> Result<TmpFile, RemuxError> {
        let output = input.sibling(PROCESSING_SUFFIX);

        let input_str = input.to_str().ok_or(RemuxError::Path)?;
        let output_str = output.to_str().ok_or(RemuxError::Path)?;

        let res = Process::run(
            &self.command,
            &[
                "-hide_banner",
                "-v",
                "error",
                "-i",
                input_str,
                "-c",
                "copy",
                "-movflags",
                "faststart",
                "-f",
                "mp4",
                output_str,
            ],
            self.timeout,
        );

        let res = match res {
            Ok(process) => process.wait().await,
            Err(e) => Err(e),
        };

        if let Err(e) = res {
            if let Err(cleanup) = output.cleanup().await {
                tracing::warn!("Failed to remove partial remux output: {cleanup}");
            }

            return Err(RemuxError::Process(e));
        }

        if let Err(e) = tokio::fs::metadata(&output).await {
            return Err(RemuxError::MissingOutput(e));
        }

        Ok(output)
    }
}
