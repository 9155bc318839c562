use crate::config::primitives::{LogFormat, Targets};
use std::{net::SocketAddr, path::PathBuf};
use url::Url;

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct ConfigFile {
    pub(crate) server: Server,

    pub(crate) tracing: Tracing,

    #[serde(default)]
    pub(crate) metrics: Metrics,

    pub(crate) media: Media,

    pub(crate) repo: Repo,

    pub(crate) store: ObjectStorage,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub(crate) enum Repo {
    Sled(Sled),
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct Server {
    pub(crate) address: SocketAddr,

    /// HS256 secret used to validate bearer tokens
    pub(crate) jwt_secret: String,

    pub(crate) temporary_directory: PathBuf,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct Tracing {
    pub(crate) logging: Logging,

    pub(crate) opentelemetry: OpenTelemetry,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct Logging {
    pub(crate) format: LogFormat,

    pub(crate) targets: Targets,

    pub(crate) log_spans: bool,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct OpenTelemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) url: Option<Url>,

    pub(crate) service_name: String,

    pub(crate) targets: Targets,
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) prometheus_address: Option<SocketAddr>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct Media {
    /// Maximum video upload size, in MiB
    pub(crate) max_file_size: usize,

    /// Maximum thumbnail upload size, in MiB
    pub(crate) max_thumbnail_size: usize,

    /// Timeout, in seconds, for each ffprobe and ffmpeg invocation
    pub(crate) process_timeout: u64,

    pub(crate) ffprobe: String,

    pub(crate) ffmpeg: String,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct Sled {
    pub(crate) path: PathBuf,

    pub(crate) cache_capacity: u64,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct ObjectStorage {
    /// Custom endpoint for S3-compatible stores. Unset means AWS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) endpoint: Option<Url>,

    pub(crate) bucket_name: String,

    pub(crate) use_path_style: bool,

    pub(crate) region: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) access_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) secret_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) session_token: Option<String>,

    /// How long signed access URLs stay valid, in seconds
    pub(crate) signature_duration: u64,

    /// How long a single object storage request may take, in seconds, body included
    pub(crate) client_timeout: u64,

    /// Base URL stored on video records in place of the bucket's own address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) public_endpoint: Option<Url>,
}
