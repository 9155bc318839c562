use crate::config::primitives::{LogFormat, Targets};
use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};
use url::Url;

impl Args {
    pub(super) fn into_output(self) -> Output {
        let Args {
            config_file,
            log_format,
            log_targets,
            log_spans,
            opentelemetry_url,
            opentelemetry_service_name,
            opentelemetry_targets,
            save_to,
            command,
        } = self;

        let tracing = Tracing {
            logging: Logging {
                format: log_format,
                targets: log_targets,
                log_spans,
            },
            opentelemetry: OpenTelemetry {
                url: opentelemetry_url,
                service_name: opentelemetry_service_name,
                targets: opentelemetry_targets,
            },
        };

        let Command::Run(Run {
            address,
            jwt_secret,
            temporary_directory,
            metrics_prometheus_address,
            media_max_file_size,
            media_max_thumbnail_size,
            media_process_timeout,
            media_ffprobe,
            media_ffmpeg,
            store,
        }) = command;

        let server = Server {
            address,
            jwt_secret,
            temporary_directory,
        };

        let metrics = Metrics {
            prometheus_address: metrics_prometheus_address,
        };

        let media = Media {
            max_file_size: media_max_file_size,
            max_thumbnail_size: media_max_thumbnail_size,
            process_timeout: media_process_timeout,
            ffprobe: media_ffprobe,
            ffmpeg: media_ffmpeg,
        };

        let (store, repo) = match store {
            Some(RunStore::ObjectStorage(RunObjectStorage { storage, repo })) => {
                (Some(storage), repo)
            }
            None => (None, None),
        };

        Output {
            config_format: ConfigFormat {
                server,
                tracing,
                metrics,
                media,
                repo,
                store,
            },
            save_to,
            config_file,
        }
    }
}

pub(super) struct Output {
    pub(super) config_format: ConfigFormat,
    pub(super) save_to: Option<PathBuf>,
    pub(super) config_file: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct ConfigFormat {
    server: Server,
    tracing: Tracing,
    metrics: Metrics,
    media: Media,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo: Option<Repo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<ObjectStorage>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Server {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<SocketAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwt_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temporary_directory: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Tracing {
    logging: Logging,
    opentelemetry: OpenTelemetry,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Logging {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<LogFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    log_spans: bool,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct OpenTelemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    targets: Option<Targets>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    prometheus_address: Option<SocketAddr>,
}

#[derive(Debug, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Media {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_file_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_thumbnail_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    process_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ffprobe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ffmpeg: Option<String>,
}

/// Run the tubely video ingestion service
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(super) struct Args {
    /// Path to the tubely configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Format of logs printed to stdout
    #[arg(long)]
    log_format: Option<LogFormat>,
    /// Log levels to print to stdout, respects RUST_LOG formatting
    #[arg(long)]
    log_targets: Option<Targets>,
    /// Whether to log openning and closing of tracing spans to stdout
    #[arg(long)]
    log_spans: bool,

    /// URL to send OpenTelemetry traces
    #[arg(long)]
    opentelemetry_url: Option<Url>,
    /// Service Name to use for OpenTelemetry
    #[arg(long)]
    opentelemetry_service_name: Option<String>,
    /// Log levels to use for OpenTelemetry, respects RUST_LOG formatting
    #[arg(long)]
    opentelemetry_targets: Option<Targets>,

    /// File to save the current configuration for reproducible runs
    #[arg(long)]
    save_to: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the tubely web server
    Run(Run),
}

#[derive(Debug, Parser)]
struct Run {
    /// The address and port to bind the tubely web server
    #[arg(short, long)]
    address: Option<SocketAddr>,

    /// The secret used to validate HS256 bearer tokens
    #[arg(long)]
    jwt_secret: Option<String>,

    /// The directory tubely stages uploads in while they are processed
    #[arg(long)]
    temporary_directory: Option<PathBuf>,

    /// Whether to enable the prometheus scrape endpoint
    #[arg(long)]
    metrics_prometheus_address: Option<SocketAddr>,

    /// The maximum size, in MiB, of an uploaded video
    ///
    /// This defaults to 1024
    #[arg(long)]
    media_max_file_size: Option<usize>,

    /// The maximum size, in MiB, of an uploaded thumbnail
    ///
    /// This defaults to 10
    #[arg(long)]
    media_max_thumbnail_size: Option<usize>,

    /// How long, in seconds, ffprobe and ffmpeg may run on a single upload
    ///
    /// This defaults to 30
    #[arg(long)]
    media_process_timeout: Option<u64>,

    /// The ffprobe binary to run
    #[arg(long)]
    media_ffprobe: Option<String>,

    /// The ffmpeg binary to run
    #[arg(long)]
    media_ffmpeg: Option<String>,

    #[command(subcommand)]
    store: Option<RunStore>,
}

/// Run tubely with the provided storage
#[derive(Debug, Subcommand)]
enum RunStore {
    /// Run tubely with object storage
    ObjectStorage(RunObjectStorage),
}

/// Run tubely with the provided object storage
#[derive(Debug, Parser)]
struct RunObjectStorage {
    #[command(flatten)]
    storage: ObjectStorage,

    #[command(subcommand)]
    repo: Option<Repo>,
}

/// Configuration for data repositories
#[derive(Debug, Subcommand, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
enum Repo {
    /// Run tubely with the provided sled-backed data repository
    Sled(Sled),
}

/// Configuration for Object Storage
#[derive(Clone, Debug, Parser, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct ObjectStorage {
    /// The base endpoint for the object storage, when not using AWS
    ///
    /// Examples:
    /// - `http://localhost:9000`
    /// - `https://nyc3.digitaloceanspaces.com`
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<Url>,

    /// Determines whether to use path style or virtualhost style for accessing objects
    ///
    /// When this is true, objects will be fetched from {endpoint}/{bucket_name}/{object}
    /// When false, objects will be fetched from {bucket_name}.{endpoint}/{object}
    #[arg(short, long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    use_path_style: bool,

    /// The bucket in which to store videos
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    bucket_name: Option<String>,

    /// The region the bucket is located in
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,

    /// The Access Key for the user accessing the bucket
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    access_key: Option<String>,

    /// The secret key for the user accessing the bucket
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key: Option<String>,

    /// The session token for accessing the bucket
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,

    /// How long signed access URLs are valid (in seconds)
    ///
    /// This defaults to 300 seconds
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    signature_duration: Option<u64>,

    /// How long a client can wait on an object storage request before giving up (in seconds)
    ///
    /// This covers sending the whole video body, so it should leave room for uploads of
    /// media.max_file_size. This defaults to 600 seconds
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    client_timeout: Option<u64>,

    /// Base URL recorded on videos instead of the bucket address, e.g. a CDN in front of the
    /// bucket
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    public_endpoint: Option<Url>,
}

/// Configuration for the sled-backed data repository
#[derive(Debug, Parser, serde::Serialize)]
#[serde(rename_all = "snake_case")]
struct Sled {
    /// The path to store the sled database
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,

    /// The cache capacity, in bytes, allowed to sled for in-memory operations
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_capacity: Option<u64>,
}
