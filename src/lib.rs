mod aspect;
mod auth;
mod config;
mod discover;
mod error;
mod error_code;
mod future;
mod ingest;
mod init_metrics;
mod init_tracing;
mod process;
mod remux;
mod repo;
mod state;
mod store;
mod tmp_file;

use actix_form_data::{Field, Form, FormData, Multipart, Value};
use actix_web::{http::header::AUTHORIZATION, web, App, HttpRequest, HttpResponse, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{marker::PhantomData, net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tracing::Instrument;
use tracing_actix_web::TracingLogger;

use self::{
    auth::JwtAuth,
    discover::FfProbe,
    error::{Error, UploadError},
    init_tracing::init_tracing,
    remux::FfMpeg,
    repo::{Repo, Video},
    state::State,
    store::{object_store::ObjectStore, Store, StoreError},
    tmp_file::TmpDir,
};

pub use self::config::{ConfigSource, TubelyConfiguration};

const MEGABYTES: usize = 1024 * 1024;

/// The raw `Authorization` header, read before the multipart body is consumed
fn authorization_header(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default().to_string())
}

struct VideoUpload<S: Store + 'static>(Value<Video>, PhantomData<S>);

impl<S: Store + 'static> FormData for VideoUpload<S> {
    type Item = Video;
    type Error = Error;

    fn form(req: &HttpRequest) -> Result<Form<Self::Item, Self::Error>, Self::Error> {
        // Create a new Multipart Form validator
        //
        // This form is expecting a single file field, 'video'
        let state = req
            .app_data::<web::Data<State<S>>>()
            .expect("No state in request")
            .clone();
        let video_id = req.match_info().query("video_id").to_string();
        let authorization = authorization_header(req);

        // staging enforces the exact limit, this only bounds the multipart framing
        let max_file_size = (state.config.media.max_file_size + 1) * MEGABYTES;

        Ok(Form::new()
            .max_files(1)
            .max_file_size(max_file_size)
            .transform_error(transform_error)
            .field(
                "video",
                Field::file(
                    async move |filename: String, content_type: Option<mime::Mime>, stream| {
                        let span = tracing::info_span!("video-upload", ?filename, %video_id);

                        ingest::ingest(
                            &**state,
                            &video_id,
                            authorization.as_deref(),
                            content_type.as_ref(),
                            stream,
                        )
                        .instrument(span)
                        .await
                    },
                ),
            ))
    }

    fn extract(value: Value<Self::Item>) -> Result<Self, Self::Error> {
        Ok(VideoUpload(value, PhantomData))
    }
}

struct ThumbnailUpload<S: Store + 'static>(Value<Video>, PhantomData<S>);

impl<S: Store + 'static> FormData for ThumbnailUpload<S> {
    type Item = Video;
    type Error = Error;

    fn form(req: &HttpRequest) -> Result<Form<Self::Item, Self::Error>, Self::Error> {
        let state = req
            .app_data::<web::Data<State<S>>>()
            .expect("No state in request")
            .clone();
        let video_id = req.match_info().query("video_id").to_string();
        let authorization = authorization_header(req);

        let max_file_size = (state.config.media.max_thumbnail_size + 1) * MEGABYTES;

        Ok(Form::new()
            .max_files(1)
            .max_file_size(max_file_size)
            .transform_error(transform_error)
            .field(
                "thumbnail",
                Field::file(
                    async move |filename: String, content_type: Option<mime::Mime>, stream| {
                        let span = tracing::info_span!("thumbnail-upload", ?filename, %video_id);

                        ingest::ingest_thumbnail(
                            &**state,
                            &video_id,
                            authorization.as_deref(),
                            content_type.as_ref(),
                            stream,
                        )
                        .instrument(span)
                        .await
                    },
                ),
            ))
    }

    fn extract(value: Value<Self::Item>) -> Result<Self, Self::Error> {
        Ok(ThumbnailUpload(value, PhantomData))
    }
}

/// Pull the single processed file out of a finished form
///
/// When the form carried no file the caller is still authorized first, so a stranger learns
/// nothing about the video from a malformed request.
async fn uploaded_video<S>(
    req: &HttpRequest,
    state: &State<S>,
    value: Value<Video>,
    field: &str,
) -> Result<Video, Error> {
    let file = value
        .map()
        .and_then(|mut m| m.remove(field))
        .and_then(|v| v.file());

    match file {
        Some(file) => {
            tracing::debug!("Uploaded {} for {}", file.filename, file.result.id);
            Ok(file.result)
        }
        None => {
            ingest::authorize(
                state,
                req.match_info().query("video_id"),
                authorization_header(req).as_deref(),
            )
            .await?;

            Err(UploadError::NoFiles.into())
        }
    }
}

/// Handle responding to successful video uploads
#[tracing::instrument(name = "Uploaded video", skip(req, value, state))]
async fn upload_video<S: Store + 'static>(
    req: HttpRequest,
    Multipart(VideoUpload(value, _)): Multipart<VideoUpload<S>>,
    state: web::Data<State<S>>,
) -> Result<HttpResponse, Error> {
    let video = uploaded_video(&req, &**state, value, "video").await?;

    Ok(HttpResponse::Ok().json(&video))
}

/// Handle responding to successful thumbnail uploads
#[tracing::instrument(name = "Uploaded thumbnail", skip(req, value, state))]
async fn upload_thumbnail<S: Store + 'static>(
    req: HttpRequest,
    Multipart(ThumbnailUpload(value, _)): Multipart<ThumbnailUpload<S>>,
    state: web::Data<State<S>>,
) -> Result<HttpResponse, Error> {
    let video = uploaded_video(&req, &**state, value, "thumbnail").await?;

    Ok(HttpResponse::Ok().json(&video))
}

#[derive(Debug, serde::Deserialize)]
struct CreateVideo {
    title: String,
    description: String,
}

#[tracing::instrument(name = "Create video", skip(req, state))]
async fn create_video<S: Store>(
    req: HttpRequest,
    json: web::Json<CreateVideo>,
    state: web::Data<State<S>>,
) -> Result<HttpResponse, Error> {
    let owner = state.auth.authenticate(&req)?;

    let CreateVideo { title, description } = json.into_inner();

    let video = Video::new(owner, title, description);
    state.repo.create_video(&video).await?;

    Ok(HttpResponse::Created().json(&video))
}

#[tracing::instrument(name = "Fetch video", skip(req, state))]
async fn get_video<S: Store>(
    req: HttpRequest,
    video_id: web::Path<String>,
    state: web::Data<State<S>>,
) -> Result<HttpResponse, Error> {
    let video =
        ingest::authorize(&**state, &video_id, authorization_header(&req).as_deref()).await?;

    Ok(HttpResponse::Ok().json(&video))
}

/// Issue a time-limited GET URL for the uploaded video
#[tracing::instrument(name = "Video access", skip(req, state))]
async fn video_access<S: Store>(
    req: HttpRequest,
    video_id: web::Path<String>,
    state: web::Data<State<S>>,
) -> Result<HttpResponse, Error> {
    let video =
        ingest::authorize(&**state, &video_id, authorization_header(&req).as_deref()).await?;

    let url = video.video_url.as_ref().ok_or(UploadError::NoVideoUrl)?;
    let key = state
        .store
        .key_from_url(url)
        .ok_or(StoreError::InvalidKey)?;

    let expires_in = state.config.store.signature_duration;
    let signed = state
        .store
        .signed_url(&key, Duration::from_secs(expires_in))
        .await?;

    tracing::debug!("Signed {} url for {expires_in}s", key.category());

    Ok(HttpResponse::Ok().json(&serde_json::json!({
        "url": signed.as_str(),
        "expires_in": expires_in,
    })))
}

async fn healthz<S: Store>(state: web::Data<State<S>>) -> Result<HttpResponse, Error> {
    state.repo.health_check().await?;
    state.store.health_check().await?;
    Ok(HttpResponse::Ok().finish())
}

fn transform_error(error: actix_form_data::Error) -> actix_web::Error {
    let error: Error = error.into();
    let error: actix_web::Error = error.into();
    error
}

fn configure_endpoints<S: Store + 'static>(config: &mut web::ServiceConfig, state: State<S>) {
    config
        .app_data(web::Data::new(state))
        .route("/healthz", web::get().to(healthz::<S>))
        .service(
            web::scope("/api")
                .service(
                    web::resource("/video_upload/{video_id}")
                        .route(web::post().to(upload_video::<S>)),
                )
                .service(
                    web::resource("/thumbnail_upload/{video_id}")
                        .route(web::post().to(upload_thumbnail::<S>)),
                )
                .service(web::resource("/videos").route(web::post().to(create_video::<S>)))
                .service(web::resource("/videos/{video_id}").route(web::get().to(get_video::<S>)))
                .service(
                    web::resource("/videos/{video_id}/access")
                        .route(web::get().to(video_access::<S>)),
                ),
        );
}

async fn launch_object_store(state: State<ObjectStore>, address: SocketAddr) -> std::io::Result<()> {
    HttpServer::new(move || {
        let state = state.clone();

        App::new()
            .wrap(TracingLogger::default())
            .configure(move |sc| configure_endpoints(sc, state))
    })
    .bind(address)?
    .run()
    .await
}

impl<P: AsRef<Path>, T: serde::Serialize> ConfigSource<P, T> {
    /// Initialize the tubely configuration
    ///
    /// This takes an optional save_to path, which the generated configuration will be saved into.
    /// Since many parameters have defaults, it can be useful to dump a valid configuration with
    /// default values to see what is available for tweaking.
    ///
    /// When running tubely as a library, configuration is limited to environment variables and
    /// configuration files. Commandline options are not available.
    ///
    /// ```rust
    /// fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     tubely::ConfigSource::memory(serde_json::json!({
    ///         "server": {
    ///             "address": "127.0.0.1:8091",
    ///             "jwt_secret": "change-me"
    ///         },
    ///         "repo": {
    ///             "type": "sled",
    ///             "path": "./sled-repo"
    ///         },
    ///         "store": {
    ///             "bucket_name": "tubely-videos",
    ///             "region": "us-east-2"
    ///         }
    ///     })).init::<&str>(None)?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn init<Q: AsRef<Path>>(
        self,
        save_to: Option<Q>,
    ) -> color_eyre::Result<TubelyConfiguration> {
        config::configure_without_clap(self, save_to)
    }
}

impl TubelyConfiguration {
    /// Build the tubely configuration from commandline arguments
    ///
    /// This is probably not useful for 3rd party applications that handle their own commandline
    pub fn build_default() -> color_eyre::Result<Self> {
        config::configure()
    }

    /// Install the default tubely tracer
    ///
    /// This is probably not useful for 3rd party applications that install their own tracing
    /// subscribers.
    pub fn install_tracing(self) -> color_eyre::Result<Self> {
        init_tracing(&self.config.tracing)?;
        Ok(self)
    }

    pub fn install_metrics(self) -> color_eyre::Result<Self> {
        if let Some(addr) = self.config.metrics.prometheus_address {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()?;

            init_metrics::init_metrics();
        }

        Ok(self)
    }

    /// Run the tubely application
    ///
    /// This must be called after `init` or `build_default`, and serves until the server shuts
    /// down.
    pub async fn run(self) -> color_eyre::Result<()> {
        let TubelyConfiguration { config } = self;

        if !config.upload_rate_is_plausible() {
            tracing::warn!(
                "Uploads of {} MiB need {:.1} MiB/s to finish within the {}s object storage timeout",
                config.media.max_file_size,
                config.required_upload_rate(),
                config.store.client_timeout,
            );
        }

        let repo = Repo::open(config.repo.clone())?;
        let store = ObjectStore::build(&config.store)?;
        let tmp_dir = TmpDir::init(&config.server.temporary_directory).await?;

        tracing::info!("Staging uploads in {:?}", tmp_dir.path());

        let address = config.server.address;

        let state = State {
            auth: Arc::new(JwtAuth::new(&config.server.jwt_secret)),
            prober: Arc::new(FfProbe::new(
                config.media.ffprobe.clone(),
                config.media.process_timeout,
            )),
            remuxer: Arc::new(FfMpeg::new(
                config.media.ffmpeg.clone(),
                config.media.process_timeout,
            )),
            repo: repo.to_arc(),
            store,
            tmp_dir: tmp_dir.clone(),
            config,
        };

        launch_object_store(state, address).await?;

        tmp_dir.cleanup().await?;

        Ok(())
    }
}
