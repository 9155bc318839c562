
use std::time::Instant;

use actix_web::web::{Bytes, BytesMut};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::{Stream, StreamExt};

use crate::{
    aspect::AspectCategory,
    error::{Error, UploadError},
    repo::{Video, VideoId},
    state::State,
    store::{ObjectKey, Store},
    tmp_file::{StageError, TmpFile},
    MEGABYTES,
};

const VIDEO_MP4: &str = "video/mp4";
const THUMBNAIL_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// How far an ingest got before it finished or failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Validating,
    Staged,
    Probed,
    Classified,
    Remuxed,
    Uploaded,
    Recorded,
}

impl Stage {
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Staged => "staged",
            Self::Probed => "probed",
            Self::Classified => "classified",
            Self::Remuxed => "remuxed",
            Self::Uploaded => "uploaded",
            Self::Recorded => "recorded",
        }
    }
}

/// The piece of work an ingest is in the middle of
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Validate,
    Stage,
    Probe,
    Remux,
    Upload,
    Record,
}

impl Step {
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Stage => "stage",
            Self::Probe => "probe",
            Self::Remux => "remux",
            Self::Upload => "upload",
            Self::Record => "record",
        }
    }
}

struct MetricsGuard {
    start: Instant,
    stage: Stage,
    step: Step,
    armed: bool,
}

impl MetricsGuard {
    fn guard() -> Self {
        metrics::counter!(crate::init_metrics::INGEST_START).increment(1);

        Self {
            start: Instant::now(),
            stage: Stage::Validating,
            step: Step::Validate,
            armed: true,
        }
    }

    fn begin(&mut self, step: Step) {
        self.step = step;
    }

    fn reached(&mut self, stage: Stage) {
        tracing::trace!("Reached {}", stage.as_str());
        self.stage = stage;
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for MetricsGuard {
    fn drop(&mut self) {
        let failed_at = if self.armed { self.step.as_str() } else { "none" };

        metrics::counter!(crate::init_metrics::INGEST_END, "stage" => self.stage.as_str(), "failed_at" => failed_at, "completed" => (!self.armed).to_string()).increment(1);
        metrics::histogram!(crate::init_metrics::INGEST_DURATION, "stage" => self.stage.as_str(), "failed_at" => failed_at, "completed" => (!self.armed).to_string()).record(self.start.elapsed().as_secs_f64());
    }
}

/// Resolve `video_id` to a record the bearer of `authorization` owns
#[tracing::instrument(level = "debug", skip(state, authorization))]
pub(crate) async fn authorize<S>(
    state: &State<S>,
    video_id: &str,
    authorization: Option<&str>,
) -> Result<Video, Error> {
    let video_id: VideoId = video_id.parse().map_err(UploadError::InvalidVideoId)?;

    let owner = state.auth.authenticate_header(authorization)?;

    let video = state
        .repo
        .get_video(video_id)
        .await?
        .ok_or(UploadError::VideoNotFound)?;

    if !video.is_owned_by(owner) {
        return Err(UploadError::NotOwner.into());
    }

    Ok(video)
}

fn validate_content_type(content_type: Option<&mime::Mime>, allowed: &[&str]) -> Result<(), Error> {
    match content_type {
        Some(mime) if allowed.contains(&mime.essence_str()) => Ok(()),
        Some(mime) => Err(UploadError::ContentType(mime.essence_str().to_string()).into()),
        None => Err(UploadError::ContentType(String::from("(none)")).into()),
    }
}

fn stage_error<E>(error: StageError<E>) -> Error
where
    Error: From<E>,
{
    match error {
        StageError::Io(e) => e.into(),
        StageError::TooLarge(limit) => UploadError::TooLarge(limit).into(),
        StageError::Stream(e) => e.into(),
    }
}

async fn release(file: TmpFile) {
    if let Err(e) = file.cleanup().await {
        tracing::warn!("Failed to release staged file: {e}");
    }
}

/// Take an uploaded video from the request body to a recorded object storage URL
///
/// Every check on the caller and the declared content type happens before any bytes are
/// staged. Staged files are released on every exit path.
#[tracing::instrument(name = "Ingest", skip(state, authorization, stream))]
pub(crate) async fn ingest<S, St, E>(
    state: &State<S>,
    video_id: &str,
    authorization: Option<&str>,
    content_type: Option<&mime::Mime>,
    stream: St,
) -> Result<Video, Error>
where
    S: Store,
    St: Stream<Item = Result<Bytes, E>>,
    Error: From<E>,
{
    let mut guard = MetricsGuard::guard();

    match run(state, video_id, authorization, content_type, stream, &mut guard).await {
        Ok(video) => {
            guard.disarm();
            Ok(video)
        }
        Err(e) => {
            tracing::warn!(
                reached = guard.stage.as_str(),
                failed_at = guard.step.as_str(),
                code = e.error_code().as_str(),
                timeout = e.is_timeout(),
                "Ingest failed: {e}"
            );
            Err(e)
        }
    }
}

async fn run<S, St, E>(
    state: &State<S>,
    video_id: &str,
    authorization: Option<&str>,
    content_type: Option<&mime::Mime>,
    stream: St,
    guard: &mut MetricsGuard,
) -> Result<Video, Error>
where
    S: Store,
    St: Stream<Item = Result<Bytes, E>>,
    Error: From<E>,
{
    let mut video = authorize(state, video_id, authorization).await?;
    validate_content_type(content_type, &[VIDEO_MP4])?;

    guard.begin(Step::Stage);
    let staged = state
        .tmp_dir
        .stage(stream, state.config.media.max_file_size * MEGABYTES)
        .await
        .map_err(stage_error)?;
    guard.reached(Stage::Staged);

    guard.begin(Step::Probe);
    let probe = state.prober.probe(&staged).await?;
    guard.reached(Stage::Probed);

    let category = AspectCategory::from(probe);
    tracing::debug!("Classified {}x{} as {category}", probe.width, probe.height);
    guard.reached(Stage::Classified);

    guard.begin(Step::Remux);
    let processed = state.remuxer.remux(&staged).await?;
    guard.reached(Stage::Remuxed);

    guard.begin(Step::Upload);
    let bytes = tokio::fs::read(&processed).await?;

    let key = ObjectKey::generate(category);
    let url = state
        .store
        .save_bytes(&key, Bytes::from(bytes), VIDEO_MP4)
        .await?;
    guard.reached(Stage::Uploaded);

    guard.begin(Step::Record);
    video.video_url = Some(url);
    video.touch();

    if let Err(e) = state.repo.update_video(&video).await {
        remove_orphan(&state.store, &key).await;
        return Err(e.into());
    }
    guard.reached(Stage::Recorded);

    metrics::counter!(crate::init_metrics::VIDEO_FILES, "category" => category.as_str())
        .increment(1);

    release(processed).await;
    release(staged).await;

    Ok(video)
}

#[tracing::instrument(level = "debug", skip(store))]
async fn remove_orphan<S: Store>(store: &S, key: &ObjectKey) {
    match store.remove(key).await {
        Ok(()) => {
            metrics::counter!(crate::init_metrics::INGEST_ORPHAN_REMOVED).increment(1);
            tracing::debug!("Removed unrecorded object");
        }
        Err(e) => {
            tracing::error!("Failed to remove unrecorded object {key}: {e}");
        }
    }
}

#[tracing::instrument(name = "Aggregate", skip(stream))]
async fn aggregate<St, E>(stream: St, limit: usize) -> Result<Bytes, Error>
where
    St: Stream<Item = Result<Bytes, E>>,
    Error: From<E>,
{
    futures_util::pin_mut!(stream);

    let mut buf = BytesMut::new();
    while let Some(res) = stream.next().await {
        let bytes = res?;

        if buf.len() + bytes.len() > limit {
            return Err(UploadError::TooLarge(limit).into());
        }

        buf.extend_from_slice(&bytes);
    }

    Ok(buf.freeze())
}

/// Store an uploaded thumbnail inline on the video record as a `data:` URL
#[tracing::instrument(name = "Thumbnail", skip(state, authorization, stream))]
pub(crate) async fn ingest_thumbnail<S, St, E>(
    state: &State<S>,
    video_id: &str,
    authorization: Option<&str>,
    content_type: Option<&mime::Mime>,
    stream: St,
) -> Result<Video, Error>
where
    St: Stream<Item = Result<Bytes, E>>,
    Error: From<E>,
{
    let mut video = authorize(state, video_id, authorization).await?;
    validate_content_type(content_type, &THUMBNAIL_TYPES)?;

    let bytes = aggregate(stream, state.config.media.max_thumbnail_size * MEGABYTES).await?;

    let essence = content_type
        .map(|mime| mime.essence_str())
        .unwrap_or(THUMBNAIL_TYPES[0]);

    video.thumbnail_url = Some(format!("data:{essence};base64,{}", STANDARD.encode(&bytes)));
    video.touch();

    state.repo.update_video(&video).await?;

    metrics::counter!(crate::init_metrics::THUMBNAIL_FILES).increment(1);

    Ok(video)
}
