use crate::{
    future::WithMetrics,
    repo::{RepoError, Video, VideoId, VideoRepo},
};
use sled::{Db, Tree};

macro_rules! b {
    ($self:ident.$ident:ident, $expr:expr) => {{
        let $ident = $self.$ident.clone();

        actix_web::rt::task::spawn_blocking(move || $expr)
            .await
            .map_err(SledError::from)
            .map_err(RepoError::from)??
    }};
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SledError {
    #[error("Error in database")]
    Sled(#[from] sled::Error),

    #[error("Invalid video json")]
    Video(#[from] serde_json::Error),

    #[error("Operation panicked")]
    Panic,
}

#[derive(Clone)]
pub(crate) struct SledRepo {
    videos: Tree,
    db: Db,
}

impl SledRepo {
    pub(crate) fn new(db: Db) -> Result<Self, SledError> {
        Ok(SledRepo {
            videos: db.open_tree("tubely-videos-tree")?,
            db,
        })
    }
}

fn encode(video: &Video) -> Result<Vec<u8>, RepoError> {
    serde_json::to_vec(video)
        .map_err(SledError::from)
        .map_err(RepoError::from)
}

fn decode(bytes: &[u8]) -> Result<Video, RepoError> {
    serde_json::from_slice(bytes)
        .map_err(SledError::from)
        .map_err(RepoError::from)
}

#[async_trait::async_trait(?Send)]
impl VideoRepo for SledRepo {
    async fn health_check(&self) -> Result<(), RepoError> {
        let next = self.db.generate_id().map_err(SledError::from)?;

        b!(self.videos, {
            videos.get(next.to_be_bytes()).map_err(SledError::from)?;
            Ok(()) as Result<(), RepoError>
        });

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(video_id = %video.id))]
    async fn create_video(&self, video: &Video) -> Result<(), RepoError> {
        let key = video.id;
        let value = encode(video)?;

        async {
            b!(self.videos, {
                videos
                    .insert(key.as_bytes(), value)
                    .map_err(SledError::from)?;
                Ok(()) as Result<(), RepoError>
            });

            Ok::<(), RepoError>(())
        }
        .with_metrics(crate::init_metrics::REPO_CREATE_VIDEO)
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_video(&self, id: VideoId) -> Result<Option<Video>, RepoError> {
        async {
            let opt = b!(self.videos, {
                videos.get(id.as_bytes()).map_err(SledError::from)
            });

            opt.map(|ivec| decode(&ivec))
                .transpose() as Result<Option<Video>, RepoError>
        }
        .with_metrics(crate::init_metrics::REPO_GET_VIDEO)
        .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(video_id = %video.id))]
    async fn update_video(&self, video: &Video) -> Result<(), RepoError> {
        let key = video.id;
        let value = encode(video)?;

        async {
            let existed = b!(self.videos, {
                // only overwrite records that already exist
                let previous = videos
                    .fetch_and_update(key.as_bytes(), |current| current.map(|_| value.clone()))
                    .map_err(SledError::from)?;

                Ok(previous.is_some()) as Result<bool, RepoError>
            });

            if existed {
                Ok::<(), RepoError>(())
            } else {
                Err(RepoError::Missing(key))
            }
        }
        .with_metrics(crate::init_metrics::REPO_UPDATE_VIDEO)
        .await
    }
}

impl std::fmt::Debug for SledRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledRepo").finish()
    }
}

impl From<actix_web::rt::task::JoinError> for SledError {
    fn from(_: actix_web::rt::task::JoinError) -> Self {
        SledError::Panic
    }
}

#[cfg(test)]
mod tests {
    use super::SledRepo;
    use crate::repo::{OwnerId, RepoError, Video, VideoId, VideoRepo};

    fn repo() -> SledRepo {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .expect("Opened temporary db");

        SledRepo::new(db).expect("Opened trees")
    }

    fn owner() -> OwnerId {
        OwnerId::from_uuid(uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn create_then_get() {
        let repo = repo();
        let video = Video::new(owner(), String::from("Boots"), String::from("A video"));

        repo.create_video(&video).await.expect("Created");

        let fetched = repo.get_video(video.id).await.expect("Fetched");
        assert_eq!(fetched, Some(video));
    }

    #[tokio::test]
    async fn missing_video_is_none() {
        let repo = repo();

        let fetched = repo.get_video(VideoId::generate()).await.expect("Fetched");
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn update_overwrites() {
        let repo = repo();
        let mut video = Video::new(owner(), String::from("Boots"), String::from("A video"));
        repo.create_video(&video).await.expect("Created");

        video.video_url = Some(
            "https://bucket.s3.us-east-1.amazonaws.com/landscape/video.mp4"
                .parse()
                .expect("Valid url"),
        );
        video.touch();
        repo.update_video(&video).await.expect("Updated");

        let fetched = repo.get_video(video.id).await.expect("Fetched");
        assert_eq!(fetched, Some(video));
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let repo = repo();
        let video = Video::new(owner(), String::from("Boots"), String::from("A video"));

        let res = repo.update_video(&video).await;

        assert!(matches!(res, Err(RepoError::Missing(id)) if id == video.id));
        assert_eq!(repo.get_video(video.id).await.expect("Fetched"), None);
    }

    #[tokio::test]
    async fn healthy() {
        repo().health_check().await.expect("Healthy");
    }
}
