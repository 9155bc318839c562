use crate::{config, error_code::ErrorCode};
use std::{fmt::Debug, str::FromStr, sync::Arc};
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

pub(crate) mod sled;

pub(crate) type ArcRepo = Arc<dyn VideoRepo>;

#[derive(Clone, Debug)]
pub(crate) enum Repo {
    Sled(self::sled::SledRepo),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub(crate) struct VideoId {
    id: Uuid,
}

/// The user a video belongs to, as named by the `sub` claim of their token
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub(crate) struct OwnerId {
    id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub(crate) struct Video {
    pub(crate) id: VideoId,
    pub(crate) user_id: OwnerId,
    pub(crate) title: String,
    pub(crate) description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
    pub(crate) thumbnail_url: Option<String>,
    pub(crate) video_url: Option<Url>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RepoError {
    #[error("Error in sled")]
    SledError(#[from] self::sled::SledError),

    #[error("Video {0} does not exist")]
    Missing(VideoId),
}

impl RepoError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SledError(self::sled::SledError::Panic) => ErrorCode::PANIC,
            _ => ErrorCode::REPO_ERROR,
        }
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait VideoRepo: Debug + Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;

    async fn create_video(&self, video: &Video) -> Result<(), RepoError>;

    async fn get_video(&self, id: VideoId) -> Result<Option<Video>, RepoError>;

    /// Overwrite an existing record. Updating a video that was never created is an error.
    async fn update_video(&self, video: &Video) -> Result<(), RepoError>;
}

impl Repo {
    #[tracing::instrument]
    pub(crate) fn open(config: config::Repo) -> color_eyre::Result<Self> {
        match config {
            config::Repo::Sled(config::Sled {
                mut path,
                cache_capacity,
            }) => {
                path.push("v0.1.0");

                let db = ::sled::Config::new()
                    .cache_capacity(cache_capacity)
                    .path(path)
                    .open()?;

                Ok(Self::Sled(self::sled::SledRepo::new(db)?))
            }
        }
    }

    pub(crate) fn to_arc(&self) -> ArcRepo {
        match self {
            Self::Sled(sled_repo) => Arc::new(sled_repo.clone()),
        }
    }
}

impl VideoId {
    pub(crate) fn generate() -> Self {
        VideoId { id: Uuid::new_v4() }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.id.as_bytes()
    }
}

impl FromStr for VideoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VideoId { id: s.parse()? })
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.id, f)
    }
}

impl OwnerId {
    pub(crate) fn from_uuid(id: Uuid) -> Self {
        OwnerId { id }
    }
}

impl FromStr for OwnerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(OwnerId { id: s.parse()? })
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.id, f)
    }
}

impl Video {
    pub(crate) fn new(user_id: OwnerId, title: String, description: String) -> Self {
        let now = OffsetDateTime::now_utc();

        Video {
            id: VideoId::generate(),
            user_id,
            title,
            description,
            created_at: now,
            updated_at: now,
            thumbnail_url: None,
            video_url: None,
        }
    }

    pub(crate) fn is_owned_by(&self, owner: OwnerId) -> bool {
        self.user_id == owner
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}
