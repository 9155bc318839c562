use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use color_eyre::Report;

use crate::error_code::ErrorCode;

pub(crate) struct Error {
    inner: color_eyre::Report,
}

impl Error {
    fn kind(&self) -> Option<&UploadError> {
        self.inner.downcast_ref()
    }

    pub(crate) fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        self.inner.root_cause()
    }

    pub(crate) fn error_code(&self) -> ErrorCode {
        self.kind()
            .map(|e| e.error_code())
            .unwrap_or(ErrorCode::UNKNOWN_ERROR)
    }

    pub(crate) fn is_timeout(&self) -> bool {
        match self.kind() {
            Some(UploadError::Probe(e)) => e.is_timeout(),
            Some(UploadError::Remux(e)) => e.is_timeout(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl<T> From<T> for Error
where
    UploadError: From<T>,
{
    fn from(error: T) -> Self {
        Error {
            inner: Report::from(UploadError::from(error)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum UploadError {
    #[error("Couldn't upload file")]
    Upload(#[from] actix_form_data::Error),

    #[error("Invalid video id")]
    InvalidVideoId(#[source] uuid::Error),

    #[error("Couldn't authenticate request")]
    Auth(#[from] crate::auth::AuthError),

    #[error("Requested a video that doesn't exist")]
    VideoNotFound,

    #[error("Video belongs to another user")]
    NotOwner,

    #[error("No files present in upload")]
    NoFiles,

    #[error("Unsupported content type {0}")]
    ContentType(String),

    #[error("Upload exceeds the limit of {0} bytes")]
    TooLarge(usize),

    #[error("Failed to read video metadata")]
    Probe(#[from] crate::discover::ProbeError),

    #[error("Failed to remux video")]
    Remux(#[from] crate::remux::RemuxError),

    #[error("Error in store")]
    Store(#[from] crate::store::StoreError),

    #[error("Error in DB")]
    Repo(#[from] crate::repo::RepoError),

    #[error("Error interacting with filesystem")]
    Io(#[from] std::io::Error),

    #[error("Video has not been uploaded yet")]
    NoVideoUrl,
}

impl UploadError {
    const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Upload(_) => ErrorCode::FILE_UPLOAD_ERROR,
            Self::InvalidVideoId(_) => ErrorCode::INVALID_VIDEO_ID,
            Self::Auth(e) => e.error_code(),
            Self::VideoNotFound => ErrorCode::VIDEO_NOT_FOUND,
            Self::NotOwner => ErrorCode::NOT_VIDEO_OWNER,
            Self::NoFiles => ErrorCode::VALIDATE_NO_FILES,
            Self::ContentType(_) => ErrorCode::VALIDATE_CONTENT_TYPE,
            Self::TooLarge(_) => ErrorCode::VALIDATE_FILE_SIZE,
            Self::Probe(e) => e.error_code(),
            Self::Remux(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Repo(e) => e.error_code(),
            Self::Io(_) => ErrorCode::IO_ERROR,
            Self::NoVideoUrl => ErrorCode::NO_VIDEO_URL,
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            Some(
                UploadError::Upload(_)
                | UploadError::InvalidVideoId(_)
                | UploadError::NoFiles
                | UploadError::ContentType(_),
            ) => StatusCode::BAD_REQUEST,
            Some(UploadError::Auth(_)) => StatusCode::UNAUTHORIZED,
            Some(UploadError::NotOwner) => StatusCode::FORBIDDEN,
            Some(UploadError::VideoNotFound | UploadError::NoVideoUrl) => StatusCode::NOT_FOUND,
            Some(UploadError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // causes of server errors can carry scratch paths
        let msg = if status.is_server_error() {
            self.inner.to_string()
        } else {
            self.root_cause().to_string()
        };

        HttpResponse::build(status)
            .content_type("application/json")
            .body(
                serde_json::to_string(&serde_json::json!({
                    "msg": msg,
                    "code": self.error_code()
                }))
                .unwrap_or_else(|_| {
                    r#"{"msg":"Request failed","code":"unknown-error"}"#.to_string()
                }),
            )
    }
}
