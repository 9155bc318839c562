use actix_web::web::Bytes;
use std::{fmt::Debug, time::Duration};
use url::Url;

mod object_key;
pub(crate) mod object_store;

pub(crate) use object_key::ObjectKey;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("Error in object store")]
    ObjectStore(#[source] crate::store::object_store::ObjectError),

    #[error("Invalid object key")]
    InvalidKey,
}

impl StoreError {
    pub(crate) const fn error_code(&self) -> crate::error_code::ErrorCode {
        match self {
            Self::ObjectStore(_) => crate::error_code::ErrorCode::OBJECT_STORAGE_ERROR,
            Self::InvalidKey => crate::error_code::ErrorCode::INVALID_OBJECT_KEY,
        }
    }
}

impl From<crate::store::object_store::ObjectError> for StoreError {
    fn from(value: crate::store::object_store::ObjectError) -> Self {
        Self::ObjectStore(value)
    }
}

#[async_trait::async_trait(?Send)]
pub(crate) trait Store: Clone + Debug {
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Upload `bytes` under `key` in a single request, returning the object's permanent URL
    async fn save_bytes(
        &self,
        key: &ObjectKey,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<Url, StoreError>;

    async fn remove(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// A time-limited GET URL for `key`. Existence is not checked.
    async fn signed_url(&self, key: &ObjectKey, expires_in: Duration) -> Result<Url, StoreError>;

    fn public_url(&self, key: &ObjectKey) -> Result<Url, StoreError>;

    /// Recover the key from a URL previously returned by [`Store::public_url`]
    fn key_from_url(&self, url: &Url) -> Option<ObjectKey>;
}
