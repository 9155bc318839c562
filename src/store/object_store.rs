use crate::{
    config::ObjectStorage,
    future::WithMetrics,
    store::{ObjectKey, Store, StoreError},
};
use actix_web::web::Bytes;
use object_store::{
    aws::{AmazonS3, AmazonS3Builder},
    path::Path,
    signer::Signer,
    Attribute, AttributeValue, Attributes, ClientOptions, ObjectStore as _, PutOptions,
    PutPayload,
};
use std::{sync::Arc, time::Duration};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ObjectError {
    #[error("Failed to build object storage client")]
    Build(#[source] object_store::Error),

    #[error("Failed to upload object")]
    Put(#[source] object_store::Error),

    #[error("Failed to remove object")]
    Delete(#[source] object_store::Error),

    #[error("Failed to sign object url")]
    Sign(#[source] object_store::Error),

    #[error("Object storage is unreachable")]
    Health(#[source] object_store::Error),

    #[error("Invalid object url")]
    Url(#[source] url::ParseError),

    #[error("Endpoint {0} has no host")]
    EndpointHost(Url),
}

#[derive(Clone)]
pub(crate) struct ObjectStore {
    client: Arc<AmazonS3>,
    bucket_name: String,
    public_base: Url,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("bucket_name", &self.bucket_name)
            .field("public_base", &self.public_base.as_str())
            .finish()
    }
}

fn location(key: &ObjectKey) -> Path {
    Path::from(key.to_string())
}

#[async_trait::async_trait(?Send)]
impl Store for ObjectStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        match self.client.head(&Path::from("tubely-health-check")).await {
            Ok(_) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(ObjectError::Health(e).into()),
        }
    }

    #[tracing::instrument(skip(self, bytes), fields(key = %key, size = bytes.len()))]
    async fn save_bytes(
        &self,
        key: &ObjectKey,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<Url, StoreError> {
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );

        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.client
            .put_opts(&location(key), PutPayload::from(bytes), opts)
            .with_metrics(crate::init_metrics::OBJECT_STORAGE_PUT)
            .await
            .map_err(ObjectError::Put)?;

        tracing::debug!("Uploaded object");

        self.public_url(key)
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn remove(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.client
            .delete(&location(key))
            .with_metrics(crate::init_metrics::OBJECT_STORAGE_DELETE)
            .await
            .map_err(ObjectError::Delete)?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn signed_url(&self, key: &ObjectKey, expires_in: Duration) -> Result<Url, StoreError> {
        let url = self
            .client
            .signed_url(reqwest::Method::GET, &location(key), expires_in)
            .with_metrics(crate::init_metrics::OBJECT_STORAGE_SIGN)
            .await
            .map_err(ObjectError::Sign)?;

        Ok(url)
    }

    fn public_url(&self, key: &ObjectKey) -> Result<Url, StoreError> {
        let url = self
            .public_base
            .join(&key.to_string())
            .map_err(ObjectError::Url)?;

        Ok(url)
    }

    fn key_from_url(&self, url: &Url) -> Option<ObjectKey> {
        url.as_str()
            .strip_prefix(self.public_base.as_str())
            .and_then(ObjectKey::parse)
    }
}

impl ObjectStore {
    pub(crate) fn build(config: &ObjectStorage) -> Result<Self, StoreError> {
        let ObjectStorage {
            endpoint,
            bucket_name,
            use_path_style,
            region,
            access_key,
            secret_key,
            session_token,
            client_timeout,
            public_endpoint,
            ..
        } = config;

        let builder = if access_key.is_some() {
            AmazonS3Builder::new()
        } else {
            AmazonS3Builder::from_env()
        };

        let mut builder = builder
            .with_bucket_name(bucket_name)
            .with_region(region)
            .with_client_options(
                ClientOptions::new().with_timeout(Duration::from_secs(*client_timeout)),
            );

        if let Some(access_key) = access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }
        if let Some(session_token) = session_token {
            builder = builder.with_token(session_token);
        }

        let bucket_endpoint = match endpoint {
            Some(endpoint) if *use_path_style => {
                let base = endpoint.as_str().trim_end_matches('/').to_string();

                builder = builder
                    .with_endpoint(&base)
                    .with_allow_http(endpoint.scheme() == "http")
                    .with_virtual_hosted_style_request(false);

                Some(with_trailing_slash(format!("{base}/{bucket_name}"))?)
            }
            Some(endpoint) => {
                let host = endpoint
                    .host_str()
                    .ok_or_else(|| ObjectError::EndpointHost(endpoint.clone()))?;

                let mut virtual_host = endpoint.clone();
                virtual_host
                    .set_host(Some(&format!("{bucket_name}.{host}")))
                    .map_err(ObjectError::Url)?;

                let base = virtual_host.as_str().trim_end_matches('/').to_string();

                builder = builder
                    .with_endpoint(&base)
                    .with_allow_http(endpoint.scheme() == "http")
                    .with_virtual_hosted_style_request(true);

                Some(with_trailing_slash(base)?)
            }
            None => None,
        };

        let client = builder.build().map_err(ObjectError::Build)?;

        let public_base = match (public_endpoint, bucket_endpoint) {
            (Some(public_endpoint), _) => {
                with_trailing_slash(public_endpoint.as_str().trim_end_matches('/').to_string())?
            }
            (None, Some(bucket_endpoint)) => bucket_endpoint,
            (None, None) => with_trailing_slash(format!(
                "https://{bucket_name}.s3.{region}.amazonaws.com"
            ))?,
        };

        Ok(ObjectStore {
            client: Arc::new(client),
            bucket_name: bucket_name.clone(),
            public_base,
        })
    }
}

fn with_trailing_slash(base: String) -> Result<Url, ObjectError> {
    Url::parse(&format!("{base}/")).map_err(ObjectError::Url)
}

#[cfg(test)]
mod tests {
    use super::ObjectStore;
    use crate::{
        aspect::AspectCategory,
        config::ObjectStorage,
        store::{ObjectKey, Store},
    };
    use std::time::Duration;

    fn config() -> ObjectStorage {
        ObjectStorage {
            endpoint: None,
            bucket_name: String::from("tubely-videos"),
            use_path_style: false,
            region: String::from("us-east-2"),
            access_key: Some(String::from("AKIDEXAMPLE")),
            secret_key: Some(String::from("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")),
            session_token: None,
            signature_duration: 300,
            client_timeout: 30,
            public_endpoint: None,
        }
    }

    #[test]
    fn aws_public_url() {
        let store = ObjectStore::build(&config()).expect("Built store");
        let key = ObjectKey::generate(AspectCategory::Landscape);

        let url = store.public_url(&key).expect("Valid url");

        assert_eq!(
            url.as_str(),
            format!("https://tubely-videos.s3.us-east-2.amazonaws.com/{key}")
        );
    }

    #[test]
    fn path_style_public_url() {
        let store = ObjectStore::build(&ObjectStorage {
            endpoint: Some("http://localhost:9000".parse().expect("Valid url")),
            use_path_style: true,
            ..config()
        })
        .expect("Built store");
        let key = ObjectKey::generate(AspectCategory::Portrait);

        let url = store.public_url(&key).expect("Valid url");

        assert_eq!(
            url.as_str(),
            format!("http://localhost:9000/tubely-videos/{key}")
        );
    }

    #[test]
    fn virtual_host_public_url() {
        let store = ObjectStore::build(&ObjectStorage {
            endpoint: Some("https://nyc3.digitaloceanspaces.com".parse().expect("Valid url")),
            ..config()
        })
        .expect("Built store");
        let key = ObjectKey::generate(AspectCategory::Other);

        let url = store.public_url(&key).expect("Valid url");

        assert_eq!(
            url.as_str(),
            format!("https://tubely-videos.nyc3.digitaloceanspaces.com/{key}")
        );
    }

    #[test]
    fn public_endpoint_wins() {
        let store = ObjectStore::build(&ObjectStorage {
            public_endpoint: Some("https://cdn.example.com/videos/".parse().expect("Valid url")),
            ..config()
        })
        .expect("Built store");
        let key = ObjectKey::generate(AspectCategory::Landscape);

        let url = store.public_url(&key).expect("Valid url");

        assert_eq!(
            url.as_str(),
            format!("https://cdn.example.com/videos/{key}")
        );
        assert_eq!(store.key_from_url(&url), Some(key));
    }

    #[test]
    fn key_from_foreign_url() {
        let store = ObjectStore::build(&config()).expect("Built store");

        let foreign = "https://example.com/landscape/abc.mp4"
            .parse()
            .expect("Valid url");

        assert_eq!(store.key_from_url(&foreign), None);
    }

    #[tokio::test]
    async fn signed_url_carries_key_and_expiry() {
        let store = ObjectStore::build(&config()).expect("Built store");
        let key = ObjectKey::generate(AspectCategory::Landscape);

        let url = store
            .signed_url(&key, Duration::from_secs(300))
            .await
            .expect("Signed url");

        assert!(url.path().ends_with(&key.to_string()), "{url}");

        let expires = url
            .query_pairs()
            .find(|(name, _)| name == "X-Amz-Expires")
            .map(|(_, value)| value.into_owned());

        assert_eq!(expires.as_deref(), Some("300"));
        assert!(url.query_pairs().any(|(name, _)| name == "X-Amz-Signature"));
    }
}
