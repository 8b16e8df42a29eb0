//! S3-compatible artifact store

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};
use tubeline_common::types::ArtifactKey;

use super::{config::S3Config, ArtifactStore};
use crate::error::StoreError;

/// Artifact store over one bucket. Artifact keys map to object keys with
/// any leading `/` removed.
#[derive(Clone)]
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
}

impl S3ArtifactStore {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "tubeline-storage",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version_latest()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, "S3 artifact store initialized");

        Self {
            client,
            bucket: config.bucket,
        }
    }

    fn object_key(key: &ArtifactKey) -> &str {
        key.as_str().trim_start_matches('/')
    }

    fn failure<E>(key: &ArtifactKey, err: E) -> StoreError
    where
        E: std::error::Error,
    {
        StoreError::ObjectStore {
            key: key.clone(),
            message: DisplayErrorContext(err).to_string(),
        }
    }

    async fn delete(&self, key: &ArtifactKey) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(Self::object_key(key))
            .send()
            .await
            .map_err(|e| Self::failure(key, e))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    #[instrument(skip(self, data), fields(artifact = %key, bytes = data.len()))]
    async fn write(&self, key: &ArtifactKey, data: Vec<u8>) -> Result<(), StoreError> {
        if self.exists(key).await? {
            return Err(StoreError::AlreadyExists { key: key.clone() });
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::object_key(key))
            .content_type("application/json")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| Self::failure(key, e))?;

        debug!(bucket = %self.bucket, "Artifact uploaded");
        Ok(())
    }

    async fn read(&self, key: &ArtifactKey) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(Self::object_key(key))
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                err if err.is_no_such_key() => StoreError::NotFound { key: key.clone() },
                err => Self::failure(key, err),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Self::failure(key, e))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    #[instrument(skip(self), fields(from = %from, to = %to))]
    async fn relocate(&self, from: &ArtifactKey, to: &ArtifactKey) -> Result<(), StoreError> {
        if !self.exists(from).await? {
            return Err(StoreError::NotFound { key: from.clone() });
        }
        if self.exists(to).await? {
            return Err(StoreError::AlreadyExists { key: to.clone() });
        }

        let copy_source = format!("{}/{}", self.bucket, Self::object_key(from));
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(&copy_source)
            .key(Self::object_key(to))
            .send()
            .await
            .map_err(|e| Self::failure(to, e))?;

        self.delete(from).await
    }

    async fn exists(&self, key: &ArtifactKey) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(Self::object_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match e.into_service_error() {
                err if err.is_not_found() => Ok(false),
                err => Err(Self::failure(key, err)),
            },
        }
    }

    async fn list(&self, location: &str) -> Result<Vec<ArtifactKey>, StoreError> {
        let location = location.trim_end_matches('/');
        let location_key = ArtifactKey::new(location)?;
        let prefix = format!("{}/", Self::object_key(&location_key));

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .delimiter("/")
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| Self::failure(&location_key, e))?;

            for object in response.contents() {
                if let Some(name) = object.key().and_then(|k| k.strip_prefix(&prefix)) {
                    keys.push(ArtifactKey::join(location, name)?);
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(keys)
    }
}
