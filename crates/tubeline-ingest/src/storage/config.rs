//! S3 connection settings
//!
//! Read from `S3_*` variables, with the `AWS_*` credential names as a
//! fallback. Path-style addressing defaults on when a custom endpoint is
//! given, since MinIO and most self-hosted stores need it.

use std::env;

use crate::error::PipelineError;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_BUCKET: &str = "tubeline";
const DEFAULT_CREDENTIAL: &str = "minioadmin";

/// Connection settings for the S3 artifact store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl S3Config {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let endpoint = var("S3_ENDPOINT");
        let bucket = var("S3_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string());
        if bucket.contains('/') {
            return Err(PipelineError::Config(format!(
                "S3_BUCKET must be a bucket name, got {:?}",
                bucket
            )));
        }

        let path_style = match var("S3_PATH_STYLE") {
            Some(value) => value.trim().parse::<bool>().map_err(|_| {
                PipelineError::Config(format!("S3_PATH_STYLE must be true or false, got {:?}", value))
            })?,
            None => endpoint.is_some(),
        };

        Ok(Self {
            region: var("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key: var("S3_ACCESS_KEY")
                .or_else(|| var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|| DEFAULT_CREDENTIAL.to_string()),
            secret_key: var("S3_SECRET_KEY")
                .or_else(|| var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|| DEFAULT_CREDENTIAL.to_string()),
            endpoint,
            bucket,
            path_style,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<S3Config, PipelineError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        S3Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_target_aws() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config.endpoint, None);
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.bucket, DEFAULT_BUCKET);
        assert!(!config.path_style);
    }

    #[test]
    fn test_endpoint_implies_path_style() {
        let config = from_vars(&[("S3_ENDPOINT", "http://minio:9000"), ("S3_BUCKET", "tfl-landing")]).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(config.bucket, "tfl-landing");
        assert!(config.path_style);

        let virtual_hosted =
            from_vars(&[("S3_ENDPOINT", "http://minio:9000"), ("S3_PATH_STYLE", "false")]).unwrap();
        assert!(!virtual_hosted.path_style);
    }

    #[test]
    fn test_aws_credential_fallback() {
        let config = from_vars(&[
            ("S3_ACCESS_KEY", ""),
            ("AWS_ACCESS_KEY_ID", "AKIA-TEST"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ])
        .unwrap();
        assert_eq!(config.access_key, "AKIA-TEST");
        assert_eq!(config.secret_key, "secret");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(from_vars(&[("S3_PATH_STYLE", "yes")]), Err(PipelineError::Config(_))));
        assert!(matches!(from_vars(&[("S3_BUCKET", "tfl/landing")]), Err(PipelineError::Config(_))));
    }
}
