//! HTTP client for the remote accelerator service
//!
//! Protocol: `POST` with a multipart body whose `file` field carries the raw
//! image, the shared secret in `x-api-key` and optional query parameters. Only
//! a `200` counts as success; its body is the output image.

use super::{AccelerationBackend, ServiceType};
use crate::{
    config::RemoteConfig,
    editing::UpscaleOptions,
    error::{ImagingError, Result},
    services::ImageCodec,
};
use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use tracing::{debug, instrument};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Remote accelerator backend
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: Client,
    config: RemoteConfig,
}

impl RemoteBackend {
    /// Create a backend with the configured request timeout
    ///
    /// # Errors
    /// - HTTP client construction failure
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ImagingError::remote(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Endpoint URL of a service: explicit URL first, then the legacy base
    #[must_use]
    pub fn endpoint(&self, service: ServiceType) -> Option<String> {
        let explicit = match service {
            ServiceType::Upscale => self.config.upscale_url.as_ref(),
            ServiceType::RemoveBackground => self.config.remover_url.as_ref(),
        };
        explicit.cloned().or_else(|| {
            self.config
                .base_url
                .as_ref()
                .map(|base| format!("{}/{}", base.trim_end_matches('/'), service.path()))
        })
    }

    #[instrument(skip(self, image), fields(bytes = image.len()))]
    async fn call(
        &self,
        service: ServiceType,
        image: &[u8],
        params: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        let url = self.endpoint(service).ok_or_else(|| {
            ImagingError::remote(format!("No endpoint configured for {}", service))
        })?;

        let part = multipart::Part::bytes(image.to_vec()).file_name("image");
        let form = multipart::Form::new().part("file", part);
        let mut request = self.client.post(&url).multipart(form);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(secret) = &self.config.secret {
            request = request.header(API_KEY_HEADER, secret);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ImagingError::remote(format!(
                    "{} request timed out after {}s",
                    service, self.config.timeout_secs
                ))
            } else {
                ImagingError::remote(format!("{} request to {} failed: {}", service, url, e))
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ImagingError::remote_status(
                service.path(),
                status.as_u16(),
                &body,
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            ImagingError::remote(format!("Failed to read {} response: {}", service, e))
        })?;
        debug!(%service, response_bytes = body.len(), "Remote accelerator responded");

        // Only a decodable image counts as success
        let decoded = ImageCodec::decode_dynamic(&body).map_err(|e| {
            ImagingError::remote(format!("{} returned an invalid image: {}", service, e))
        })?;
        ImageCodec::encode_dynamic_png(&decoded)
    }
}

#[async_trait]
impl AccelerationBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    fn supports(&self, service: ServiceType) -> bool {
        self.endpoint(service).is_some()
    }

    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>> {
        self.call(ServiceType::RemoveBackground, image, &[]).await
    }

    async fn upscale(&self, image: &[u8], options: &UpscaleOptions) -> Result<Vec<u8>> {
        self.call(
            ServiceType::Upscale,
            image,
            &[("scale", options.factor.to_string())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(config: RemoteConfig) -> RemoteBackend {
        RemoteBackend::new(config).unwrap()
    }

    #[test]
    fn test_explicit_endpoints_win() {
        let remote = backend(RemoteConfig {
            upscale_url: Some("http://up.example/run".into()),
            base_url: Some("http://gpu.example/".into()),
            ..RemoteConfig::default()
        });
        assert_eq!(
            remote.endpoint(ServiceType::Upscale).as_deref(),
            Some("http://up.example/run")
        );
        assert_eq!(
            remote.endpoint(ServiceType::RemoveBackground).as_deref(),
            Some("http://gpu.example/remove-background")
        );
    }

    #[test]
    fn test_unconfigured_service_is_unsupported() {
        let remote = backend(RemoteConfig {
            remover_url: Some("http://rm.example".into()),
            ..RemoteConfig::default()
        });
        assert!(remote.supports(ServiceType::RemoveBackground));
        assert!(!remote.supports(ServiceType::Upscale));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_remote_error() {
        let remote = backend(RemoteConfig::default());
        let err = remote.remove_background(b"bytes").await.unwrap_err();
        assert!(matches!(err, ImagingError::RemoteService(_)));
    }
}
