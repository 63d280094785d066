use std::env;

/// Default API endpoint, overridable via `DIFFUSION_CLOUD_URL`.
pub const DEFAULT_API_URL: &str = "https://api.diffusion.cloud";
/// Default web endpoint for interactive sign-in, overridable via
/// `DIFFUSION_CLOUD_WEB_URL`.
pub const DEFAULT_WEB_URL: &str = "https://www.diffusion.cloud";

/// Host-supplied performance settings.
///
/// These arrive from the embedding application's configuration; the client
/// only applies the remote-execution caps (see
/// [`clamped_for_cloud`](Self::clamped_for_cloud)).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSettings {
    pub batch_size: u32,
    pub resolution_multiplier: f32,
    /// Upper bound on generated image size, in megapixels.
    pub max_pixel_count: u32,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            batch_size: 4,
            resolution_multiplier: 1.0,
            max_pixel_count: 6,
        }
    }
}

impl PerformanceSettings {
    /// Apply the caps enforced for remote workers: at most 4 images per
    /// batch and 8 megapixels per image.
    pub fn clamped_for_cloud(self) -> Self {
        Self {
            batch_size: self.batch_size.min(4),
            resolution_multiplier: self.resolution_multiplier,
            max_pixel_count: self.max_pixel_count.min(8),
        }
    }
}

/// Connection configuration for [`CloudClient`](crate::CloudClient).
///
/// Use [`ClientConfig::builder()`] for ergonomic construction, or
/// [`ClientConfig::default()`] for the service defaults (environment
/// overrides applied).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base API URL, without a trailing slash.
    pub api_url: String,
    /// Base web URL used to build interactive sign-in links.
    pub web_url: String,
    /// Host performance settings.
    pub performance: PerformanceSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: env::var("DIFFUSION_CLOUD_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
            web_url: env::var("DIFFUSION_CLOUD_WEB_URL").unwrap_or_else(|_| DEFAULT_WEB_URL.into()),
            performance: PerformanceSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: Option<ClientConfig>,
}

impl ClientConfigBuilder {
    fn config(&mut self) -> &mut ClientConfig {
        self.config.get_or_insert_with(ClientConfig::default)
    }

    /// Set the base API URL. A trailing slash is stripped.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.config().api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the base web URL used for sign-in links.
    pub fn with_web_url(mut self, url: impl Into<String>) -> Self {
        self.config().web_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the host performance settings.
    pub fn with_performance(mut self, performance: PerformanceSettings) -> Self {
        self.config().performance = performance;
        self
    }

    /// Build the final [`ClientConfig`].
    pub fn build(mut self) -> ClientConfig {
        self.config().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_strips_trailing_slash() {
        let config = ClientConfig::builder()
            .with_api_url("http://localhost:9000/")
            .with_web_url("http://localhost:9001///")
            .build();
        assert_eq!(config.api_url, "http://localhost:9000");
        assert_eq!(config.web_url, "http://localhost:9001");
    }

    #[test]
    fn test_performance_caps() {
        let settings = PerformanceSettings {
            batch_size: 16,
            resolution_multiplier: 1.5,
            max_pixel_count: 99,
        };
        let clamped = settings.clamped_for_cloud();
        assert_eq!(clamped.batch_size, 4);
        assert_eq!(clamped.max_pixel_count, 8);
        assert_eq!(clamped.resolution_multiplier, 1.5);
    }

    #[test]
    fn test_performance_caps_keep_small_values() {
        let settings = PerformanceSettings {
            batch_size: 2,
            resolution_multiplier: 1.0,
            max_pixel_count: 4,
        };
        let clamped = settings.clamped_for_cloud();
        assert_eq!(clamped.batch_size, 2);
        assert_eq!(clamped.max_pixel_count, 4);
    }
}
