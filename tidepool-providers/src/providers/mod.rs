//! Reference provider implementations.

use tidepool_core::{HttpResponse, ProviderError};

pub mod demo;
pub mod magneto;
pub mod torrent_api;

pub use demo::DemoFeedProvider;
pub use magneto::MagnetoProvider;
pub use torrent_api::TorrentApiProvider;

/// Normalizes a base URL, rejecting anything that is not absolute http(s).
fn validate_base_url(provider: &str, base_url: &str) -> Result<String, ProviderError> {
    let parsed = url::Url::parse(base_url).map_err(|e| ProviderError::Configuration {
        provider: provider.to_string(),
        reason: format!("invalid base url '{base_url}': {e}"),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ProviderError::Configuration {
            provider: provider.to_string(),
            reason: format!("unsupported scheme in base url '{base_url}'"),
        });
    }

    Ok(base_url.trim_end_matches('/').to_string())
}

fn check_status(provider: &str, response: &HttpResponse) -> Result<(), ProviderError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ProviderError::Status {
            provider: provider.to_string(),
            status: response.status,
            url: response.url.clone(),
        })
    }
}
