use std::time::Duration;

use bytes::Bytes;

use crate::helpers::BwError;
use crate::tile::{NetworkStatus, Scheme, TileId};

pub const DEFAULT_TILE_TIMEOUT: Duration = Duration::from_secs(8);

/// Component order of the URL path after the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlPattern {
    Zxy,
    Zyx,
}

/// The blocking fetch seam. `TileLoadService` is the production
/// implementation; tests plug in stubs. Fetches run on the loader pool,
/// never on the worker thread itself.
pub trait TileFetcher: Send + Sync + 'static {
    type Payload: Send + 'static;

    fn fetch(&self, id: TileId) -> (Option<Self::Payload>, NetworkStatus);
}

/// Resolves a tile id against one endpoint and performs a single bounded
/// GET. No retries here; retry policy belongs to the scheduler.
pub struct TileLoadService {
    base_url: String,
    pattern: UrlPattern,
    y_scheme: Scheme,
    extension: String,
    client: reqwest::blocking::Client,
}

impl TileLoadService {
    pub fn new(
        base_url: &str,
        pattern: UrlPattern,
        y_scheme: Scheme,
        extension: &str,
    ) -> Result<Self, BwError> {
        Self::with_timeout(base_url, pattern, y_scheme, extension, DEFAULT_TILE_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        pattern: UrlPattern,
        y_scheme: Scheme,
        extension: &str,
        timeout: Duration,
    ) -> Result<Self, BwError> {
        url::Url::parse(base_url)
            .map_err(|e| BwError::InvalidInput(format!("Bad tile base URL {base_url}: {e}")))?;
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("bergwelt/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| BwError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(TileLoadService {
            base_url: base_url.trim_end_matches('/').to_string(),
            pattern,
            y_scheme,
            extension: extension.to_string(),
            client,
        })
    }

    pub fn build_tile_url(&self, id: TileId) -> String {
        let id = id.to_scheme(self.y_scheme);
        let ext = if self.extension.is_empty() {
            String::new()
        } else {
            format!(".{}", self.extension)
        };
        match self.pattern {
            UrlPattern::Zxy => {
                format!("{}/{}/{}/{}{}", self.base_url, id.zoom_level, id.x, id.y, ext)
            }
            UrlPattern::Zyx => {
                format!("{}/{}/{}/{}{}", self.base_url, id.zoom_level, id.y, id.x, ext)
            }
        }
    }

    fn get(&self, id: TileId) -> (Option<Bytes>, NetworkStatus) {
        let url = self.build_tile_url(id);
        match self.client.get(&url).send() {
            Ok(response) => {
                let status = response.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return (None, NetworkStatus::NotFound);
                }
                if !status.is_success() {
                    log::warn!("Tile GET {url} returned {status}");
                    return (None, NetworkStatus::NetworkError);
                }
                match response.bytes() {
                    Ok(bytes) if bytes.is_empty() => (None, NetworkStatus::NotFound),
                    Ok(bytes) => (Some(bytes), NetworkStatus::Good),
                    Err(e) => {
                        log::warn!("Tile GET {url} body read failed: {e}");
                        (None, NetworkStatus::NetworkError)
                    }
                }
            }
            Err(e) => {
                log::debug!("Tile GET {url} failed: {e}");
                (None, NetworkStatus::NetworkError)
            }
        }
    }
}

impl TileFetcher for TileLoadService {
    type Payload = Bytes;

    fn fetch(&self, id: TileId) -> (Option<Bytes>, NetworkStatus) {
        self.get(id)
    }
}

/// Raw payload pair for one terrain tile; heights and imagery travel the
/// pipeline together because the shipped quad carries both.
#[derive(Debug, Clone)]
pub struct TerrainPayload {
    pub height: Bytes,
    pub ortho: Bytes,
}

/// Pairs the height and ortho endpoints into a single fetch per tile id.
/// A missing layer makes the combined result terminal (NotFound) while a
/// transient failure on either side stays retryable.
pub struct DualFetcher {
    pub heights: TileLoadService,
    pub ortho: TileLoadService,
}

impl TileFetcher for DualFetcher {
    type Payload = TerrainPayload;

    fn fetch(&self, id: TileId) -> (Option<TerrainPayload>, NetworkStatus) {
        let (height, height_status) = self.heights.fetch(id);
        let (ortho, ortho_status) = self.ortho.fetch(id);
        let status = combine_status(height_status, ortho_status);
        match (height, ortho, status) {
            (Some(height), Some(ortho), NetworkStatus::Good) => {
                (Some(TerrainPayload { height, ortho }), NetworkStatus::Good)
            }
            (_, _, status) => (None, status),
        }
    }
}

fn combine_status(a: NetworkStatus, b: NetworkStatus) -> NetworkStatus {
    use NetworkStatus::*;
    match (a, b) {
        (Good, Good) => Good,
        (NotFound, _) | (_, NotFound) => NotFound,
        _ => NetworkError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(pattern: UrlPattern, scheme: Scheme, ext: &str) -> TileLoadService {
        TileLoadService::new("https://tiles.example.org/layer/", pattern, scheme, ext).unwrap()
    }

    #[test]
    fn height_urls_are_zxy_north_up() {
        let svc = service(UrlPattern::Zxy, Scheme::SlippyMap, "png");
        let id = TileId::new(2, 1, 0, Scheme::Tms);
        // y flips from TMS row 0 (south) to slippy row 3
        assert_eq!(
            svc.build_tile_url(id),
            "https://tiles.example.org/layer/2/1/3.png"
        );
    }

    #[test]
    fn ortho_urls_are_zyx_south_up() {
        let svc = service(UrlPattern::Zyx, Scheme::Tms, "jpeg");
        let id = TileId::new(3, 5, 2, Scheme::Tms);
        assert_eq!(
            svc.build_tile_url(id),
            "https://tiles.example.org/layer/3/2/5.jpeg"
        );
    }

    #[test]
    fn poi_urls_have_no_extension() {
        let svc = service(UrlPattern::Zxy, Scheme::Tms, "");
        let id = TileId::new(1, 0, 1, Scheme::Tms);
        assert_eq!(svc.build_tile_url(id), "https://tiles.example.org/layer/1/0/1");
    }

    #[test]
    fn bad_base_url_is_rejected() {
        assert!(TileLoadService::new("not a url", UrlPattern::Zxy, Scheme::Tms, "png").is_err());
    }

    #[test]
    fn combined_status_prefers_terminal_over_transient() {
        use NetworkStatus::*;
        assert_eq!(combine_status(Good, Good), Good);
        assert_eq!(combine_status(NotFound, Good), NotFound);
        assert_eq!(combine_status(Good, NotFound), NotFound);
        assert_eq!(combine_status(NetworkError, NotFound), NotFound);
        assert_eq!(combine_status(NetworkError, Good), NetworkError);
        assert_eq!(combine_status(NetworkError, NetworkError), NetworkError);
    }
}
