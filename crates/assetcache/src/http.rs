//! Support for downloading assets over HTTP.

use futures::future::BoxFuture;
use reqwest::{header, Client, StatusCode, Url};

use crate::cacher::AssetRequest;
use crate::error::{CacheContents, CacheError};

const USER_AGENT: &str = concat!("assetcache/", env!("CARGO_PKG_VERSION"));

impl From<reqwest::Error> for CacheError {
    fn from(error: reqwest::Error) -> Self {
        Self::download_error(&error)
    }
}

/// Downloader for assets hosted on plain HTTP servers.
///
/// The client is used exactly as handed in; in particular no request timeout
/// is applied by the downloader itself, so a stalled server stalls the
/// download and everyone attached to it.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches the asset bytes at `url`.
    pub async fn download(&self, url: &str) -> CacheContents<Vec<u8>> {
        let url = Url::parse(url).map_err(|e| CacheError::InvalidUrl(e.to_string()))?;

        tracing::debug!("Fetching asset from `{url}`");

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.bytes().await?.to_vec());
        }

        if matches!(status, StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED) {
            Err(CacheError::PermissionDenied(status.to_string()))
        } else if status.is_client_error() {
            // If it's a client error, chances are it's a 404.
            Err(CacheError::NotFound)
        } else {
            Err(CacheError::DownloadError(status.to_string()))
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

/// An [`AssetRequest`] that pairs the HTTP transport with a decode function.
///
/// This is the ready-made way of constructing an
/// [`AssetCache`](crate::AssetCache): callers only supply the conversion
/// from raw bytes to their asset type.
#[derive(Debug, Clone)]
pub struct HttpAssetRequest<D> {
    downloader: HttpDownloader,
    decoder: D,
}

impl<D> HttpAssetRequest<D> {
    /// Creates a request with a default HTTP client.
    pub fn new(decoder: D) -> Self {
        Self::with_downloader(HttpDownloader::default(), decoder)
    }

    /// Creates a request downloading through the given downloader.
    pub fn with_downloader(downloader: HttpDownloader, decoder: D) -> Self {
        Self { downloader, decoder }
    }
}

impl<D, A> AssetRequest for HttpAssetRequest<D>
where
    D: Fn(&[u8]) -> CacheContents<A> + 'static + Send + Sync + Clone,
    A: 'static + Send + Sync + Clone,
{
    type Asset = A;

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, CacheContents<Vec<u8>>> {
        Box::pin(self.downloader.download(url))
    }

    fn decode(&self, bytes: &[u8]) -> CacheContents<Self::Asset> {
        (self.decoder)(bytes)
    }
}
