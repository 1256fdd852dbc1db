//! Helpers for testing the asset cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - When using [`tempdir`], make sure that the handle to the temp
//!    directory is held for the entire lifetime of the test. When dropped
//!    too early, the cache directory silently disappears under the cache.
//!    To avoid this, assign it to a variable in the test function
//!    (e.g. `let _cache_dir = tempdir()`).
//!
//!  - When using [`AssetServer`], make sure that the server is held until
//!    all requests to it have been made. If the server is dropped, the
//!    connections to it fail. To avoid this, assign it to a variable:
//!    `let server = AssetServer::new(...)`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{OriginalUri, Path, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::TempDir;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `assetcache`
///    crate and mutes all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("assetcache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use it
/// as a guard to automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a
/// `tokio::test`. It automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Creates a new test server from the given router.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A server for a fixed set of assets that counts the hits it receives.
///
/// Routes:
///
///  - `/download/<name>` serves the asset registered under `name`, or 404.
///  - `/respond_statuscode/<num>/<anything>` responds with the given status.
pub struct AssetServer {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl AssetServer {
    /// Creates a server for the given `name -> bytes` assets.
    pub fn new<'a>(assets: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        let assets: BTreeMap<String, Vec<u8>> = assets
            .into_iter()
            .map(|(name, bytes)| (name.to_owned(), bytes.to_owned()))
            .collect();
        let assets = Arc::new(assets);

        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |OriginalUri(uri): OriginalUri, req: Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(uri.to_string()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let router = Router::new()
            .route(
                "/download/*path",
                get(move |Path(path): Path<String>| {
                    let assets = assets.clone();
                    async move {
                        match assets.get(&path) {
                            Some(bytes) => bytes.clone().into_response(),
                            None => StatusCode::NOT_FOUND.into_response(),
                        }
                    }
                }),
            )
            .route(
                "/respond_statuscode/:num/*tail",
                get(|Path((num, _)): Path<(u16, String)>| async move {
                    StatusCode::from_u16(num).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }),
            )
            .layer(middleware::from_fn(hitcounter));

        let server = Server::with_router(router);

        Self { server, hits }
    }

    /// The total number of requests this server has answered so far.
    ///
    /// Calling this resets all counters.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// All requests this server has answered so far, per URI.
    ///
    /// Calling this resets all counters.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> Url {
        self.server.url(path)
    }
}
