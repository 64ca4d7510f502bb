// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Apply configurations through the reloader sidecar of the routing daemon: the rendered text is
//! written to a file shared with the sidecar, then a POST asks it to reload.

use crate::frr::ApplyError;
use crate::frr::reloader::ConfigApplier;
use crate::frr::renderer::builder::Render;
use config::internal::FrrConfig;
use hyper::client::conn::http1;
use hyper::{Method, Request, header};
use hyper_util::rt::TokioIo;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
#[allow(unused)]
use tracing::{debug, error, info, warn};

/// How long the reloader has to accept a reload request and answer it.
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct HttpReloader {
    config_path: PathBuf,
    /// `host:port` of the reloader.
    address: String,
    timeout: Duration,
}

impl HttpReloader {
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>, address: impl Into<String>) -> Self {
        Self {
            config_path: config_path.into(),
            address: address.into(),
            timeout: DEFAULT_TRIGGER_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn write(&self, text: String) -> Result<(), ApplyError> {
        debug!("Writing frr config to {}", self.config_path.display());
        tokio::fs::write(&self.config_path, text)
            .await
            .map_err(|source| ApplyError::Write {
                path: self.config_path.clone(),
                source,
            })
    }

    async fn trigger(&self) -> Result<(), ApplyError> {
        timeout(self.timeout, self.post())
            .await
            .map_err(|_| ApplyError::Timeout {
                address: self.address.clone(),
                after: self.timeout,
            })?
    }

    async fn post(&self) -> Result<(), ApplyError> {
        let stream =
            TcpStream::connect(&self.address)
                .await
                .map_err(|source| ApplyError::Connect {
                    address: self.address.clone(),
                    source,
                })?;
        let http_err = |source| ApplyError::Http {
            address: self.address.clone(),
            source,
        };
        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(http_err)?;
        let connection = tokio::spawn(connection);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::HOST, &self.address)
            .body(String::new())?;
        let response = sender.send_request(request).await.map_err(http_err);
        connection.abort();

        let status = response?.status();
        if !status.is_success() {
            return Err(ApplyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

impl ConfigApplier for HttpReloader {
    async fn apply(&self, config: &FrrConfig) -> Result<(), ApplyError> {
        let rendered = config.render(&());
        debug!("FRR configuration is:\n{rendered}");
        self.write(rendered.to_string()).await?;
        self.trigger().await?;
        info!("Reloader at {} accepted the new config", self.address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use config::internal::UnderlayConfig;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    fn config() -> FrrConfig {
        FrrConfig {
            log_level: "debugging".to_string(),
            hostname: "node-0".to_string(),
            underlay: UnderlayConfig {
                asn: 64514,
                vtep: "100.65.0.1/32".parse().unwrap(),
                neighbors: vec![],
            },
            vnis: vec![],
        }
    }

    /// A reloader answering every POST with `status`, counting requests.
    async fn fake_reloader(status: StatusCode) -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    status
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (address, hits)
    }

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("perouter-{name}-{}.conf", std::process::id()))
    }

    #[tokio::test]
    #[traced_test]
    async fn test_apply_writes_and_triggers() {
        let (address, hits) = fake_reloader(StatusCode::OK).await;
        let path = scratch_file("ok");
        let reloader = HttpReloader::new(&path, address.to_string());
        reloader.apply(&config()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("hostname node-0\n"));
        assert!(written.contains("router bgp 64514\n"));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_error_status_fails() {
        let (address, hits) = fake_reloader(StatusCode::INTERNAL_SERVER_ERROR).await;
        let path = scratch_file("status");
        let reloader = HttpReloader::new(&path, address.to_string());
        let err = reloader.apply(&config()).await.unwrap_err();
        assert!(matches!(err, ApplyError::Status(500)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unreachable_reloader_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);
        let path = scratch_file("unreachable");
        let reloader = HttpReloader::new(&path, address.to_string());
        let err = reloader.apply(&config()).await.unwrap_err();
        assert!(matches!(err, ApplyError::Connect { .. }));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_silent_reloader_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });
        let path = scratch_file("silent");
        let reloader = HttpReloader::new(&path, address.to_string())
            .with_timeout(Duration::from_millis(200));
        let err = reloader.apply(&config()).await.unwrap_err();
        assert!(matches!(
            err,
            ApplyError::Timeout { after, .. } if after == Duration::from_millis(200)
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_unwritable_path_fails_before_posting() {
        let (address, hits) = fake_reloader(StatusCode::OK).await;
        let reloader = HttpReloader::new("/nonexistent/dir/frr.conf", address.to_string());
        let err = reloader.apply(&config()).await.unwrap_err();
        assert!(matches!(err, ApplyError::Write { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
