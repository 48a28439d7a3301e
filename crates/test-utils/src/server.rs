use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use syncds::config::ServerConfig;
use syncds::server::{SyncService, serve};

/// A sync server running on a loopback port for the duration of a test.
pub struct TestServer {
    pub addr: SocketAddr,
    pub service: Arc<SyncService>,
    pub shutdown: CancellationToken,
    handle: JoinHandle<syncds::errors::Result<()>>,
}

impl TestServer {
    pub async fn start(config: &ServerConfig) -> Self {
        let listener = TcpListener::bind(&config.listen)
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let service = Arc::new(SyncService::new(config));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, Arc::clone(&service), shutdown.clone()));
        Self {
            addr,
            service,
            shutdown,
            handle,
        }
    }

    /// `host:port` as the client config expects it.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle
            .await
            .expect("server task panicked")
            .expect("server returned an error");
    }
}
