use std::io;
use std::sync::Arc;

use pgwire::tokio::process_socket;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::executor::Executor;
use crate::handler::HandlerFactory;

pub struct Server {
    config: Config,
    executor: Arc<Executor>,
}

impl Server {
    pub fn new(config: Config, executor: Executor) -> Self {
        Server {
            config,
            executor: Arc::new(executor),
        }
    }

    /// Accept connections until the listener fails
    pub async fn start(&self) -> io::Result<()> {
        let factory = Arc::new(HandlerFactory::new(self.executor.clone()));

        let server_addr = self.config.listen_addr();
        let listener = TcpListener::bind(&server_addr).await?;
        info!(addr = %server_addr, data_file = %self.config.data_file.display(), "listening");

        loop {
            let (socket, peer) = listener.accept().await?;
            let factory_ref = factory.clone();
            tokio::spawn(async move {
                match process_socket(socket, None, factory_ref).await {
                    Ok(_) => debug!(peer = %peer, "connection closed cleanly"),
                    Err(e) => warn!(peer = %peer, error = ?e, "connection error"),
                }
            });
        }
    }
}
