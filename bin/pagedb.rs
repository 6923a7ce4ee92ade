use pagedb::config::Config;
use pagedb::executor::Executor;
use pagedb::server::Server;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
pub async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_args();
    let executor = match Executor::open(&config) {
        Ok(executor) => executor,
        Err(e) => {
            error!(error = %e, path = %config.data_file.display(), "failed to open database");
            std::process::exit(1);
        }
    };

    let server = Server::new(config, executor);
    if let Err(e) = server.start().await {
        error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}
