use clap::Parser;
use hitcount_server::server::{serve_metrics, HitsServer};
use hitcount_server::{store, Api, Config, CorsPolicy, CounterService};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "hitcount-server", version, about = "Page-view counter API")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "HITCOUNT_CONFIG")]
    config: Option<String>,
    /// Listen port, overrides `listen.port`
    #[arg(short, long, env = "HITCOUNT_PORT")]
    port: Option<u16>,
    /// Redis URL; selects the Redis store
    #[arg(long, env = "HITCOUNT_REDIS_URL")]
    redis_url: Option<String>,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(url) = args.redis_url {
        config.use_redis(url);
    }
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.listen.worker_threads())
        .enable_all()
        .build()?;

    info!(
        "Starting hitcount on port {} with {} store",
        config.listen.port,
        config.store.backend.as_str()
    );
    let store = store::open(&config.store)?;

    runtime.block_on(run(config, store))
}

async fn run(config: Config, store: std::sync::Arc<dyn store::CounterStore>) -> anyhow::Result<()> {
    let api = Api::new(
        CounterService::new(store),
        CorsPolicy::from_config(&config.cors),
    )?;
    let addr: SocketAddr = format!("{}:{}", config.listen.host, config.listen.port).parse()?;
    let server = HitsServer::bind(addr, api).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    let metrics_task = if config.metrics.enabled {
        let metrics_addr: SocketAddr =
            format!("{}:{}", config.listen.host, config.metrics.port).parse()?;
        let listener = TcpListener::bind(metrics_addr).await?;
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(serve_metrics(listener, shutdown(rx))))
    } else {
        None
    };

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received ctrl-c");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Unable to listen for ctrl-c: {}", e);
                // keep the sender alive so the servers are not stopped
                std::future::pending::<()>().await;
            }
        }
    });

    if let Err(e) = server.run_until(shutdown(shutdown_rx)).await {
        error!("Server error: {}", e);
        return Err(anyhow::anyhow!(e));
    }

    if let Some(task) = metrics_task {
        if let Ok(Err(e)) = task.await {
            error!("Metrics server error: {}", e);
        }
    }
    Ok(())
}
