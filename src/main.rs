use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use chronos_seek::config::{init_tracing, SearchArgs};
use chronos_seek::server::SeekServer;
use chronos_seek::{HttpRecordFetcher, Resolver};
use tracing::info;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "HTTP service locating records by timestamp", long_about = None)]
struct Args {
    #[clap(long, env = "CHRONOS_SEEK_ADDR", default_value = "127.0.0.1:9000")]
    addr: SocketAddr,

    #[clap(flatten)]
    search: SearchArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info,chronos_seek=info");

    let args = Args::parse();
    let options = args.search.resolver_options()?;
    let fetcher = HttpRecordFetcher::new(args.search.fetcher_config())?;

    info!(
        base_url = %args.search.base_url,
        max_attempts = options.retry.max_attempts,
        upper_bound = options.bounds.upper(),
        "record service configured"
    );

    // One cache for every request this process serves.
    let resolver = Arc::new(Resolver::new(fetcher, options));
    let server = SeekServer::new(resolver);

    tokio::select! {
        _ = server.run(args.addr) => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutting down");
        }
    }
    Ok(())
}
