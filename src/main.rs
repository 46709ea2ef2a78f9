use std::process::exit;

use clap::Parser;
use grabber::{DownloadRequest, Grabber, GrabberConfig, ProxyConfig, ProxyType};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let dest_dir = match args.dest_dir {
        Some(dir) => dir,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("Cannot determine the working directory: {e}");
                exit(1);
            }
        },
    };

    let proxy = if let Some(url) = args.http_proxy {
        Some(ProxyConfig {
            url,
            proxy_type: ProxyType::Http,
        })
    } else {
        args.socks_proxy.map(|url| ProxyConfig {
            url,
            proxy_type: ProxyType::Socks5,
        })
    };

    let config = GrabberConfig {
        segment_workers: args.workers,
        proxy,
        ..GrabberConfig::default()
    };

    let grabber = match Grabber::new(config) {
        Ok(grabber) => grabber,
        Err(e) => {
            error!("Failed to start the download engine: {e}");
            exit(1);
        }
    };

    info!(url = %args.url, "downloading");
    let result = grabber
        .download(DownloadRequest {
            url: args.url.clone(),
            dest_path: dest_dir,
            filename: args.output,
            skip_mux: args.skip_mux,
            subs_only: args.subs_only,
        })
        .await;

    grabber.shutdown().await;

    if let Err(e) = result {
        error!(url = %args.url, "Error downloading: {e}");
        exit(1);
    }
}
