use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "HLS (m3u8) presentation downloader",
    long_about = "Downloads an HTTP Live Streaming presentation and rebuilds it\n\
                  into a single playable file.\n\
                  \n\
                  The playlist is resolved (master playlists follow their best\n\
                  rendition), segments are fetched concurrently and decrypted when\n\
                  AES-128 encrypted, alternate audio and subtitle renditions are\n\
                  collected, and the resulting tracks are muxed with ffmpeg."
)]
pub struct CliArgs {
    /// URL of the m3u8 playlist to download
    #[arg(short, long = "m3u8", help = "Url of the m3u8 file to download")]
    pub url: String,

    /// Name of the output file, without extension
    #[arg(
        short,
        long,
        default_value = "downloaded_video",
        help = "The name of the output file without the extension"
    )]
    pub output: String,

    /// Directory receiving the downloaded files
    #[arg(
        short,
        long,
        help = "Directory to download files to (default: current directory)"
    )]
    pub dest_dir: Option<PathBuf>,

    /// HTTP proxy to route requests through
    #[arg(long, help = "The url of the HTTP proxy to use")]
    pub http_proxy: Option<String>,

    /// SOCKS5 proxy to route requests through
    #[arg(long, help = "<host>:<port> of the socks5 proxy to use")]
    pub socks_proxy: Option<String>,

    /// Only download subtitle renditions
    #[arg(long, help = "Only download the subtitles, skip audio and video")]
    pub subs_only: bool,

    /// Keep the intermediate files instead of muxing them
    #[arg(
        long,
        help = "Skip the final mux and leave the intermediate TS/audio/subtitle files in place"
    )]
    pub skip_mux: bool,

    /// Concurrent segment downloads
    #[arg(
        short = 'w',
        long,
        default_value = "4",
        help = "Number of concurrent segment downloads"
    )]
    pub workers: usize,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}
