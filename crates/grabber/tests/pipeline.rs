//! End-to-end pipeline tests against a local HTTP server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aes::Aes128;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use grabber::crypto::msn_iv;
use grabber::http::create_client;
use grabber::resolver::PlaylistResolver;
use grabber::{DownloadRequest, GrabError, Grabber, GrabberConfig};
use tokio::net::TcpListener;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

const KEY: [u8; 16] = *b"sixteen byte key";

/// Serves `app` on an ephemeral port and returns its base URL.
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", addr.port())
}

/// Deterministic 1 KiB of segment content.
fn segment_data(pos: usize) -> Vec<u8> {
    (0..1024).map(|i| ((i + pos * 7) % 251) as u8).collect()
}

fn encrypt_segment(plain: &[u8], iv: &[u8; 16]) -> Vec<u8> {
    let mut buf = vec![0u8; plain.len() + 16];
    Aes128CbcEnc::new(&KEY.into(), iv.into())
        .encrypt_padded_b2b_mut::<Pkcs7>(plain, &mut buf)
        .unwrap()
        .to_vec()
}

fn test_config(tmp: &std::path::Path) -> GrabberConfig {
    GrabberConfig {
        tmp_dir: tmp.join("tmp"),
        download_retries: 1,
        ..GrabberConfig::default()
    }
}

async fn download(
    base: &str,
    playlist: &str,
    dest: &std::path::Path,
    filename: &str,
) -> Result<(), GrabError> {
    let grabber = Grabber::new(test_config(dest)).unwrap();
    let result = grabber
        .download(DownloadRequest {
            url: format!("{base}/{playlist}"),
            dest_path: dest.to_path_buf(),
            filename: filename.to_string(),
            skip_mux: true,
            subs_only: false,
        })
        .await;
    grabber.shutdown().await;
    result
}

#[tokio::test]
async fn plain_media_playlist_three_segments() {
    const MEDIA: &str =
        "#EXTM3U\n#EXTINF:6,\na.ts\n#EXTINF:6,\nb.ts\n#EXTINF:6,\nc.ts\n#EXT-X-ENDLIST\n";
    let app = Router::new()
        .route("/m.m3u8", get(|| async { MEDIA }))
        .route("/a.ts", get(|| async { segment_data(0) }))
        .route("/b.ts", get(|| async { segment_data(1) }))
        .route("/c.ts", get(|| async { segment_data(2) }));
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    download(&base, "m.m3u8", dest.path(), "out").await.unwrap();

    let assembled = std::fs::read(dest.path().join("out.ts")).unwrap();
    let mut expected = segment_data(0);
    expected.extend(segment_data(1));
    expected.extend(segment_data(2));
    assert_eq!(assembled.len(), 3072);
    assert_eq!(assembled, expected);

    // temp files are consumed
    let leftovers: Vec<_> = std::fs::read_dir(dest.path().join("tmp"))
        .map(|entries| entries.filter_map(Result::ok).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");
}

#[tokio::test]
async fn master_playlist_picks_highest_bandwidth() {
    const MASTER: &str = "#EXTM3U\n\
                          #EXT-X-STREAM-INF:BANDWIDTH=500000\n\
                          low.m3u8\n\
                          #EXT-X-STREAM-INF:BANDWIDTH=2000000\n\
                          high.m3u8\n";
    const LOW: &str = "#EXTM3U\n#EXTINF:6,\nlow0.ts\n";
    const HIGH: &str = "#EXTM3U\n#EXTINF:6,\nhigh0.ts\n#EXTINF:6,\nhigh1.ts\n";
    let app = Router::new()
        .route("/master.m3u8", get(|| async { MASTER }))
        .route("/low.m3u8", get(|| async { LOW }))
        .route("/high.m3u8", get(|| async { HIGH }))
        .route("/low0.ts", get(|| async { b"LOW".to_vec() }))
        .route("/high0.ts", get(|| async { segment_data(10) }))
        .route("/high1.ts", get(|| async { segment_data(11) }));
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    download(&base, "master.m3u8", dest.path(), "out")
        .await
        .unwrap();

    let assembled = std::fs::read(dest.path().join("out.ts")).unwrap();
    let mut expected = segment_data(10);
    expected.extend(segment_data(11));
    assert_eq!(assembled, expected, "expected the 2M variant's segments");
}

#[tokio::test]
async fn aes_128_with_derived_ivs() {
    // no IV declared: segment N decrypts with the 1-indexed MSN IV
    const MEDIA: &str = "#EXTM3U\n\
                         #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
                         #EXTINF:6,\ns0.ts\n#EXTINF:6,\ns1.ts\n#EXT-X-ENDLIST\n";
    let app = Router::new()
        .route("/m.m3u8", get(|| async { MEDIA }))
        .route("/key.bin", get(|| async { KEY.to_vec() }))
        .route(
            "/s0.ts",
            get(|| async { encrypt_segment(&segment_data(0), &msn_iv(0)) }),
        )
        .route(
            "/s1.ts",
            get(|| async { encrypt_segment(&segment_data(1), &msn_iv(1)) }),
        );
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    download(&base, "m.m3u8", dest.path(), "enc").await.unwrap();

    let assembled = std::fs::read(dest.path().join("enc.ts")).unwrap();
    let mut expected = segment_data(0);
    expected.extend(segment_data(1));
    assert_eq!(assembled, expected, "decrypted bytes must match the plaintext");
}

#[tokio::test]
async fn map_uri_leads_encrypted_output_and_shifts_ivs() {
    // the init segment takes position 0, so the first media segment
    // decrypts with the position-1 IV
    const MEDIA: &str = "#EXTM3U\n\
                         #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
                         #EXT-X-MAP:URI=\"init.bin\"\n\
                         #EXTINF:6,\ns0.ts\n#EXTINF:6,\ns1.ts\n#EXT-X-ENDLIST\n";
    let app = Router::new()
        .route("/m.m3u8", get(|| async { MEDIA }))
        .route("/key.bin", get(|| async { KEY.to_vec() }))
        .route(
            "/init.bin",
            get(|| async { encrypt_segment(&segment_data(90), &msn_iv(0)) }),
        )
        .route(
            "/s0.ts",
            get(|| async { encrypt_segment(&segment_data(91), &msn_iv(1)) }),
        )
        .route(
            "/s1.ts",
            get(|| async { encrypt_segment(&segment_data(92), &msn_iv(2)) }),
        );
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    download(&base, "m.m3u8", dest.path(), "mapped")
        .await
        .unwrap();

    let assembled = std::fs::read(dest.path().join("mapped.ts")).unwrap();
    let mut expected = segment_data(90);
    expected.extend(segment_data(91));
    expected.extend(segment_data(92));
    assert_eq!(assembled, expected, "init segment first, media IVs shifted");
}

#[tokio::test]
async fn sample_aes_is_rejected_before_any_fetch() {
    const MEDIA: &str = "#EXTM3U\n\
                         #EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"key.bin\"\n\
                         #EXTINF:6,\ns0.ts\n";
    // the key route intentionally doesn't exist: rejection must come first
    let app = Router::new().route("/m.m3u8", get(|| async { MEDIA }));
    let base = serve(app).await;

    let scratch = std::env::temp_dir();
    let config = Arc::new(test_config(&scratch));
    let client = create_client(&config).unwrap();
    let resolver = PlaylistResolver::new(client, config);

    let err = resolver.resolve(&format!("{base}/m.m3u8")).await.unwrap_err();
    assert!(matches!(err, GrabError::UnsupportedCrypto(_)), "{err}");
}

#[tokio::test]
async fn http_404_segment_leaves_a_gap() {
    let mut media = String::from("#EXTM3U\n");
    for i in 0..20 {
        media.push_str(&format!("#EXTINF:6,\nseg{i}.ts\n"));
    }

    let mut app = Router::new().route(
        "/m.m3u8",
        get(move || {
            let media = media.clone();
            async move { media }
        }),
    );
    for i in 0..20 {
        if i == 7 {
            continue; // this one answers 404
        }
        app = app.route(
            &format!("/seg{i}.ts"),
            get(move || async move { segment_data(i) }),
        );
    }
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    download(&base, "m.m3u8", dest.path(), "gap").await.unwrap();

    let assembled = std::fs::read(dest.path().join("gap.ts")).unwrap();
    let mut expected = Vec::new();
    for i in 0..20 {
        if i != 7 {
            expected.extend(segment_data(i));
        }
    }
    assert_eq!(assembled.len(), 19 * 1024);
    assert_eq!(assembled, expected);
}

#[tokio::test]
async fn subtitles_only_produces_per_language_srt() {
    const MASTER: &str = "#EXTM3U\n\
                          #EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"French\",LANGUAGE=\"fr\",URI=\"subs_fr.m3u8\"\n\
                          #EXT-X-STREAM-INF:BANDWIDTH=2000000,SUBTITLES=\"subs\"\n\
                          video.m3u8\n";
    const VIDEO: &str = "#EXTM3U\n#EXTINF:6,\nv0.ts\n";
    const SUBS: &str = "#EXTM3U\n#EXTINF:6,\nc0.vtt\n#EXTINF:6,\nc1.vtt\n";
    const CUE0: &str = "WEBVTT\n\n00:00:10.000 --> 00:00:11.000\nPremière réplique.\n";
    const CUE1: &str = "WEBVTT\n\n00:00:12.000 --> 00:00:13.500\nSeconde réplique.\n";
    let app = Router::new()
        .route("/master.m3u8", get(|| async { MASTER }))
        .route("/video.m3u8", get(|| async { VIDEO }))
        .route("/subs_fr.m3u8", get(|| async { SUBS }))
        .route("/v0.ts", get(|| async { segment_data(0) }))
        .route("/c0.vtt", get(|| async { CUE0 }))
        .route("/c1.vtt", get(|| async { CUE1 }));
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    let grabber = Grabber::new(test_config(dest.path())).unwrap();
    grabber
        .download(DownloadRequest {
            url: format!("{base}/master.m3u8"),
            dest_path: dest.path().to_path_buf(),
            filename: "movie".to_string(),
            skip_mux: true,
            subs_only: true,
        })
        .await
        .unwrap();
    grabber.shutdown().await;

    let srt = std::fs::read_to_string(dest.path().join("movie_fr.srt")).unwrap();
    // realigned to time zero, merged across segments
    assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,000\nPremière réplique.\n"));
    assert!(srt.contains("2\n00:00:02,000 --> 00:00:03,500\nSeconde réplique.\n"));

    // subs only: no video output
    assert!(!dest.path().join("movie.ts").exists());
}

#[tokio::test]
async fn existing_output_short_circuits_the_download() {
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = hits.clone();
    let app = Router::new().route(
        "/m.m3u8",
        get(move || {
            let hits = handler_hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "#EXTM3U\n#EXTINF:6,\na.ts\n"
            }
        }),
    );
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    std::fs::write(dest.path().join("out.mp4"), b"already muxed").unwrap();

    let grabber = Grabber::new(test_config(dest.path())).unwrap();
    grabber
        .download(DownloadRequest {
            url: format!("{base}/m.m3u8"),
            dest_path: dest.path().to_path_buf(),
            filename: "out".to_string(),
            skip_mux: false,
            subs_only: false,
        })
        .await
        .unwrap();
    grabber.shutdown().await;

    assert_eq!(hits.load(Ordering::SeqCst), 0, "playlist must not be fetched");
    assert_eq!(
        std::fs::read(dest.path().join("out.mp4")).unwrap(),
        b"already muxed"
    );
}

#[tokio::test]
async fn failed_first_attempt_is_retried() {
    const MEDIA: &str = "#EXTM3U\n#EXTINF:6,\na.ts\n";
    let hits = Arc::new(AtomicUsize::new(0));
    let handler_hits = hits.clone();
    let app = Router::new()
        .route(
            "/m.m3u8",
            get(move || {
                let hits = handler_hits.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                    } else {
                        (StatusCode::OK, MEDIA.to_string())
                    }
                }
            }),
        )
        .route("/a.ts", get(|| async { segment_data(0) }));
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    let config = GrabberConfig {
        download_retries: 2,
        ..test_config(dest.path())
    };
    let grabber = Grabber::new(config).unwrap();
    grabber
        .download(DownloadRequest {
            url: format!("{base}/m.m3u8"),
            dest_path: dest.path().to_path_buf(),
            filename: "out".to_string(),
            skip_mux: true,
            subs_only: false,
        })
        .await
        .unwrap();
    grabber.shutdown().await;

    assert_eq!(hits.load(Ordering::SeqCst), 2, "second attempt must refetch");
    assert_eq!(
        std::fs::read(dest.path().join("out.ts")).unwrap(),
        segment_data(0)
    );
}

#[tokio::test]
async fn stalled_download_surfaces_a_timeout() {
    let app = Router::new().route(
        "/m.m3u8",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(800)).await;
            "#EXTM3U\n#EXTINF:6,\na.ts\n"
        }),
    );
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    let config = GrabberConfig {
        download_timeout: Duration::from_millis(150),
        ..test_config(dest.path())
    };
    let grabber = Grabber::new(config).unwrap();
    let err = grabber
        .download(DownloadRequest {
            url: format!("{base}/m.m3u8"),
            dest_path: dest.path().to_path_buf(),
            filename: "out".to_string(),
            skip_mux: true,
            subs_only: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GrabError::Timeout(_)), "{err}");
    grabber.shutdown().await;
}

#[tokio::test]
async fn empty_playlist_body_is_invalid() {
    let app = Router::new().route("/m.m3u8", get(|| async { "" }));
    let base = serve(app).await;

    let dest = tempfile::tempdir().unwrap();
    let err = download(&base, "m.m3u8", dest.path(), "out")
        .await
        .unwrap_err();
    assert!(matches!(err, GrabError::InvalidPlaylist(_)), "{err}");
}
