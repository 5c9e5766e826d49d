use std::io;
use std::io::BufRead;

use base64::{engine::general_purpose, Engine as _};
use log::{error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

use crate::basic::var::Config;
use crate::decode::B2bDecoder;
use crate::ssr::emit::CorrSink;

// request dialects offered to the caster, newest first: (HTTP version,
// Ntrip-Version header, Connection header). A rejection moves to the next.
const NTRIP_DIALECTS: &[(&str, &str, &str)] = &[
    ("1.1", "Ntrip/2.0", "close"),
    ("1.0", "Ntrip/1.0", "close"),
    ("1.0", "Ntrip/1.0", "keep-alive"),
];

const MAX_ATTEMPTS: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const HEADER_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(1);

fn mount_request(dialect: (&str, &str, &str), host: &str, mountpoint: &str, auth: &str) -> String {
    let (http, ntrip, conn) = dialect;
    format!(
        "GET /{mountpoint} HTTP/{http}\r\n\
         Host: {host}\r\n\
         Authorization: Basic {auth}\r\n\
         Ntrip-Version: {ntrip}\r\n\
         Connection: {conn}\r\n\
         User-Agent: NTRIP b2bssr\r\n\
         \r\n"
    )
}

/// Open a mountpoint on an NTRIP caster. Transport errors are retried up to
/// `MAX_ATTEMPTS`; a caster that answers but refuses the request is offered
/// the next older protocol dialect before giving up.
pub async fn conntrip(
    host: &str,
    port: &str,
    mountpoint: &str,
    username: &str,
    password: &str,
) -> Option<TcpStream> {
    let server = format!("{}:{}", host, port);
    let auth = general_purpose::STANDARD.encode(format!("{}:{}", username, password));

    let mut dialect = 0usize;
    for attempt in 1..=MAX_ATTEMPTS {
        let (http, ntrip, _) = NTRIP_DIALECTS[dialect];
        info!(
            "NTRIP {}: requesting /{} with HTTP/{} {} (attempt {}/{})",
            server, mountpoint, http, ntrip, attempt, MAX_ATTEMPTS
        );

        let mut stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(&server)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                warn!("connect to {} failed: {}", server, e);
                sleep(RETRY_DELAY).await;
                continue;
            }
            Err(_) => {
                warn!("connect to {} timed out", server);
                continue;
            }
        };

        let request = mount_request(NTRIP_DIALECTS[dialect], host, mountpoint, &auth);
        if let Err(e) = stream.write_all(request.as_bytes()).await {
            error!("failed to send mount request: {}", e);
            return None;
        }

        let mut head = [0u8; 1024];
        let n = match timeout(HEADER_TIMEOUT, stream.read(&mut head)).await {
            Ok(Ok(n)) if n > 0 => n,
            _ => {
                warn!("no response header from {}", server);
                sleep(RETRY_DELAY).await;
                continue;
            }
        };
        let head = String::from_utf8_lossy(&head[..n]);

        // "ICY 200 OK" is the classic Ntrip 1.0 greeting
        if head.contains(" 200 ") || head.starts_with("ICY 200 OK") {
            info!("mountpoint /{} accepted by {}", mountpoint, server);
            return Some(stream);
        }

        let status = head.lines().next().unwrap_or("").trim();
        warn!("caster refused /{}: {}", mountpoint, status);
        if dialect + 1 < NTRIP_DIALECTS.len() {
            dialect += 1;
        } else {
            error!("{} accepts none of the known NTRIP dialects", server);
            return None;
        }
    }

    error!("giving up on {} after {} attempts", server, MAX_ATTEMPTS);
    None
}

/// Decode B2b corrections from an NTRIP caster until EOF or a "stop" line
/// on stdin.
pub async fn ntrip2ssr(
    host: &str,
    port: &str,
    mountpoint: &str,
    username: &str,
    password: &str,
    cfg: Config,
    sink: &mut dyn CorrSink,
) {
    let connect = conntrip(host, port, mountpoint, username, password).await;
    let mut stream = match connect {
        Some(s) => s,
        None => return,
    };

    let mut decoder = B2bDecoder::new(cfg);
    let mut buf = vec![0u8; 4096];

    let (tx, mut rx) = mpsc::channel::<String>(100);
    tokio::spawn(async move {
        let stdin = io::stdin();
        let reader = io::BufReader::new(stdin);
        let mut lines = reader.lines();
        while let Some(Ok(input)) = lines.next() {
            if tx.send(input.clone()).await.is_err() {
                break;
            }
            if input.trim() == "stop" {
                return;
            }
        }
    });

    loop {
        tokio::select! {
            read = stream.read(&mut buf) => {
                match read {
                    Ok(0) => {
                        info!("NTRIP stream closed by server");
                        break;
                    }
                    Ok(n) => {
                        decoder.input(&buf[..n], sink);
                    }
                    Err(e) => {
                        error!("Error reading NTRIP stream: {}", e);
                        break;
                    }
                }
            }

            Some(input) = rx.recv() => {
                match input.trim() {
                    "stop" => {
                        info!("Stopping...");
                        break;
                    }
                    _ => {
                        warn!("Unknown command: {}", input.trim());
                    }
                }
            }
        }
    }

    let st = decoder.stats();
    info!(
        "decode summary: frames={} crc_err={} ldpc_ok={} ldpc_fail={} masks={} orbits={} clocks={}",
        st.frames, st.crc_errors, st.ldpc_ok, st.ldpc_fail, st.masks, st.orbits, st.clocks
    );
    if let Some(avg) = st.mean_ldpc_time() {
        info!("mean LDPC decode time: {:?}", avg);
    }
}
