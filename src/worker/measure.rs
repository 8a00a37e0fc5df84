//! Site measurement performed by a single worker.
//!
//! The numbers are a rough, HTTP-level approximation of a page load:
//! time to response headers, time to full body, time spent scanning the
//! body and the body size. Transport errors still yield timings.

use crate::models::{Measurement, SpawnRequest, WorkerMessage};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Raw numbers for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteMetrics {
    pub load_time: f64,
    pub cpu_time: f64,
    pub network_latency: f64,
    pub memory_usage: f64,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Count markup elements in a page body.
fn scan_body(body: &[u8]) -> usize {
    body.windows(2)
        .filter(|w| w[0] == b'<' && w[1].is_ascii_alphabetic())
        .count()
}

/// Fetch `site` once and time it.
pub async fn measure_site(client: &reqwest::Client, site: &str) -> SiteMetrics {
    let start = Instant::now();
    let response = client.get(site).send().await;
    let network_latency = millis(start.elapsed());

    let body = match response {
        Ok(resp) => match resp.bytes().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Failed reading body from {}: {}", site, e);
                None
            }
        },
        Err(e) => {
            warn!("Request to {} failed: {}", site, e);
            None
        }
    };
    let load_time = millis(start.elapsed());

    let (cpu_time, memory_usage) = match body {
        Some(bytes) => {
            let scan_start = Instant::now();
            let elements = scan_body(&bytes);
            let cpu_time = millis(scan_start.elapsed());
            debug!("{}: {} bytes, {} elements", site, bytes.len(), elements);
            (cpu_time, bytes.len() as f64 / BYTES_PER_MB)
        }
        None => (0.0, 0.0),
    };

    SiteMetrics {
        load_time,
        cpu_time,
        network_latency,
        memory_usage,
    }
}

/// Run one worker to completion and produce its single result message.
pub async fn run_worker(client: &reqwest::Client, request: &SpawnRequest) -> WorkerMessage {
    let metrics = measure_site(client, &request.site).await;

    WorkerMessage::BenchmarkResult(Measurement {
        run_id: request.run_id,
        index: request.index,
        site: request.site.clone(),
        load_time: metrics.load_time,
        cpu_time: metrics.cpu_time,
        network_latency: metrics.network_latency,
        memory_usage: metrics.memory_usage,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::RunId;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `body` to every connection on an ephemeral local port.
    pub(crate) async fn serve(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}/", addr)
    }

    #[test]
    fn test_scan_body() {
        assert_eq!(scan_body(b"<html><body><p>1 < 2</p></body></html>"), 3);
        assert_eq!(scan_body(b""), 0);
    }

    #[tokio::test]
    async fn test_measure_local_site() {
        let url = serve("<html><body>hello</body></html>").await;
        let client = reqwest::Client::new();

        let metrics = measure_site(&client, &url).await;
        assert!(metrics.load_time >= metrics.network_latency);
        assert!(metrics.memory_usage > 0.0);
    }

    #[tokio::test]
    async fn test_unreachable_site_still_reports() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = reqwest::Client::new();
        let request = SpawnRequest {
            site: format!("http://{}/", addr),
            run_id: RunId(3),
            index: 2,
        };

        match run_worker(&client, &request).await {
            WorkerMessage::BenchmarkResult(m) => {
                assert_eq!(m.run_id, RunId(3));
                assert_eq!(m.index, 2);
                assert_eq!(m.memory_usage, 0.0);
                assert!(m.load_time >= 0.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
