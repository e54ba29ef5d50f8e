//! Load generator and conformance test.
//!
//! Every worker opens its own connection and sends `msgs_per_conn` chat
//! messages. In test mode each worker also checks that the relayer echoes
//! every one of its messages back with its own identifier as sender.

mod report;

use std::sync::Arc;
use std::time::Duration;

use shared::{Action, Envelope};
use tokio::sync::Barrier;
use tokio::time::Instant;

use crate::relay_client::{self, ClientError, RelayReader};

pub use report::{DurationStats, Report, WorkerResult};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub addr: String,
    pub conns: usize,
    pub msgs_per_conn: usize,
    pub same_start: bool,
    pub test: bool,
    pub test_timeout: Duration,
}

pub struct Outcome {
    pub elapsed: Duration,
    /// Present in test mode.
    pub report: Option<Report>,
}

pub async fn run(opts: LoadOptions) -> Outcome {
    let start = Instant::now();
    if opts.conns == 0 {
        return Outcome {
            elapsed: start.elapsed(),
            report: None,
        };
    }

    let opts = Arc::new(opts);
    let barrier = opts.same_start.then(|| Arc::new(Barrier::new(opts.conns)));
    let mut workers = Vec::with_capacity(opts.conns);
    for id in 1..=opts.conns {
        let opts = Arc::clone(&opts);
        let barrier = barrier.clone();
        workers.push(tokio::spawn(async move {
            if opts.test {
                Some(run_test_worker(id, &opts, barrier).await)
            } else {
                run_worker(id, &opts, barrier).await;
                None
            }
        }));
    }

    let mut results = Vec::new();
    for worker in workers {
        match worker.await {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "worker panicked"),
        }
    }

    let elapsed = start.elapsed();
    let report = opts
        .test
        .then(|| Report::new(&results, opts.msgs_per_conn, elapsed));
    Outcome { elapsed, report }
}

fn message_text(worker: usize, n: usize) -> String {
    format!("Worker #{}: Message {}", worker, n)
}

async fn wait_for_start(barrier: &Option<Arc<Barrier>>) {
    if let Some(barrier) = barrier {
        barrier.wait().await;
    }
}

async fn run_worker(id: usize, opts: &LoadOptions, barrier: Option<Arc<Barrier>>) {
    let connected = relay_client::connect(&opts.addr).await;
    wait_for_start(&barrier).await;
    let (mut writer, _reader) = match connected {
        Ok(halves) => halves,
        Err(e) => {
            tracing::warn!(worker = id, error = %e, "error connecting");
            return;
        }
    };

    for n in 1..=opts.msgs_per_conn {
        if let Err(e) = writer.send_chat("", &message_text(id, n)).await {
            tracing::warn!(worker = id, message = n, error = %e, "error sending message");
            return;
        }
    }
    let _ = writer.close().await;
}

async fn run_test_worker(
    id: usize,
    opts: &LoadOptions,
    barrier: Option<Arc<Barrier>>,
) -> WorkerResult {
    let mut result = WorkerResult::new(id);

    let start = Instant::now();
    let connected =
        tokio::time::timeout(opts.test_timeout, relay_client::connect(&opts.addr)).await;
    result.connect_dur = start.elapsed();
    wait_for_start(&barrier).await;
    let (mut writer, mut reader) = match connected {
        Ok(Ok(halves)) => halves,
        Ok(Err(e)) => {
            result.connect_err = Some(e.to_string());
            return result;
        }
        Err(_) => {
            result.connect_err = Some("timed out connecting".to_string());
            return result;
        }
    };
    result.connected = true;

    // The first frame must be our own connect notice.
    let first = tokio::time::timeout(opts.test_timeout, reader.next_envelope()).await;
    let session = match first {
        Ok(Ok(env)) if env.action == Action::Connect => env.contents,
        Ok(Ok(env)) => {
            result.stop_reason = Some(unexpected(Action::Connect, &env));
            return result;
        }
        Ok(Err(e)) => {
            result.recv_err = Some(format!("error receiving identifier: {}", e));
            return result;
        }
        Err(_) => {
            result.recv_err = Some("timed out receiving identifier".to_string());
            return result;
        }
    };
    result.session = Some(session.clone());

    let recv = tokio::spawn(receive_echoes(
        reader,
        session.clone(),
        opts.msgs_per_conn,
        opts.test_timeout,
    ));

    let send_start = Instant::now();
    let deadline = send_start + opts.test_timeout;
    let mut sent = 0;
    for n in 1..=opts.msgs_per_conn {
        let text = message_text(id, n);
        match tokio::time::timeout_at(deadline, writer.send_chat(&session, &text)).await {
            Ok(Ok(())) => sent += 1,
            Ok(Err(e)) => {
                result.send_err = Some(e.to_string());
                break;
            }
            Err(_) => {
                result.send_err = Some("timed out sending".to_string());
                break;
            }
        }
    }
    result.send_dur = send_start.elapsed();
    result.msgs_sent = sent;

    match recv.await {
        Ok(echoes) => echoes.apply(&mut result),
        Err(e) => result.recv_err = Some(format!("receiver task failed: {}", e)),
    }
    let _ = writer.close().await;
    result
}

/// What a worker's receive side observed.
#[derive(Debug, Default)]
struct Echoes {
    received: usize,
    duration: Duration,
    recv_err: Option<String>,
    stop_reason: Option<String>,
    server_err: Option<String>,
}

impl Echoes {
    fn apply(self, result: &mut WorkerResult) {
        result.msgs_recvd = self.received;
        result.recv_dur = self.duration;
        result.recv_err = self.recv_err;
        result.stop_reason = self.stop_reason;
        result.server_err = self.server_err;
    }
}

/// Count chat envelopes sent by `session` until `expected` arrived, the
/// relayer reports an error, or announces our own disconnect.
async fn receive_echoes(
    mut reader: RelayReader,
    session: String,
    expected: usize,
    timeout: Duration,
) -> Echoes {
    let start = Instant::now();
    let deadline = start + timeout;
    let mut echoes = Echoes::default();

    while echoes.received < expected {
        let env = match tokio::time::timeout_at(deadline, reader.next_envelope()).await {
            Ok(Ok(env)) => env,
            Ok(Err(ClientError::Envelope(e))) => {
                echoes.recv_err = Some(format!("undecodable frame: {}", e));
                continue;
            }
            Ok(Err(e)) => {
                echoes.recv_err = Some(e.to_string());
                break;
            }
            Err(_) => {
                echoes.recv_err = Some("timed out receiving".to_string());
                break;
            }
        };
        match env.action {
            Action::Chat if env.sender == session => echoes.received += 1,
            Action::Disconnect if env.contents == session => {
                echoes.stop_reason = Some(unexpected(Action::Chat, &env));
                break;
            }
            Action::Error => {
                echoes.server_err = Some(env.contents);
                break;
            }
            _ => {}
        }
    }
    echoes.duration = start.elapsed();
    echoes
}

fn unexpected(expected: Action, got: &Envelope) -> String {
    format!(
        "expected {:?}, got {:?} (contents: {:?})",
        expected.as_str(),
        got.action.as_str(),
        got.contents
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayer::api::{self, AppState};
    use relayer::relay::{connection, RelayState};
    use std::net::SocketAddr;

    async fn start_relayer() -> (String, Arc<RelayState>) {
        let relay = Arc::new(RelayState::default());
        let state = AppState::new(
            Arc::clone(&relay),
            connection::Settings {
                ping_interval: None,
                drain_timeout: Duration::from_secs(1),
            },
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                api::router(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        (format!("ws://{}/", addr), relay)
    }

    fn options(addr: String, test: bool) -> LoadOptions {
        LoadOptions {
            addr,
            conns: 5,
            msgs_per_conn: 3,
            same_start: true,
            test,
            test_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_mode_passes_against_relayer() {
        let (addr, _relay) = start_relayer().await;
        let outcome = run(options(addr, true)).await;
        let report = outcome.report.expect("test mode produces a report");
        assert_eq!(report.total, 5);
        assert_eq!(report.passed, 5, "{}", report);
        assert!(report.errors.connect.is_empty());
    }

    #[tokio::test]
    async fn plain_load_has_no_report() {
        let (addr, _relay) = start_relayer().await;
        let outcome = run(options(addr, false)).await;
        assert!(outcome.report.is_none());
    }

    #[tokio::test]
    async fn unreachable_relayer_fails_every_worker() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let opts = LoadOptions {
            conns: 2,
            ..options(format!("ws://{}/", addr), true)
        };
        let report = run(opts).await.report.unwrap();
        assert_eq!(report.passed, 0);
        assert_eq!(report.errors.connect.len(), 2);
    }

    #[test]
    fn message_text_names_worker_and_sequence() {
        assert_eq!(message_text(3, 7), "Worker #3: Message 7");
    }
}
