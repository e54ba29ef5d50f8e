//! Aggregation of per-worker test results.

use std::fmt;
use std::time::Duration;

/// Outcome of one test worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerResult {
    pub id: usize,
    /// Identifier assigned by the relayer.
    pub session: Option<String>,
    pub connected: bool,
    pub connect_dur: Duration,
    pub send_dur: Duration,
    pub recv_dur: Duration,
    pub msgs_sent: usize,
    /// Own messages echoed back by the relayer.
    pub msgs_recvd: usize,
    pub connect_err: Option<String>,
    pub send_err: Option<String>,
    pub recv_err: Option<String>,
    /// Why receiving stopped before every echo arrived.
    pub stop_reason: Option<String>,
    /// Contents of an `error` envelope from the relayer.
    pub server_err: Option<String>,
}

impl WorkerResult {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn passed(&self, msgs_per_conn: usize) -> bool {
        self.connected && self.msgs_sent == msgs_per_conn && self.msgs_recvd == msgs_per_conn
    }
}

/// Min / mean / max over a set of durations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationStats {
    pub count: usize,
    pub total: Duration,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl DurationStats {
    pub fn add(&mut self, d: Duration) {
        self.count += 1;
        self.total += d;
        self.min = Some(self.min.map_or(d, |m| m.min(d)));
        self.max = Some(self.max.map_or(d, |m| m.max(d)));
    }

    pub fn mean(&self) -> Option<Duration> {
        let count = u32::try_from(self.count).ok().filter(|&c| c > 0)?;
        Some(self.total / count)
    }
}

/// Min / mean / max over message counts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CountStats {
    pub count: usize,
    pub total: usize,
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl CountStats {
    pub fn add(&mut self, n: usize) {
        self.count += 1;
        self.total += n;
        self.min = Some(self.min.map_or(n, |m| m.min(n)));
        self.max = Some(self.max.map_or(n, |m| m.max(n)));
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total as f64 / self.count as f64)
    }
}

/// One phase (connect, send, receive), split by whether it succeeded.
#[derive(Debug, Clone, Default)]
pub struct Phase {
    pub passed: DurationStats,
    pub failed: DurationStats,
    /// Messages handled by workers that failed this phase.
    pub failed_msgs: CountStats,
}

#[derive(Debug, Clone, Default)]
pub struct Errors {
    pub connect: Vec<String>,
    pub send: Vec<String>,
    pub recv: Vec<String>,
    pub stop_reasons: Vec<String>,
    pub server: Vec<String>,
}

impl Errors {
    fn categories(&self) -> [(&'static str, &[String]); 5] {
        [
            ("Connect error", self.connect.as_slice()),
            ("Send error", self.send.as_slice()),
            ("Receive error", self.recv.as_slice()),
            ("Stopped receiving", self.stop_reasons.as_slice()),
            ("Server error", self.server.as_slice()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub total: usize,
    pub passed: usize,
    pub msgs_per_conn: usize,
    pub elapsed: Duration,
    pub connect: Phase,
    pub send: Phase,
    pub recv: Phase,
    pub errors: Errors,
}

impl Report {
    pub fn new(results: &[WorkerResult], msgs_per_conn: usize, elapsed: Duration) -> Self {
        let mut report = Self {
            total: results.len(),
            passed: 0,
            msgs_per_conn,
            elapsed,
            connect: Phase::default(),
            send: Phase::default(),
            recv: Phase::default(),
            errors: Errors::default(),
        };

        for r in results {
            if r.passed(msgs_per_conn) {
                report.passed += 1;
            }
            if !r.connected {
                report.connect.failed.add(r.connect_dur);
                report
                    .errors
                    .connect
                    .push(r.connect_err.clone().unwrap_or_default());
                continue;
            }
            report.connect.passed.add(r.connect_dur);

            if r.msgs_sent == msgs_per_conn {
                report.send.passed.add(r.send_dur);
            } else {
                report.send.failed.add(r.send_dur);
                report.send.failed_msgs.add(r.msgs_sent);
                if let Some(e) = &r.send_err {
                    report.errors.send.push(e.clone());
                }
            }

            if r.msgs_recvd == msgs_per_conn {
                report.recv.passed.add(r.recv_dur);
            } else {
                report.recv.failed.add(r.recv_dur);
                report.recv.failed_msgs.add(r.msgs_recvd);
                if let Some(e) = &r.recv_err {
                    report.errors.recv.push(e.clone());
                } else if let Some(reason) = &r.stop_reason {
                    report.errors.stop_reasons.push(reason.clone());
                } else if let Some(e) = &r.server_err {
                    report.errors.server.push(e.clone());
                }
            }
        }
        report
    }

    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.passed as f64 / self.total as f64 * 100.0
    }
}

fn secs(d: Option<Duration>) -> String {
    d.map_or_else(|| "-".to_string(), |d| format!("{:.6}", d.as_secs_f64()))
}

fn write_phase(f: &mut fmt::Formatter<'_>, name: &str, phase: &Phase) -> fmt::Result {
    let all = phase.passed.total + phase.failed.total;
    let n = phase.passed.count + phase.failed.count;
    let mean_all = u32::try_from(n).ok().filter(|&n| n > 0).map(|n| all / n);
    writeln!(f, "Average time to {} (total): {} secs", name, secs(mean_all))?;
    if phase.passed.count > 0 {
        writeln!(
            f,
            "\tMin, Average, Max time to {} (passed): {}, {}, {} secs",
            name,
            secs(phase.passed.min),
            secs(phase.passed.mean()),
            secs(phase.passed.max)
        )?;
    }
    if phase.failed.count > 0 {
        writeln!(
            f,
            "\tAverage, Max time to {} (failed): {}, {} secs",
            name,
            secs(phase.failed.mean()),
            secs(phase.failed.max)
        )?;
    }
    if let (Some(min), Some(mean), Some(max)) = (
        phase.failed_msgs.min,
        phase.failed_msgs.mean(),
        phase.failed_msgs.max,
    ) {
        writeln!(
            f,
            "\t\tMin, Average, Max number of messages (failed): {}, {:.3}, {} msgs",
            min, mean, max
        )?;
    }
    writeln!(f)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total test time: {:.6} secs",
            self.elapsed.as_secs_f64()
        )?;
        writeln!(
            f,
            "{} passed, {} failed, {} total ({:.2}% passed)",
            self.passed,
            self.failed(),
            self.total,
            self.pass_rate()
        )?;
        writeln!(f)?;

        write_phase(f, "connect", &self.connect)?;
        if self.connect.passed.count > 0 {
            write_phase(f, "send msgs", &self.send)?;
            write_phase(f, "receive msgs", &self.recv)?;
        }

        for (name, errors) in self.errors.categories() {
            if let Some(first) = errors.first() {
                writeln!(f, "{} ({} total), first: {}", name, errors.len(), first)?;
            }
        }
        Ok(())
    }
}
