//! Optional CSV trace files for the pacer, bandwidth estimator, RFC 8888
//! feedback, and outbound frame sizes. Writers live off the hot path: rows
//! are appended to an in-memory buffer and flushed every
//! [`FLUSH_EVERY`] rows, never on every packet.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

const FLUSH_EVERY: usize = 64;

pub struct CsvTrace {
    writer: BufWriter<File>,
    pending: usize,
}

impl CsvTrace {
    fn open(path: impl AsRef<Path>, header: &str) -> std::io::Result<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "{header}")?;
        }
        Ok(Self { writer, pending: 0 })
    }

    fn row(&mut self, line: &str) {
        if writeln!(self.writer, "{line}").is_err() {
            return;
        }
        self.pending += 1;
        if self.pending >= FLUSH_EVERY {
            let _ = self.writer.flush();
            self.pending = 0;
        }
    }
}

impl Drop for CsvTrace {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Bundles the four diagnostic traces named in the persistent-state layout.
/// Any trace that fails to open (e.g. an unwritable working directory) is
/// left absent and its `record_*` call becomes a no-op.
pub struct Diagnostics {
    pacer: Option<CsvTrace>,
    gcc: Option<CsvTrace>,
    rfc8888: Option<CsvTrace>,
    frame_size: Option<CsvTrace>,
}

impl Diagnostics {
    /// Open all four traces in `dir`. Errors opening an individual file are
    /// logged and that trace is disabled; the session continues either way.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let open = |name: &str, header: &str| match CsvTrace::open(dir.join(name), header) {
            Ok(trace) => Some(trace),
            Err(e) => {
                log::warn!("diagnostics: failed to open {name}: {e}");
                None
            }
        };
        Self {
            pacer: open("leaky_bucket_pacer.csv", "timestamp_ms,budget_bytes,queue_len"),
            gcc: open(
                "gcc_stats.csv",
                "timestamp_ms,target_bitrate,delay_state,loss_ratio",
            ),
            rfc8888: open("rfc8888.csv", "timestamp_ms,ssrc,rtt_ms,loss_ratio"),
            frame_size: open("frame_size.csv", "timestamp_ms,frame_id,bytes,is_key_frame"),
        }
    }

    pub fn record_pacer(&mut self, timestamp_ms: u64, budget_bytes: f64, queue_len: usize) {
        if let Some(trace) = &mut self.pacer {
            trace.row(&format!("{timestamp_ms},{budget_bytes:.1},{queue_len}"));
        }
    }

    pub fn record_gcc(&mut self, timestamp_ms: u64, target_bitrate: i64, delay_state: &str, loss_ratio: f64) {
        if let Some(trace) = &mut self.gcc {
            trace.row(&format!(
                "{timestamp_ms},{target_bitrate},{delay_state},{loss_ratio:.4}"
            ));
        }
    }

    pub fn record_rfc8888(&mut self, timestamp_ms: u64, ssrc: u32, rtt_ms: u64, loss_ratio: f64) {
        if let Some(trace) = &mut self.rfc8888 {
            trace.row(&format!("{timestamp_ms},{ssrc},{rtt_ms},{loss_ratio:.4}"));
        }
    }

    pub fn record_frame_size(&mut self, timestamp_ms: u64, frame_id: u64, bytes: usize, is_key_frame: bool) {
        if let Some(trace) = &mut self.frame_size {
            trace.row(&format!("{timestamp_ms},{frame_id},{bytes},{is_key_frame}"));
        }
    }
}
