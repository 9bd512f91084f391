//! Debug tracer for lock and sweep events.
//!
//! Disabled by default; every trace call early-exits on a plain bool when
//! tracing is off. Output is buffered and flushed periodically.
//!
//! ## Environment Variables
//!
//! - `NATIVE_GIL_TRACE`: enable tracing
//!   - `"1"`, `"true"`, or `"stdout"`: write to stdout
//!   - `"stderr"`: write to stderr
//!   - `<path>`: write to file at path
//!
//! - `NATIVE_GIL_TRACE_FLUSH_INTERVAL`: number of messages before auto-flush
//!   (default: 1000)

use parking_lot::Mutex;
use std::{
    env,
    fmt::Arguments,
    fs::File,
    io::{stderr, stdout, BufWriter, Write},
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

const BUFFER_SIZE: usize = 64 * 1024;
const AUTO_FLUSH_INTERVAL: usize = 1_000;

pub struct Tracer {
    enabled: bool,
    // Behind a mutex rather than a thread-local cell: the lock this traces
    // is shared by every thread crossing the native boundary.
    writer: Mutex<Option<BufWriter<Box<dyn Write + Send>>>>,
    message_count: AtomicUsize,
    auto_flush_interval: usize,
}

impl Tracer {
    pub fn new() -> Self {
        let trace_env = env::var("NATIVE_GIL_TRACE");
        let (enabled, writer): (bool, Option<Box<dyn Write + Send>>) = match trace_env {
            Ok(val) if val == "1" || val == "true" || val == "stdout" => {
                (true, Some(Box::new(stdout())))
            }
            Ok(val) if val == "stderr" => (true, Some(Box::new(stderr()))),
            Ok(val) if !val.is_empty() => match File::create(&val) {
                Ok(f) => (true, Some(Box::new(f))),
                Err(_) => (false, None),
            },
            _ => (false, None),
        };

        let auto_flush_interval = env::var("NATIVE_GIL_TRACE_FLUSH_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(AUTO_FLUSH_INTERVAL);

        Self {
            enabled,
            writer: Mutex::new(writer.map(|w| BufWriter::with_capacity(BUFFER_SIZE, w))),
            message_count: AtomicUsize::new(0),
            auto_flush_interval,
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn write_line(&self, args: Arguments<'_>) {
        let mut writer = self.writer.lock();
        if let Some(w) = writer.as_mut() {
            let _ = writeln!(w, "[gil] {:?} {}", thread::current().id(), args);
            let count = self.message_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % self.auto_flush_interval == 0 {
                let _ = w.flush();
            }
        }
    }

    pub fn trace_acquire(&self, depth: usize) {
        if !self.enabled {
            return;
        }
        self.write_line(format_args!("acquire depth={depth}"));
    }

    pub fn trace_release(&self, depth: usize, cleanup: bool) {
        if !self.enabled {
            return;
        }
        self.write_line(format_args!("release depth={depth} cleanup={cleanup}"));
    }

    pub fn trace_drain(&self, drained: usize) {
        if !self.enabled {
            return;
        }
        self.write_line(format_args!("drain levels={drained}"));
    }

    pub fn trace_sweep(&self, duration: Duration, ok: bool) {
        if !self.enabled {
            return;
        }
        self.write_line(format_args!(
            "sweep us={} ok={ok}",
            duration.as_micros()
        ));
    }

    pub fn flush(&self) {
        if let Some(w) = self.writer.lock().as_mut() {
            let _ = w.flush();
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}
