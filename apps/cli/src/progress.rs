//! Terminal rendering of upload events.

use panup_transfer::SpeedCalculator;
use panup_upload::UploadEvent;
use tokio::sync::mpsc;

/// Turns [`UploadEvent`]s into status lines.
pub struct ProgressReporter {
    speed: SpeedCalculator,
    size: u64,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self {
            speed: SpeedCalculator::default(),
            size: 0,
        }
    }
}

impl ProgressReporter {
    /// Returns the line to print for `event`, if any.
    pub fn line(&mut self, event: &UploadEvent) -> Option<String> {
        match event {
            UploadEvent::Hashing { filename, size } => {
                self.size = *size;
                Some(format!("hashing {filename} ({})", format_bytes(*size)))
            }
            UploadEvent::Renamed { from, to } => {
                Some(format!("{from} exists in the destination, uploading as {to}"))
            }
            UploadEvent::Reused { file_id } => {
                Some(format!("identical content already stored (file id {file_id})"))
            }
            UploadEvent::Planned {
                total_chunks,
                slice_size,
                size,
            } => {
                self.size = *size;
                Some(format!(
                    "uploading {} in {total_chunks} chunk(s) of {}",
                    format_bytes(*size),
                    format_bytes(*slice_size)
                ))
            }
            UploadEvent::ChunkSent {
                index,
                bytes,
                sent_chunks,
                total_chunks,
            } => {
                self.speed.record(*bytes);
                let sent = self.speed.total_bytes();
                let pct = if self.size > 0 {
                    (sent as f64 / self.size as f64 * 100.0).min(100.0)
                } else {
                    100.0
                };
                let mut line = format!(
                    "chunk {index} sent [{sent_chunks}/{total_chunks}] {pct:.1}% {}/s",
                    format_bytes(self.speed.bytes_per_second() as u64)
                );
                if let Some(eta) = self.speed.eta(self.size.saturating_sub(sent)) {
                    line.push_str(&format!(", eta {}s", eta.as_secs()));
                }
                Some(line)
            }
            UploadEvent::ChunkRetry { index, attempt } => {
                Some(format!("chunk {index} failed on attempt {attempt}, retrying"))
            }
            UploadEvent::Verifying { total_chunks } => {
                Some(format!("verifying {total_chunks} parts"))
            }
            UploadEvent::Completing => Some("finalizing".to_string()),
            UploadEvent::WaitingAsync { polls } => {
                (*polls == 1).then(|| "waiting for the server to assemble the file".to_string())
            }
            UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => None,
        }
    }

    /// Prints events to stderr until the channel closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<UploadEvent>) {
        while let Some(event) = rx.recv().await {
            if let Some(line) = self.line(&event) {
                eprintln!("{line}");
            }
        }
    }
}

/// Formats a byte count with binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
