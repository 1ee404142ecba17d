//! Terminal front end for a voice session.
//!
//! Polls [`VoiceState`] every 100 ms and prints status changes and transcript
//! lines, with a live volume bar while connected.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::broadcast::error::TryRecvError;

use crate::state::{ConnectionState, VoiceState};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const BAR_WIDTH: usize = 30;

/// Draws a level in [0, 1] as a fixed-width bar.
pub fn volume_bar(level: f32, width: usize) -> String {
    let filled = ((level.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), " ".repeat(width - filled))
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Render until the task is dropped.
pub async fn run(state: Arc<VoiceState>) {
    let mut transcript = state.subscribe_transcript();
    let mut last_status: Option<ConnectionState> = None;
    let mut stdout = std::io::stdout();

    loop {
        let status = state.status();
        if last_status.as_ref() != Some(&status) {
            let _ = writeln!(stdout, "\r[{}] {}", timestamp(), status);
            last_status = Some(status.clone());
        }

        loop {
            match transcript.try_recv() {
                Ok(text) => {
                    let _ = writeln!(stdout, "\r[{}] agent: {}", timestamp(), text.trim());
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    let _ = writeln!(stdout, "\r[{}] ({} lines skipped)", timestamp(), skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if status == ConnectionState::Connected {
            let _ = write!(stdout, "\r{} ", volume_bar(state.volume(), BAR_WIDTH));
        }
        let _ = stdout.flush();

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
