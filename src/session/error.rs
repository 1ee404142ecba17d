use thiserror::Error;

/// Failures of the live connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Session rejected: {0}")]
    Rejected(String),

    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Why a voice session could not start.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("A voice session is already {0}")]
    AlreadyActive(String),

    #[error("Audio device unavailable: {0:#}")]
    Acquisition(anyhow::Error),

    #[error(transparent)]
    Connection(#[from] TransportError),

    #[error("Timed out after {0}s waiting for the session to open")]
    Timeout(u64),
}

impl VoiceError {
    /// Short text for the status line.
    pub fn status_reason(&self) -> String {
        match self {
            VoiceError::AlreadyActive(_) => self.to_string(),
            VoiceError::Acquisition(_) => "Microphone or speaker unavailable".to_string(),
            VoiceError::Connection(TransportError::Protocol(_)) => {
                "Unexpected reply from the voice service".to_string()
            }
            VoiceError::Connection(e) => e.to_string(),
            VoiceError::Timeout(_) => "Connection timed out".to_string(),
        }
    }
}
