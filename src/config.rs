//! Connection configuration.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    frame::MAX_PAYLOAD_LEN,
    mask::{DEFAULT_ENTROPY_PATH, DeviceMaskSource, MaskKeySource, OsMaskSource},
    message_assembler::DispatchMode,
};

/// Where mask keys come from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomSource {
    /// The operating system's CSPRNG.
    #[default]
    Os,
    /// A character device such as `/dev/urandom`.
    Device(PathBuf),
}

impl RandomSource {
    /// Device source reading from [`DEFAULT_ENTROPY_PATH`].
    #[must_use]
    pub fn default_device() -> Self { Self::Device(PathBuf::from(DEFAULT_ENTROPY_PATH)) }

    /// Open the source.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while opening a device.
    pub fn open(&self) -> std::io::Result<Box<dyn MaskKeySource>> {
        Ok(match self {
            Self::Os => Box::new(OsMaskSource),
            Self::Device(path) => Box::new(DeviceMaskSource::open(path)?),
        })
    }
}

/// Settings for a [`Connection`](crate::connection::Connection).
///
/// Timeouts are never armed by the engine itself; the caller reads them
/// from here, runs its own timers and reports expiry through the
/// connection's event methods.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use wsframe::{config::WebSocketConfig, message_assembler::DispatchMode};
///
/// let config = WebSocketConfig::default()
///     .max_payload_len(1 << 20)
///     .connect_timeout(Duration::from_secs(5))
///     .dispatch_mode(DispatchMode::Streaming);
/// assert_eq!(config.max_payload_len, 1 << 20);
/// assert_eq!(config.close_timeout, Duration::from_secs(60));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Largest accepted frame payload and assembled message.
    pub max_payload_len: u64,
    /// How long the caller should wait for the transport to connect.
    pub connect_timeout: Duration,
    /// How long the caller should wait for the peer's close echo.
    pub close_timeout: Duration,
    /// Buffered or streaming message delivery.
    pub dispatch_mode: DispatchMode,
    /// Answer pings automatically.
    pub auto_pong: bool,
    /// Reject text messages that are not UTF-8.
    pub validate_utf8: bool,
    /// Mask key source.
    pub random_source: RandomSource,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_payload_len: MAX_PAYLOAD_LEN,
            connect_timeout: Duration::from_secs(60),
            close_timeout: Duration::from_secs(60),
            dispatch_mode: DispatchMode::Buffered,
            auto_pong: true,
            validate_utf8: true,
            random_source: RandomSource::Os,
        }
    }
}

impl WebSocketConfig {
    /// Set the payload ceiling. Values above [`MAX_PAYLOAD_LEN`] are clamped.
    #[must_use]
    pub fn max_payload_len(mut self, len: u64) -> Self {
        self.max_payload_len = len.min(MAX_PAYLOAD_LEN);
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the close-handshake timeout.
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Select buffered or streaming delivery.
    #[must_use]
    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Enable or disable automatic pong replies.
    #[must_use]
    pub fn auto_pong(mut self, enabled: bool) -> Self {
        self.auto_pong = enabled;
        self
    }

    /// Enable or disable UTF-8 validation of text messages.
    #[must_use]
    pub fn validate_utf8(mut self, enabled: bool) -> Self {
        self.validate_utf8 = enabled;
        self
    }

    /// Choose the mask key source.
    #[must_use]
    pub fn random_source(mut self, source: RandomSource) -> Self {
        self.random_source = source;
        self
    }
}
