//! Trace points for request/response traffic.

use cps_protocol::ServerError;

/// Observer invoked at each trace point of a request.
///
/// All hooks default to doing nothing, so implementors pick what they need.
/// A sink is attached per connection through
/// [`ConnectionConfig::with_trace_sink`](crate::ConnectionConfig::with_trace_sink).
pub trait TraceSink: Send + Sync {
    /// The request envelope has been built.
    fn request_built(&self, _command: &str, _envelope: &str) {}

    /// Raw bytes were written to the transport.
    fn bytes_sent(&self, _bytes: &[u8]) {}

    /// Raw response bytes were received.
    fn bytes_received(&self, _bytes: &[u8]) {}

    /// The server attached a non-fatal error block to its reply.
    fn warning(&self, _warning: &ServerError) {}
}

/// Forwards every trace point to `tracing` at TRACE level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn request_built(&self, command: &str, envelope: &str) {
        tracing::trace!(command, "request envelope:\n{}", envelope);
    }

    fn bytes_sent(&self, bytes: &[u8]) {
        tracing::trace!(len = bytes.len(), "sent: {}", String::from_utf8_lossy(bytes));
    }

    fn bytes_received(&self, bytes: &[u8]) {
        tracing::trace!(len = bytes.len(), "received: {}", String::from_utf8_lossy(bytes));
    }

    fn warning(&self, warning: &ServerError) {
        tracing::trace!(code = warning.code, "server warning: {}", warning);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every trace point as a short event string.
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }

        fn record(&self, event: String) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }

    impl TraceSink for RecordingSink {
        fn request_built(&self, command: &str, _envelope: &str) {
            self.record(format!("built:{command}"));
        }

        fn bytes_sent(&self, bytes: &[u8]) {
            self.record(format!("sent:{}", bytes.len()));
        }

        fn bytes_received(&self, bytes: &[u8]) {
            self.record(format!("received:{}", bytes.len()));
        }

        fn warning(&self, warning: &ServerError) {
            self.record(format!("warning:{}", warning.code));
        }
    }
}
