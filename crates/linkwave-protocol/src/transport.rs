//! Transport boundary.
//!
//! The physical socket lives outside this crate; [`Connection`] drives
//! it through [`Transport`]. A reconnect always gets a brand-new
//! transport from the [`TransportFactory`], never a reused handle.
//!
//! [`Connection`]: crate::connection::Connection

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ProtocolError, Result};

/// External socket/channel collaborator.
pub trait Transport: Send + Sync {
    /// Open the underlying channel.
    fn open(&self) -> Result<()>;

    /// Write one encoded frame.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Close the underlying channel. Idempotent.
    fn close(&self);
}

/// Produces a fresh transport per connection attempt.
pub trait TransportFactory: Send + Sync {
    /// Create a transport for one connection's exclusive use.
    fn create(&self) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Arc<dyn Transport> + Send + Sync,
{
    fn create(&self) -> Arc<dyn Transport> {
        self()
    }
}

/// In-memory transport for tests and the loopback demo path.
///
/// Records written frames for inspection; failure of `open` or `write`
/// can be scripted to exercise the error paths.
#[derive(Default)]
pub struct LoopbackTransport {
    inner: Mutex<LoopbackInner>,
}

#[derive(Default)]
struct LoopbackInner {
    open: bool,
    written: Vec<Vec<u8>>,
    fail_open: bool,
    fail_writes: bool,
}

impl LoopbackTransport {
    /// Create a loopback transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` call fail
    pub fn fail_open(&self) {
        self.inner.lock().fail_open = true;
    }

    /// Make subsequent `write` calls fail
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Take every frame written so far
    pub fn drain_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.inner.lock().written)
    }

    /// Whether the channel is currently open
    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }
}

impl Transport for LoopbackTransport {
    fn open(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_open {
            return Err(ProtocolError::Transport("open refused".to_string()));
        }
        inner.open = true;
        Ok(())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return Err(ProtocolError::Transport("channel not open".to_string()));
        }
        if inner.fail_writes {
            return Err(ProtocolError::Transport("write refused".to_string()));
        }
        inner.written.push(bytes.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.inner.lock().open = false;
    }
}
