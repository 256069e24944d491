//! In-memory stream server for tests.
//!
//! The factory and every server it builds share one state, so a test can
//! connect "viewers", inject messages and inspect broadcasts after the
//! orchestrator has taken ownership of the factory.

use std::io;
use std::sync::{Arc, Mutex};

use super::{NetworkError, ServerFactory, StreamServer, INBOUND_CAPACITY};

#[derive(Debug, Default)]
struct FakeNetState {
    clients: usize,
    inbound: Vec<Vec<u8>>,
    dropped_messages: usize,
    broadcasts: Vec<Vec<u8>>,
    bound_ports: Vec<u16>,
    live_servers: usize,
    fail_bind: bool,
}

/// [`ServerFactory`] producing [`FakeServer`]s.
#[derive(Debug, Clone, Default)]
pub struct FakeServerFactory {
    state: Arc<Mutex<FakeNetState>>,
}

impl FakeServerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_client_count(&self, clients: usize) {
        self.with(|s| s.clients = clients);
    }

    /// Queues a message as if a viewer had sent it. Like the real server,
    /// at most [`INBOUND_CAPACITY`] messages wait for a drain.
    pub fn inject_message(&self, message: Vec<u8>) {
        self.with(|s| {
            if s.inbound.len() < INBOUND_CAPACITY {
                s.inbound.push(message);
            } else {
                s.dropped_messages += 1;
            }
        });
    }

    /// Injected messages discarded because the buffer was full.
    pub fn dropped_messages(&self) -> usize {
        self.with(|s| s.dropped_messages)
    }

    pub fn fail_bind(&self, fail: bool) {
        self.with(|s| s.fail_bind = fail);
    }

    /// Every packet broadcast so far.
    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.with(|s| s.broadcasts.clone())
    }

    /// Ports of every server built so far, oldest first.
    pub fn bound_ports(&self) -> Vec<u16> {
        self.with(|s| s.bound_ports.clone())
    }

    /// Servers built and not yet dropped.
    pub fn live_servers(&self) -> usize {
        self.with(|s| s.live_servers)
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeNetState) -> R) -> R {
        f(&mut self.state.lock().expect("lock poisoned"))
    }
}

impl ServerFactory for FakeServerFactory {
    fn bind(&self, port: u16) -> Result<Box<dyn StreamServer>, NetworkError> {
        self.with(|s| {
            if s.fail_bind {
                return Err(NetworkError::Bind {
                    port,
                    source: io::Error::new(io::ErrorKind::AddrInUse, "fake: port busy"),
                });
            }
            s.bound_ports.push(port);
            s.live_servers += 1;
            Ok(())
        })?;
        Ok(Box::new(FakeServer {
            port,
            state: Arc::clone(&self.state),
        }))
    }
}

/// A [`StreamServer`] backed by [`FakeServerFactory`]'s shared state.
#[derive(Debug)]
pub struct FakeServer {
    port: u16,
    state: Arc<Mutex<FakeNetState>>,
}

impl StreamServer for FakeServer {
    fn port(&self) -> u16 {
        self.port
    }

    fn client_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").clients
    }

    fn drain_messages(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().expect("lock poisoned").inbound)
    }

    fn broadcast(&self, packet: &[u8]) {
        self.state
            .lock()
            .expect("lock poisoned")
            .broadcasts
            .push(packet.to_vec());
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.live_servers -= 1;
        }
    }
}
