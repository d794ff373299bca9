//! Scripted in-memory device
//!
//! Stands in for printer hardware in tests and in `--mock` runs. Clones share
//! state, so a test can keep a handle while the manager owns the device.

use crate::device::DeviceIo;
use crate::error::{PrintError, PrintResult};
use crate::status::StatusQuery;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<StatusQuery, u8>,
    pending: Option<StatusQuery>,
    writes: Vec<(Instant, Vec<u8>)>,
    not_found: bool,
    fail_writes_after: Option<usize>,
    stalled: bool,
    open: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Device that answers no status query
    pub fn new() -> Self {
        Self::default()
    }

    /// Online with paper loaded
    pub fn ready() -> Self {
        let device = Self::new();
        device.set_reply(StatusQuery::Printer, 0b0001_0110);
        device.set_reply(StatusQuery::Paper, 0b0001_0010);
        device
    }

    /// Sticky reply for a query
    pub fn set_reply(&self, query: StatusQuery, value: u8) {
        self.state.lock().replies.insert(query, value);
    }

    /// Make `open` fail with [`PrintError::NotFound`]
    pub fn set_not_found(&self, not_found: bool) {
        self.state.lock().not_found = not_found;
    }

    /// Let `n` more writes succeed, then fail every write
    pub fn fail_writes_after(&self, n: usize) {
        let mut state = self.state.lock();
        state.fail_writes_after = Some(state.writes.len() + n);
    }

    /// Writes never complete while set, like a printer that stopped
    /// draining its buffer
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Status queries received, in order
    pub fn queries(&self) -> Vec<StatusQuery> {
        self.state
            .lock()
            .writes
            .iter()
            .filter_map(|(_, w)| StatusQuery::from_command(w))
            .collect()
    }

    /// Print data writes (status queries excluded) with their timestamps
    pub fn print_writes(&self) -> Vec<(Instant, Vec<u8>)> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(_, w)| StatusQuery::from_command(w).is_none())
            .cloned()
            .collect()
    }

    /// All print data concatenated
    pub fn printed(&self) -> Vec<u8> {
        self.print_writes().into_iter().flat_map(|(_, w)| w).collect()
    }

    /// Whether `needle` appears in the printed data
    pub fn printed_contains(&self, needle: &[u8]) -> bool {
        let printed = self.printed();
        !needle.is_empty() && printed.windows(needle.len()).any(|w| w == needle)
    }

    pub fn clear(&self) {
        self.state.lock().writes.clear();
    }
}

#[async_trait]
impl DeviceIo for MockDevice {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    async fn open(&mut self) -> PrintResult<()> {
        let mut state = self.state.lock();
        if state.not_found {
            return Err(PrintError::NotFound("mock device unplugged".into()));
        }
        state.open = true;
        Ok(())
    }

    async fn close(&mut self) -> PrintResult<()> {
        self.state.lock().open = false;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let stalled = self.state.lock().stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock();
        if !state.open {
            return Err(PrintError::NotOpen("mock".into()));
        }
        if state
            .fail_writes_after
            .is_some_and(|limit| state.writes.len() >= limit)
        {
            return Err(PrintError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        state.pending = StatusQuery::from_command(data);
        state.writes.push((Instant::now(), data.to_vec()));
        Ok(())
    }

    async fn read(&mut self, _timeout: Duration) -> PrintResult<Vec<u8>> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PrintError::NotOpen("mock".into()));
        }
        let reply = state
            .pending
            .take()
            .and_then(|q| state.replies.get(&q).copied());
        Ok(reply.map(|b| vec![b]).unwrap_or_default())
    }
}
