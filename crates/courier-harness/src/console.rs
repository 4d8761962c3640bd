//! Console capture.

use std::{io, sync::Arc};

use courier_client::Console;
use parking_lot::Mutex;

/// Clonable in-memory writer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Console writing into two buffers: (console, out, err).
pub fn capture_console() -> (Console, SharedBuffer, SharedBuffer) {
    let out = SharedBuffer::default();
    let err = SharedBuffer::default();
    (Console::new(out.clone(), err.clone()), out, err)
}
