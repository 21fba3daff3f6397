use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use webstandards_harness::{DocumentValidator, OutputStreams, ValidationError};

/// Cloneable in-memory destination standing in for the terminal
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Streams writing into two inspectable buffers
pub fn test_streams() -> (OutputStreams, SharedBuffer, SharedBuffer) {
    let out = SharedBuffer::default();
    let err = SharedBuffer::default();
    (OutputStreams::new(out.clone(), err.clone()), out, err)
}

/// Records every document it sees and always reports one error
pub struct FaultInjectingValidator {
    seen: Mutex<Vec<Vec<u8>>>,
}

impl FaultInjectingValidator {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl DocumentValidator for FaultInjectingValidator {
    fn name(&self) -> &str {
        "Faulty"
    }

    fn validate(&self, document: &[u8]) -> Vec<ValidationError> {
        self.seen.lock().unwrap().push(document.to_vec());
        vec![ValidationError::error("injected failure").at(1, 1)]
    }
}

/// Logs through the harness streams while validating, the way an in-process
/// application under test would
pub struct LoggingValidator {
    streams: OutputStreams,
    line: &'static str,
}

impl LoggingValidator {
    pub fn new(streams: &OutputStreams, line: &'static str) -> Self {
        Self {
            streams: streams.clone(),
            line,
        }
    }
}

impl DocumentValidator for LoggingValidator {
    fn name(&self) -> &str {
        "Logging"
    }

    fn validate(&self, _document: &[u8]) -> Vec<ValidationError> {
        let _ = writeln!(self.streams.stdout(), "{}", self.line);
        Vec::new()
    }
}
