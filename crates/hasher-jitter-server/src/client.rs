//! Blocking jitter client for hashers and simulators

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use hasher_jitter::{JitterVector, Slots};

use crate::error::Result;
use crate::protocol::{self, JitterRequest, RESPONSE_LEN};

/// Synchronous client holding one connection open across requests.
pub struct JitterClient {
    stream: UnixStream,
}

impl JitterClient {
    /// Connect to a jitter server
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        Ok(Self { stream })
    }

    /// Connect with read and write timeouts
    pub fn connect_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(Self { stream })
    }

    /// Zone-based lookup (protocol v2)
    pub fn request(&mut self, slots: &Slots, hash: u32, pass: u32) -> Result<JitterVector> {
        self.exchange(JitterRequest::Search {
            slots: *slots,
            hash,
            pass,
        })
    }

    /// Hash-only lookup (protocol v1)
    pub fn request_legacy(&mut self, hash: u32) -> Result<JitterVector> {
        self.exchange(JitterRequest::Legacy { hash })
    }

    fn exchange(&mut self, request: JitterRequest) -> Result<JitterVector> {
        self.stream.write_all(&request.encode())?;
        let mut response = [0u8; RESPONSE_LEN];
        self.stream.read_exact(&mut response)?;
        Ok(protocol::decode_response(response))
    }
}
