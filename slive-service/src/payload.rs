//! Randomized file contents written by benchmark operations.

use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::{io, task};

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncRead, ReadBuf};

/// Randomized contents of a file.
///
/// Payloads are generated on the fly while they are read, so writing a multi-megabyte file never
/// buffers it in memory. Clone an instance to reproduce the same bytes.
#[derive(Debug, Clone)]
pub struct Payload {
    /// The remaining length of the payload in bytes.
    pub len: u64,
    /// The RNG used to fill the payload with random bytes.
    pub rng: SmallRng,
}

impl Payload {
    /// Creates a payload of `len` bytes with contents derived from `seed`.
    pub fn new(len: u64, seed: u64) -> Self {
        Self {
            len,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl AsyncRead for Payload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> task::Poll<io::Result<()>> {
        let len_to_fill = (buf.remaining() as u64).min(self.len) as usize;

        let fill_buf = buf.initialize_unfilled_to(len_to_fill);
        self.rng.fill_bytes(fill_buf);

        self.len -= len_to_fill as u64;
        buf.advance(len_to_fill);

        task::Poll::Ready(Ok(()))
    }
}

/// Hands out payloads with distinct seeds.
///
/// Each executor owns one source, so concurrent operations never share generator state.
#[derive(Debug)]
pub struct PayloadSource {
    seeds: Mutex<SmallRng>,
}

impl PayloadSource {
    /// Creates a source with a fixed seed, producing the same payload sequence on every run.
    pub fn new(seed: u64) -> Self {
        Self {
            seeds: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Creates a randomly seeded source.
    pub fn random() -> Self {
        Self::new(rand::random())
    }

    /// Returns a new payload of `len` bytes.
    pub fn payload(&self, len: u64) -> Payload {
        let seed = self.seeds.lock().unwrap_or_else(PoisonError::into_inner).next_u64();
        Payload::new(len, seed)
    }
}
