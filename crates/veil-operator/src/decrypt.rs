//! Chunked decryption against a rate-limited compute service.

use std::sync::Arc;

use veil_core::{CiphertextHandle, Plaintext};
use veil_crypto::Ed25519KeyPair;
use veil_ledger::{ComputeError, ConfidentialCompute, DecryptAuthorization};

/// Splits a handle list into round-trips no larger than either the node's
/// configured chunk size or the service's per-call limit. Results are
/// reassembled in input order.
#[derive(Clone)]
pub struct ChunkedDecryptor {
    compute: Arc<dyn ConfidentialCompute>,
    chunk_size: usize,
}

impl std::fmt::Debug for ChunkedDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedDecryptor")
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl ChunkedDecryptor {
    /// Decryptor over `compute` with at most `chunk_size` handles per call.
    pub fn new(compute: Arc<dyn ConfidentialCompute>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.min(compute.max_handles_per_call()).max(1);
        Self { compute, chunk_size }
    }

    /// Effective handles per round-trip.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Decrypt `handles` as `key`'s principal.
    pub async fn decrypt(
        &self,
        key: &Ed25519KeyPair,
        handles: &[CiphertextHandle],
    ) -> Result<Vec<Plaintext>, ComputeError> {
        let mut out = Vec::with_capacity(handles.len());
        for chunk in handles.chunks(self.chunk_size) {
            let authorization = DecryptAuthorization::sign(key, chunk)?;
            let plain = self.compute.decrypt(chunk, &authorization)?;
            out.extend(plain);
            tokio::task::yield_now().await;
        }
        tracing::debug!(
            handles = handles.len(),
            round_trips = handles.len().div_ceil(self.chunk_size),
            "decrypted"
        );
        Ok(out)
    }
}
