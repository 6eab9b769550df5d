use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::cell::UnsafeCell;

thread_local! {
    static RNG: UnsafeCell<ChaCha20Rng> = UnsafeCell::new(ChaCha20Rng::from_seed(OsRng.gen()));
}

/// Cryptographically secure RNG backed by a per-thread ChaCha20 stream seeded from the OS.
pub struct SecureRng;

impl SecureRng {
    #[inline]
    fn with_rng<T>(f: impl FnOnce(&mut ChaCha20Rng) -> T) -> T {
        // Only one thread accesses this RNG so this is safe
        RNG.with(|rng| unsafe { f(&mut *rng.get()) })
    }

    pub fn next_u128() -> u128 {
        Self::with_rng(|rng| {
            let mut bytes = [0u8; 16];
            rand_chacha::rand_core::RngCore::fill_bytes(rng, &mut bytes);
            u128::from_le_bytes(bytes)
        })
    }

    pub fn fill(dest: &mut [u8]) {
        Self::with_rng(|rng| rand_chacha::rand_core::RngCore::fill_bytes(rng, dest))
    }
}

impl RngCore for SecureRng {
    fn next_u32(&mut self) -> u32 {
        SecureRng::with_rng(|rng| rand_chacha::rand_core::RngCore::next_u32(rng))
    }

    fn next_u64(&mut self) -> u64 {
        SecureRng::with_rng(|rng| rand_chacha::rand_core::RngCore::next_u64(rng))
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        SecureRng::fill(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        // try_fill_bytes is infallible for ChaCha20Rng
        SecureRng::fill(dest);
        Ok(())
    }
}

impl CryptoRng for SecureRng {}
