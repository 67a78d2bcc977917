/// Cryptographic primitives.
///
/// Everything here is synchronous, CPU-bound, and safe to call from
/// multiple threads. Policy (who may decrypt what) lives in the engine;
/// these modules only wield keys they are handed.
pub mod aead;
pub mod hash;
pub mod kdf;
pub mod keys;
pub mod sensitive;
