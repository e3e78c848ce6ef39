pub mod aead;
pub mod keys;
