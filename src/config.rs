//! Connection defaults and SSH algorithm preferences.
//!
//! Network gear frequently runs old SSH stacks, so the algorithm preference
//! lists lead with modern algorithms and keep legacy key exchange, cipher,
//! and MAC variants available for devices that offer nothing newer.

use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};

/// Default SSH port for device sessions.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Timeout for one connect + authenticate + elevate attempt against a
/// single dialect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for a single command exchange.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for one configuration-set transaction.
pub const CONFIG_SET_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on devices processed concurrently in one batch.
pub const MAX_CONCURRENT_DEVICES: usize = 8;

/// Key exchange algorithms in order of preference.
///
/// Includes modern algorithms like Curve25519 as well as legacy
/// Diffie-Hellman variants for compatibility with older devices.
pub const COMPAT_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA256,
    kex::DH_GEX_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G14_SHA1,
    kex::DH_G1_SHA1,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

/// Cipher algorithms for encryption.
///
/// Includes AES-GCM and ChaCha20-Poly1305 as well as legacy CBC mode
/// ciphers for compatibility with older devices.
pub static COMPAT_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

/// MAC algorithms, ETM variants first.
pub const COMPAT_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1,
];

/// Compression algorithms, no compression preferred.
pub const COMPAT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

/// Host key algorithms.
///
/// Includes Ed25519 and ECDSA as well as legacy RSA and DSA for
/// compatibility with older devices.
pub const COMPAT_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
    Algorithm::Dsa,
];
