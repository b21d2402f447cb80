//! Content fingerprinting for duplicate detection.
//!
//! Two stamps can differ in encoding while representing the same logical
//! content, so duplicate detection keys on a fingerprint of the stamp's
//! content descriptor rather than on image bytes. The descriptor is
//! normalized before hashing so minor formatting differences do not defeat
//! the match.

use sha2::{Digest, Sha256};

/// Fingerprints stamp content descriptors.
///
/// Produces lowercase hex-encoded SHA-256 digests (64 characters). Fingerprint
/// equality is treated as logical-duplicate equality everywhere in the engine.
///
/// # Normalization
///
/// Before hashing, the descriptor is:
/// - trimmed of leading/trailing whitespace
/// - converted to lowercase
/// - collapsed so runs of whitespace become single spaces
///
/// # Example
///
/// ```rust
/// use stampsync::fingerprint::Fingerprinter;
///
/// let fp = Fingerprinter::fingerprint("lightcurve obsid=4021 segment=3");
/// assert_eq!(fp.len(), 64);
///
/// // Normalized content produces the same fingerprint
/// let fp2 = Fingerprinter::fingerprint("  Lightcurve   obsid=4021 segment=3 ");
/// assert_eq!(fp, fp2);
/// ```
pub struct Fingerprinter;

impl Fingerprinter {
    /// Computes the SHA-256 fingerprint of a normalized content descriptor.
    #[must_use]
    pub fn fingerprint(descriptor: &str) -> String {
        let normalized = Self::normalize(descriptor);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Normalizes a descriptor for consistent fingerprinting.
    #[must_use]
    pub fn normalize(descriptor: &str) -> String {
        descriptor
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}
