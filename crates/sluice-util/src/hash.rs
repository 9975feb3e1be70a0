/// Content fingerprint of an artifact: the hex BLAKE3 digest of its bytes.
#[must_use]
pub fn fingerprint(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Short form of [`fingerprint`] used in log lines.
#[must_use]
pub fn short_fingerprint(data: &[u8]) -> String {
    let mut hex = fingerprint(data);
    hex.truncate(12);
    hex
}
