//! Randomness from BoringSSL's CSPRNG.

use crate::base::neterror::NetError;

/// Fill a fixed-size array with random bytes.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], NetError> {
    let mut buf = [0u8; N];
    boring::rand::rand_bytes(&mut buf).map_err(|e| {
        tracing::error!(error = %e, "BoringSSL RAND_bytes failed");
        NetError::SslProtocolError
    })?;
    Ok(buf)
}
