#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;

use anyhow::anyhow;
use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_LABEL: &[u8] = b"tyren-session";

/// Issues and checks the relay's bearer credential. The credential is an
/// HMAC of a fixed label, so it carries no expiry and every issued token is
/// identical until the secret changes.
pub struct Credentials {
    secret: String,
}

impl Credentials {
    /// Returns `None` without a secret, in which case no credential is
    /// valid.
    pub fn new(secret: &str) -> Option<Credentials> {
        if secret.is_empty() {
            return None;
        }

        return Some(Credentials {
            secret: secret.to_string(),
        });
    }

    fn mac(&self) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|err| return anyhow!("Invalid session secret: {err}"))?;
        mac.update(TOKEN_LABEL);
        return Ok(mac);
    }

    pub fn issue(&self) -> Result<String> {
        let digest = self.mac()?.finalize().into_bytes();
        return Ok(URL_SAFE_NO_PAD.encode(digest));
    }

    pub fn verify(&self, token: &str) -> bool {
        let signature = match URL_SAFE_NO_PAD.decode(token.trim()) {
            Ok(signature) => signature,
            Err(_) => return false,
        };

        match self.mac() {
            Ok(mac) => return mac.verify_slice(&signature).is_ok(),
            Err(_) => return false,
        }
    }
}

/// Compares two secrets in time independent of where they differ.
pub fn secrets_match(expected: &str, given: &str) -> bool {
    let expected = expected.as_bytes();
    let given = given.as_bytes();
    if expected.len() != given.len() {
        return false;
    }

    let diff = expected
        .iter()
        .zip(given.iter())
        .fold(0u8, |acc, (left, right)| return acc | (left ^ right));

    return diff == 0;
}
