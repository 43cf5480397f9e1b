//! Signature Verifier - Signer Recovery Against the Claimed Party
//!
//! Recovers the address that signed a canonical message with the
//! network's signature scheme and compares it to the claimed signer.
//! Verification has no side effects; the caller decides what a
//! rejection means for its transaction.

use tracing::{debug, warn};

use crate::domain::{CanonicalMessage, LendError, LendResult, Network};
use crate::ports::chain_client::ChainRegistry;

/// Network-dispatched signature verification.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
  chains: ChainRegistry,
}

impl SignatureVerifier {
  pub fn new(chains: ChainRegistry) -> Self {
    Self { chains }
  }

  /// Check that `claimed` signed `message` on `network`.
  ///
  /// # Errors
  /// - `UnsupportedNetwork` when no chain client serves the network
  /// - `Validation` when the signature is malformed
  /// - `SignatureMismatch` when the recovered address differs
  pub async fn verify(
    &self,
    network: Network,
    message: &CanonicalMessage,
    signature: &str,
    claimed: &str,
  ) -> LendResult<()> {
    let chain = self.chains.get(network)?;
    let recovered = chain.recover_signer(&message.to_bytes(), signature).await?;

    if !addresses_match(&recovered, claimed) {
      warn!(
        network = %network,
        claimed = %claimed,
        recovered = %recovered,
        "Signature does not match claimed signer"
      );
      return Err(LendError::SignatureMismatch {
        expected: claimed.to_string(),
        recovered,
      });
    }

    debug!(network = %network, signer = %recovered, "Signature verified");
    Ok(())
  }
}

/// Case-insensitive hex address comparison.
pub fn addresses_match(a: &str, b: &str) -> bool {
  a.trim().eq_ignore_ascii_case(b.trim())
}
