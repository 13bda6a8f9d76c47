use crate::chain::LogEntry;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;

/// Signs appended chain entries so receipts are non-repudiable: an
/// auditor holding the public key can tie an entry hash to this service
/// instance. Signatures ride in receipts, never in the on-disk chain
/// record itself.
pub struct ReceiptSigner {
    keypair: SigningKey,
}

impl ReceiptSigner {
    /// Fresh random keypair. Production deployments should load a
    /// persisted key instead so the service identity is stable.
    pub fn generate() -> Self {
        Self {
            keypair: SigningKey::generate(&mut OsRng),
        }
    }

    /// Loads the 32-byte secret key from `path`, generating and writing
    /// one on first start.
    pub fn load_or_generate(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let raw = fs::read(path)?;
            let secret: [u8; 32] = raw
                .try_into()
                .map_err(|_| anyhow::anyhow!("key file is not 32 bytes: {}", path.display()))?;
            Ok(Self {
                keypair: SigningKey::from_bytes(&secret),
            })
        } else {
            let signer = Self::generate();
            fs::write(path, signer.keypair.to_bytes())?;
            Ok(signer)
        }
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.keypair.verifying_key()
    }

    /// Ed25519 signature over the entry hash. The hash already commits
    /// to the payload, timestamp and chain position.
    pub fn sign_entry(&self, entry: &LogEntry) -> Signature {
        self.keypair.sign(entry.entry_hash.as_bytes())
    }

    pub fn verify_entry(
        verification_key: &VerifyingKey,
        entry: &LogEntry,
        signature: &Signature,
    ) -> bool {
        verification_key
            .verify(entry.entry_hash.as_bytes(), signature)
            .is_ok()
    }
}
