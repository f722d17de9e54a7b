use blake2::{Blake2b, Digest};
use rand::Rng;
pub use secp256k1::{Message, PublicKey, SecretKey, Signature};
use sha2::Sha256;

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    pub fn new(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&secret_key);

        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_slice(data: &[u8; 32]) -> anyhow::Result<KeyPair> {
        let secret_key = SecretKey::parse(data)
            .map_err(|e| anyhow::anyhow!("could not derive secret key from slice: {:?}", e))?;

        Ok(KeyPair::new(secret_key))
    }

    pub fn new_random() -> Self {
        KeyPair::new(random_secret_key())
    }

    pub fn sign_ecdsa(&self, message: &Message) -> Signature {
        secp256k1::sign(message, &self.secret_key).0
    }

    /// Hex of the compressed public key, the form peers exchange swap keys in.
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key.serialize_compressed()[..])
    }
}

pub fn verify_ecdsa(msg: &Message, sig: &Signature, pk: &PublicKey) -> bool {
    secp256k1::verify(msg, sig, pk)
}

pub fn random_secret_key() -> SecretKey {
    loop {
        // out-of-range scalars are astronomically rare but possible
        if let Ok(key) = SecretKey::parse(&rand::thread_rng().gen::<[u8; 32]>()) {
            return key;
        }
    }
}

/// SHA-256 of `data` as a signable message.
pub fn message_digest(data: &[u8]) -> Message {
    let mut hasher = Sha256::default();
    hasher.input(data);

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.result());

    Message::parse(&digest)
}

/// Checks that `secret` is the private half of the hex-encoded compressed
/// `public_key`.
pub fn is_secret_of(secret: &[u8; 32], public_key: &str) -> bool {
    match KeyPair::from_slice(secret) {
        Ok(keypair) => keypair.public_key_hex() == public_key,
        Err(_) => false,
    }
}

/// Source of the keys a wallet signs broadcast messages with.
pub trait KeyDerivation {
    fn derive_key(&self, index: u64) -> anyhow::Result<KeyPair>;
}

/// Deterministic broadcast-key hierarchy rooted at the wallet's master seed.
#[derive(Clone)]
pub struct BroadcastKdf {
    seed: [u8; 32],
}

impl BroadcastKdf {
    const DOMAIN: &'static [u8] = b"beam.bbs.kdf";

    pub fn new(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    pub fn new_random() -> Self {
        Self::new(rand::thread_rng().gen())
    }
}

impl KeyDerivation for BroadcastKdf {
    fn derive_key(&self, index: u64) -> anyhow::Result<KeyPair> {
        // the counter only moves on the rare out-of-range digest
        for counter in 0u32..16 {
            let mut hasher = Blake2b::new();
            hasher.input(Self::DOMAIN);
            hasher.input(&self.seed);
            hasher.input(&index.to_le_bytes());
            hasher.input(&counter.to_le_bytes());

            let mut key = [0u8; 32];
            key.copy_from_slice(&hasher.result()[..32]);

            if let Ok(keypair) = KeyPair::from_slice(&key) {
                return Ok(keypair);
            }
        }

        Err(anyhow::anyhow!("could not derive broadcast key {}", index))
    }
}
