use crate::{
    keypair::{message_digest, verify_ecdsa, KeyDerivation, Signature},
    offer::SwapOffer,
    token::{SwapOfferToken, TokenError},
    wallet::WalletId,
};
use thiserror::Error;

pub const MESSAGE_KIND_SWAP_OFFER: u8 = 0;

const HEADER_SIZE: usize = 2;
const SIGNATURE_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message of {0} bytes is too short")]
    TooShort(usize),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unexpected message kind {0}")]
    UnexpectedKind(u8),
    #[error(transparent)]
    Codec(#[from] TokenError),
    #[error("signature does not match the publisher")]
    BadSignature,
    #[error("offer carries no publisher")]
    MissingPublisher,
    #[error("key {0} does not belong to the offer's publisher")]
    ForeignKey(u64),
    #[error(transparent)]
    KeyDerivation(#[from] anyhow::Error),
}

/// Turns offers into signed board messages and back.
///
/// Wire layout: `[version: 1][kind: 1][payload][signature: 64]`, where the
/// payload is a serialized [`SwapOfferToken`] and the signature is an ECDSA
/// signature over the payload's SHA-256 by the offer's publisher.
pub struct OfferBoardProtocolHandler<K> {
    kdf: K,
    version: u8,
}

impl<K: KeyDerivation> OfferBoardProtocolHandler<K> {
    pub fn new(kdf: K, version: u8) -> Self {
        Self { kdf, version }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn create_message(&self, offer: &SwapOffer, key_index: u64) -> Result<Vec<u8>, ProtocolError> {
        let publisher = offer.publisher_id.ok_or(ProtocolError::MissingPublisher)?;
        let keypair = self.kdf.derive_key(key_index)?;
        if WalletId::from_public_key(&keypair.public_key) != publisher {
            return Err(ProtocolError::ForeignKey(key_index));
        }

        let payload = SwapOfferToken::from_offer(offer).to_bytes()?;
        let signature = keypair.sign_ecdsa(&message_digest(&payload));

        let mut message = Vec::with_capacity(HEADER_SIZE + payload.len() + SIGNATURE_SIZE);
        message.push(self.version);
        message.push(MESSAGE_KIND_SWAP_OFFER);
        message.extend_from_slice(&payload);
        message.extend_from_slice(&signature.serialize());

        Ok(message)
    }

    /// Never fails loudly: anything that is not a well-formed offer signed by
    /// its publisher yields `None`.
    pub fn parse_message(&self, message: &[u8]) -> Option<SwapOffer> {
        match self.verify_message(message) {
            Ok(offer) => Some(offer),
            Err(e) => {
                tracing::debug!("dropping board message: {}", e);
                None
            }
        }
    }

    pub fn verify_message(&self, message: &[u8]) -> Result<SwapOffer, ProtocolError> {
        if message.len() <= HEADER_SIZE + SIGNATURE_SIZE {
            return Err(ProtocolError::TooShort(message.len()));
        }
        if message[0] != self.version {
            return Err(ProtocolError::UnsupportedVersion(message[0]));
        }
        if message[1] != MESSAGE_KIND_SWAP_OFFER {
            return Err(ProtocolError::UnexpectedKind(message[1]));
        }

        let (payload, signature) = message[HEADER_SIZE..].split_at(message.len() - HEADER_SIZE - SIGNATURE_SIZE);
        let mut raw_signature = [0u8; SIGNATURE_SIZE];
        raw_signature.copy_from_slice(signature);
        let signature = Signature::parse_standard(&raw_signature).map_err(|_| ProtocolError::BadSignature)?;

        let token = SwapOfferToken::from_bytes(payload)?;
        let public_key = token.public_key().ok_or(ProtocolError::MissingPublisher)?;
        if !verify_ecdsa(&message_digest(payload), &signature, &public_key) {
            return Err(ProtocolError::BadSignature);
        }

        Ok(token.unpack())
    }
}
