use crate::{
    coin::AtomicSwapCoin,
    keypair::PublicKey,
    offer::{SwapOffer, SwapOfferStatus},
    parameters::{prepare_for_tokenization, TxParameterId, TxParameters},
    wallet::{TxId, WalletId},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("token could not be decoded: {0}")]
    Codec(#[from] bincode::Error),
    #[error("token does not describe a valid swap offer")]
    Invalid,
}

/// Self-contained form of a swap offer, exchanged outside of the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapOfferToken {
    tx_id: Option<TxId>,
    status: Option<SwapOfferStatus>,
    publisher_id: Option<WalletId>,
    coin: Option<AtomicSwapCoin>,
    params: TxParameters,
}

impl SwapOfferToken {
    pub fn from_offer(offer: &SwapOffer) -> Self {
        let params = if offer.params.is_empty() {
            offer.params.clone()
        } else {
            prepare_for_tokenization(&offer.params)
        };

        SwapOfferToken {
            tx_id: Some(offer.tx_id),
            status: Some(offer.status),
            publisher_id: offer.publisher_id,
            coin: Some(offer.coin),
            params,
        }
    }

    pub fn from_params(params: TxParameters) -> Self {
        SwapOfferToken {
            tx_id: params.tx_id(),
            status: None,
            publisher_id: None,
            coin: params.get(TxParameterId::AtomicSwapCoin),
            params,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TokenError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenError> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn to_token_string(&self) -> Result<String, TokenError> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn parse(token: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(token.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Parses `token` and checks it describes a complete swap offer.
    pub fn is_valid(token: &str) -> bool {
        Self::parse_valid(token).is_ok()
    }

    pub fn parse_valid(token: &str) -> Result<Self, TokenError> {
        let token = Self::parse(token)?;
        if token.tx_id.is_none() && token.params.tx_id().is_none() {
            return Err(TokenError::Invalid);
        }
        if !token.unpack().is_valid() {
            return Err(TokenError::Invalid);
        }

        Ok(token)
    }

    /// Rebuilds the offer. A token without any transaction id unpacks with an
    /// all-zero id, which `parse_valid` never lets through.
    pub fn unpack(&self) -> SwapOffer {
        let tx_id = self
            .tx_id
            .or_else(|| self.params.tx_id())
            .unwrap_or(TxId([0; 16]));

        let mut offer = SwapOffer::new(tx_id, self.params.clone());
        if let Some(status) = self.status {
            offer.status = status;
        }
        if let Some(coin) = self.coin {
            offer.coin = coin;
        }
        offer.publisher_id = self.publisher_id;

        offer
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.publisher_id.as_ref()?.to_public_key()
    }

    pub fn publisher_id(&self) -> Option<WalletId> {
        self.publisher_id
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{keypair::KeyPair, parameters::create_swap_parameters};

    fn params() -> TxParameters {
        create_swap_parameters(None)
            .with(TxParameterId::AtomicSwapCoin, AtomicSwapCoin::Bitcoin)
            .with(TxParameterId::Amount, 500_000_000u64)
            .with(TxParameterId::AtomicSwapAmount, 2_000_000u64)
            .with(TxParameterId::AtomicSwapIsBeamSide, false)
            .with(TxParameterId::IsSender, false)
            .with(TxParameterId::MinHeight, 1000u64)
            .with(TxParameterId::PeerResponseTime, 150u64)
    }

    #[test]
    fn token_string_roundtrip_keeps_offer() {
        let publisher = KeyPair::new_random();
        let mut offer = SwapOffer::new(params().tx_id().unwrap(), params());
        offer.publisher_id = Some(WalletId::from_public_key(&publisher.public_key));

        let token = SwapOfferToken::from_offer(&offer).to_token_string().unwrap();

        assert!(SwapOfferToken::is_valid(&token));
        let parsed = SwapOfferToken::parse(&token).unwrap();
        let unpacked = parsed.unpack();
        assert_eq!(unpacked.tx_id, offer.tx_id);
        assert_eq!(unpacked.amount(), Some(500_000_000));
        assert_eq!(unpacked.expiry_height(), Some(1150));
        assert_eq!(parsed.public_key(), Some(publisher.public_key));
    }

    #[test]
    fn token_missing_mandatory_field_is_invalid() {
        for id in [
            TxParameterId::AtomicSwapCoin,
            TxParameterId::Amount,
            TxParameterId::AtomicSwapAmount,
            TxParameterId::MinHeight,
            TxParameterId::PeerResponseTime,
            TxParameterId::TransactionType,
        ]
        .iter()
        {
            let mut params = params();
            params.delete(*id, crate::parameters::SubTxIndex::Default);
            let token = SwapOfferToken::from_params(params).to_token_string().unwrap();

            assert!(!SwapOfferToken::is_valid(&token), "{:?} should be mandatory", id);
        }
    }

    #[test]
    fn garbage_is_not_a_token() {
        assert!(!SwapOfferToken::is_valid("not hex at all"));
        assert!(!SwapOfferToken::is_valid("abcd"));
        assert!(!SwapOfferToken::is_valid(""));

        let token = SwapOfferToken::from_params(params()).to_token_string().unwrap();
        assert!(!SwapOfferToken::is_valid(&token[..token.len() - 2]));
    }
}
