use crate::{
    coin::{AtomicSwapCoin, CoinParams, NetworkProfile},
    swap::BEAM_LOCK_TX_LIFETIME_MAX,
    wallet::Height,
};
use std::str::FromStr;

/// When the foreign lock may be refunded before its lock time expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickRefundPolicy {
    Disabled,
    /// The counterpart disclosed a private key matching the public key it
    /// committed to the contract with.
    PeerKeyDisclosure,
    /// Key disclosure plus proof that the native lock was never mined:
    /// `depth` blocks past its maximum height without a kernel proof.
    ConfirmedAbsence { depth: Height },
}

impl FromStr for QuickRefundPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "disabled" | "off" => Ok(QuickRefundPolicy::Disabled),
            "peer-key" => Ok(QuickRefundPolicy::PeerKeyDisclosure),
            other => {
                let depth = other
                    .strip_prefix("absence:")
                    .ok_or_else(|| anyhow::anyhow!("unknown quick refund policy '{}'", other))?
                    .parse()?;
                Ok(QuickRefundPolicy::ConfirmedAbsence { depth })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapSettings {
    pub network: NetworkProfile,
    pub lock_tx_min_confirmations: u32,
    pub withdraw_tx_min_confirmations: u32,
    /// Overrides the coin's default foreign lock time.
    pub lock_time_in_blocks: Option<u64>,
    pub quick_refund: QuickRefundPolicy,
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            network: NetworkProfile::Mainnet,
            lock_tx_min_confirmations: 6,
            withdraw_tx_min_confirmations: 6,
            lock_time_in_blocks: None,
            quick_refund: QuickRefundPolicy::PeerKeyDisclosure,
        }
    }
}

impl SwapSettings {
    pub fn from_env() -> Self {
        let default = Self::default();

        let network = read_env("SWAP_NETWORK", default.network);
        let lock_tx_min_confirmations =
            read_env("SWAP_LOCK_TX_MIN_CONFIRMATIONS", default.lock_tx_min_confirmations);
        let withdraw_tx_min_confirmations = read_env(
            "SWAP_WITHDRAW_TX_MIN_CONFIRMATIONS",
            default.withdraw_tx_min_confirmations,
        );
        let lock_time_in_blocks = std::env::var("SWAP_LOCK_TIME_IN_BLOCKS")
            .ok()
            .and_then(|value| value.parse().ok())
            .or(default.lock_time_in_blocks);
        let quick_refund = read_env("SWAP_QUICK_REFUND", default.quick_refund);

        Self {
            network,
            lock_tx_min_confirmations,
            withdraw_tx_min_confirmations,
            lock_time_in_blocks,
            quick_refund,
        }
    }

    pub fn coin_params(&self, coin: AtomicSwapCoin) -> CoinParams {
        let mut params = CoinParams::new(coin, self.network);
        params.lock_tx_min_confirmations = self.lock_tx_min_confirmations;
        params.withdraw_tx_min_confirmations = self.withdraw_tx_min_confirmations;
        if let Some(lock_time) = self.lock_time_in_blocks {
            params.lock_time_in_blocks = lock_time;
        }

        params
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardConfig {
    pub protocol_version: u8,
    pub max_offer_lifetime: Height,
    /// Blocks a settled offer stays cached before it is forgotten.
    pub eviction_grace: Height,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            max_offer_lifetime: BEAM_LOCK_TX_LIFETIME_MAX,
            eviction_grace: 1440,
        }
    }
}

fn read_env<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quick_refund_policy_parses() {
        assert_eq!(
            "disabled".parse::<QuickRefundPolicy>().unwrap(),
            QuickRefundPolicy::Disabled
        );
        assert_eq!(
            "peer-key".parse::<QuickRefundPolicy>().unwrap(),
            QuickRefundPolicy::PeerKeyDisclosure
        );
        assert_eq!(
            "absence:12".parse::<QuickRefundPolicy>().unwrap(),
            QuickRefundPolicy::ConfirmedAbsence { depth: 12 }
        );
        assert!("absence:".parse::<QuickRefundPolicy>().is_err());
        assert!("sometimes".parse::<QuickRefundPolicy>().is_err());
    }

    #[test]
    fn out_of_range_confirmations_fall_back() {
        std::env::set_var("SWAP_TEST_CONFIRMATIONS_WIDE", "4294967297");
        std::env::set_var("SWAP_TEST_CONFIRMATIONS_OK", "3");

        assert_eq!(read_env("SWAP_TEST_CONFIRMATIONS_WIDE", 6u32), 6);
        assert_eq!(read_env("SWAP_TEST_CONFIRMATIONS_OK", 6u32), 3);
        assert_eq!(read_env("SWAP_TEST_CONFIRMATIONS_UNSET", 6u32), 6);
    }

    #[test]
    fn settings_override_coin_defaults() {
        let settings = SwapSettings {
            network: NetworkProfile::Testnet,
            lock_tx_min_confirmations: 1,
            withdraw_tx_min_confirmations: 2,
            lock_time_in_blocks: Some(10),
            quick_refund: QuickRefundPolicy::Disabled,
        };

        let params = settings.coin_params(AtomicSwapCoin::Litecoin);

        assert_eq!(params.lock_tx_min_confirmations, 1);
        assert_eq!(params.withdraw_tx_min_confirmations, 2);
        assert_eq!(params.lock_time_in_blocks, 10);
        assert_eq!(
            params.address_version,
            CoinParams::new(AtomicSwapCoin::Litecoin, NetworkProfile::Testnet).address_version
        );
    }
}
