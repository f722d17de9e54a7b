use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AtomicSwapCoin {
    Bitcoin,
    Litecoin,
    Qtum,
    Unknown,
}

impl AtomicSwapCoin {
    pub fn is_known(self) -> bool {
        self != AtomicSwapCoin::Unknown
    }

    pub fn ticker(self) -> &'static str {
        match self {
            AtomicSwapCoin::Bitcoin => "btc",
            AtomicSwapCoin::Litecoin => "ltc",
            AtomicSwapCoin::Qtum => "qtum",
            AtomicSwapCoin::Unknown => "unknown",
        }
    }
}

impl From<AtomicSwapCoin> for u8 {
    fn from(coin: AtomicSwapCoin) -> u8 {
        match coin {
            AtomicSwapCoin::Bitcoin => 0,
            AtomicSwapCoin::Litecoin => 1,
            AtomicSwapCoin::Qtum => 2,
            AtomicSwapCoin::Unknown => 3,
        }
    }
}

impl TryFrom<u8> for AtomicSwapCoin {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> anyhow::Result<Self> {
        match value {
            0 => Ok(AtomicSwapCoin::Bitcoin),
            1 => Ok(AtomicSwapCoin::Litecoin),
            2 => Ok(AtomicSwapCoin::Qtum),
            3 => Ok(AtomicSwapCoin::Unknown),
            other => Err(anyhow::anyhow!("unknown swap coin {}", other)),
        }
    }
}

impl FromStr for AtomicSwapCoin {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(AtomicSwapCoin::Bitcoin),
            "ltc" | "litecoin" => Ok(AtomicSwapCoin::Litecoin),
            "qtum" => Ok(AtomicSwapCoin::Qtum),
            other => Err(anyhow::anyhow!("unsupported swap coin '{}'", other)),
        }
    }
}

impl fmt::Display for AtomicSwapCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ticker())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkProfile {
    Mainnet,
    Testnet,
}

impl FromStr for NetworkProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(NetworkProfile::Mainnet),
            "testnet" | "test" => Ok(NetworkProfile::Testnet),
            other => Err(anyhow::anyhow!("unknown network '{}'", other)),
        }
    }
}

/// Chain constants of a foreign coin on a given network.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinParams {
    pub coin: AtomicSwapCoin,
    pub blocks_per_hour: f64,
    pub lock_time_in_blocks: u64,
    pub address_version: u8,
    pub lock_tx_min_confirmations: u32,
    pub withdraw_tx_min_confirmations: u32,
    /// Average foreign withdraw tx size in bytes, used to turn a fee rate into a fee.
    pub withdraw_tx_average_size: u64,
    pub dust_threshold: u64,
}

impl CoinParams {
    pub fn new(coin: AtomicSwapCoin, network: NetworkProfile) -> Self {
        let mainnet = network == NetworkProfile::Mainnet;

        match coin {
            AtomicSwapCoin::Litecoin => CoinParams {
                coin,
                blocks_per_hour: 24.0,
                lock_time_in_blocks: 2 * 24 * 24,
                address_version: if mainnet { 0x30 } else { 0x6f },
                lock_tx_min_confirmations: 6,
                withdraw_tx_min_confirmations: 6,
                withdraw_tx_average_size: 240,
                dust_threshold: 546,
            },
            AtomicSwapCoin::Qtum => CoinParams {
                coin,
                blocks_per_hour: 28.125,
                lock_time_in_blocks: 2 * 24 * 28,
                address_version: if mainnet { 0x3a } else { 0x78 },
                lock_tx_min_confirmations: 6,
                withdraw_tx_min_confirmations: 6,
                withdraw_tx_average_size: 240,
                dust_threshold: 546,
            },
            AtomicSwapCoin::Bitcoin | AtomicSwapCoin::Unknown => CoinParams {
                coin,
                blocks_per_hour: 6.0,
                lock_time_in_blocks: 2 * 24 * 6,
                address_version: if mainnet { 0x00 } else { 0x6f },
                lock_tx_min_confirmations: 6,
                withdraw_tx_min_confirmations: 6,
                withdraw_tx_average_size: 240,
                dust_threshold: 546,
            },
        }
    }

    /// Fee in coin units for a withdraw transaction at `fee_rate` per kilobyte.
    pub fn withdraw_fee(&self, fee_rate: u64) -> u64 {
        (self.withdraw_tx_average_size * fee_rate + 500) / 1000
    }

    pub fn is_lock_amount_sufficient(&self, amount: u64, fee_rate: u64) -> bool {
        let fee = self.withdraw_fee(fee_rate);
        amount > fee && amount - fee >= self.dust_threshold
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn coin_byte_roundtrip() {
        for coin in [
            AtomicSwapCoin::Bitcoin,
            AtomicSwapCoin::Litecoin,
            AtomicSwapCoin::Qtum,
            AtomicSwapCoin::Unknown,
        ]
        .iter()
        {
            assert_eq!(AtomicSwapCoin::try_from(u8::from(*coin)).unwrap(), *coin);
        }
        assert!(AtomicSwapCoin::try_from(4).is_err());
    }

    #[test]
    fn network_changes_address_version_only() {
        let main = CoinParams::new(AtomicSwapCoin::Bitcoin, NetworkProfile::Mainnet);
        let test = CoinParams::new(AtomicSwapCoin::Bitcoin, NetworkProfile::Testnet);

        assert_ne!(main.address_version, test.address_version);
        assert_eq!(main.lock_time_in_blocks, test.lock_time_in_blocks);
    }

    #[test]
    fn lock_amount_must_cover_withdraw_fee_and_dust() {
        let params = CoinParams::new(AtomicSwapCoin::Bitcoin, NetworkProfile::Testnet);

        assert_eq!(params.withdraw_fee(10_000), 2_400);
        assert!(params.is_lock_amount_sufficient(2_000_000, 10_000));
        assert!(!params.is_lock_amount_sufficient(2_000, 10_000));
        assert!(!params.is_lock_amount_sufficient(2_900, 10_000));
        assert!(!params.is_lock_amount_sufficient(2_945, 10_000));
        assert!(params.is_lock_amount_sufficient(2_946, 10_000));
    }
}
