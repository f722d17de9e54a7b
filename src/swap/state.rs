use crate::parameters::{Parameter, ParameterValue};
use std::{convert::TryFrom, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    Initial,
    BuildingBeamLockTX,
    BuildingBeamRefundTX,
    BuildingBeamRedeemTX,
    HandlingContractTX,
    SendingRefundTX,
    SendingRedeemTX,
    SendingBeamLockTX,
    SendingBeamRedeemTX,
    SendingBeamRefundTX,
    CompleteSwap,
    Canceled,
    Failed,
    Refunded,
}

const STATES: [State; 14] = [
    State::Initial,
    State::BuildingBeamLockTX,
    State::BuildingBeamRefundTX,
    State::BuildingBeamRedeemTX,
    State::HandlingContractTX,
    State::SendingRefundTX,
    State::SendingRedeemTX,
    State::SendingBeamLockTX,
    State::SendingBeamRedeemTX,
    State::SendingBeamRefundTX,
    State::CompleteSwap,
    State::Canceled,
    State::Failed,
    State::Refunded,
];

impl State {
    pub fn is_final(self) -> bool {
        matches!(
            self,
            State::CompleteSwap | State::Canceled | State::Failed | State::Refunded
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            State::Initial => "waiting for peer",
            State::BuildingBeamLockTX => "building Beam LockTX",
            State::BuildingBeamRefundTX => "building Beam RefundTX",
            State::BuildingBeamRedeemTX => "building Beam RedeemTX",
            State::HandlingContractTX => "handling LockTX",
            State::SendingRefundTX => "sending RefundTX",
            State::SendingRedeemTX => "sending RedeemTX",
            State::SendingBeamLockTX => "sending Beam LockTX",
            State::SendingBeamRedeemTX => "sending Beam RedeemTX",
            State::SendingBeamRefundTX => "sending Beam RefundTX",
            State::CompleteSwap => "completed",
            State::Canceled => "cancelled",
            State::Failed => "failed",
            State::Refunded => "aborted",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl TryFrom<u8> for State {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> anyhow::Result<Self> {
        STATES
            .get(value as usize)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown swap state {}", value))
    }
}

/// Progress of a native sub-transaction negotiated with the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubTxState {
    Initial,
    Invitation,
    Constructed,
}

/// Progress of a transaction built on the foreign chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SwapTxState {
    Initial,
    CreatingTx,
    SigningTx,
    Constructed,
}

impl Parameter for State {
    fn into_value(self) -> ParameterValue {
        ParameterValue::U8(self as u8)
    }

    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::U8(raw) => State::try_from(*raw).ok(),
            _ => None,
        }
    }
}

impl Parameter for SubTxState {
    fn into_value(self) -> ParameterValue {
        ParameterValue::U8(self as u8)
    }

    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::U8(0) => Some(SubTxState::Initial),
            ParameterValue::U8(1) => Some(SubTxState::Invitation),
            ParameterValue::U8(2) => Some(SubTxState::Constructed),
            _ => None,
        }
    }
}

impl Parameter for SwapTxState {
    fn into_value(self) -> ParameterValue {
        ParameterValue::U8(self as u8)
    }

    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::U8(0) => Some(SwapTxState::Initial),
            ParameterValue::U8(1) => Some(SwapTxState::CreatingTx),
            ParameterValue::U8(2) => Some(SwapTxState::SigningTx),
            ParameterValue::U8(3) => Some(SwapTxState::Constructed),
            _ => None,
        }
    }
}
