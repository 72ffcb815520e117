//! Quote and swap parameter types

use alloy_primitives::{I256, U256};
use serde::{Deserialize, Serialize};

use crate::{MarketId, MintId};

/// Whether `amount` is the exact input or the exact output of a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SwapMode {
    #[default]
    ExactIn,
    ExactOut,
}

/// Parameters for a single-market quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteParams {
    pub source_mint: MintId,
    pub destination_mint: MintId,
    pub amount: U256,
    pub swap_mode: SwapMode,
}

impl QuoteParams {
    pub fn exact_in(source_mint: MintId, destination_mint: MintId, amount: U256) -> Self {
        Self {
            source_mint,
            destination_mint,
            amount,
            swap_mode: SwapMode::ExactIn,
        }
    }
}

/// Computed input/output pair; `out_amount == 0` means unpriceable at this size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub in_amount: U256,
    pub out_amount: U256,
}

impl Quote {
    pub fn new(in_amount: U256, out_amount: U256) -> Self {
        Self { in_amount, out_amount }
    }

    pub fn unpriceable(in_amount: U256) -> Self {
        Self {
            in_amount,
            out_amount: U256::ZERO,
        }
    }

    pub fn is_unpriceable(&self) -> bool {
        self.out_amount.is_zero()
    }

    /// Flashloan fee owed on the borrowed input
    pub fn flashloan_fee(&self, fee_bps: u16) -> U256 {
        self.in_amount * U256::from(fee_bps) / U256::from(10_000u64)
    }

    /// `out - in - flashloan fee`, negative when the round trip loses
    pub fn profit(&self, flashloan_fee_bps: u16) -> I256 {
        signed(self.out_amount) - signed(self.in_amount) - signed(self.flashloan_fee(flashloan_fee_bps))
    }
}

fn signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

/// One hop of a batched route evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHopParams {
    pub market: MarketId,
    pub source_mint: MintId,
    pub destination_mint: MintId,
}

/// Parameters for building an executable swap leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    pub source_mint: MintId,
    pub destination_mint: MintId,
    pub in_amount: U256,
    pub minimum_out_amount: U256,
    pub user_transfer_authority: String,
}

/// Opaque leg descriptor handed to bundle construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapLeg {
    pub market: MarketId,
    pub source_mint: MintId,
    pub destination_mint: MintId,
    pub in_amount: U256,
    pub minimum_out_amount: U256,
    pub accounts: Vec<String>,
}
