//! Constant product (x * y = k) reference oracle

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use backrun_core::{
    Market, MarketId, MintId, Quote, QuoteError, QuoteParams, QuoteResult, SwapLeg, SwapMode,
    SwapParams,
};

use crate::oracle::QuoteOracle;

/// Pool state snapshot for a constant product market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    pub reserve_a: U256,
    pub reserve_b: U256,
    /// Swap fee, usually 30 (0.3%)
    pub fee_bps: u16,
}

impl Reserves {
    pub fn new(reserve_a: u64, reserve_b: u64, fee_bps: u16) -> Self {
        Self {
            reserve_a: U256::from(reserve_a),
            reserve_b: U256::from(reserve_b),
            fee_bps,
        }
    }
}

#[derive(Debug, Clone)]
struct Pool {
    market: Market,
    reserves: Reserves,
}

impl Pool {
    /// (reserve_in, reserve_out) for a swap selling `source`
    fn oriented(&self, source: &MintId, destination: &MintId) -> QuoteResult<(U256, U256)> {
        let m = &self.market;
        if &m.mint_a == source && &m.mint_b == destination {
            Ok((self.reserves.reserve_a, self.reserves.reserve_b))
        } else if &m.mint_b == source && &m.mint_a == destination {
            Ok((self.reserves.reserve_b, self.reserves.reserve_a))
        } else {
            Err(QuoteError::Unpriceable {
                market: m.id.clone(),
                reason: format!("{} -> {} not traded here", source, destination),
            })
        }
    }

    /// amountOut = (amountIn * fee * reserveOut) / (reserveIn * 10000 + amountIn * fee)
    fn amount_out(&self, amount_in: U256, reserve_in: U256, reserve_out: U256) -> QuoteResult<U256> {
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(QuoteError::PoolNotInitialized(self.market.id.clone()));
        }
        if amount_in.is_zero() {
            return Ok(U256::ZERO);
        }

        let fee_multiplier = U256::from(10_000u16.saturating_sub(self.reserves.fee_bps));
        let amount_in_with_fee = amount_in
            .checked_mul(fee_multiplier)
            .ok_or_else(|| self.overflow())?;
        let numerator = amount_in_with_fee
            .checked_mul(reserve_out)
            .ok_or_else(|| self.overflow())?;
        let denominator = reserve_in
            .checked_mul(U256::from(10_000))
            .and_then(|r| r.checked_add(amount_in_with_fee))
            .ok_or_else(|| self.overflow())?;

        Ok(numerator / denominator)
    }

    fn amount_in(&self, amount_out: U256, reserve_in: U256, reserve_out: U256) -> QuoteResult<U256> {
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(QuoteError::PoolNotInitialized(self.market.id.clone()));
        }
        if amount_out >= reserve_out {
            return Err(QuoteError::InsufficientLiquidity(self.market.id.clone()));
        }

        let fee_multiplier = U256::from(10_000u16.saturating_sub(self.reserves.fee_bps));
        let numerator = reserve_in
            .checked_mul(amount_out)
            .and_then(|n| n.checked_mul(U256::from(10_000)))
            .ok_or_else(|| self.overflow())?;
        let denominator = (reserve_out - amount_out) * fee_multiplier;

        Ok(numerator / denominator + U256::from(1))
    }

    fn overflow(&self) -> QuoteError {
        QuoteError::Unpriceable {
            market: self.market.id.clone(),
            reason: "amount overflow".into(),
        }
    }
}

fn check_fee(market: &MarketId, reserves: &Reserves) -> QuoteResult<()> {
    if reserves.fee_bps >= 10_000 {
        return Err(QuoteError::Unpriceable {
            market: market.clone(),
            reason: format!("fee {} bps", reserves.fee_bps),
        });
    }
    Ok(())
}

/// In-memory constant product replica
#[derive(Debug, Default)]
pub struct ConstantProductOracle {
    pools: HashMap<MarketId, Pool>,
}

impl ConstantProductOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    fn pool(&self, id: &MarketId) -> QuoteResult<&Pool> {
        self.pools
            .get(id)
            .ok_or_else(|| QuoteError::PoolNotFound(id.clone()))
    }
}

impl QuoteOracle for ConstantProductOracle {
    type Snapshot = Reserves;

    fn add_pool(&mut self, market: &Market, snapshot: Reserves) -> QuoteResult<Vec<String>> {
        check_fee(&market.id, &snapshot)?;
        debug!("Adding pool {} ({})", market.id, market.dex);

        let accounts = [&market.vault_a, &market.vault_b]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        self.pools.insert(
            market.id.clone(),
            Pool {
                market: market.clone(),
                reserves: snapshot,
            },
        );
        Ok(accounts)
    }

    fn update_pool(&mut self, market: &MarketId, snapshot: Reserves) -> QuoteResult<()> {
        let pool = self
            .pools
            .get_mut(market)
            .ok_or_else(|| QuoteError::PoolNotFound(market.clone()))?;
        check_fee(market, &snapshot)?;
        pool.reserves = snapshot;
        Ok(())
    }

    fn calculate_quote(&self, market: &MarketId, params: &QuoteParams) -> QuoteResult<Quote> {
        let pool = self.pool(market)?;
        let (reserve_in, reserve_out) = pool.oriented(&params.source_mint, &params.destination_mint)?;

        match params.swap_mode {
            SwapMode::ExactIn => {
                let out = pool.amount_out(params.amount, reserve_in, reserve_out)?;
                Ok(Quote::new(params.amount, out))
            }
            SwapMode::ExactOut => {
                let needed = pool.amount_in(params.amount, reserve_in, reserve_out)?;
                Ok(Quote::new(needed, params.amount))
            }
        }
    }

    fn calculate_swap_leg(&self, market: &MarketId, params: &SwapParams) -> QuoteResult<SwapLeg> {
        let pool = self.pool(market)?;
        // validates the direction
        pool.oriented(&params.source_mint, &params.destination_mint)?;

        let mut accounts = vec![market.as_str().to_string()];
        accounts.extend(pool.market.vault_a.iter().cloned());
        accounts.extend(pool.market.vault_b.iter().cloned());
        accounts.push(params.user_transfer_authority.clone());

        Ok(SwapLeg {
            market: market.clone(),
            source_mint: params.source_mint.clone(),
            destination_mint: params.destination_mint.clone(),
            in_amount: params.in_amount,
            minimum_out_amount: params.minimum_out_amount,
            accounts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backrun_core::{DexLabel, RouteHopParams, SOL_MINT, USDC_MINT};

    fn sol() -> MintId {
        MintId::from(SOL_MINT)
    }

    fn usdc() -> MintId {
        MintId::from(USDC_MINT)
    }

    fn oracle_with_pool(reserves: Reserves) -> ConstantProductOracle {
        let mut oracle = ConstantProductOracle::new();
        let market = Market::new("m1", sol(), usdc(), DexLabel::Raydium);
        oracle.add_pool(&market, reserves).unwrap();
        oracle
    }

    #[test]
    fn test_amount_out() {
        // 1000 in, 0.3% fee, 1M/1M reserves
        let oracle = oracle_with_pool(Reserves::new(1_000_000, 1_000_000, 30));
        let params = QuoteParams::exact_in(sol(), usdc(), U256::from(1000u64));
        let quote = oracle.calculate_quote(&MarketId::from("m1"), &params).unwrap();

        // 9_970_000 * 1_000_000 / (10_000_000_000 + 9_970_000) = 996
        assert_eq!(quote.in_amount, U256::from(1000u64));
        assert_eq!(quote.out_amount, U256::from(996u64));
    }

    #[test]
    fn test_exact_out_covers_requested_output() {
        let oracle = oracle_with_pool(Reserves::new(1_000_000, 2_000_000, 30));
        let id = MarketId::from("m1");

        let exact_out = QuoteParams {
            swap_mode: SwapMode::ExactOut,
            ..QuoteParams::exact_in(sol(), usdc(), U256::from(5000u64))
        };
        let needed = oracle.calculate_quote(&id, &exact_out).unwrap();

        let back = QuoteParams::exact_in(sol(), usdc(), needed.in_amount);
        let out = oracle.calculate_quote(&id, &back).unwrap();
        assert!(out.out_amount >= U256::from(5000u64));
    }

    #[test]
    fn test_exact_out_beyond_reserves_is_insufficient_liquidity() {
        let oracle = oracle_with_pool(Reserves::new(1_000, 1_000, 30));
        let params = QuoteParams {
            swap_mode: SwapMode::ExactOut,
            ..QuoteParams::exact_in(sol(), usdc(), U256::from(1_000u64))
        };

        let err = oracle.calculate_quote(&MarketId::from("m1"), &params).unwrap_err();
        assert!(matches!(err, QuoteError::InsufficientLiquidity(_)));
        assert!(err.is_expected());
    }

    #[test]
    fn test_unknown_pool() {
        let oracle = ConstantProductOracle::new();
        let params = QuoteParams::exact_in(sol(), usdc(), U256::from(1u64));
        let err = oracle.calculate_quote(&MarketId::from("nope"), &params).unwrap_err();
        assert_eq!(err, QuoteError::PoolNotFound(MarketId::from("nope")));
    }

    #[test]
    fn test_update_pool_changes_price() {
        let mut oracle = oracle_with_pool(Reserves::new(1_000_000, 1_000_000, 30));
        let id = MarketId::from("m1");
        let params = QuoteParams::exact_in(sol(), usdc(), U256::from(1000u64));
        let before = oracle.calculate_quote(&id, &params).unwrap();

        oracle.update_pool(&id, Reserves::new(1_000_000, 2_000_000, 30)).unwrap();
        let after = oracle.calculate_quote(&id, &params).unwrap();
        assert!(after.out_amount > before.out_amount);
    }

    #[test]
    fn test_route_stops_at_failing_hop() {
        let oracle = oracle_with_pool(Reserves::new(1_000_000, 1_000_000, 30));
        let hops = vec![
            RouteHopParams {
                market: MarketId::from("m1"),
                source_mint: sol(),
                destination_mint: usdc(),
            },
            RouteHopParams {
                market: MarketId::from("missing"),
                source_mint: usdc(),
                destination_mint: sol(),
            },
        ];

        let quote = oracle.calculate_route(U256::from(1000u64), &hops);
        assert_eq!(quote.in_amount, U256::from(1000u64));
        assert!(quote.is_unpriceable());
    }

    #[test]
    fn test_swap_leg_lists_accounts() {
        let mut oracle = ConstantProductOracle::new();
        let mut market = Market::new("m1", sol(), usdc(), DexLabel::Orca);
        market.vault_a = Some("vault-a".into());
        market.vault_b = Some("vault-b".into());
        let accounts = oracle.add_pool(&market, Reserves::new(10, 10, 30)).unwrap();
        assert_eq!(accounts, vec!["vault-a".to_string(), "vault-b".to_string()]);

        let leg = oracle
            .calculate_swap_leg(
                &MarketId::from("m1"),
                &SwapParams {
                    source_mint: usdc(),
                    destination_mint: sol(),
                    in_amount: U256::from(5u64),
                    minimum_out_amount: U256::from(1u64),
                    user_transfer_authority: "payer".into(),
                },
            )
            .unwrap();
        assert_eq!(leg.accounts, vec!["m1", "vault-a", "vault-b", "payer"]);
    }
}
