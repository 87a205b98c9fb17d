use alloy::rpc::types::Log;

use super::{DecodeContext, decode_event};
use crate::bindings::ILendingPool::{Borrowed, CollateralDeposited, Liquidated, Repaid};
use crate::entry::{EntryDetails, HistoryEntry};
use crate::error::DecodeError;
use crate::registry::format_amount;

/// Health factors are reported as 18-decimal fixed point (1e18 == 1.0).
pub const HEALTH_FACTOR_DECIMALS: u8 = 18;

type Decoded = Result<Option<HistoryEntry>, DecodeError>;

pub(super) fn collateral_deposited(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let CollateralDeposited {
        user,
        token,
        amount,
    } = decode_event(log)?;

    if !ctx.owns(user) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.unit_for(token),
        EntryDetails::CollateralDeposited { user, token },
    )
    .map(Some)
}

pub(super) fn borrowed(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let Borrowed {
        user,
        amount,
        healthFactor,
    } = decode_event(log)?;

    if !ctx.owns(user) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.stablecoin_unit(),
        EntryDetails::Borrowed {
            user,
            health_factor: format_amount(healthFactor, HEALTH_FACTOR_DECIMALS)?,
        },
    )
    .map(Some)
}

pub(super) fn repaid(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let Repaid { user, amount } = decode_event(log)?;

    if !ctx.owns(user) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.stablecoin_unit(),
        EntryDetails::Repaid { user },
    )
    .map(Some)
}

/// Primary amount is the debt covered (stablecoin); the seized collateral is
/// carried in its own token's precision.
pub(super) fn liquidated(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let Liquidated {
        user,
        liquidator,
        collateralToken,
        debtCovered,
        collateralSeized,
    } = decode_event(log)?;

    if !ctx.owns(user) {
        return Ok(None);
    }

    let collateral_decimals = ctx.registry.unit_for(collateralToken).decimals();

    ctx.entry(
        log,
        debtCovered,
        ctx.registry.stablecoin_unit(),
        EntryDetails::Liquidated {
            user,
            liquidator,
            collateral_token: collateralToken,
            collateral_seized: format_amount(collateralSeized, collateral_decimals)?,
        },
    )
    .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{EventKind, Scope};
    use crate::test_utils::{LENDING_POOL, PLATFORM_TOKEN, PRINCIPAL, STRANGER, event_log, test_registry};
    use alloy::primitives::U256;
    use ledger_chain::TestChain;
    use std::time::Duration;

    async fn decode(kind: EventKind, log: &Log) -> Decoded {
        let chain = TestChain::new(0);
        let registry = test_registry();
        let ctx = DecodeContext {
            scope: Scope::Principal(PRINCIPAL),
            registry: &registry,
            reader: &chain,
            dependent_read_timeout: Duration::from_millis(50),
        };

        kind.decode(log, &ctx).await
    }

    #[tokio::test]
    async fn test_borrow_formats_health_factor() {
        let log = event_log(
            LENDING_POOL,
            &Borrowed {
                user: PRINCIPAL,
                amount: U256::from(100_000_000u64),
                healthFactor: U256::from(1_850_000_000_000_000_000u128),
            },
            100,
            0,
        );

        let entry = decode(EventKind::Borrowed, &log).await.unwrap().unwrap();

        assert_eq!(entry.primary_amount, "100");
        assert_eq!(
            entry.details,
            EntryDetails::Borrowed {
                user: PRINCIPAL,
                health_factor: "1.85".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_liquidation_of_principal() {
        let log = event_log(
            LENDING_POOL,
            &Liquidated {
                user: PRINCIPAL,
                liquidator: STRANGER,
                collateralToken: PLATFORM_TOKEN,
                debtCovered: U256::from(40_000_000u64),
                collateralSeized: U256::from(500_000_000_000_000_000u128),
            },
            100,
            0,
        );

        let entry = decode(EventKind::Liquidated, &log).await.unwrap().unwrap();

        assert_eq!(entry.primary_amount, "40");
        assert_eq!(
            entry.details,
            EntryDetails::Liquidated {
                user: PRINCIPAL,
                liquidator: STRANGER,
                collateral_token: PLATFORM_TOKEN,
                collateral_seized: "0.5".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_liquidation_performed_by_principal_is_not_theirs() {
        let log = event_log(
            LENDING_POOL,
            &Liquidated {
                user: STRANGER,
                liquidator: PRINCIPAL,
                collateralToken: PLATFORM_TOKEN,
                debtCovered: U256::from(1u64),
                collateralSeized: U256::from(1u64),
            },
            100,
            0,
        );

        assert!(decode(EventKind::Liquidated, &log).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collateral_and_repay() {
        let deposited = event_log(
            LENDING_POOL,
            &CollateralDeposited {
                user: PRINCIPAL,
                token: PLATFORM_TOKEN,
                amount: U256::from(1_000_000_000_000_000_000u128),
            },
            100,
            0,
        );
        let repaid = event_log(
            LENDING_POOL,
            &Repaid {
                user: PRINCIPAL,
                amount: U256::from(5_000_000u64),
            },
            101,
            0,
        );

        let deposited = decode(EventKind::CollateralDeposited, &deposited)
            .await
            .unwrap()
            .unwrap();
        let repaid = decode(EventKind::Repaid, &repaid).await.unwrap().unwrap();

        assert_eq!(deposited.primary_amount, "1");
        assert_eq!(deposited.display_unit.symbol(), Some("DICE"));
        assert_eq!(repaid.primary_amount, "5");
    }
}
