//! Known-token registry used to pick decimals and display symbols for amounts.

use alloy::primitives::utils::{UnitsError, format_units};
use alloy::primitives::{Address, U256};
use serde::Serialize;

/// Precision assumed for tokens the registry does not know about.
pub const DEFAULT_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// The unit an entry's primary amount is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DisplayUnit {
    Known { symbol: String, decimals: u8 },
    /// Token not in the registry; the amount was scaled by [`DEFAULT_DECIMALS`].
    Unresolved { token: Address, decimals: u8 },
}

impl DisplayUnit {
    pub const fn decimals(&self) -> u8 {
        match self {
            Self::Known { decimals, .. } | Self::Unresolved { decimals, .. } => *decimals,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Known { symbol, .. } => Some(symbol),
            Self::Unresolved { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenRegistry {
    stablecoin: TokenInfo,
    platform_token: TokenInfo,
    /// Payment-token address zero means the chain's native currency.
    native: Option<TokenInfo>,
}

impl TokenRegistry {
    pub fn new(stablecoin: TokenInfo, platform_token: TokenInfo) -> Self {
        Self {
            stablecoin,
            platform_token,
            native: None,
        }
    }

    #[must_use]
    pub fn with_native(mut self, symbol: impl Into<String>, decimals: u8) -> Self {
        self.native = Some(TokenInfo::new(Address::ZERO, symbol, decimals));
        self
    }

    pub const fn stablecoin(&self) -> &TokenInfo {
        &self.stablecoin
    }

    pub const fn platform_token(&self) -> &TokenInfo {
        &self.platform_token
    }

    fn lookup(&self, token: Address) -> Option<&TokenInfo> {
        [Some(&self.stablecoin), Some(&self.platform_token), self.native.as_ref()]
            .into_iter()
            .flatten()
            .find(|info| info.address == token)
    }

    pub fn unit_for(&self, token: Address) -> DisplayUnit {
        self.lookup(token).map_or(
            DisplayUnit::Unresolved {
                token,
                decimals: DEFAULT_DECIMALS,
            },
            |info| DisplayUnit::Known {
                symbol: info.symbol.clone(),
                decimals: info.decimals,
            },
        )
    }

    pub fn stablecoin_unit(&self) -> DisplayUnit {
        self.unit_for(self.stablecoin.address)
    }
}

/// Renders base units as a plain decimal string without trailing zeros,
/// e.g. 50_000_000 with 6 decimals becomes "50".
pub fn format_amount(raw: U256, decimals: u8) -> Result<String, UnitsError> {
    let formatted = format_units(raw, decimals)?;

    if !formatted.contains('.') {
        return Ok(formatted);
    }

    Ok(formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string())
}
