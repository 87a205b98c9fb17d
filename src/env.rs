use alloy::primitives::Address;
use clap::Parser;
use std::time::Duration;
use tracing::Level;

use crate::decode::TimestampFallback;
use crate::feed::{
    ContractAddresses, DEFAULT_BACKFILL_WINDOW, DEFAULT_CHUNK_SIZE, FeedDefinition, FeedName,
    FeedSettings,
};
use crate::lending::LendingMonitorConfig;
use crate::registry::{TokenInfo, TokenRegistry};
use crate::telemetry::{self, TelemetryGuard};

#[derive(clap::ValueEnum, Debug, Clone)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        (&log_level).into()
    }
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct EvmEnv {
    #[clap(short, long, env)]
    pub ws_rpc_url: url::Url,
    /// Every game controller deployment, comma separated
    #[clap(long, env, value_delimiter = ',')]
    pub game_controllers: Vec<Address>,
    #[clap(long, env)]
    pub marketplace: Option<Address>,
    #[clap(long, env)]
    pub auction_house: Option<Address>,
    #[clap(long, env)]
    pub offer_book: Option<Address>,
    #[clap(long, env)]
    pub lending_pool: Option<Address>,
}

#[derive(Parser, Debug, Clone)]
pub struct TokenEnv {
    #[clap(long, env)]
    pub stablecoin_address: Address,
    #[clap(long, env, default_value = "USDT")]
    pub stablecoin_symbol: String,
    #[clap(long, env, default_value = "6")]
    pub stablecoin_decimals: u8,
    #[clap(long, env)]
    pub platform_token_address: Address,
    #[clap(long, env)]
    pub platform_token_symbol: String,
    #[clap(long, env, default_value = "18")]
    pub platform_token_decimals: u8,
    /// Symbol of the chain's native currency, used for payment token zero
    #[clap(long, env)]
    pub native_symbol: Option<String>,
    #[clap(long, env, default_value = "18")]
    pub native_decimals: u8,
}

#[derive(Parser, Debug, Clone)]
pub struct Env {
    #[clap(long, env, default_value = "info")]
    pub log_level: LogLevel,
    #[clap(flatten)]
    pub evm_env: EvmEnv,
    #[clap(flatten)]
    pub token_env: TokenEnv,
    #[clap(long, env, value_enum)]
    pub feed: FeedName,
    /// Address whose activity is shown; ignored by the ranking feed
    #[clap(long, env)]
    pub principal: Option<Address>,
    /// Number of blocks behind the head covered by the backfill
    #[clap(long, env, default_value_t = DEFAULT_BACKFILL_WINDOW)]
    pub backfill_window: u64,
    /// Largest block range requested in one log query
    #[clap(long, env, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,
    /// Timeout in seconds for each log query and the head lookup
    #[clap(long, env, default_value = "30")]
    pub query_timeout_secs: u64,
    /// Timeout in seconds for dependent contract reads and block lookups
    #[clap(long, env, default_value = "10")]
    pub dependent_read_timeout_secs: u64,
    #[clap(long, env, value_enum, default_value = "absent")]
    pub timestamp_fallback: TimestampFallback,
    /// Interval in seconds between lending position refreshes
    #[clap(long, env, default_value = "5")]
    pub lending_refresh_secs: u64,
    /// API key for OTLP trace export (optional)
    #[clap(long, env)]
    pub otlp_api_key: Option<String>,
    #[clap(long, env, default_value = telemetry::DEFAULT_OTLP_ENDPOINT)]
    pub otlp_endpoint: String,
}

impl Env {
    pub const fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            backfill_window: self.backfill_window,
            chunk_size: self.chunk_size,
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            dependent_read_timeout: Duration::from_secs(self.dependent_read_timeout_secs),
            timestamp_fallback: self.timestamp_fallback,
        }
    }

    pub fn token_registry(&self) -> TokenRegistry {
        let tokens = &self.token_env;
        let registry = TokenRegistry::new(
            TokenInfo::new(
                tokens.stablecoin_address,
                &tokens.stablecoin_symbol,
                tokens.stablecoin_decimals,
            ),
            TokenInfo::new(
                tokens.platform_token_address,
                &tokens.platform_token_symbol,
                tokens.platform_token_decimals,
            ),
        );

        match &tokens.native_symbol {
            Some(symbol) => registry.with_native(symbol, tokens.native_decimals),
            None => registry,
        }
    }

    /// Unset contracts become the zero address, which leaves the feeds that
    /// need them idle.
    pub fn contract_addresses(&self) -> ContractAddresses {
        ContractAddresses {
            game_controllers: self.evm_env.game_controllers.clone(),
            marketplace: self.evm_env.marketplace.unwrap_or_default(),
            auction_house: self.evm_env.auction_house.unwrap_or_default(),
            offer_book: self.evm_env.offer_book.unwrap_or_default(),
            lending_pool: self.evm_env.lending_pool.unwrap_or_default(),
        }
    }

    pub fn feed_definition(&self) -> FeedDefinition {
        FeedDefinition::for_name(self.feed, &self.contract_addresses())
    }

    /// `None` unless both a principal and a lending pool are configured.
    pub fn lending_monitor_config(&self) -> Option<LendingMonitorConfig> {
        let user = self.principal.filter(|principal| *principal != Address::ZERO)?;
        let lending_pool = self
            .evm_env
            .lending_pool
            .filter(|pool| *pool != Address::ZERO)?;

        Some(LendingMonitorConfig {
            lending_pool,
            user,
            refresh_interval: Duration::from_secs(self.lending_refresh_secs),
            read_timeout: Duration::from_secs(self.dependent_read_timeout_secs),
        })
    }
}

pub fn default_filter(level: Level) -> String {
    format!("ledger_feed={level},ledger_chain={level}")
}

fn console_filter(level: Level) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(level).into())
}

/// Console logging, plus OTLP export when an API key is configured. The
/// returned guard flushes pending spans when dropped.
pub fn setup_tracing(env: &Env) -> Option<TelemetryGuard> {
    let level: Level = (&env.log_level).into();

    if let Some(ref api_key) = env.otlp_api_key {
        match telemetry::setup_telemetry(api_key.clone(), &env.otlp_endpoint, level) {
            Ok(guard) => return Some(guard),
            Err(e) => {
                eprintln!("Failed to set up OTLP telemetry: {e}, falling back to console logging");
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(console_filter(level))
        .compact()
        .init();

    if env.otlp_api_key.is_none() {
        tracing::warn!("No OTLP_API_KEY configured - running with console logging only");
    }

    None
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::test_utils::{
        GAME_CONTROLLER, GAME_CONTROLLER_V2, LENDING_POOL, PLATFORM_TOKEN, PRINCIPAL, USDT,
    };

    fn parse(args: &[&str]) -> Env {
        let mut argv = vec![
            "ledger-feed",
            "--ws-rpc-url",
            "ws://localhost:8545",
            "--stablecoin-address",
            "0x00000000000000000000000000000000000000d1",
            "--platform-token-address",
            "0x00000000000000000000000000000000000000d2",
            "--platform-token-symbol",
            "DICE",
        ];
        argv.extend_from_slice(args);
        Env::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_log_level_from_conversion() {
        let level: Level = LogLevel::Trace.into();
        assert_eq!(Level::TRACE, level);

        let level: Level = LogLevel::Debug.into();
        assert_eq!(Level::DEBUG, level);

        let level: Level = LogLevel::Info.into();
        assert_eq!(Level::INFO, level);

        let level: Level = LogLevel::Warn.into();
        assert_eq!(Level::WARN, level);

        let level: Level = LogLevel::Error.into();
        assert_eq!(Level::ERROR, level);

        let log_level = LogLevel::Debug;
        let level: Level = (&log_level).into();
        assert_eq!(level, Level::DEBUG);
    }

    #[test]
    fn test_defaults() {
        let env = parse(&["--feed", "game"]);
        let settings = env.feed_settings();

        assert_eq!(env.feed, FeedName::Game);
        assert_eq!(settings.backfill_window, 50_000);
        assert_eq!(settings.chunk_size, 50_000);
        assert_eq!(settings.query_timeout, Duration::from_secs(30));
        assert_eq!(settings.timestamp_fallback, TimestampFallback::Absent);
        assert!(matches!(env.log_level, LogLevel::Info));
        assert!(env.otlp_api_key.is_none());
    }

    #[test]
    fn test_game_controllers_are_comma_separated() {
        let env = parse(&[
            "--feed",
            "game",
            "--game-controllers",
            "0x1000000000000000000000000000000000000001,0x1000000000000000000000000000000000000002",
        ]);

        assert_eq!(
            env.contract_addresses().game_controllers,
            vec![GAME_CONTROLLER, GAME_CONTROLLER_V2]
        );
        assert_eq!(env.feed_definition().sources.len(), 8);
    }

    #[test]
    fn test_token_registry_from_flags() {
        let env = parse(&["--feed", "nft", "--native-symbol", "ETH"]);
        let registry = env.token_registry();

        assert_eq!(registry.stablecoin().address, USDT);
        assert_eq!(registry.stablecoin().decimals, 6);
        assert_eq!(registry.platform_token().address, PLATFORM_TOKEN);
        assert_eq!(registry.unit_for(Address::ZERO).symbol(), Some("ETH"));
    }

    #[test]
    fn test_missing_contracts_are_zero() {
        let env = parse(&["--feed", "lending"]);

        assert_eq!(env.contract_addresses().lending_pool, Address::ZERO);
        assert!(!env.feed_definition().is_configured());
        assert!(env.lending_monitor_config().is_none());
    }

    #[test]
    fn test_lending_monitor_config() {
        let env = parse(&[
            "--feed",
            "lending",
            "--principal",
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "--lending-pool",
            "0x3000000000000000000000000000000000000001",
            "--timestamp-fallback",
            "local-clock",
        ]);

        let config = env.lending_monitor_config().unwrap();
        assert_eq!(config.user, PRINCIPAL);
        assert_eq!(config.lending_pool, LENDING_POOL);
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(
            env.feed_settings().timestamp_fallback,
            TimestampFallback::LocalClock
        );
    }

    #[test]
    fn test_default_filter_covers_both_crates() {
        assert_eq!(
            default_filter(Level::DEBUG),
            "ledger_feed=DEBUG,ledger_chain=DEBUG"
        );
    }
}
