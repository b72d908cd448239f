use std::path::PathBuf;

use cswd_warehouse::{resolve_home, WarehouseConfig, DEFAULT_CHUNK_SIZE};
use time::macros::date;
use time::{Date, OffsetDateTime};

use crate::cache::FreshnessPolicy;
use crate::throttling::ThrottlePolicy;

/// First trading day of the Shanghai exchange; incremental refreshes of an
/// empty table start here.
pub const MARKET_EPOCH: Date = date!(1990 - 12 - 10);

#[derive(Debug, Clone)]
pub struct Settings {
    pub home: PathBuf,
    pub cache_root: PathBuf,
    pub db_path: PathBuf,
    pub freshness: FreshnessPolicy,
    pub market_epoch: Date,
    pub chunk_size: usize,
    pub throttle: ThrottlePolicy,
}

impl Settings {
    pub fn under(home: impl Into<PathBuf>) -> Self {
        let warehouse = WarehouseConfig::under(home);
        Self {
            cache_root: warehouse.home.join("webcache"),
            db_path: warehouse.db_path,
            home: warehouse.home,
            freshness: FreshnessPolicy::default(),
            market_epoch: MARKET_EPOCH,
            chunk_size: DEFAULT_CHUNK_SIZE,
            throttle: ThrottlePolicy::default(),
        }
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        WarehouseConfig {
            home: self.home.clone(),
            db_path: self.db_path.clone(),
            chunk_size: self.chunk_size,
        }
    }

    /// Calendar date in the market's timezone.
    pub fn market_today(&self, now: OffsetDateTime) -> Date {
        now.to_offset(self.freshness.offset).date()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::under(resolve_home())
    }
}
