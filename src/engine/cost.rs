use std::sync::Arc;

use uuid::Uuid;

use crate::models::delivery::DeliveryRequest;
use crate::models::driver::Driver;

/// Cost of sending `driver` to `request`. Lower is better.
pub trait CostModel: Send + Sync {
    fn cost(&self, driver: &Driver, request: &DeliveryRequest) -> f64;
}

/// Every pairing costs the same, so efficiency selection falls back to its
/// id-hash rotation.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatCost;

impl CostModel for FlatCost {
    fn cost(&self, _driver: &Driver, _request: &DeliveryRequest) -> f64 {
        0.0
    }
}

/// Prefers higher rated drivers; urgent requests weigh rating twice as much.
#[derive(Debug, Default, Clone, Copy)]
pub struct RatingCost;

impl CostModel for RatingCost {
    fn cost(&self, driver: &Driver, request: &DeliveryRequest) -> f64 {
        let shortfall = 5.0 - driver.rating.clamp(0.0, 5.0);
        if request.is_urgent() {
            shortfall * 2.0
        } else {
            shortfall
        }
    }
}

/// Which `CostModel` the engine is built with, selected by `COST_MODEL`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CostModelKind {
    #[default]
    Flat,
    Rating,
}

impl CostModelKind {
    pub fn build(self) -> Arc<dyn CostModel> {
        match self {
            CostModelKind::Flat => Arc::new(FlatCost),
            CostModelKind::Rating => Arc::new(RatingCost),
        }
    }
}

impl std::str::FromStr for CostModelKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "rating" => Ok(Self::Rating),
            other => Err(format!("unknown cost model: {other}, expected flat/rating")),
        }
    }
}

/// Stable numeric hash of a request id: its leading 32 bits.
pub fn id_hash(id: &Uuid) -> u64 {
    (id.as_u128() >> 96) as u64
}
