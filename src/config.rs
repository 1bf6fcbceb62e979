use std::env;
use std::time::Duration;

use crate::engine::cost::CostModelKind;
use crate::engine::reroute::RerouteSettings;
use crate::error::AppError;
use crate::models::schedule::{DispatchMethod, DispatchSettings};

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub dispatch_interval_secs: u64,
    pub commit_pacing_ms: u64,
    pub dispatch_method: DispatchMethod,
    pub cost_model: CostModelKind,
    pub prioritize_urgent: bool,
    pub max_distance_km: f64,
    pub auto_dispatch: bool,
    pub reroute_delay_threshold_min: i64,
    pub reroute_eta_offset_min: i64,
    pub auto_reroute: bool,
    pub store_conditional_assign: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            dispatch_interval_secs: 120,
            commit_pacing_ms: 500,
            dispatch_method: DispatchMethod::Proximity,
            cost_model: CostModelKind::Flat,
            prioritize_urgent: true,
            max_distance_km: 25.0,
            auto_dispatch: false,
            reroute_delay_threshold_min: 10,
            reroute_eta_offset_min: 15,
            auto_reroute: false,
            store_conditional_assign: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            dispatch_interval_secs: parse_or_default(
                "DISPATCH_INTERVAL_SECS",
                defaults.dispatch_interval_secs,
            )?,
            commit_pacing_ms: parse_or_default("COMMIT_PACING_MS", defaults.commit_pacing_ms)?,
            dispatch_method: parse_or_default("DISPATCH_METHOD", defaults.dispatch_method)?,
            cost_model: parse_or_default("COST_MODEL", defaults.cost_model)?,
            prioritize_urgent: parse_or_default("PRIORITIZE_URGENT", defaults.prioritize_urgent)?,
            max_distance_km: parse_or_default("MAX_DISTANCE_KM", defaults.max_distance_km)?,
            auto_dispatch: parse_or_default("AUTO_DISPATCH", defaults.auto_dispatch)?,
            reroute_delay_threshold_min: parse_or_default(
                "REROUTE_DELAY_THRESHOLD_MIN",
                defaults.reroute_delay_threshold_min,
            )?,
            reroute_eta_offset_min: parse_or_default(
                "REROUTE_ETA_OFFSET_MIN",
                defaults.reroute_eta_offset_min,
            )?,
            auto_reroute: parse_or_default("AUTO_REROUTE", defaults.auto_reroute)?,
            store_conditional_assign: parse_or_default(
                "STORE_CONDITIONAL_ASSIGN",
                defaults.store_conditional_assign,
            )?,
        };

        if config.dispatch_interval_secs == 0 {
            return Err(AppError::Internal(
                "invalid DISPATCH_INTERVAL_SECS: must be > 0".to_string(),
            ));
        }
        if config.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            prioritize_urgent: self.prioritize_urgent,
            dispatch_method: self.dispatch_method,
            max_distance_km: self.max_distance_km,
        }
    }

    pub fn reroute_settings(&self) -> RerouteSettings {
        RerouteSettings {
            delay_threshold_minutes: self.reroute_delay_threshold_min,
            automatic_rerouting: self.auto_reroute,
            eta_offset_minutes: self.reroute_eta_offset_min,
            pacing: self.commit_pacing(),
        }
    }

    pub fn commit_pacing(&self) -> Duration {
        Duration::from_millis(self.commit_pacing_ms)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
