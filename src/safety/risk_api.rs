//! External risk API client
//!
//! Best-effort honeypot screening via an HTTP risk service. A transport or
//! parse failure degrades to `Unknown` so the bot's own network issues never
//! produce false positives; the decision layer treats Unknown as non-blocking.

use async_trait::async_trait;
use ethers::types::Address;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RiskApiConfig;
use crate::safety::Probe;

/// Screening collaborator; trait seam so tests can inject fixed verdicts
#[async_trait]
pub trait RiskOracle: Send + Sync {
    async fn screen(&self, token: Address) -> Probe;
}

/// JSON body returned by the risk service
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    #[serde(default)]
    pub is_honeypot: bool,
    #[serde(default)]
    pub cannot_sell_all: bool,
    #[serde(default)]
    pub transfer_pausable: bool,
    #[serde(default)]
    pub is_blacklisted: bool,
    #[serde(default)]
    pub buy_tax: f64,
    #[serde(default)]
    pub sell_tax: f64,
}

impl RiskReport {
    /// Apply the flag logic: any hard flag or a tax above the ceiling fails
    pub fn verdict(&self, max_tax_pct: f64) -> Probe {
        let flagged = self.is_honeypot
            || self.cannot_sell_all
            || self.transfer_pausable
            || self.is_blacklisted
            || self.buy_tax > max_tax_pct
            || self.sell_tax > max_tax_pct;

        if flagged {
            Probe::Fail
        } else {
            Probe::Pass
        }
    }
}

/// HTTP GET implementation of the risk oracle
pub struct HttpRiskOracle {
    client: reqwest::Client,
    config: RiskApiConfig,
}

impl HttpRiskOracle {
    pub fn new(config: RiskApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

#[async_trait]
impl RiskOracle for HttpRiskOracle {
    async fn screen(&self, token: Address) -> Probe {
        let url = format!("{}?address={:#x}", self.config.base_url, token);

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("risk API unreachable, treating as unknown: {}", e);
                return Probe::Unknown;
            }
        };

        if !response.status().is_success() {
            warn!(
                "risk API returned {}, treating as unknown",
                response.status()
            );
            return Probe::Unknown;
        }

        match response.json::<RiskReport>().await {
            Ok(report) => {
                let verdict = report.verdict(self.config.max_tax_pct);
                debug!("risk API verdict for {:#x}: {:?}", token, verdict);
                verdict
            }
            Err(e) => {
                warn!("risk API body undecodable, treating as unknown: {}", e);
                Probe::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_report_passes() {
        let report = RiskReport::default();
        assert_eq!(report.verdict(10.0), Probe::Pass);
    }

    #[test]
    fn test_honeypot_flag_fails() {
        let report = RiskReport {
            is_honeypot: true,
            ..Default::default()
        };
        assert_eq!(report.verdict(10.0), Probe::Fail);
    }

    #[test]
    fn test_tax_over_ceiling_fails() {
        let report = RiskReport {
            sell_tax: 12.5,
            ..Default::default()
        };
        assert_eq!(report.verdict(10.0), Probe::Fail);

        let at_ceiling = RiskReport {
            sell_tax: 10.0,
            ..Default::default()
        };
        assert_eq!(at_ceiling.verdict(10.0), Probe::Pass);
    }

    #[test]
    fn test_pausable_and_blacklist_flags_fail() {
        for report in [
            RiskReport {
                transfer_pausable: true,
                ..Default::default()
            },
            RiskReport {
                is_blacklisted: true,
                ..Default::default()
            },
            RiskReport {
                cannot_sell_all: true,
                ..Default::default()
            },
        ] {
            assert_eq!(report.verdict(10.0), Probe::Fail);
        }
    }

    #[test]
    fn test_report_deserializes_partial_body() {
        let report: RiskReport =
            serde_json::from_str(r#"{"isHoneypot": true, "sellTax": 3.0}"#).unwrap();
        assert!(report.is_honeypot);
        assert!((report.sell_tax - 3.0).abs() < f64::EPSILON);
        assert!(!report.transfer_pausable);
    }
}
