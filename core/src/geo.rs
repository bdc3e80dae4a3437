use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeoCheckConfig;
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct IpLocation {
    ip: Option<String>,
    country: Option<String>,
}

/// Public IP address and the country it resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoReport {
    pub ip: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoVerdict {
    Allowed(GeoReport),
    Blocked(GeoReport),
}

impl GeoVerdict {
    pub fn report(&self) -> &GeoReport {
        match self {
            Self::Allowed(report) | Self::Blocked(report) => report,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// Resolve the public IP location and compare it against the blocked list
pub async fn check_location(config: &GeoCheckConfig) -> Result<GeoVerdict> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()?;

    debug!("Looking up public IP location via {}", config.endpoint);
    let location: IpLocation = client
        .get(&config.endpoint)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let report = report_from(location)?;
    let verdict = verdict(report, &config.blocked_countries);
    if verdict.is_blocked() {
        warn!("Public IP {} resolves to blocked country {}", verdict.report().ip, verdict.report().country);
    }
    Ok(verdict)
}

fn report_from(location: IpLocation) -> Result<GeoReport> {
    let ip = non_empty(location.ip)
        .ok_or_else(|| Error::GeoLookup("could not determine public IP".to_string()))?;
    let country = non_empty(location.country)
        .ok_or_else(|| Error::GeoLookup(format!("could not determine location of {}", ip)))?;
    Ok(GeoReport { ip, country })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Country names and ISO codes compare case-insensitively
pub fn verdict(report: GeoReport, blocked_countries: &[String]) -> GeoVerdict {
    let blocked = blocked_countries
        .iter()
        .any(|country| country.trim().eq_ignore_ascii_case(&report.country));
    if blocked {
        GeoVerdict::Blocked(report)
    } else {
        GeoVerdict::Allowed(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(country: &str) -> GeoReport {
        GeoReport {
            ip: "203.0.113.7".to_string(),
            country: country.to_string(),
        }
    }

    #[test]
    fn test_blocked_country_matches_code_or_name() {
        let blocked = GeoCheckConfig::default().blocked_countries;
        assert!(verdict(report("IR"), &blocked).is_blocked());
        assert!(verdict(report("iran"), &blocked).is_blocked());
        assert!(!verdict(report("DE"), &blocked).is_blocked());
    }

    #[test]
    fn test_missing_fields_are_lookup_errors() {
        let location: IpLocation = serde_json::from_str(r#"{"ip": "203.0.113.7"}"#).unwrap();
        let err = report_from(location).unwrap_err();
        assert!(matches!(err, Error::GeoLookup(msg) if msg.contains("203.0.113.7")));

        let location: IpLocation = serde_json::from_str(r#"{"ip": " ", "country": "DE"}"#).unwrap();
        assert!(report_from(location).is_err());
    }

    #[test]
    fn test_report_from_ipinfo_payload() {
        let location: IpLocation = serde_json::from_str(
            r#"{"ip": "203.0.113.7", "city": "Berlin", "country": "DE", "org": "AS0 Example"}"#,
        )
        .unwrap();
        assert_eq!(report_from(location).unwrap(), report("DE"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_lookup_error() {
        let config = GeoCheckConfig {
            enabled: true,
            endpoint: "http://127.0.0.1:1/json".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let err = check_location(&config).await.unwrap_err();
        assert!(matches!(err, Error::GeoLookup(_)));
    }
}
