//! WFS query construction

use crate::error::FetchError;
use chrono::{DateTime, Utc};
use reqwest::Url;

/// Stored query returning all requested stations in one coverage
pub const STORED_QUERY_ID: &str = "fmi::observations::weather::multipointcoverage";

/// Parameter order determines tuple column order in the response
pub const WIND_PARAMETERS: &str = "windspeedms,windgust,winddirection";

fn format_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Build the getFeature URL for a batch of stations
pub fn build_query_url(
    base_url: &str,
    station_ids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Url, FetchError> {
    if start > end {
        return Err(FetchError::InvalidRequest(format!(
            "window start {} is after end {}",
            start, end
        )));
    }

    let mut url = Url::parse(base_url)
        .map_err(|e| FetchError::InvalidRequest(format!("bad base URL {}: {}", base_url, e)))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("service", "WFS")
            .append_pair("version", "2.0.0")
            .append_pair("request", "getFeature")
            .append_pair("storedquery_id", STORED_QUERY_ID)
            .append_pair("starttime", &format_time(&start))
            .append_pair("endtime", &format_time(&end));
        for id in station_ids {
            query.append_pair("fmisid", id);
        }
        query.append_pair("parameters", WIND_PARAMETERS);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_build_url() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = vec!["100996".to_string(), "101023".to_string()];

        let url = build_query_url("https://opendata.fmi.fi/wfs", &ids, start, end).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("starttime".into(), "2024-01-01T10:00:00Z".into())));
        assert!(pairs.contains(&("endtime".into(), "2024-01-01T12:00:00Z".into())));
        assert_eq!(pairs.iter().filter(|(k, _)| k == "fmisid").count(), 2);
        assert!(pairs.contains(&("parameters".into(), WIND_PARAMETERS.into())));
    }

    #[test]
    fn test_reversed_window_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let result = build_query_url("https://opendata.fmi.fi/wfs", &[], start, end);
        assert!(matches!(result, Err(FetchError::InvalidRequest(_))));
    }
}
