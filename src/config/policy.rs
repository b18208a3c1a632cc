use log::warn;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Rate limiting policy for one route. The limit applies per client IP over
/// a window of `period` minutes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RatePolicy {
    pub route: String,
    pub limit: i64,
    #[serde(rename = "period")]
    pub minutes: i64,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("could not read rate policies: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown format for rate policies, JSON or CSV supported")]
    UnknownFormat,
    #[error("bad CSV policy row {0}: {1}")]
    BadRow(usize, String),
}

/// Load rate policies from a file, trying JSON first and falling back to
/// CSV (`route,limit,minutes` rows). A missing file yields no policies so
/// the server still comes up, unlimited.
pub fn load_policies(path: &str) -> Result<Vec<RatePolicy>, PolicyError> {
    if !Path::new(path).exists() {
        warn!("rate policy file {path} not found, running without rate limits");
        return Ok(Vec::new());
    }

    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }

    if let Ok(policies) = serde_json::from_str(&data) {
        return Ok(policies);
    }

    parse_csv_policies(&data)
}

fn parse_csv_policies(data: &str) -> Result<Vec<RatePolicy>, PolicyError> {
    let mut policies = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(PolicyError::UnknownFormat);
        }

        let limit = fields[1]
            .parse()
            .map_err(|_| PolicyError::BadRow(line_no + 1, "limit must be an integer".into()))?;
        let minutes = fields[2]
            .parse()
            .map_err(|_| PolicyError::BadRow(line_no + 1, "minutes must be an integer".into()))?;

        policies.push(RatePolicy {
            route: fields[0].to_string(),
            limit,
            minutes,
        });
    }

    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("oauth2-sandbox-policy-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_json_policies() {
        let path = write_temp(
            "policy.json",
            r#"[{"route": "/", "limit": 50, "period": 1}]"#,
        );

        let policies = load_policies(path.to_str().unwrap()).unwrap();
        assert_eq!(
            policies,
            vec![RatePolicy {
                route: "/".to_string(),
                limit: 50,
                minutes: 1
            }]
        );
    }

    #[test]
    fn test_load_csv_policies() {
        let path = write_temp("policy.csv", "/, 50, 1\n/token, 30, 1\n");

        let policies = load_policies(path.to_str().unwrap()).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[1].route, "/token");
        assert_eq!(policies[1].limit, 30);
        assert_eq!(policies[1].minutes, 1);
    }

    #[test]
    fn test_load_missing_file_yields_no_policies() {
        let policies = load_policies("/does/not/exist/policy.json").unwrap();
        assert!(policies.is_empty());
    }

    #[test]
    fn test_bad_csv_row() {
        let path = write_temp("policy-bad.csv", "/, fifty, 1\n");
        assert!(matches!(
            load_policies(path.to_str().unwrap()),
            Err(PolicyError::BadRow(1, _))
        ));
    }

    #[test]
    fn test_unknown_format() {
        let path = write_temp("policy-bad.txt", "just some text");
        assert!(matches!(
            load_policies(path.to_str().unwrap()),
            Err(PolicyError::UnknownFormat)
        ));
    }
}
