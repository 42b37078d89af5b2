//! Google Sheets API v4 schedule source

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{table::rows_from_grid, ScheduleSource};
use crate::config::SheetsConfig;
use crate::errors::{ScheduleError, ScheduleResult};
use crate::models::ScheduleRow;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
enum Credentials {
    ApiKey(String),
    TokenFile(PathBuf),
}

pub struct SheetsScheduleSource {
    client: Client,
    url: Url,
    credentials: Credentials,
}

impl SheetsScheduleSource {
    pub fn new(config: &SheetsConfig) -> ScheduleResult<Self> {
        let spreadsheet_id = config
            .spreadsheet_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ScheduleError::Credentials {
                message: "no spreadsheet id configured".to_string(),
            })?;

        let credentials = match (&config.api_key, &config.access_token_file) {
            (_, Some(path)) => Credentials::TokenFile(path.clone()),
            (Some(key), None) => Credentials::ApiKey(key.clone()),
            (None, None) => {
                return Err(ScheduleError::Credentials {
                    message: "neither api_key nor access_token_file configured".to_string(),
                })
            }
        };

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: values_url(&config.endpoint, spreadsheet_id, &config.range)?,
            credentials,
        })
    }
}

/// `{endpoint}/v4/spreadsheets/{id}/values/{range}` with each segment escaped
fn values_url(endpoint: &str, spreadsheet_id: &str, range: &str) -> ScheduleResult<Url> {
    let invalid = |message: String| ScheduleError::decode("sheets", message);

    let mut url = Url::parse(endpoint)
        .map_err(|e| invalid(format!("invalid endpoint '{endpoint}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("endpoint '{endpoint}' cannot carry a path")))?
        .pop_if_empty()
        .extend(["v4", "spreadsheets", spreadsheet_id, "values", range]);
    Ok(url)
}

async fn read_token(path: &Path) -> ScheduleResult<String> {
    let token = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ScheduleError::Credentials {
            message: format!("cannot read token file {}: {e}", path.display()),
        })?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ScheduleError::Credentials {
            message: format!("token file {} is empty", path.display()),
        });
    }
    Ok(token.to_string())
}

#[async_trait]
impl ScheduleSource for SheetsScheduleSource {
    fn name(&self) -> &str {
        "sheets"
    }

    async fn fetch_rows(&self) -> ScheduleResult<Vec<ScheduleRow>> {
        let request = match &self.credentials {
            Credentials::ApiKey(key) => self.client.get(self.url.clone()).query(&[("key", key)]),
            Credentials::TokenFile(path) => {
                let token = read_token(path).await?;
                self.client.get(self.url.clone()).bearer_auth(token)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScheduleError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| ScheduleError::decode(self.name(), e.to_string()))?;
        let rows = rows_from_grid(&body.values);
        debug!("Fetched {} schedule rows from sheets", rows.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_values_url_escapes_range() {
        let url = values_url("https://sheets.example.com/", "sheet-id", "agenda!A1:Z").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.example.com/v4/spreadsheets/sheet-id/values/agenda!A1:Z"
        );

        let spaced = values_url("https://sheets.example.com", "id", "my agenda").unwrap();
        assert!(spaced.as_str().ends_with("/values/my%20agenda"));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = SheetsConfig {
            spreadsheet_id: Some("id".into()),
            ..SheetsConfig::default()
        };
        assert!(matches!(
            SheetsScheduleSource::new(&config),
            Err(ScheduleError::Credentials { .. })
        ));
    }

    #[tokio::test]
    async fn test_token_file_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  ya29.token  ").unwrap();
        assert_eq!(
            read_token(file.path()).await.unwrap(),
            "ya29.token"
        );
    }
}
