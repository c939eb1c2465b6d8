use crate::{config::FeedSettings, error::HarvestError};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One row of an aggregator search result. Columns the core does not use are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FeedRow {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "job_url")]
    pub url: Option<String>,
    #[serde(alias = "job_level")]
    pub experience: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery<'a> {
    pub site: &'a str,
    pub search_term: &'a str,
    pub location: &'a str,
    pub results_wanted: u32,
    pub offset: u32,
}

#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    async fn search(&self, query: &FeedQuery<'_>) -> Result<Vec<FeedRow>, HarvestError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    jobs: Vec<FeedRow>,
}

/// Client for a JobSpy-compatible search API.
pub struct JobSpyClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl JobSpyClient {
    pub fn new(settings: &FeedSettings, timeout: Duration) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build feed client: {}", e)))?;
        Ok(JobSpyClient {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait::async_trait]
impl FeedClient for JobSpyClient {
    async fn search(&self, query: &FeedQuery<'_>) -> Result<Vec<FeedRow>, HarvestError> {
        let url = format!("{}/api/v1/search_jobs", self.endpoint);
        let results_wanted = query.results_wanted.to_string();
        let offset = query.offset.to_string();
        debug!("Search {} for {:?} at offset {}", query.site, query.search_term, offset);

        let mut request = self.client.get(&url).query(&[
            ("site_name", query.site),
            ("search_term", query.search_term),
            ("location", query.location),
            ("results_wanted", results_wanted.as_str()),
            ("offset", offset.as_str()),
        ]);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HarvestError::transport(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Http {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| HarvestError::Feed(format!("invalid response from {}: {}", url, e)))?;
        Ok(body.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_search_response() {
        let body = r#"{
            "count": 2,
            "jobs": [
                {
                    "id": "li-3811",
                    "site": "linkedin",
                    "title": "Data Scientist",
                    "company": "Acme",
                    "location": "New York, NY, US",
                    "job_url": "https://www.linkedin.com/jobs/view/3811",
                    "job_level": "mid-senior level",
                    "description": null,
                    "min_amount": 120000
                },
                { "title": "ML Engineer", "company": null, "job_url": "https://www.indeed.com/viewjob?jk=9" }
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();

        assert_eq!(
            response.jobs[0],
            FeedRow {
                title: Some("Data Scientist".into()),
                company: Some("Acme".into()),
                location: Some("New York, NY, US".into()),
                url: Some("https://www.linkedin.com/jobs/view/3811".into()),
                experience: Some("mid-senior level".into()),
                description: None,
            }
        );
        assert_eq!(response.jobs[1].company, None);
        assert_eq!(response.jobs[1].location, None);
    }

    #[test]
    fn missing_jobs_is_empty() {
        let response: SearchResponse = serde_json::from_str(r#"{"count": 0}"#).unwrap();
        assert!(response.jobs.is_empty());
    }
}
