//! GitHub REST analyzer
//!
//! Produces a repository summary from three GitHub endpoints: repository
//! metadata, the language byte breakdown and the top contributors.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use repolens_core::{AnalysisPayload, Analyzer, AnalyzerError, ResourceKey, ResourceOrigin};
use reqwest::{header::HeaderMap, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use crate::config::GithubConfig;

const API_VERSION: &str = "2022-11-28";

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct RepoInfo {
    full_name: String,
    html_url: String,
    description: Option<String>,
    homepage: Option<String>,
    default_branch: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    archived: bool,
    license: Option<LicenseInfo>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    subscribers_count: u64,
    #[serde(default)]
    open_issues_count: u64,
    #[serde(default)]
    size: u64,
    created_at: Option<String>,
    updated_at: Option<String>,
    pushed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LicenseInfo {
    spdx_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contributor {
    login: Option<String>,
    html_url: Option<String>,
    contributions: u64,
}

#[derive(Debug, Deserialize)]
struct GithubErrorBody {
    message: String,
}

/// One row of the language breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageShare {
    pub name: String,
    pub bytes: u64,
    pub percentage: f64,
}

// ============================================================================
// ANALYZER
// ============================================================================

/// Analyzer backed by the GitHub REST API.
pub struct GithubAnalyzer {
    client: Client,
    api_url: String,
    token: Option<SecretString>,
    origin: ResourceOrigin,
    max_contributors: usize,
}

impl GithubAnalyzer {
    /// Create an analyzer for keys under `origin`.
    pub fn new(config: &GithubConfig, origin: ResourceOrigin) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("repolens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalyzerError::Upstream {
                status: None,
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            origin,
            max_contributors: config.max_contributors.max(1),
        })
    }

    /// Split a key into `(owner, repo)`.
    fn owner_and_repo<'a>(&self, key: &'a ResourceKey) -> Result<(&'a str, &'a str), AnalyzerError> {
        let unanalyzable = |reason: &str| AnalyzerError::Unanalyzable {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let path = self
            .origin
            .relative_path(key)
            .ok_or_else(|| unanalyzable("not a repository on the configured origin"))?;
        let path = path.trim_end_matches(".git");

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next(), segments.next()) {
            (Some(owner), Some(repo), None) => Ok((owner, repo)),
            _ => Err(unanalyzable("expected an owner/repository reference")),
        }
    }

    /// GET `path`, returning `None` on 404 and on 204 (GitHub answers
    /// 204 for statistics it has nothing to report on). Callers that
    /// expect a collection fall back to an empty one.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, AnalyzerError> {
        let url = format!("{}{}", self.api_url, path);
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let response = request.send().await.map_err(|e| AnalyzerError::Upstream {
            status: e.status().map(|s| s.as_u16()),
            message: format!("GitHub request failed: {}", e),
        })?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => return Ok(None),
            _ if status.is_success() => {
                return response
                    .json::<T>()
                    .await
                    .map(Some)
                    .map_err(|e| invalid_response(path, e))
            }
            _ => {}
        }

        let retry_after_secs = parse_retry_after_secs(response.headers());
        let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && is_rate_limit_exhausted(response.headers()));
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<GithubErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);

        Err(if rate_limited {
            AnalyzerError::RateLimited { retry_after_secs }
        } else {
            AnalyzerError::Upstream {
                status: Some(status.as_u16()),
                message,
            }
        })
    }
}

#[async_trait]
impl Analyzer for GithubAnalyzer {
    async fn analyze(&self, key: &ResourceKey) -> Result<Option<AnalysisPayload>, AnalyzerError> {
        let (owner, repo) = self.owner_and_repo(key)?;
        let base = format!("/repos/{}/{}", owner, repo);

        let Some(info) = self.get_json::<RepoInfo>(&base).await? else {
            tracing::debug!(%key, "repository not found on GitHub");
            return Ok(None);
        };
        if info.size == 0 {
            return Err(AnalyzerError::Unanalyzable {
                key: key.to_string(),
                reason: "repository is empty".to_string(),
            });
        }

        let languages = self
            .get_json::<BTreeMap<String, u64>>(&format!("{}/languages", base))
            .await?
            .unwrap_or_default();
        let contributors = self
            .get_json::<Vec<Contributor>>(&format!(
                "{}/contributors?per_page={}",
                base, self.max_contributors
            ))
            .await?
            .unwrap_or_default();

        tracing::debug!(
            %key,
            languages = languages.len(),
            contributors = contributors.len(),
            "GitHub analysis complete"
        );

        Ok(Some(build_payload(info, &languages, contributors)))
    }

    fn name(&self) -> &'static str {
        "github"
    }
}

impl std::fmt::Debug for GithubAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubAnalyzer")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("origin", &self.origin)
            .finish()
    }
}

// ============================================================================
// PAYLOAD ASSEMBLY
// ============================================================================

fn build_payload(
    info: RepoInfo,
    languages: &BTreeMap<String, u64>,
    contributors: Vec<Contributor>,
) -> AnalysisPayload {
    let contributors: Vec<_> = contributors
        .into_iter()
        .filter_map(|c| {
            c.login.map(|login| {
                json!({
                    "login": login,
                    "contributions": c.contributions,
                    "profile": c.html_url,
                })
            })
        })
        .collect();

    AnalysisPayload::new(json!({
        "repository": {
            "full_name": info.full_name,
            "url": info.html_url,
            "description": info.description,
            "homepage": info.homepage.filter(|h| !h.is_empty()),
            "default_branch": info.default_branch,
            "topics": info.topics,
            "license": info.license.and_then(|l| l.spdx_id.or(l.name)),
            "fork": info.fork,
            "archived": info.archived,
            "created_at": info.created_at,
            "updated_at": info.updated_at,
            "pushed_at": info.pushed_at,
        },
        "stats": {
            "stars": info.stargazers_count,
            "forks": info.forks_count,
            "watchers": info.subscribers_count,
            "open_issues": info.open_issues_count,
            "size_kb": info.size,
        },
        "languages": language_breakdown(languages),
        "contributors": contributors,
        "analyzed_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// Languages ordered by byte count, with percentages rounded to two places.
pub fn language_breakdown(languages: &BTreeMap<String, u64>) -> Vec<LanguageShare> {
    let total: u64 = languages.values().sum();
    let mut shares: Vec<LanguageShare> = languages
        .iter()
        .map(|(name, &bytes)| LanguageShare {
            name: name.clone(),
            bytes,
            percentage: if total == 0 {
                0.0
            } else {
                ((bytes as f64 / total as f64) * 10_000.0).round() / 100.0
            },
        })
        .collect();
    shares.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.name.cmp(&b.name)));
    shares
}

fn invalid_response(path: &str, err: impl std::fmt::Display) -> AnalyzerError {
    AnalyzerError::InvalidResponse {
        reason: format!("{}: {}", path, err),
    }
}

fn is_rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim() == "0")
}

fn parse_retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    if let Some(secs) = headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
    {
        return Some(secs);
    }
    headers
        .get("x-ratelimit-reset")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .map(|reset| (reset - Utc::now().timestamp()).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn analyzer() -> GithubAnalyzer {
        GithubAnalyzer::new(&GithubConfig::default(), ResourceOrigin::default()).unwrap()
    }

    #[test]
    fn test_owner_and_repo() {
        let analyzer = analyzer();
        let key = ResourceOrigin::default().canonicalize("rust-lang/rust");
        assert_eq!(analyzer.owner_and_repo(&key).unwrap(), ("rust-lang", "rust"));

        let key = ResourceOrigin::default().canonicalize("tokio-rs/tokio.git");
        assert_eq!(analyzer.owner_and_repo(&key).unwrap(), ("tokio-rs", "tokio"));
    }

    #[test]
    fn test_owner_and_repo_rejects_other_shapes() {
        let analyzer = analyzer();
        for reference in ["just-owner", "a/b/c"] {
            let key = ResourceOrigin::default().canonicalize(reference);
            assert!(matches!(
                analyzer.owner_and_repo(&key),
                Err(AnalyzerError::Unanalyzable { .. })
            ));
        }

        let foreign = ResourceKey::from_canonical("https://gitlab.com/owner/repo");
        assert!(matches!(
            analyzer.owner_and_repo(&foreign),
            Err(AnalyzerError::Unanalyzable { .. })
        ));
    }

    #[test]
    fn test_language_breakdown() {
        let languages = BTreeMap::from([
            ("Shell".to_string(), 250),
            ("Rust".to_string(), 700),
            ("Makefile".to_string(), 50),
        ]);
        let shares = language_breakdown(&languages);
        let names: Vec<_> = shares.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Rust", "Shell", "Makefile"]);
        assert_eq!(shares[0].percentage, 70.0);
        assert_eq!(shares[2].percentage, 5.0);
    }

    #[test]
    fn test_language_breakdown_empty() {
        assert!(language_breakdown(&BTreeMap::new()).is_empty());
        let zero = BTreeMap::from([("Text".to_string(), 0)]);
        assert_eq!(language_breakdown(&zero)[0].percentage, 0.0);
    }

    #[test]
    fn test_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        assert!(!is_rate_limit_exhausted(&headers));
        assert_eq!(parse_retry_after_secs(&headers), None);

        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("retry-after", HeaderValue::from_static("42"));
        assert!(is_rate_limit_exhausted(&headers));
        assert_eq!(parse_retry_after_secs(&headers), Some(42));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = GithubConfig {
            token: Some(SecretString::from("ghp_secret".to_string())),
            ..GithubConfig::default()
        };
        let analyzer = GithubAnalyzer::new(&config, ResourceOrigin::default()).unwrap();
        let debug = format!("{:?}", analyzer);
        assert!(!debug.contains("ghp_secret"));
    }
}
