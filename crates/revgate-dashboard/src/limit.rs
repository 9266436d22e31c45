//! Usage-limit client.
//!
//! Talks to the dashboard's private limit endpoints with an
//! authenticated browser session cookie, the same way the dashboard
//! UI does: POST the new limit, then read it back and confirm the
//! flag actually changed. Both signals must agree before a run counts
//! as successful.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use revgate_core::config::DashboardSettings;
use revgate_core::{Error, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36";

/// Limit state as the dashboard reports it. The endpoint omits fields
/// freely, so everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitState {
    pub no_usage_based_allowed: Option<bool>,
    pub hard_limit: Option<f64>,
    pub hard_limit_per_user: Option<f64>,
}

/// Body posted to change the limit. Disabling usage-based pricing
/// zeroes both numeric limits and raises the flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRequest {
    pub hard_limit: u64,
    pub no_usage_based_allowed: bool,
    pub hard_limit_per_user: u64,
}

impl LimitRequest {
    pub fn disable_usage_based() -> Self {
        Self {
            hard_limit: 0,
            no_usage_based_allowed: true,
            hard_limit_per_user: 0,
        }
    }
}

/// What a disable run observed: whether the POST landed, and the
/// state read back afterwards.
#[derive(Debug, Clone)]
pub struct LimitOutcome {
    pub set_ok: bool,
    pub state: Option<LimitState>,
}

impl LimitOutcome {
    pub fn succeeded(&self) -> bool {
        classify(self.set_ok, self.state.as_ref())
    }
}

/// A run succeeds only when the set request returned 200 and the
/// read-back confirms `noUsageBasedAllowed` is true. Every other
/// combination is a failure.
pub fn classify(set_ok: bool, state: Option<&LimitState>) -> bool {
    set_ok && state.is_some_and(|s| s.no_usage_based_allowed == Some(true))
}

#[derive(Debug)]
pub struct LimitClient {
    http: reqwest::Client,
    settings: DashboardSettings,
    cookie: String,
}

impl LimitClient {
    pub fn new(settings: &DashboardSettings) -> Result<Self> {
        let cookie = settings.cookie.clone().ok_or_else(|| {
            Error::Config(
                "dashboard.cookie is not configured; copy a session cookie from the browser first"
                    .to_string(),
            )
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            settings: settings.clone(),
            cookie,
        })
    }

    /// POSTs the limit change. `Ok(false)` means the dashboard
    /// rejected the request (anything but 200); transport failures
    /// are errors.
    pub async fn set_hard_limit(&self, request: &LimitRequest) -> Result<bool> {
        let url = format!("{}/set-hard-limit", self.settings.base_url);
        debug!("POST {}", url);
        let response = self
            .browser_post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Http(format!("set-hard-limit request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            info!("hard limit accepted by dashboard");
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("set-hard-limit rejected: {} {}", status, body);
            Ok(false)
        }
    }

    /// Reads the current limit state back. The endpoint is a POST
    /// with an empty JSON body.
    pub async fn get_hard_limit(&self) -> Result<LimitState> {
        let url = format!("{}/get-hard-limit", self.settings.base_url);
        debug!("POST {}", url);
        let response = self
            .browser_post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| Error::Http(format!("get-hard-limit request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Api(format!("get-hard-limit returned {}", status)));
        }
        response
            .json::<LimitState>()
            .await
            .map_err(|e| Error::Api(format!("get-hard-limit body did not parse: {}", e)))
    }

    /// Full disable flow: set the zeroed limit, then verify it stuck.
    pub async fn disable_usage_based(&self) -> Result<LimitOutcome> {
        let set_ok = self
            .set_hard_limit(&LimitRequest::disable_usage_based())
            .await?;
        if !set_ok {
            return Ok(LimitOutcome {
                set_ok,
                state: None,
            });
        }

        let state = self.get_hard_limit().await?;
        if state.no_usage_based_allowed != Some(true) {
            warn!("dashboard accepted the limit but the flag did not change");
        }
        Ok(LimitOutcome {
            set_ok,
            state: Some(state),
        })
    }

    /// Common header set that makes the request look like the
    /// dashboard UI's own fetch call.
    fn browser_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("Content-Type", "application/json")
            .header("Cookie", &self.cookie)
            .header("User-Agent", USER_AGENT)
            .header("Referer", &self.settings.referer)
            .header("Origin", &self.settings.origin)
            .header("Priority", "u=1, i")
    }
}
