use std::time::Duration;

use crate::backend::Endpoints;
use crate::dashboard::ViewKind;
use crate::limits::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::push::socket_io_url;

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings for the `rentdesk` binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub push_url: String,
    pub company_id: String,
    pub endpoints: Endpoints,
    pub views: Vec<ViewKind>,
    pub request_timeout: Duration,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = get("RENTDESK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(invalid("RENTDESK_API_URL", &api_url, "must start with http:// or https://"));
        }

        let push_url = match get("RENTDESK_PUSH_URL") {
            Some(url) => url,
            None => socket_io_url(&api_url)
                .map_err(|e| invalid("RENTDESK_API_URL", &api_url, e.to_string()))?,
        };

        let company_id = get("RENTDESK_COMPANY_ID").ok_or(ConfigError::Missing("RENTDESK_COMPANY_ID"))?;

        let endpoints = match get("RENTDESK_API_PROFILE") {
            Some(profile) => Endpoints::from_profile(&profile)
                .ok_or_else(|| invalid("RENTDESK_API_PROFILE", &profile, "expected standard or legacy"))?,
            None => Endpoints::default(),
        };

        let views = match get("RENTDESK_VIEWS") {
            Some(list) => parse_views(&list)?,
            None => vec![ViewKind::PendingRequests],
        };

        let timeout_ms = match get("RENTDESK_REQUEST_TIMEOUT_MS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => return Err(invalid("RENTDESK_REQUEST_TIMEOUT_MS", &raw, "must be positive")),
                Ok(ms) => ms,
                Err(e) => return Err(invalid("RENTDESK_REQUEST_TIMEOUT_MS", &raw, e.to_string())),
            },
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };

        let metrics_port = get("RENTDESK_METRICS_PORT")
            .map(|raw| {
                raw.parse::<u16>()
                    .map_err(|e| invalid("RENTDESK_METRICS_PORT", &raw, e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            api_url,
            push_url,
            company_id,
            endpoints,
            views,
            request_timeout: Duration::from_millis(timeout_ms),
            metrics_port,
        })
    }
}

fn parse_views(list: &str) -> Result<Vec<ViewKind>, ConfigError> {
    let mut views = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let kind = ViewKind::parse(part)
            .ok_or_else(|| invalid("RENTDESK_VIEWS", part, "expected current, history or pending"))?;
        if !views.contains(&kind) {
            views.push(kind);
        }
    }
    if views.is_empty() {
        return Err(invalid("RENTDESK_VIEWS", list, "no views listed"));
    }
    Ok(views)
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}
