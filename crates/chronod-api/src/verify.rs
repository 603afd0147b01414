//! Authorization check for externally-triggered cron endpoints.
//!
//! Platform schedulers call back over plain HTTP, authenticated by a
//! shared secret in the `Authorization` header. In development
//! (`NODE_ENV=development`) every request is allowed so local
//! dashboards work without a secret configured.

use serde::Serialize;

/// Outcome of a cron ping verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronAuth {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CronAuth {
    fn allowed() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// Check a request's `Authorization` header against the process
/// environment (`CRON_SECRET`, `NODE_ENV`).
pub fn verify_cron_request(authorization: Option<&str>) -> CronAuth {
    let secret = std::env::var("CRON_SECRET").ok();
    let node_env = std::env::var("NODE_ENV").ok();
    verify_with_env(authorization, secret.as_deref(), node_env.as_deref())
}

/// Environment-injected variant of [`verify_cron_request`].
pub fn verify_with_env(
    authorization: Option<&str>,
    secret: Option<&str>,
    node_env: Option<&str>,
) -> CronAuth {
    if node_env == Some("development") {
        return CronAuth::allowed();
    }
    let Some(secret) = secret else {
        return CronAuth::denied("CRON_SECRET environment variable not set");
    };
    let Some(header) = authorization else {
        return CronAuth::denied("Missing Authorization header");
    };
    if header == format!("Bearer {secret}") {
        CronAuth::allowed()
    } else {
        CronAuth::denied("Invalid Authorization header")
    }
}
