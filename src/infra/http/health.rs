//! `GET /health`: store connectivity decides the status code, everything else is informational.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::application::error::ErrorReport;

use super::state::ApiState;

const SOURCE: &str = "infra::http::health";
const MEMINFO_PATH: &str = "/proc/meminfo";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBody {
    pub status: &'static str,
    pub database: &'static str,
    pub cache: CacheHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryHealth>,
    pub uploads: UploadsHealth,
}

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub backend: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHealth {
    pub total_kb: u64,
    pub available_kb: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadsHealth {
    pub bytes_used: Option<u64>,
}

pub async fn health(State(state): State<ApiState>) -> Response {
    let db = state.repo.ping().await;

    let cache = state.catalog.cache();
    let cache_status = match cache.ping().await {
        Ok(()) => "ok",
        Err(err) => {
            warn!(target = SOURCE, backend = cache.backend(), error = %err, "cache ping failed");
            "degraded"
        }
    };

    let bytes_used = match state.storage.usage_bytes().await {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(target = SOURCE, error = %err, "failed to measure upload usage");
            None
        }
    };

    let body = HealthBody {
        status: if db.is_ok() { "ok" } else { "error" },
        database: if db.is_ok() { "ok" } else { "unreachable" },
        cache: CacheHealth {
            backend: cache.backend(),
            status: cache_status,
        },
        memory: read_meminfo().await,
        uploads: UploadsHealth { bytes_used },
    };

    match db {
        Ok(()) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            let mut response = (status, Json(body)).into_response();
            ErrorReport::from_error(SOURCE, status, &err).attach(&mut response);
            response
        }
    }
}

async fn read_meminfo() -> Option<MemoryHealth> {
    let raw = tokio::fs::read_to_string(MEMINFO_PATH).await.ok()?;
    parse_meminfo(&raw)
}

fn parse_meminfo(raw: &str) -> Option<MemoryHealth> {
    let mut total = None;
    let mut available = None;

    for line in raw.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        match key.trim() {
            "MemTotal" => total = value,
            "MemAvailable" => available = value,
            _ => {}
        }
    }

    Some(MemoryHealth {
        total_kb: total?,
        available_kb: available?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_total_and_available() {
        let raw = "MemTotal:       16303428 kB\nMemFree:         1234 kB\nMemAvailable:   8123456 kB\n";
        assert_eq!(
            parse_meminfo(raw),
            Some(MemoryHealth {
                total_kb: 16_303_428,
                available_kb: 8_123_456,
            })
        );
    }

    #[test]
    fn missing_fields_yield_none() {
        assert_eq!(parse_meminfo("MemTotal: 100 kB\n"), None);
        assert_eq!(parse_meminfo(""), None);
    }

    #[test]
    fn body_omits_memory_when_unknown() {
        let body = HealthBody {
            status: "ok",
            database: "ok",
            cache: CacheHealth {
                backend: "memory",
                status: "ok",
            },
            memory: None,
            uploads: UploadsHealth {
                bytes_used: Some(0),
            },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert!(json.get("memory").is_none());
        assert_eq!(json["uploads"]["bytesUsed"], 0);
        assert_eq!(json["cache"]["backend"], "memory");
    }
}
