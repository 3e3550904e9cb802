//! 서버 설정 — JSON 파일 + 환경 변수 오버라이드
//!
//! 우선순위: 기본값 < 파일 < 환경 변수

use crate::error::{MemDbError, MemDbResult};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, MAX_LOCK_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Redo log 내구성 수준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityLevel {
    /// 모든 커밋마다 fsync (최대 안전)
    #[default]
    Full,
    /// fsync를 백그라운드 워커에 위임
    Lazy,
    /// redo log를 기록하지 않음
    None,
}

impl DurabilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurabilityLevel::Full => "full",
            DurabilityLevel::Lazy => "lazy",
            DurabilityLevel::None => "none",
        }
    }

    pub fn parse_level(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Some(DurabilityLevel::Full),
            "lazy" => Some(DurabilityLevel::Lazy),
            "none" => Some(DurabilityLevel::None),
            _ => None,
        }
    }
}

/// 서버/데이터베이스 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// 모든 테이블 잠금의 기본 타임아웃 (ms)
    pub lock_timeout_ms: u64,
    /// 없으면 순수 인메모리
    pub data_dir: Option<PathBuf>,
    pub durability: DurabilityLevel,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7878".to_string(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            data_dir: None,
            durability: DurabilityLevel::Full,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// JSON 파일에서 로드 (누락된 필드는 기본값)
    pub fn load_from_file(path: &Path) -> MemDbResult<Self> {
        let json = fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// 환경 변수에서 오버라이드
    pub fn apply_env(&mut self) -> MemDbResult<()> {
        if let Ok(addr) = env::var("MEMDB_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(value) = env::var("MEMDB_LOCK_TIMEOUT_MS") {
            self.lock_timeout_ms = value.trim().parse().map_err(|_| {
                MemDbError::Config(format!("MEMDB_LOCK_TIMEOUT_MS is not a number: {value}"))
            })?;
        }
        if let Ok(dir) = env::var("MEMDB_DATA_DIR") {
            self.data_dir = if dir.is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Ok(value) = env::var("MEMDB_DURABILITY") {
            self.durability = DurabilityLevel::parse_level(&value).ok_or_else(|| {
                MemDbError::Config(format!("unknown durability level: {value}"))
            })?;
        }
        if let Ok(level) = env::var("MEMDB_LOG") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> MemDbResult<()> {
        if self.lock_timeout_ms == 0 {
            return Err(MemDbError::Config(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.lock_timeout() > MAX_LOCK_TIMEOUT {
            return Err(MemDbError::Config(format!(
                "lock_timeout_ms must not exceed {}",
                MAX_LOCK_TIMEOUT.as_millis()
            )));
        }
        if self.bind_addr.trim().is_empty() {
            return Err(MemDbError::Config("bind_addr must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
