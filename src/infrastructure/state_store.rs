//! 状态存储 - 基础设施层
//!
//! 唯一权威的持久化状态：QueueItem、PlatformHealth、AttemptRecord。
//! 所有读写都经过同一把锁，每次修改都会落盘（写临时文件后 rename），
//! 落盘失败时内存状态回滚，保证每次修改要么完整生效要么完全不生效。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{AttemptRecord, Platform, PlatformHealth, QueueItem};

/// 持久化的全部状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub items: Vec<QueueItem>,
    #[serde(default)]
    pub health: BTreeMap<Platform, PlatformHealth>,
    #[serde(default)]
    pub records: Vec<AttemptRecord>,
    /// 下一个入队序号
    #[serde(default)]
    pub next_sequence: u64,
}

/// 状态存储
///
/// 职责：
/// - 持有唯一的 PersistedState
/// - 只暴露"读"和"原子修改"两种能力
/// - 不认识状态机规则
pub struct StateStore {
    path: Option<PathBuf>,
    state: Mutex<PersistedState>,
}

impl StateStore {
    /// 仅驻留内存的存储（测试用）
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(PersistedState::default()),
        }
    }

    /// 打开状态文件，不存在则从空状态开始
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if fs::try_exists(&path).await.unwrap_or(false) {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|source| StoreError::ReadFailed {
                    path: path.display().to_string(),
                    source,
                })?;
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            })?
        } else {
            debug!("状态文件不存在，使用空状态: {}", path.display());
            PersistedState::default()
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// 只读访问
    pub async fn read<R>(&self, f: impl FnOnce(&PersistedState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// 原子修改：闭包返回错误或落盘失败时，内存状态回滚到修改前
    pub async fn mutate<R, E>(
        &self,
        f: impl FnOnce(&mut PersistedState) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut state = self.state.lock().await;
        let snapshot = state.clone();

        let result = match f(&mut state) {
            Ok(r) => r,
            Err(e) => {
                *state = snapshot;
                return Err(e);
            }
        };

        if let Err(e) = self.persist(&state).await {
            *state = snapshot;
            return Err(e.into());
        }

        Ok(result)
    }

    async fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(state)?;
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, json)
            .await
            .map_err(|source| StoreError::WriteFailed {
                path: tmp_path.display().to_string(),
                source,
            })?;
        fs::rename(&tmp_path, path)
            .await
            .map_err(|source| StoreError::WriteFailed {
                path: path.display().to_string(),
                source,
            })?;

        Ok(())
    }
}
