//! CLI 配置文件
//!
//! TOML 格式，`[tracking]` 表对应 `TrackingConfig`，`[simulation]` 表描述模拟服务端：
//!
//! ```toml
//! [tracking]
//! host = "127.0.0.1"
//! port = 2101
//! poll_interval_ms = 500
//! stream_ar_tags = false
//!
//! [simulation]
//! actors = 2
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use captury_sdk::TrackingConfig;
use serde::{Deserialize, Serialize};

/// 默认配置文件路径（`<config_dir>/captury/config.toml`）
pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("captury");
    path.push("config.toml");
    Ok(path)
}

/// 模拟服务端参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 演员数量
    pub actors: u32,
    /// 每个演员的关节名（链式骨架）
    pub joints: Vec<String>,
    /// 模拟服务端帧率
    pub server_fps: u32,
    /// AR 标记数量（仅在 `stream_ar_tags` 打开时生效）
    pub tags: u32,
    /// 相机数量
    pub cameras: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            actors: 2,
            joints: ["Hips", "Spine", "Neck", "Head"]
                .map(String::from)
                .to_vec(),
            server_fps: 60,
            tags: 2,
            cameras: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub tracking: TrackingConfig,
    pub simulation: SimulationConfig,
}

impl CliConfig {
    /// 加载配置；文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.tracking.validate().context("配置无效")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, format!("# Captury CLI Configuration\n\n{content}"))
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }
}
