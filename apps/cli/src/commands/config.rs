//! 配置管理命令

use std::path::Path;

use anyhow::{Result, bail};
use clap::Subcommand;

use crate::config::CliConfig;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 写入默认配置文件
    Init {
        /// 覆盖已有文件
        #[arg(short, long)]
        force: bool,
    },

    /// 显示生效的配置
    Show,

    /// 检查配置文件
    Check,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Init { force } => Self::init(path, force),
            ConfigCommand::Show => Self::show(path),
            ConfigCommand::Check => Self::check(path),
        }
    }

    fn init(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
        }
        CliConfig::default().save(path)?;
        println!("✅ 已写入默认配置: {}", path.display());
        Ok(())
    }

    fn show(path: &Path) -> Result<()> {
        let config = CliConfig::load(path)?;
        if !path.exists() {
            println!("# {} 不存在，显示默认配置", path.display());
        }
        print!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }

    fn check(path: &Path) -> Result<()> {
        if !path.exists() {
            println!("⚠️  配置文件不存在: {}", path.display());
            return Ok(());
        }
        let config = CliConfig::load(path)?;
        println!("✅ 配置有效: {}", path.display());
        println!(
            "   服务端: {}:{}，轮询间隔 {} ms",
            config.tracking.host, config.tracking.port, config.tracking.poll_interval_ms
        );
        Ok(())
    }
}
