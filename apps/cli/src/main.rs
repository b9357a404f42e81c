//! # Captury CLI
//!
//! Command-line interface for Captury Live skeletal tracking.
//!
//! ```bash
//! # 写入默认配置（~/.config/captury/config.toml）
//! captury-cli config init
//!
//! # 对进程内模拟服务端运行跟踪线程 + 逐帧消费端
//! captury-cli simulate --actors 3 --ar-tags --duration 10
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{ConfigCommand, SimulateCommand};

/// Captury CLI - 动作捕捉跟踪命令行工具
#[derive(Parser, Debug)]
#[command(name = "captury-cli")]
#[command(about = "Command-line interface for Captury Live skeletal tracking", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 `<config_dir>/captury/config.toml`）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 对模拟服务端运行跟踪
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("captury_cli=info,captury_driver=info,captury_client=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_config_path()?,
    };

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&config_path),
        Commands::Simulate { args } => args.execute(&config_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate_flags() {
        let cli = Cli::try_parse_from([
            "captury-cli",
            "simulate",
            "--port",
            "2200",
            "--ar-tags",
            "--duration",
            "1.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate { args } => {
                assert_eq!(args.port, Some(2200));
                assert!(args.ar_tags);
                assert_eq!(args.duration, Some(1.5));
                assert_eq!(args.frequency, 30);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["captury-cli", "config", "show", "--config", "/tmp/c.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Config(ConfigCommand::Show)));
    }
}
