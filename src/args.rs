use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wiring::demo::DEFAULT_SCRIPT;

/// wiring - 进程内装配运行时演示
#[derive(Parser, Debug)]
#[command(name = "wiring", version)]
#[command(about = "依赖注入容器 + 响应式属性 + 事件总线的无界面演示")]
pub struct Args {
    /// 子命令（缺省运行 demo）
    #[command(subcommand)]
    pub command: Option<Command>,

    /// 配置文件路径（缺省 ~/.config/wiring/config.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 覆盖日志级别（trace|debug|info|warn|error）
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 运行计数器场景
    Demo {
        /// 动作脚本，逗号分隔：inc / inc:N / dec / dec:N / reset
        #[arg(long, default_value = DEFAULT_SCRIPT)]
        script: String,
        /// 不打印视图输出
        #[arg(long)]
        quiet: bool,
        /// 结束时打印容器统计
        #[arg(long)]
        stats: bool,
    },
    /// 打印生效的配置
    Config,
}

impl Default for Command {
    fn default() -> Self {
        Command::Demo {
            script: DEFAULT_SCRIPT.to_string(),
            quiet: false,
            stats: false,
        }
    }
}
