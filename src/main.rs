use anyhow::Result;
use clap::{Arg, Command};

use dcron::common::{start_application, StartupConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("dcron")
        .version("1.0.0")
        .about("分布式定时任务执行引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，不指定时依次查找默认位置"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("hostname")
                .long("hostname")
                .value_name("NAME")
                .help("持有锁时使用的标识，默认取本机主机名"),
        )
        .get_matches();

    let startup_config = StartupConfig {
        config_path: matches.get_one::<String>("config").cloned(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        log_format: matches.get_one::<String>("log-format").cloned(),
        hostname: matches.get_one::<String>("hostname").cloned(),
    };

    start_application(startup_config).await
}
