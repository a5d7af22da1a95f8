use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use fiquela_cli::{Cli, Config};
use fiquela_common::FiqConfig;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "fiquela")]
#[command(version)]
#[command(about = "Run SQL-like queries against JSON and NDJSON files")]
struct Args {
    /// 查询文本,未给出时从 stdin 读取
    query_text: Option<String>,

    #[arg(short, long, conflicts_with = "query_text")]
    query: Option<String>,

    /// 默认输入文件
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[arg(long, default_value = "table")]
    format: String,

    /// 只输出执行计划
    #[arg(long)]
    explain: bool,

    #[arg(long, env = "FIQUELA_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    no_color: bool,
}

fn run(args: Args) -> anyhow::Result<()> {
    let fiq = match &args.config {
        Some(path) => FiqConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FiqConfig::default(),
    };
    fiquela_cli::init_logging(&fiq.log.level);

    let text = match args.query.or(args.query_text) {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read query from stdin")?;
            buf
        }
    };
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("no query given");
    }

    let cli = Cli::new(Config {
        file: args.file,
        format: args.format,
        color: !args.no_color,
        fiq,
    });

    if args.explain {
        print!("{}", cli.explain(text)?);
    } else {
        cli.execute(text)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let color = !args.no_color;
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if color {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
