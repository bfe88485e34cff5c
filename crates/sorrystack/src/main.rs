mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sorrystack")]
#[command(about = "KDLで書く。メンテナンスページ付きのAWSスタックを合成する。", long_about = None)]
struct Cli {
    /// スタック定義ファイル（省略時は stack.kdl を検索）
    #[arg(long, global = true, env = "SORRYSTACK_STACK_PATH")]
    stack: Option<PathBuf>,

    /// 詳細ログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// CloudFormation テンプレートとアセットを出力
    Synth {
        /// 出力ディレクトリ（省略時は sorrystack.yaml の output_dir）
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// テンプレートを標準出力にも表示
        #[arg(short, long)]
        print: bool,
    },
    /// 記録済みのベースラインとの差分を表示
    Diff {
        /// 差分がある場合に終了コード 1 を返す
        #[arg(long)]
        fail: bool,
    },
    /// 現在の合成結果をベースラインとして記録
    Snapshot,
    /// スタック定義を検証
    Validate,
    /// リソースを依存順に一覧表示
    Ls {
        /// 各リソースの依存先も表示
        #[arg(short, long)]
        deps: bool,
    },
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Versionコマンドは定義ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("sorrystack {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let stack_path = utils::resolve_stack_path(cli.stack)?;

    match cli.command {
        Commands::Synth { out, print } => commands::synth::handle(&stack_path, out, print).await,
        Commands::Diff { fail } => commands::diff::handle(&stack_path, fail).await,
        Commands::Snapshot => commands::snapshot::handle(&stack_path).await,
        Commands::Validate => commands::validate::handle(&stack_path),
        Commands::Ls { deps } => commands::ls::handle(&stack_path, deps),
        Commands::Version => Ok(()),
    }
}
