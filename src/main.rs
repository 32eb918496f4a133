use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use blocklaunch::core::content::{ContentSpec, ModEntry};
use blocklaunch::core::error::LauncherResult;
use blocklaunch::core::install::{
    EventSink, InstallEvent, InstallPipeline, InstallRequest, LoaderSpec, StageStatus,
};
use blocklaunch::core::java::ensure_runtime;
use blocklaunch::core::launch::{self, LaunchRequest};
use blocklaunch::core::loaders::LoaderKind;
use blocklaunch::core::state::{default_data_dir, LauncherConfig, LauncherContext};
use blocklaunch::core::version::VersionResolver;

/// Install and launch Minecraft from the command line.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Launcher data directory (versions, libraries, assets, instances).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install a game version, optionally with a loader and content.
    Install(InstallArgs),
    /// Start an installed version.
    Launch(LaunchArgs),
    /// Write the run script for an installed version without starting it.
    Script(LaunchArgs),
}

#[derive(Args, Debug)]
struct InstallArgs {
    /// Game version, e.g. 1.20.1
    version: String,
    /// none, fabric or forge
    #[arg(long, default_value = "none")]
    loader: LoaderKind,
    /// Loader build; the recommended one when omitted.
    #[arg(long)]
    loader_version: Option<String>,
    /// Modpack archive to unpack into the game directory.
    #[arg(long, conflicts_with = "mods")]
    modpack: Option<String>,
    /// Mod jar URL; repeat for several.
    #[arg(long = "mod")]
    mods: Vec<String>,
}

#[derive(Args, Debug)]
struct LaunchArgs {
    /// Descriptor id as reported by `install`.
    version: String,
    #[arg(long, default_value = "Player")]
    username: String,
    /// Heap size in MiB.
    #[arg(long)]
    memory: Option<u32>,
    #[arg(long, requires = "height")]
    width: Option<u32>,
    #[arg(long, requires = "width")]
    height: Option<u32>,
    /// Java binary; a managed runtime is used when omitted.
    #[arg(long)]
    java: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    blocklaunch::init_logging();
    let cli = Cli::parse();

    let result = match build_context(cli.data_dir) {
        Ok(ctx) => match cli.command {
            Command::Install(args) => install(ctx, args).await,
            Command::Launch(args) => run_game(&ctx, args).await,
            Command::Script(args) => write_script(&ctx, args).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn build_context(data_dir: Option<PathBuf>) -> LauncherResult<LauncherContext> {
    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    let config = LauncherConfig::load_or_default(&data_dir)?;
    LauncherContext::new(config)
}

async fn install(ctx: LauncherContext, args: InstallArgs) -> LauncherResult<()> {
    let content = match (args.modpack, args.mods) {
        (Some(url), _) => Some(ContentSpec::Modpack { url }),
        (None, mods) if !mods.is_empty() => {
            Some(ContentSpec::Mods(mods.into_iter().map(ModEntry::new).collect()))
        }
        _ => None,
    };
    let request = InstallRequest {
        version_id: args.version,
        loader: LoaderSpec {
            kind: args.loader,
            version: args.loader_version,
        },
        content,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            report(event);
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling install");
            on_interrupt.cancel();
        }
    });

    let pipeline = InstallPipeline::new(ctx);
    let outcome = pipeline.run(&request, EventSink::new(tx), cancel).await;
    let _ = reporter.await;

    let outcome = outcome?;
    info!("Ready to launch {} with {:?}", outcome.version_id, outcome.java);
    Ok(())
}

fn report(event: InstallEvent) {
    match event {
        InstallEvent::Progress { stage, percent } => info!("[{}] {}%", stage, percent),
        InstallEvent::StageTransition {
            stage,
            status: StageStatus::Failed,
            error,
        } => error!("[{}] failed: {}", stage, error.unwrap_or_default()),
        InstallEvent::StageTransition { stage, status, .. } => info!("[{}] {:?}", stage, status),
        InstallEvent::Warning { message } => warn!("{}", message),
        InstallEvent::Finished { version_id } => info!("Installed {}", version_id),
    }
}

async fn launch_request(ctx: &LauncherContext, args: LaunchArgs) -> LauncherResult<LaunchRequest> {
    let java = match args.java {
        Some(java) => java,
        None => {
            let effective = VersionResolver::new(&ctx.layout).resolve(&args.version)?;
            let downloader = ctx.downloader(CancellationToken::new());
            ensure_runtime(ctx, &downloader, effective.java_major, &|_| {})
                .await?
                .java
        }
    };
    let mut request = LaunchRequest::new(args.version, args.username, java);
    request.memory_mb = args.memory.unwrap_or(ctx.config.memory_mb);
    request.resolution = args.width.zip(args.height);
    Ok(request)
}

async fn run_game(ctx: &LauncherContext, args: LaunchArgs) -> LauncherResult<()> {
    let request = launch_request(ctx, args).await?;
    let game = launch::launch(ctx, &request).await?;
    info!(
        "Minecraft running (pid {:?}); output in {:?}, run script at {:?}",
        game.pid, game.log_path, game.script_path
    );
    match game.exit.await {
        Ok(Some(code)) => info!("Minecraft exited with code {}", code),
        Ok(None) => warn!("Minecraft ended without an exit code"),
        Err(e) => warn!("Lost the game process: {}", e),
    }
    Ok(())
}

async fn write_script(ctx: &LauncherContext, args: LaunchArgs) -> LauncherResult<()> {
    let request = launch_request(ctx, args).await?;
    let command = launch::prepare(ctx, &request).await?;
    let path = command.write_script(&ctx.layout.instance_dir(&request.version_id), ctx.platform.os)?;
    println!("{}", path.display());
    Ok(())
}
