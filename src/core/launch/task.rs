// ─── Launch Task ───
// Resolves an installed version into a command and spawns the game with
// its output captured to the instance log.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::auth::LaunchAccount;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::LauncherContext;
use crate::core::version::{EffectiveDescriptor, VersionResolver};

use super::arguments::{self, TemplateVariables, CUSTOM_RESOLUTION_FEATURE};
use super::classpath::{self, safe_path_str, ResolvedLibrarySet};
use super::command::LaunchCommand;
use super::natives;

/// Lines kept in memory for the early-crash report.
const LOG_TAIL_LINES: usize = 30;

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub version_id: String,
    pub username: String,
    pub memory_mb: u32,
    /// Window size; `None` leaves the game's default.
    pub resolution: Option<(u32, u32)>,
    pub java: PathBuf,
}

impl LaunchRequest {
    pub fn new(version_id: impl Into<String>, username: impl Into<String>, java: impl Into<PathBuf>) -> Self {
        Self {
            version_id: version_id.into(),
            username: username.into(),
            memory_mb: 4096,
            resolution: None,
            java: java.into(),
        }
    }
}

/// A running game process that survived the early-crash window.
#[derive(Debug)]
pub struct LaunchedGame {
    pub pid: Option<u32>,
    pub command: LaunchCommand,
    pub log_path: PathBuf,
    pub script_path: PathBuf,
    /// Resolves to the exit code once the process ends and its output is
    /// flushed to the log.
    pub exit: tokio::task::JoinHandle<Option<i32>>,
}

/// Resolve, assemble and extract natives, producing the command to run.
pub async fn prepare(ctx: &LauncherContext, request: &LaunchRequest) -> LauncherResult<LaunchCommand> {
    let layout = &ctx.layout;
    let effective = VersionResolver::new(layout).resolve(&request.version_id)?;
    if effective.main_class.is_empty() {
        return Err(LauncherError::Other(format!(
            "descriptor {} declares no main class",
            effective.id
        )));
    }
    let libraries = classpath::assemble(&effective, layout, &ctx.platform)?;

    let natives_dir = layout.natives_dir(&request.version_id);
    natives::extract(&effective, &layout.libraries_dir(), &natives_dir, &ctx.platform).await?;

    let game_dir = layout.instance_dir(&request.version_id);
    tokio::fs::create_dir_all(&game_dir)
        .await
        .map_err(|e| LauncherError::io(&game_dir, e))?;

    let account = LaunchAccount::offline(&request.username);
    Ok(build_command(ctx, request, &effective, &libraries, &account))
}

/// Assemble the full argument vector for an already-resolved version.
pub fn build_command(
    ctx: &LauncherContext,
    request: &LaunchRequest,
    effective: &EffectiveDescriptor,
    libraries: &ResolvedLibrarySet,
    account: &LaunchAccount,
) -> LaunchCommand {
    let layout = &ctx.layout;
    let platform = &ctx.platform;
    let separator = platform.os.classpath_separator();
    let game_dir = layout.instance_dir(&request.version_id);
    let natives_dir = layout.natives_dir(&request.version_id);
    let classpath = libraries.classpath_string(separator);
    let modulepath = libraries.modulepath_string(separator);

    let variables = launch_variables(ctx, request, effective, account, &classpath);
    let mut features = HashSet::new();
    if request.resolution.is_some() {
        features.insert(CUSTOM_RESOLUTION_FEATURE.to_string());
    }

    // ── JVM Arguments ──
    let memory = request.memory_mb.max(512);
    let mut jvm_args = vec![format!("-Xmx{memory}M"), format!("-Xms{}M", memory / 2)];
    if effective.jvm_arguments.is_empty() {
        jvm_args.push(format!("-Djava.library.path={}", safe_path_str(&natives_dir)));
        jvm_args.push("-cp".into());
        jvm_args.push(classpath.clone());
    } else {
        let rendered =
            arguments::render_with_features(&effective.jvm_arguments, &variables, platform, &features);
        // A child's list replaces its parent's whole, so a loader profile
        // may omit the library path and classpath the base game declared.
        let has_classpath = contains_any(&rendered, &["-cp", "-classpath", "--class-path"]);
        let has_library_path = rendered.iter().any(|a| a.starts_with("-Djava.library.path="));
        jvm_args.extend(rendered);
        if !has_library_path {
            jvm_args.push(format!("-Djava.library.path={}", safe_path_str(&natives_dir)));
        }
        if !has_classpath {
            jvm_args.push("-cp".into());
            jvm_args.push(classpath.clone());
        }
    }
    if !modulepath.is_empty() && !contains_any(&jvm_args, &["-p", "--module-path"]) {
        jvm_args.push("-p".into());
        jvm_args.push(modulepath);
    }

    // ── Game Arguments ──
    let game_args = match &effective.legacy_arguments {
        Some(legacy) => {
            arguments::render(&arguments::split_legacy(legacy), &variables, platform)
        }
        None => arguments::render_with_features(
            &effective.game_arguments,
            &variables,
            platform,
            &features,
        ),
    };

    LaunchCommand {
        executable: request.java.clone(),
        jvm_args: arguments::dedup_arguments(jvm_args),
        main_class: effective.main_class.clone(),
        game_args: arguments::dedup_arguments(game_args),
        working_dir: game_dir,
        natives_dir,
    }
}

fn launch_variables(
    ctx: &LauncherContext,
    request: &LaunchRequest,
    effective: &EffectiveDescriptor,
    account: &LaunchAccount,
    classpath: &str,
) -> TemplateVariables {
    let layout = &ctx.layout;
    let assets_root = safe_path_str(&layout.assets_dir());
    let assets_index = effective
        .asset_index
        .as_ref()
        .map(|index| index.id.clone())
        .unwrap_or_else(|| effective.base_id().to_string());

    let mut vars = TemplateVariables::new();
    vars.set("auth_player_name", account.username.as_str())
        .set("version_name", request.version_id.as_str())
        .set("game_directory", safe_path_str(&layout.instance_dir(&request.version_id)))
        .set("assets_root", assets_root.as_str())
        .set("game_assets", assets_root.as_str())
        .set("assets_index_name", assets_index)
        .set("auth_uuid", account.uuid.as_str())
        .set("auth_access_token", account.access_token.as_str())
        .set("auth_session", account.access_token.as_str())
        .set("user_type", account.user_type.as_str())
        .set("user_properties", "{}")
        .set("clientid", Uuid::new_v4().simple().to_string())
        .set("version_type", effective.version_type.as_str())
        .set("natives_directory", safe_path_str(&layout.natives_dir(&request.version_id)))
        .set("library_directory", safe_path_str(&layout.libraries_dir()))
        .set("classpath", classpath)
        .set("classpath_separator", ctx.platform.os.classpath_separator())
        .set("launcher_name", ctx.config.launcher_name.as_str())
        .set("launcher_version", ctx.config.launcher_version.as_str());
    if let Some((width, height)) = request.resolution {
        vars.set("resolution_width", width.to_string())
            .set("resolution_height", height.to_string());
    }
    vars
}

fn contains_any(args: &[String], flags: &[&str]) -> bool {
    args.iter().any(|arg| flags.contains(&arg.as_str()))
}

/// Prepare and spawn the game.
///
/// The manual-run script is written before spawning so it is available
/// when the launch fails. A process that exits inside the early-crash
/// window is reported as `ProcessLaunchFailure` with the tail of its log.
pub async fn launch(ctx: &LauncherContext, request: &LaunchRequest) -> LauncherResult<LaunchedGame> {
    let command = prepare(ctx, request).await?;
    let game_dir = ctx.layout.instance_dir(&request.version_id);
    let script_path = command.write_script(&game_dir, ctx.platform.os)?;
    info!("Manual launch script written to {:?}", script_path);

    let log_path = ctx.layout.launch_log(&request.version_id);
    let header = log_header(ctx, request, &command);
    let sink = LogSink::open(&log_path, header).await?;

    let mut cmd = command.to_command();
    configure_platform_spawn(&mut cmd);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    info!("Launching {} with Java {:?}", request.version_id, command.executable);
    debug!("Command (copy/paste): {}", command.format_for_logs());

    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to spawn {:?}: {}", command.executable, e);
        LauncherError::ProcessLaunchFailure(format!(
            "could not start {}: {e} (run {} manually to diagnose)",
            command.executable.display(),
            script_path.display()
        ))
    })?;
    let pid = child.id();

    if let Some(stdout) = child.stdout.take() {
        sink.capture(stdout, "");
    }
    if let Some(stderr) = child.stderr.take() {
        sink.capture(stderr, "[stderr] ");
    }

    let window = ctx.config.early_crash_window();
    let early_exit = tokio::time::timeout(window, child.wait()).await;
    match early_exit {
        Ok(status) => {
            let detail = match status {
                Ok(status) => describe_exit(status),
                Err(e) => format!("could not observe process: {e}"),
            };
            let tail = sink.finish().await;
            warn!("Game exited during the {:?} early-crash window: {}", window, detail);
            Err(LauncherError::ProcessLaunchFailure(format!(
                "game exited within {} ms ({detail}); log: {}; script: {}\n{}",
                window.as_millis(),
                log_path.display(),
                script_path.display(),
                tail.join("\n")
            )))
        }
        Err(_) => {
            info!("Game process {:?} is running", pid);
            let exit = tokio::spawn(async move {
                let code = match child.wait().await {
                    Ok(status) => {
                        info!("Game process {:?} finished: {}", pid, describe_exit(status));
                        status.code()
                    }
                    Err(e) => {
                        warn!("Lost track of game process {:?}: {}", pid, e);
                        None
                    }
                };
                sink.finish().await;
                code
            });
            Ok(LaunchedGame {
                pid,
                command,
                log_path,
                script_path,
                exit,
            })
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn log_header(ctx: &LauncherContext, request: &LaunchRequest, command: &LaunchCommand) -> String {
    format!(
        "=== {} {} ===\nstarted: {}\nversion: {}\nuser: {}\nmemory: {} MB\njava: {}\nplatform: {} {}\nworking dir: {}\ncommand: {}\n\n",
        ctx.config.launcher_name,
        ctx.config.launcher_version,
        chrono::Local::now().to_rfc3339(),
        request.version_id,
        request.username,
        request.memory_mb,
        command.executable.display(),
        ctx.platform.os,
        ctx.platform.arch,
        command.working_dir.display(),
        command.format_for_logs()
    )
}

// ── Log Capture ──

/// Forwards captured lines to a single writer task that owns the log file.
struct LogSink {
    sender: mpsc::UnboundedSender<String>,
    writer: tokio::task::JoinHandle<()>,
    tail: Arc<Mutex<VecDeque<String>>>,
}

impl LogSink {
    async fn open(path: &Path, header: String) -> LauncherResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
        file.write_all(header.as_bytes())
            .await
            .map_err(|e| LauncherError::io(path, e))?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(LOG_TAIL_LINES)));
        let tail_writer = Arc::clone(&tail);
        let log_path = path.to_path_buf();

        let writer = tokio::spawn(async move {
            while let Some(line) = receiver.recv().await {
                if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
                    warn!("Failed to write launch log {:?}: {}", log_path, e);
                }
                let mut tail = tail_writer.lock().unwrap_or_else(|p| p.into_inner());
                if tail.len() == LOG_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            let _ = file.flush().await;
        });

        Ok(Self { sender, writer, tail })
    }

    fn capture<R>(&self, stream: R, prefix: &'static str)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if sender.send(format!("{prefix}{line}")).is_err() {
                    break;
                }
            }
        });
    }

    /// Wait for the streams to drain and return the last captured lines.
    async fn finish(self) -> Vec<String> {
        let Self { sender, writer, tail } = self;
        drop(sender);
        if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
            debug!("Launch log writer still draining");
        }
        let tail = tail.lock().unwrap_or_else(|p| p.into_inner());
        tail.iter().cloned().collect()
    }
}

fn configure_platform_spawn(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd.env_remove("WT_SESSION");
        cmd.env_remove("TERM");
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}
