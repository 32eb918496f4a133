// ─── Launch Command ───
// The final argument vector, plus its rendering as a log line and as a
// manual-run script.

use std::path::{Path, PathBuf};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::platform::OsName;

use super::classpath::safe_path_str;

/// Built fresh for every launch; never persisted except as a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub executable: PathBuf,
    pub jvm_args: Vec<String>,
    pub main_class: String,
    pub game_args: Vec<String>,
    pub working_dir: PathBuf,
    /// Directory holding extracted natives, exported to the loader path.
    pub natives_dir: PathBuf,
}

impl LaunchCommand {
    /// Every argument after the executable, in order.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.jvm_args.len() + self.game_args.len() + 1);
        args.extend(self.jvm_args.iter().cloned());
        args.push(self.main_class.clone());
        args.extend(self.game_args.iter().cloned());
        args
    }

    /// The command as a single copy-pasteable line for the host shell.
    pub fn format_for_logs(&self) -> String {
        let os = if cfg!(target_os = "windows") {
            OsName::Windows
        } else {
            OsName::Linux
        };
        self.command_line(os)
    }

    /// The command quoted for the shell that runs scripts on `os`.
    pub fn command_line(&self, os: OsName) -> String {
        let mut parts = vec![shell_escape(&safe_path_str(&self.executable), os)];
        parts.extend(self.args().iter().map(|a| shell_escape(a, os)));
        parts.join(" ")
    }

    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.executable);
        cmd.args(self.args());
        cmd.current_dir(&self.working_dir);
        configure_native_library_env(&mut cmd, &self.natives_dir);
        cmd
    }

    /// Script that reproduces this launch outside the launcher.
    pub fn script_contents(&self, os: OsName) -> String {
        let line = self.command_line(os);
        let dir = safe_path_str(&self.working_dir);
        match os {
            OsName::Windows => format!(
                "@echo off\r\ncd /d {}\r\n{}\r\npause\r\n",
                shell_escape(&dir, os),
                line
            ),
            _ => format!("#!/bin/sh\ncd {} || exit 1\nexec {}\n", shell_escape(&dir, os), line),
        }
    }

    /// Write the manual-run script into `dir` and return its path.
    pub fn write_script(&self, dir: &Path, os: OsName) -> LauncherResult<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| LauncherError::io(dir, e))?;
        let path = dir.join(script_name(os));
        std::fs::write(&path, self.script_contents(os)).map_err(|e| LauncherError::io(&path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .map_err(|e| LauncherError::io(&path, e))?;
        }
        Ok(path)
    }
}

pub fn script_name(os: OsName) -> &'static str {
    match os {
        OsName::Windows => "run-minecraft.bat",
        _ => "run-minecraft.sh",
    }
}

fn configure_native_library_env(cmd: &mut tokio::process::Command, natives_dir: &Path) {
    let native_path = safe_path_str(natives_dir);
    let var = if cfg!(target_os = "windows") {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    };
    cmd.env(var, append_env_path(var, &native_path));
}

fn append_env_path(var_name: &str, value: &str) -> String {
    let separator = if cfg!(target_os = "windows") { ";" } else { ":" };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => format!("{value}{separator}{existing}"),
        _ => value.to_string(),
    }
}

/// Quote one argument. POSIX shells get single quotes so `$` and
/// backticks stay literal; cmd.exe only understands double quotes.
fn shell_escape(raw: &str, os: OsName) -> String {
    let plain = !raw.is_empty()
        && raw.chars().all(|ch| {
            ch.is_ascii_alphanumeric()
                || matches!(ch, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '+')
                || (ch == '\\' && matches!(os, OsName::Windows))
        });
    if plain {
        return raw.to_string();
    }
    match os {
        OsName::Windows => format!("\"{}\"", raw.replace('"', "\\\"")),
        _ => format!("'{}'", raw.replace('\'', "'\\''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> LaunchCommand {
        LaunchCommand {
            executable: PathBuf::from("/opt/java/bin/java"),
            jvm_args: vec!["-Xmx2048M".into(), "-cp".into(), "/a b/x.jar:/c.jar".into()],
            main_class: "net.minecraft.client.main.Main".into(),
            game_args: vec!["--username".into(), "Steve".into()],
            working_dir: PathBuf::from("/games/1.20.1"),
            natives_dir: PathBuf::from("/games/1.20.1/natives"),
        }
    }

    #[test]
    fn args_put_main_class_between_jvm_and_game() {
        let args = command().args();
        assert_eq!(args[3], "net.minecraft.client.main.Main");
        assert_eq!(args.len(), 6);
    }

    #[test]
    fn command_line_quotes_only_what_needs_it() {
        assert_eq!(
            command().command_line(OsName::Linux),
            "/opt/java/bin/java -Xmx2048M -cp '/a b/x.jar:/c.jar' net.minecraft.client.main.Main --username Steve"
        );
        assert_eq!(
            command().command_line(OsName::Windows),
            "/opt/java/bin/java -Xmx2048M -cp \"/a b/x.jar:/c.jar\" net.minecraft.client.main.Main --username Steve"
        );
    }

    #[test]
    fn unix_scripts_keep_unresolved_tokens_literal() {
        let mut cmd = command();
        cmd.game_args.extend(["--xuid".into(), "${auth_xuid}".into(), "it's `x`".into()]);

        let script = cmd.script_contents(OsName::Linux);
        assert!(script.contains("--xuid '${auth_xuid}'"));
        assert!(script.contains(r"'it'\''s `x`'"));
        assert!(!script.contains("\"${auth_xuid}\""));
    }

    #[test]
    fn scripts_match_the_platform() {
        let unix = command().script_contents(OsName::Linux);
        assert!(unix.starts_with("#!/bin/sh\n"));
        assert!(unix.contains("exec /opt/java/bin/java -Xmx2048M"));

        let windows = command().script_contents(OsName::Windows);
        assert!(windows.starts_with("@echo off\r\n"));
        assert_eq!(script_name(OsName::Windows), "run-minecraft.bat");
    }

    #[test]
    fn script_is_written_to_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = command().write_script(temp.path(), OsName::Linux).unwrap();
        assert_eq!(path.file_name().unwrap(), "run-minecraft.sh");
        assert!(std::fs::read_to_string(path).unwrap().contains("--username Steve"));
    }

    #[test]
    fn env_path_prefixes_new_value() {
        std::env::set_var("BLOCKLAUNCH_TEST_PATH", "/usr/lib");
        let separator = if cfg!(target_os = "windows") { ";" } else { ":" };
        assert_eq!(
            append_env_path("BLOCKLAUNCH_TEST_PATH", "/natives"),
            format!("/natives{separator}/usr/lib")
        );
        assert_eq!(append_env_path("BLOCKLAUNCH_UNSET_VAR", "/natives"), "/natives");
    }
}
