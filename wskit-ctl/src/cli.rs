use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use wskit_core::config::{DEFAULT_DAEMON_TIMEOUT, DEFAULT_HELPER_TIMEOUT};
use wskit_namespace::{Action, MountAction};

#[derive(Parser)]
#[command(name = "wskit-ctl")]
#[command(version, about = "Serve mount(2) for unprivileged workspace containers", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Serve trapped mounts, waiting for the workload's listener fd
    wskit-ctl intercept --listener-socket /run/wskit/listener.sock

    # Start a workload under the mount filter
    wskit-ctl run --listener-socket /run/wskit/listener.sock -- bash

    # Check kernel support
    wskit-ctl check
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Receive a listener fd and serve trapped mount calls until the workload exits
    Intercept {
        /// Socket the workload sends its listener fd to
        #[arg(long, value_name = "PATH")]
        listener_socket: PathBuf,

        /// Privileged daemon socket
        #[arg(long, value_name = "PATH", default_value = "/.workspace/daemon.sock")]
        daemon_socket: PathBuf,

        /// Deadline for one daemon request in seconds
        #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_DAEMON_TIMEOUT.as_secs())]
        daemon_timeout: u64,

        /// Bound on one namespace helper run in seconds
        #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_HELPER_TIMEOUT.as_secs())]
        helper_timeout: u64,

        /// How privileged mounts reach the workload
        #[arg(long, value_enum, default_value_t = RelocationMode::Staged)]
        relocation: RelocationMode,

        /// Staging directory as seen by the interceptor
        #[arg(long, value_name = "PATH", default_value = "/.workspace/staging")]
        staging_root: PathBuf,

        /// The staging directory as seen inside the workload
        #[arg(long, value_name = "PATH", default_value = "/.staging")]
        staging_mount_point: PathBuf,

        /// Filesystem type to hand back to the kernel (repeatable)
        #[arg(long, value_name = "FSTYPE")]
        passthrough: Vec<String>,
    },

    /// Run a program with mount calls trapped
    Run {
        /// Socket the interceptor listens on
        #[arg(long, value_name = "PATH")]
        listener_socket: PathBuf,

        /// Program to run
        program: String,

        /// Program arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Namespace helper entry point (internal)
    #[command(hide = true)]
    Handler {
        #[command(subcommand)]
        action: HandlerAction,
    },

    /// Check interception requirements
    Check,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum HandlerAction {
    /// Call mount(2) in the entered namespaces
    Mount {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        target: PathBuf,
        #[arg(long)]
        flags: u64,
        #[arg(long)]
        data: Option<String>,
    },
}

impl HandlerAction {
    pub fn into_action(self) -> Action {
        match self {
            HandlerAction::Mount {
                source,
                target,
                flags,
                data,
            } => Action::Mount(MountAction {
                source,
                target,
                flags,
                data,
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RelocationMode {
    /// Move through a staging directory shared with the workload
    Staged,
    /// Move straight to the destination (interceptor shares the mount namespace)
    Direct,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn parse_action(action: &Action) -> Action {
        let mut argv = vec![OsString::from("wskit-ctl")];
        argv.extend(action.to_args());
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Handler { action } => action.into_action(),
            _ => panic!("not a handler command"),
        }
    }

    #[test]
    fn helper_arguments_parse_back() {
        let action = Action::Mount(MountAction::move_mount("/.staging/42", "/workspace/proc"));
        assert_eq!(parse_action(&action), action);
    }

    #[test]
    fn helper_non_utf8_target_parses_back() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let target = OsStr::from_bytes(b"/w\xffs");
        let action = Action::Mount(MountAction::move_mount("/.staging/42", target));
        assert_eq!(parse_action(&action), action);
    }

    #[test]
    fn helper_data_parses_back() {
        let mut mount = MountAction::move_mount("/.staging/42", "/workspace/proc");
        mount.data = Some("hidepid=2".to_string());
        let action = Action::Mount(mount);
        assert_eq!(parse_action(&action), action);
    }

    #[test]
    fn intercept_defaults() {
        let cli = Cli::try_parse_from(["wskit-ctl", "intercept", "--listener-socket", "/tmp/l.sock"])
            .unwrap();
        match cli.command {
            Commands::Intercept {
                daemon_timeout,
                relocation,
                passthrough,
                ..
            } => {
                assert_eq!(daemon_timeout, 10);
                assert_eq!(relocation, RelocationMode::Staged);
                assert!(passthrough.is_empty());
            }
            _ => panic!("not intercept"),
        }
    }

    #[test]
    fn run_keeps_program_flags() {
        let cli = Cli::try_parse_from([
            "wskit-ctl",
            "run",
            "--listener-socket",
            "/tmp/l.sock",
            "ls",
            "-la",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { program, args, .. } => {
                assert_eq!(program, "ls");
                assert_eq!(args, vec!["-la"]);
            }
            _ => panic!("not run"),
        }
    }
}
