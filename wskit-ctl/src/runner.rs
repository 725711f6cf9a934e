use console::style;
use log::{debug, info};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use wskit::{accept_listener, trap_and_hand_over, Dispatcher};
use wskit_core::{InterceptorConfig, RelocationStrategy};

use crate::cli::RelocationMode;

/// Settings for one interceptor run
pub struct InterceptConfig {
    pub listener_socket: PathBuf,
    pub daemon_socket: PathBuf,
    pub daemon_timeout: u64,
    pub helper_timeout: u64,
    pub relocation: RelocationMode,
    pub staging_root: PathBuf,
    pub staging_mount_point: PathBuf,
    pub passthrough: Vec<String>,
}

impl InterceptConfig {
    fn to_interceptor_config(&self) -> InterceptorConfig {
        let relocation = match self.relocation {
            RelocationMode::Staged => {
                RelocationStrategy::staged(&self.staging_root, &self.staging_mount_point)
            }
            RelocationMode::Direct => RelocationStrategy::Direct,
        };
        let mut config = InterceptorConfig::default()
            .daemon_socket(&self.daemon_socket)
            .daemon_timeout(Duration::from_secs(self.daemon_timeout))
            .helper_timeout(Duration::from_secs(self.helper_timeout))
            .relocation(relocation);
        for fstype in &self.passthrough {
            config = config.passthrough(fstype.clone());
        }
        config
    }
}

pub fn run_interceptor(config: InterceptConfig) -> Result<(), Box<dyn std::error::Error>> {
    let interceptor = config.to_interceptor_config();
    interceptor.validate()?;
    debug!("{:?}", interceptor);

    let listener = accept_listener(&config.listener_socket)?;
    info!("listener fd received, serving mount calls");

    let mut dispatcher = Dispatcher::from_config(listener, &interceptor)?;
    let stats = dispatcher.run()?;

    println!(
        "{}={} | {}={} | {}={}",
        style("received").dim(),
        style(stats.received).bold(),
        style("answered").dim(),
        style(stats.answered).green().bold(),
        style("stale").dim(),
        style(stats.stale).bold(),
    );
    Ok(())
}

/// Install the mount filter, hand the listener to the interceptor and exec
/// `program`. Only returns on failure.
pub fn run_trapped(
    listener_socket: PathBuf,
    program: String,
    args: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let stream = UnixStream::connect(&listener_socket).map_err(|e| {
        format!(
            "cannot reach interceptor at {}: {}",
            listener_socket.display(),
            e
        )
    })?;
    trap_and_hand_over(&stream)?;
    drop(stream);

    info!("Executing: {} {:?}", program, args);
    let err = Command::new(&program).args(&args).exec();
    Err(format!("execve {} failed: {}", program, err).into())
}
