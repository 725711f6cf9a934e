//! Mount interceptor CLI - serve mount(2) for unprivileged workspace containers

mod cli;
mod commands;
mod logging;
mod runner;

use clap::Parser;
use cli::{Cli, Commands};
use commands::check_requirements;
use console::style;
use logging::Role;
use runner::{run_interceptor, run_trapped, InterceptConfig};
use wskit_namespace::run_helper;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        // Helper children join mount namespaces, which needs a single thread:
        // nothing may spawn one before this point.
        Commands::Handler { action } => {
            logging::init_logger(cli.verbose, Role::Helper);
            std::process::exit(run_helper(&action.into_action()));
        }
        Commands::Intercept {
            listener_socket,
            daemon_socket,
            daemon_timeout,
            helper_timeout,
            relocation,
            staging_root,
            staging_mount_point,
            passthrough,
        } => {
            logging::init_logger(cli.verbose, Role::Interceptor);
            let config = InterceptConfig {
                listener_socket,
                daemon_socket,
                daemon_timeout,
                helper_timeout,
                relocation,
                staging_root,
                staging_mount_point,
                passthrough,
            };
            if let Err(e) = run_interceptor(config) {
                eprintln!("{} {}", style("error:").red().bold(), e);
                std::process::exit(1);
            }
        }
        Commands::Run {
            listener_socket,
            program,
            args,
        } => {
            logging::init_logger(cli.verbose, Role::Interceptor);
            if let Err(e) = run_trapped(listener_socket, program, args) {
                eprintln!("{} {}", style("error:").red().bold(), e);
                std::process::exit(1);
            }
        }
        Commands::Check => {
            logging::init_logger(cli.verbose, Role::Interceptor);
            if !check_requirements() {
                std::process::exit(1);
            }
        }
    }
}
