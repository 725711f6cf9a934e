use console::style;
use env_logger::{Builder, Env, Target};
use log::Level;
use std::io::Write;

/// Who is logging: the interceptor itself or a namespace helper child
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Interceptor,
    Helper,
}

/// Initialize logger; `RUST_LOG` overrides the verbose flag
pub fn init_logger(verbose: bool, role: Role) {
    let default = if verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().filter_or("RUST_LOG", default));

    match role {
        // Helper output ends up inside the parent's error messages: keep it plain
        Role::Helper => builder.format(|buf, record| {
            writeln!(
                buf,
                "handler[{}] {} {}",
                std::process::id(),
                record.level(),
                record.args()
            )
        }),
        Role::Interceptor => builder.format(|buf, record| {
            let level = match record.level() {
                Level::Error => format!("{}", style("ERROR").red().bold()),
                Level::Warn => format!("{}", style("WARN ").yellow().bold()),
                Level::Info => format!("{}", style("INFO ").green()),
                Level::Debug => format!("{}", style("DEBUG").cyan()),
                Level::Trace => format!("{}", style("TRACE").dim()),
            };
            writeln!(buf, "{} {}", level, record.args())
        }),
    };

    builder.target(Target::Stderr).init();
}
