use console::style;
use log::info;
use wskit_core::capabilities::SystemCapabilities;

/// Print what interception needs and what this system offers; true when usable
pub fn check_requirements() -> bool {
    info!("Checking interception requirements");
    println!("Checking interception requirements...\n");

    let caps = SystemCapabilities::detect();
    println!("{}", caps.summary());

    println!();
    if caps.can_intercept() {
        println!("{} mount calls can be intercepted", style("ready:").green().bold());
    } else {
        println!(
            "{} seccomp user notification is unavailable (Linux 5.0+ required)",
            style("not ready:").red().bold()
        );
    }
    if !caps.has_root {
        println!("  note: the staged relocation helper needs CAP_SYS_ADMIN to join mount namespaces");
    }

    println!("\nSystem info:");
    println!("  UID: {}", unsafe { libc::getuid() });
    println!("  PID: {}", std::process::id());
    caps.can_intercept()
}
