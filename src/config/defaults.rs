//! Built-in settings and the default files seeded into a fresh home.

use std::fs;
use std::io;

use crate::config::paths::RootPath;

pub const SYSTEM_CONF: &str = "system.conf";
pub const SYSTEM_EX_CONF: &str = "system-ex.conf";
pub const DATABASE_CONF: &str = "database.conf";
pub const ANNOUNCEMENT_CONF: &str = "announcement.conf";
pub const POLICY_SCRIPT: &str = "process_and_thread_policy.js";
pub const GIT_CONFIG_TEMPLATE: &str = "gitconfig-template.yml";
pub const NO_MORE_TEST_LOCK: &str = "no_more_test.lock";
pub const SHUTDOWN_LOCK: &str = "shutdown.lock";

/// Internal properties compiled into the binary.
pub const INTERNAL_PROPERTIES: &str = concat!("internal.version=", env!("CARGO_PKG_VERSION"), "\n");

const DEFAULT_SYSTEM_CONF: &str = r#"# Controller settings. Changes are applied without a restart.

#controller.port=16001
#controller.monitor_port=13243
#controller.dev_mode=false
#controller.verbose=false
#controller.security=false
#controller.csv_separator=comma

#cluster.enabled=false
#cluster.mode=none
#cluster.members=
"#;

const DEFAULT_DATABASE_CONF: &str = r#"# Database settings. Read once at startup.

database.type=h2
#database.url=
#database.username=admin
#database.password=admin
"#;

const DEFAULT_POLICY_SCRIPT: &str = r#"function getProcessCount(total) {
    if (total < 2) {
        return 1;
    }
    var processCount = 2;
    if (total > 80) {
        processCount = parseInt(total / 40) + 1;
    }
    if (processCount > 10) {
        processCount = 10;
    }
    return processCount;
}

function getThreadCount(total) {
    var processCount = getProcessCount(total);
    return parseInt(total / processCount);
}
"#;

/// Write the default files that are missing from the primary root.
///
/// Existing files are never touched.
pub fn seed_primary_root(root: &RootPath) -> io::Result<()> {
    for (name, content) in [
        (SYSTEM_CONF, DEFAULT_SYSTEM_CONF),
        (DATABASE_CONF, DEFAULT_DATABASE_CONF),
        (POLICY_SCRIPT, DEFAULT_POLICY_SCRIPT),
    ] {
        let path = root.sub_file(name);
        if !path.exists() {
            fs::write(&path, content)?;
            tracing::info!(path = %path.display(), "Default file created");
        }
    }
    Ok(())
}
