//! systemd units that drive `hytale-backup run-once` on the instance.
//!
//! The timer fires once shortly after boot and then on a fixed interval;
//! a oneshot service cannot overlap itself, so there is at most one run
//! per instance.

use std::{path::PathBuf, time::Duration};

pub const SERVICE_NAME: &str = "hytale-backup.service";
pub const TIMER_NAME: &str = "hytale-backup.timer";

#[derive(Debug, Clone)]
pub struct UnitOptions {
    pub binary_path: PathBuf,
    /// Optional `EnvironmentFile=` carrying the `HYTALE_BACKUP_*` settings.
    pub env_file: Option<PathBuf>,
    pub initial_delay: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedUnit {
    pub name: &'static str,
    pub contents: String,
}

pub fn backup_units(opts: &UnitOptions) -> [RenderedUnit; 2] {
    let mut service = String::from(
        "[Unit]\n\
         Description=Mirror and prune Hytale server backups\n\
         Wants=network-online.target\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         Type=oneshot\n",
    );
    if let Some(env_file) = &opts.env_file {
        service.push_str(&format!("EnvironmentFile={}\n", env_file.display()));
    }
    service.push_str(&format!("ExecStart={} run-once\n", opts.binary_path.display()));

    let timer = format!(
        "[Unit]\n\
         Description=Periodic Hytale backup sync\n\
         \n\
         [Timer]\n\
         OnBootSec={}s\n\
         OnUnitActiveSec={}s\n\
         Unit={SERVICE_NAME}\n\
         \n\
         [Install]\n\
         WantedBy=timers.target\n",
        opts.initial_delay.as_secs(),
        opts.interval.as_secs(),
    );

    [
        RenderedUnit {
            name: SERVICE_NAME,
            contents: service,
        },
        RenderedUnit {
            name: TIMER_NAME,
            contents: timer,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_uses_delay_and_interval() {
        let [service, timer] = backup_units(&UnitOptions {
            binary_path: "/usr/local/bin/hytale-backup".into(),
            env_file: Some("/etc/hytale/backup.env".into()),
            initial_delay: Duration::from_secs(120),
            interval: Duration::from_secs(1800),
        });

        assert_eq!(service.name, "hytale-backup.service");
        assert!(service.contents.contains("Type=oneshot\n"));
        assert!(service.contents.contains("EnvironmentFile=/etc/hytale/backup.env\n"));
        assert!(service
            .contents
            .ends_with("ExecStart=/usr/local/bin/hytale-backup run-once\n"));
        assert!(timer.contents.contains("OnBootSec=120s\nOnUnitActiveSec=1800s\n"));
        assert!(timer.contents.contains("Unit=hytale-backup.service\n"));
    }

    #[test]
    fn env_file_is_optional() {
        let [service, _] = backup_units(&UnitOptions {
            binary_path: "/opt/bin/hytale-backup".into(),
            env_file: None,
            initial_delay: Duration::from_secs(60),
            interval: Duration::from_secs(600),
        });

        assert!(!service.contents.contains("EnvironmentFile"));
    }
}
