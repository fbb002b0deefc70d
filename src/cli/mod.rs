use crate::config::MonitorConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Live SvxLink / SvxReflector node dashboard fed from the log file.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "SVXMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log file to follow; a name containing "reflector" selects the reflector format
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Address for the observer websocket endpoint
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

impl Cli {
    /// Command-line flags win over the file.
    pub fn apply_overrides(&self, config: &mut MonitorConfig) {
        if let Some(log_file) = &self.log_file {
            config.log_file = log_file.clone();
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "svxmon",
            "--log-file",
            "/var/log/svxlink",
            "--listen",
            "127.0.0.1:9100",
        ])
        .expect("parse");

        let mut config = MonitorConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.log_file, PathBuf::from("/var/log/svxlink"));
        assert_eq!(config.listen.port(), 9100);
    }

    #[test]
    fn no_flags_leave_config_alone() {
        let cli = Cli::try_parse_from(["svxmon"]).expect("parse");
        let mut config = MonitorConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn rejects_bad_listen_address() {
        assert!(Cli::try_parse_from(["svxmon", "--listen", "nowhere"]).is_err());
    }
}
