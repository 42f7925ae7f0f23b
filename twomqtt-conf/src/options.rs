use structopt::StructOpt;

use super::logging::Level;

#[derive(StructOpt, Debug, Clone, Default)]
pub struct Options {
    /// Config filename
    #[structopt(name = "config", short = "f", long)]
    pub cfg_name: Option<String>,

    /// Log level, overrides LOG_LEVEL: trace, debug, info, warning, error or critical
    #[structopt(name = "log-level", long)]
    pub log_level: Option<Level>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options() {
        let opts = Options::from_iter(["poller", "-f", "/etc/poller.toml", "--log-level", "debug"]);
        assert_eq!(opts.cfg_name.as_deref(), Some("/etc/poller.toml"));
        assert_eq!(opts.log_level.map(|l| l.inner()), Some(slog::Level::Debug));

        assert!(Options::from_iter_safe(["poller", "--log-level", "chatty"]).is_err());
    }
}
