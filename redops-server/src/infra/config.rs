//! Runtime configuration, resolved from CLI flags and the environment.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "redops-server")]
#[command(about = "Scan orchestration server for authorized penetration tests")]
pub struct Config {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Host the HTTP API binds to.
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the HTTP API binds to.
    #[arg(long, env = "SERVER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory of YAML module definitions.
    #[arg(long, env = "MODULES_DIR", default_value = "modules")]
    pub modules_dir: PathBuf,

    /// Directory step logs are written to.
    #[arg(long, env = "LOGS_DIR", default_value = "logs")]
    pub logs_dir: PathBuf,

    /// Checklist seed file.
    #[arg(long, env = "CHECKLIST_FILE", default_value = "checklist.yaml")]
    pub checklist_file: PathBuf,

    /// Name of the pentest container commands run in.
    #[arg(long, env = "SANDBOX_CONTAINER", default_value = "exegol-redops")]
    pub container: String,
}

impl Config {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let config =
            Config::try_parse_from(["redops-server", "--database-url", "postgres://x"])
                .unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:5000");
        assert_eq!(config.modules_dir, PathBuf::from("modules"));
        assert_eq!(config.container, "exegol-redops");
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "redops-server",
            "--database-url",
            "postgres://x",
            "--port",
            "8080",
            "--container",
            "lab",
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.container, "lab");
    }
}
