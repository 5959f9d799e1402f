use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    /// Engine configuration file.
    #[arg(short, long, default_value_t = String::from("/etc/kaito/engine.yaml"))]
    config: String,

    /// Workspace to deploy, as YAML.
    #[arg(short, long)]
    workspace: String,

    /// Overrides `preset_registry_name` from the config file.
    #[arg(long, env = "PRESET_REGISTRY_NAME")]
    registry_name: Option<String>,

    /// Revision recorded on generated Deployments.
    #[arg(long, default_value_t = String::from("1"))]
    revision: String,

    /// Wait for the workload to become ready.
    #[arg(long)]
    wait: bool,

    /// Readiness timeout. Defaults to the model's own readiness timeout.
    #[arg(long, value_parser = parse_duration_arg)]
    timeout: Option<Duration>,
}

// helper needed because the arguments from the duration_str's parse function and the one expected by the clap
// `value_parser` argument have incompatible lifetimes.
fn parse_duration_arg(arg: &str) -> Result<Duration, String> {
    duration_str::parse(arg)
}

impl Cli {
    /// Parses command line arguments
    pub fn init_engine_cli() -> Self {
        Self::parse()
    }

    pub fn get_config(&self) -> PathBuf {
        PathBuf::from(&self.config)
    }

    pub fn get_workspace(&self) -> PathBuf {
        PathBuf::from(&self.workspace)
    }

    pub fn registry_name(&self) -> Option<&str> {
        self.registry_name.as_deref()
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn wait(&self) -> bool {
        self.wait
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_flags() {
        let cli = Cli::try_parse_from([
            "kaito-workspace-engine",
            "--config",
            "engine.yaml",
            "--workspace",
            "ws.yaml",
            "--registry-name",
            "myregistry.io",
            "--revision",
            "3",
            "--wait",
            "--timeout",
            "30m",
        ])
        .unwrap();

        assert_eq!(cli.get_config(), PathBuf::from("engine.yaml"));
        assert_eq!(cli.get_workspace(), PathBuf::from("ws.yaml"));
        assert_eq!(cli.registry_name(), Some("myregistry.io"));
        assert_eq!(cli.revision(), "3");
        assert!(cli.wait());
        assert_eq!(cli.timeout(), Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn workspace_is_required() {
        assert!(Cli::try_parse_from(["kaito-workspace-engine"]).is_err());
    }

    #[test]
    fn invalid_timeout() {
        let result = Cli::try_parse_from([
            "kaito-workspace-engine",
            "--workspace",
            "ws.yaml",
            "--timeout",
            "soon",
        ]);
        assert!(result.is_err());
    }
}
