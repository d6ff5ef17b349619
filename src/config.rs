use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-model USD-per-million-token prices (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prices {
    pub input: f64,
    pub output: f64,
    pub cache_write: f64,
    pub cache_read: f64,
}

impl Default for Prices {
    fn default() -> Self {
        Prices {
            input: 15.00,
            output: 75.00,
            cache_write: 18.75,
            cache_read: 1.50,
        }
    }
}

/// One federation peer entry (§6.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Phrases the Supervisor Loop's `track` step matches against remediation
/// agent pane text (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionPhrases {
    pub action: Vec<String>,
    pub no_action: Vec<String>,
}

impl Default for InterventionPhrases {
    fn default() -> Self {
        InterventionPhrases {
            action: vec![
                "approved".to_string(),
                "sent".to_string(),
                "told".to_string(),
                "instructed".to_string(),
            ],
            no_action: vec!["no intervention needed".to_string()],
        }
    }
}

/// The single configuration value threaded through every constructor in
/// this crate. Nothing in this crate reads the environment directly
/// outside of `Config::from_env` — all other code takes a `Config` (or a
/// borrowed field of one) as an explicit argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one subdirectory per multiplexer group (§6.1).
    pub state_dir: PathBuf,
    /// The multiplexer group this daemon instance owns.
    pub multiplexer_group: String,
    /// Monitor Loop tick interval in seconds (τ, default 5).
    pub tick_interval_s: u64,
    /// Minimum interval between Supervisor Loop launches (default 60s).
    pub min_launch_interval_s: u64,
    /// Lines of pane history captured for the classifier (default 50).
    pub capture_lines: usize,
    /// Seconds the classifier may reuse a prior status before falling
    /// back to `waiting_user` (§4.2 precedence 6).
    pub classifier_staleness_s: u64,
    /// Command (argv) used to launch both ordinary and remediation
    /// agents.
    pub agent_command: Vec<String>,
    pub prices: Prices,
    pub intervention_phrases: InterventionPhrases,
    /// Control API bind port.
    pub control_api_port: u16,
    /// Shared secret checked against `X-API-Key` on mutating routes.
    pub api_key: String,
    /// Per-outbound-HTTP-call timeout (default 10s, §5).
    pub http_timeout_s: u64,
    pub peers: Vec<PeerConfig>,
    /// Grace period given to tasks on shutdown (default 5s, §5).
    pub shutdown_grace_s: u64,
    /// Horizon (hours) after which terminated sessions are eligible for
    /// garbage collection.
    pub terminated_retention_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            state_dir: PathBuf::from("/var/lib/overcode"),
            multiplexer_group: "agents".to_string(),
            tick_interval_s: 5,
            min_launch_interval_s: 60,
            capture_lines: 50,
            classifier_staleness_s: 10,
            agent_command: vec!["claude".to_string()],
            prices: Prices::default(),
            intervention_phrases: InterventionPhrases::default(),
            control_api_port: 8787,
            api_key: String::new(),
            http_timeout_s: 10,
            peers: Vec::new(),
            shutdown_grace_s: 5,
            terminated_retention_hours: 24 * 7,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables layered over
    /// defaults, mirroring the teacher's env-driven `CcswarmConfig`
    /// loading but without any module-level singleton: the returned
    /// value is passed explicitly to every constructor that needs it.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        if let Ok(v) = std::env::var("OVERCODE_STATE_DIR") {
            cfg.state_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("OVERCODE_MULTIPLEXER_GROUP") {
            cfg.multiplexer_group = v;
        }
        if let Ok(v) = std::env::var("OVERCODE_TICK_INTERVAL_S") {
            cfg.tick_interval_s = v.parse()?;
        }
        if let Ok(v) = std::env::var("OVERCODE_MIN_LAUNCH_INTERVAL_S") {
            cfg.min_launch_interval_s = v.parse()?;
        }
        if let Ok(v) = std::env::var("OVERCODE_CAPTURE_LINES") {
            cfg.capture_lines = v.parse()?;
        }
        if let Ok(v) = std::env::var("OVERCODE_AGENT_COMMAND") {
            cfg.agent_command = v.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(v) = std::env::var("OVERCODE_CONTROL_API_PORT") {
            cfg.control_api_port = v.parse()?;
        }
        if let Ok(v) = std::env::var("OVERCODE_API_KEY") {
            cfg.api_key = v;
        }
        if let Ok(v) = std::env::var("OVERCODE_HTTP_TIMEOUT_S") {
            cfg.http_timeout_s = v.parse()?;
        }
        if let Ok(v) = std::env::var("OVERCODE_PEERS_JSON") {
            cfg.peers = serde_json::from_str(&v)?;
        }
        if let Ok(v) = std::env::var("OVERCODE_PRICE_INPUT") {
            cfg.prices.input = v.parse()?;
        }
        if let Ok(v) = std::env::var("OVERCODE_PRICE_OUTPUT") {
            cfg.prices.output = v.parse()?;
        }
        if let Ok(v) = std::env::var("OVERCODE_PRICE_CACHE_WRITE") {
            cfg.prices.cache_write = v.parse()?;
        }
        if let Ok(v) = std::env::var("OVERCODE_PRICE_CACHE_READ") {
            cfg.prices.cache_read = v.parse()?;
        }

        Ok(cfg)
    }

    /// Reloads federation peers only, mirroring spec §6.7's
    /// "read at startup and on SIGHUP-equivalent" policy.
    pub fn reload_peers(&mut self) -> anyhow::Result<()> {
        if let Ok(v) = std::env::var("OVERCODE_PEERS_JSON") {
            self.peers = serde_json::from_str(&v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prices_match_spec() {
        let p = Prices::default();
        assert_eq!(p.input, 15.00);
        assert_eq!(p.output, 75.00);
        assert_eq!(p.cache_write, 18.75);
        assert_eq!(p.cache_read, 1.50);
    }

    #[test]
    fn default_intervention_phrases() {
        let phrases = InterventionPhrases::default();
        assert!(phrases.action.contains(&"approved".to_string()));
        assert!(phrases.no_action.contains(&"no intervention needed".to_string()));
    }
}
