//! Startup configuration: a YAML file merged with CLI overrides, following
//! the gateway's `Cli`/`Config::load` split so the same binary can run from
//! a bare `--port` flag in development or a full file in a deployment.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use controller_auth::Role;
use controller_notify::SmtpConfig;
use controller_proxy::ProxyConfig;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "controller", about = "Workflow controller for the agent execution platform")]
pub struct Cli {
	/// Path to a YAML configuration file. Without one, defaults apply.
	#[arg(long, env = "CONTROLLER_CONFIG")]
	pub config: Option<PathBuf>,

	#[arg(long, env = "CONTROLLER_HOST")]
	pub host: Option<IpAddr>,

	#[arg(long, env = "CONTROLLER_PORT")]
	pub port: Option<u16>,

	/// "json" or "text".
	#[arg(long, env = "CONTROLLER_LOG_FORMAT")]
	pub log_format: Option<String>,
}

impl Cli {
	pub fn overrides(&self) -> ConfigOverrides {
		ConfigOverrides {
			host: self.host,
			port: self.port,
			log_json: self.log_format.as_deref().map(|f| f.eq_ignore_ascii_case("json")),
		}
	}
}

#[derive(Default)]
pub struct ConfigOverrides {
	pub host: Option<IpAddr>,
	pub port: Option<u16>,
	pub log_json: Option<bool>,
}

/// A credential an operator pre-provisions for a machine caller (an agent,
/// a CI bot) that has no interactive way to go through native auth.
#[derive(Clone, Debug, Deserialize)]
pub struct BootstrapToken {
	pub value: String,
	pub token_name: String,
}

/// An environment ACL entry granted at startup, before any admin has logged
/// in to grant one through `/agents/access`.
#[derive(Clone, Debug, Deserialize)]
pub struct BootstrapGrant {
	pub user_id: String,
	/// One of `DEV`/`TEST`/`PROD`/`*`, parsed with [`controller_store::models::EnvGrant::parse`].
	pub environment: String,
	#[serde(default = "default_granted_by")]
	pub granted_by: String,
}

fn default_granted_by() -> String {
	"bootstrap".to_string()
}

fn default_api_host() -> String {
	"0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
	8080
}

fn default_stale_after_s() -> u64 {
	90
}

fn default_role() -> Role {
	Role::Viewer
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	#[serde(default = "default_api_host")]
	pub api_host: String,
	#[serde(default = "default_api_port")]
	pub api_port: u16,
	/// An agent is considered `Online` while its last heartbeat is within
	/// this many seconds of now (§4.5).
	#[serde(default = "default_stale_after_s")]
	pub agent_stale_after_s: u64,
	/// Role assigned the first time a username is seen through TLS client
	/// cert or native auth, absent any prior grant (§4.3).
	#[serde(default = "default_role")]
	pub default_role: Role,
	#[serde(default)]
	pub log_json: bool,
	#[serde(default)]
	pub smtp: Option<SmtpConfig>,
	/// When present, a TLS front-door proxy is started in front of the API
	/// in addition to serving it directly (§4.1/§4.2).
	#[serde(default)]
	pub proxy: Option<ProxyConfig>,
	#[serde(default)]
	pub bootstrap_admin_tokens: Vec<BootstrapToken>,
	#[serde(default)]
	pub bootstrap_agent_tokens: Vec<BootstrapToken>,
	#[serde(default)]
	pub bootstrap_grants: Vec<BootstrapGrant>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			api_host: default_api_host(),
			api_port: default_api_port(),
			agent_stale_after_s: default_stale_after_s(),
			default_role: default_role(),
			log_json: false,
			smtp: None,
			proxy: None,
			bootstrap_admin_tokens: Vec::new(),
			bootstrap_agent_tokens: Vec::new(),
			bootstrap_grants: Vec::new(),
		}
	}
}

impl Config {
	pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> anyhow::Result<Self> {
		let mut config = match path {
			Some(p) => {
				let raw = std::fs::read_to_string(p).with_context(|| format!("reading config file {}", p.display()))?;
				serde_yaml::from_str(&raw).with_context(|| format!("parsing config file {}", p.display()))?
			}
			None => Config::default(),
		};
		if let Some(host) = overrides.host {
			config.api_host = host.to_string();
		}
		if let Some(port) = overrides.port {
			config.api_port = port;
		}
		if let Some(log_json) = overrides.log_json {
			config.log_json = log_json;
		}
		Ok(config)
	}
}
