//! Runtime configuration from environment variables, with `--port` / `--bind`
//! command-line overrides.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::rate_limit::WindowSpec;

pub const ENV_AUTH_URL: &str = "AUTH_URL";
pub const ENV_JWT_SECRET: &str = "JWT_SECRET";
pub const ENV_HTTP_PORT: &str = "CATTRACK_HTTP_PORT";
pub const ENV_BIND: &str = "CATTRACK_BIND";
pub const ENV_UPSTREAM_TIMEOUT_MS: &str = "CATTRACK_UPSTREAM_TIMEOUT_MS";
pub const ENV_OPERATION_TIMEOUT_MS: &str = "CATTRACK_OPERATION_TIMEOUT_MS";
pub const ENV_LOGIN_WINDOW_MS: &str = "CATTRACK_LOGIN_WINDOW_MS";
pub const ENV_LOGIN_MAX: &str = "CATTRACK_LOGIN_MAX";
pub const ENV_RATE_SWEEP_SECS: &str = "CATTRACK_RATE_SWEEP_SECS";
pub const ENV_TRUST_FORWARDED_FOR: &str = "CATTRACK_TRUST_FORWARDED_FOR";

#[derive(Clone)]
pub struct Config {
    pub auth_url: String,
    pub jwt_secret: Option<String>,
    pub bind: IpAddr,
    pub http_port: u16,
    pub upstream_timeout: Duration,
    pub operation_timeout: Duration,
    pub login_window: WindowSpec,
    /// Zero disables the background sweep.
    pub rate_sweep_interval: Duration,
    pub trust_forwarded_for: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("auth_url", &self.auth_url)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<set>"))
            .field("bind", &self.bind)
            .field("http_port", &self.http_port)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("login_window", &self.login_window)
            .field("rate_sweep_interval", &self.rate_sweep_interval)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

fn parse_num<T: std::str::FromStr>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match vars.get(name).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<T>().map_err(|e| anyhow!("{name}={raw:?}: {e}")),
        None => Ok(default),
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<bool> {
    let Some(v) = vars.get(name) else { return Ok(false); };
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{name}={other:?}: expected a boolean")),
    }
}

fn parse_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        if let Some(v) = args[i].strip_prefix(flag).and_then(|r| r.strip_prefix('=')) {
            return Some(v);
        }
        i += 1;
    }
    None
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_sources(&vars, &args)
    }

    /// Build from an explicit variable map and argument list (arguments win).
    pub fn from_sources(vars: &HashMap<String, String>, args: &[String]) -> Result<Self> {
        let auth_url = vars
            .get(ENV_AUTH_URL)
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("{ENV_AUTH_URL} must be set to the identity provider base URL"))?;
        if !(auth_url.starts_with("http://") || auth_url.starts_with("https://")) {
            return Err(anyhow!("{ENV_AUTH_URL} must be an http(s) URL, got {auth_url:?}"));
        }

        let mut http_port: u16 = parse_num(vars, ENV_HTTP_PORT, 3000)?;
        if let Some(p) = parse_arg(args, "--port") {
            http_port = p.parse().with_context(|| format!("--port {p:?}"))?;
        }
        let mut bind: IpAddr = parse_num(vars, ENV_BIND, IpAddr::from([0, 0, 0, 0]))?;
        if let Some(b) = parse_arg(args, "--bind") {
            bind = b.parse().with_context(|| format!("--bind {b:?}"))?;
        }

        let login_window_ms: u64 = parse_num(vars, ENV_LOGIN_WINDOW_MS, 1000)?;
        let login_max: u32 = parse_num(vars, ENV_LOGIN_MAX, 10)?;
        if login_window_ms == 0 || login_max == 0 {
            return Err(anyhow!("{ENV_LOGIN_WINDOW_MS} and {ENV_LOGIN_MAX} must be positive"));
        }

        Ok(Self {
            auth_url,
            jwt_secret: vars.get(ENV_JWT_SECRET).cloned().filter(|s| !s.is_empty()),
            bind,
            http_port,
            upstream_timeout: Duration::from_millis(parse_num(vars, ENV_UPSTREAM_TIMEOUT_MS, 5000)?),
            operation_timeout: Duration::from_millis(parse_num(vars, ENV_OPERATION_TIMEOUT_MS, 10_000)?),
            login_window: WindowSpec::new(Duration::from_millis(login_window_ms), login_max),
            rate_sweep_interval: Duration::from_secs(parse_num(vars, ENV_RATE_SWEEP_SECS, 30)?),
            trust_forwarded_for: parse_bool(vars, ENV_TRUST_FORWARDED_FOR)?,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::new(self.bind, self.http_port) }
}
