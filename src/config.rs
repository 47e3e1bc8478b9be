use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    auth::UserCredential,
    backend::BackendTimeouts,
    cluster::{MemberId, ReplicaAddr},
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "kvgate",
    about = "Session front door for a replicated key-value cluster",
    version = crate::version::VERSION,
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the front-door HTTP server (default).
    Serve,

    /// Log in to a running front door and send commands interactively.
    Console,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    #[arg(
        long,
        global = true,
        env = "KVGATE_BIND",
        value_name = "ADDR",
        default_value = "127.0.0.1:21000"
    )]
    pub bind: SocketAddr,

    /// Backend replica address; repeat the flag or separate entries with commas.
    #[arg(
        long = "replica",
        global = true,
        env = "KVGATE_REPLICAS",
        value_name = "ID=URL",
        value_delimiter = ',',
        default_value = "1=http://127.0.0.1:21001,2=http://127.0.0.1:21002,3=http://127.0.0.1:21003"
    )]
    pub replicas: Vec<ReplicaAddr>,

    /// Initial membership view of every proxy, in fan-out order.
    #[arg(
        long,
        global = true,
        env = "KVGATE_VOTERS",
        value_name = "IDS",
        value_delimiter = ',',
        default_value = "1"
    )]
    pub voters: Vec<MemberId>,

    /// Session pool size; one node proxy is started per session slot.
    #[arg(
        long,
        global = true,
        env = "KVGATE_SESSIONS",
        value_name = "N",
        default_value_t = 3,
        value_parser = clap::value_parser!(u64).range(1..=1024)
    )]
    pub sessions: u64,

    #[arg(
        long = "user",
        global = true,
        env = "KVGATE_USERS",
        value_name = "NAME:PASSWORD",
        value_delimiter = ',',
        default_value = "1:1,2:2,3:3"
    )]
    pub users: Vec<UserCredential>,

    #[arg(
        long = "request-timeout-ms",
        global = true,
        env = "KVGATE_REQUEST_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 3_000,
        value_parser = clap::value_parser!(u64).range(100..=60_000)
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "connect-timeout-ms",
        global = true,
        env = "KVGATE_CONNECT_TIMEOUT_MS",
        value_name = "MS",
        default_value_t = 1_000,
        value_parser = clap::value_parser!(u64).range(50..=30_000)
    )]
    pub connect_timeout_ms: u64,

    /// Front-door base URL used by `console`.
    #[arg(
        long,
        global = true,
        env = "KVGATE_SERVER",
        value_name = "ORIGIN",
        default_value = "http://127.0.0.1:21000"
    )]
    pub server: String,
}

impl Config {
    pub fn pool_size(&self) -> usize {
        usize::try_from(self.sessions).unwrap_or(usize::MAX)
    }

    pub fn backend_timeouts(&self) -> BackendTimeouts {
        BackendTimeouts {
            request: Duration::from_millis(self.request_timeout_ms),
            connect: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_apply_when_flags_absent() {
        let cli = Cli::try_parse_from(["kvgate"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config.bind, SocketAddr::from(([127, 0, 0, 1], 21000)));
        assert_eq!(
            cli.config
                .replicas
                .iter()
                .map(|r| (r.member_id, r.base_url.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (1, "http://127.0.0.1:21001"),
                (2, "http://127.0.0.1:21002"),
                (3, "http://127.0.0.1:21003"),
            ]
        );
        assert_eq!(cli.config.voters, vec![1]);
        assert_eq!(cli.config.pool_size(), 3);
        assert_eq!(cli.config.users.len(), 3);
        assert_eq!(
            cli.config.backend_timeouts(),
            BackendTimeouts {
                request: Duration::from_secs(3),
                connect: Duration::from_secs(1),
            }
        );
        assert_eq!(cli.config.server, "http://127.0.0.1:21000");
    }

    #[test]
    fn parses_repeated_and_delimited_lists() {
        let cli = Cli::try_parse_from([
            "kvgate",
            "serve",
            "--replica",
            "1=http://a:1",
            "--replica",
            "2=http://b:2,3=http://c:3",
            "--voters",
            "2,1",
            "--user",
            "alice:pw",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Serve)));
        assert_eq!(cli.config.replicas.len(), 3);
        assert_eq!(cli.config.voters, vec![2, 1]);
        assert_eq!(cli.config.users[0].username, "alice");
    }

    #[test]
    fn rejects_invalid_sessions() {
        let err = Cli::try_parse_from(["kvgate", "--sessions", "0"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--sessions"));
        assert!(msg.contains("1..=1024"));
    }

    #[test]
    fn rejects_invalid_request_timeout() {
        let err = Cli::try_parse_from(["kvgate", "--request-timeout-ms", "10"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("--request-timeout-ms"));
        assert!(msg.contains("100..=60000"));
    }

    #[test]
    fn rejects_malformed_replica() {
        let err = Cli::try_parse_from(["kvgate", "--replica", "one=http://a"]).unwrap_err();
        assert!(err.to_string().contains("--replica"));
    }
}
