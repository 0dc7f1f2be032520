use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Policy-driven traffic shaping for an intercepting HTTP/DNS proxy"
)]
pub struct Args {
    /// Path to configuration file (TOML)
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse command files and print each command in normalized form
    Check {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Show the url policy a client would get for a URL
    Explain {
        /// Client address used to pick the profile
        #[arg(long)]
        client: Option<IpAddr>,
        url: String,
    },

    /// Answer a DNS question the way the proxy would
    Dns {
        /// Client address used to pick the profile
        #[arg(long)]
        client: Option<IpAddr>,
        domain: String,
    },

    /// Print a profile as commands
    Dump {
        /// Client address used to pick the profile
        #[arg(long)]
        client: Option<IpAddr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_explain_with_client() {
        let args = Args::try_parse_from([
            "tamper",
            "--config",
            "tamper.toml",
            "explain",
            "--client",
            "192.168.1.20",
            "g.cn/api",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("tamper.toml")));
        match args.command {
            Command::Explain { client, url } => {
                assert_eq!(client, Some("192.168.1.20".parse().unwrap()));
                assert_eq!(url, "g.cn/api");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_is_global() {
        let args = Args::try_parse_from(["tamper", "dump", "--config", "tamper.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("tamper.toml")));
    }

    #[test]
    fn check_requires_files() {
        assert!(Args::try_parse_from(["tamper", "check"]).is_err());
    }

    #[test]
    fn client_must_be_an_ip() {
        assert!(Args::try_parse_from(["tamper", "dns", "--client", "phone", "g.cn"]).is_err());
    }
}
