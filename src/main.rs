use std::{io, sync::Arc};

use clap::Parser;
use tamper::{
    cli::{Args, Command, ProfileLoader, commands},
    error::TamperError,
    net::{DnsAnswerer, SystemDnsResolver},
    policy::Registry,
};

#[tokio::main]
async fn main() -> Result<(), TamperError> {
    env_logger::init();

    let args = Args::parse();
    let registry = Arc::new(Registry::with_defaults());
    let mut out = io::stdout();

    match &args.command {
        Command::Check { files } => commands::check(&registry, files, &mut out),
        Command::Explain { client, url } => {
            let setup = ProfileLoader::load(&args, registry)?;
            commands::explain(&setup.profiles, *client, url, &mut out)
        }
        Command::Dns { client, domain } => {
            let setup = ProfileLoader::load(&args, registry)?;
            let answerer = DnsAnswerer::new(SystemDnsResolver::new()?, setup.dns.proxy_ips.clone());
            commands::dns(&answerer, &setup.profiles, *client, domain, &mut out).await
        }
        Command::Dump { client } => {
            let setup = ProfileLoader::load(&args, registry)?;
            commands::dump(&setup.profiles, *client, &mut out)
        }
    }
}
