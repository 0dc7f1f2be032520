use std::{io::Write, net::IpAddr, path::PathBuf};

use super::loader::read_command_file;
use crate::{
    error::TamperError,
    net::{DnsAnswerer, DnsResolver},
    policy::{ContentPolicy, Describe, Registry},
    profile::ProfileSet,
};

/// Print every command of `files` in normalized form with its description.
///
/// Bad lines are reported and checking continues; the first error is returned at the end.
pub fn check(registry: &Registry, files: &[PathBuf], out: &mut impl Write) -> Result<(), TamperError> {
    let mut first_error = None;

    for path in files {
        writeln!(out, "# {}", path.display())?;
        let lines = match read_command_file(path) {
            Ok(lines) => lines,
            Err(e) => {
                log::error!("{}: {e}", path.display());
                first_error.get_or_insert(e);
                continue;
            }
        };

        for (line, command) in lines {
            match registry.factory(&command) {
                Ok(policy) => writeln!(out, "{:<48} # {}", policy.command(), policy.comment())?,
                Err(source) => {
                    let e = TamperError::ProfileLine {
                        path: path.clone(),
                        line,
                        source: Box::new(source),
                    };
                    log::error!("{e}");
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}

/// Describe the url policy `client` gets for `url`.
pub fn explain(
    profiles: &ProfileSet,
    client: Option<IpAddr>,
    url: &str,
    out: &mut impl Write,
) -> Result<(), TamperError> {
    let profile = profiles.for_client(client);
    writeln!(out, "profile: {}", profile.name())?;

    let Some(policy) = profile.resolve_url(url) else {
        writeln!(out, "policy:  none, pass through")?;
        return Ok(());
    };
    writeln!(out, "policy:  {}", policy.command())?;
    writeln!(out, "effect:  {}", policy.comment())?;
    if let Some(ContentPolicy::Map(map)) = policy.content_policy() {
        writeln!(out, "fetch:   {}", map.apply(url))?;
    }
    Ok(())
}

/// Answer a DNS question for `client` and print the addresses.
pub async fn dns<R: DnsResolver>(
    answerer: &DnsAnswerer<R>,
    profiles: &ProfileSet,
    client: Option<IpAddr>,
    domain: &str,
    out: &mut impl Write,
) -> Result<(), TamperError> {
    let policy = profiles.resolve_domain(client, domain);
    if let Some(policy) = &policy {
        writeln!(out, "policy:  {}", policy.command())?;
    }

    let ips = answerer.answer(domain, policy.as_deref()).await?;
    if ips.is_empty() {
        writeln!(out, "no addresses")?;
    }
    for ip in ips {
        writeln!(out, "{ip}")?;
    }
    Ok(())
}

/// Print the profile serving `client` as replayable commands.
pub fn dump(profiles: &ProfileSet, client: Option<IpAddr>, out: &mut impl Write) -> Result<(), TamperError> {
    let profile = profiles.for_client(client);
    writeln!(out, "# profile {}", profile.name())?;
    for command in profile.commands() {
        writeln!(out, "{command}")?;
    }
    Ok(())
}
