use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::error::TamperError;
use crate::policy::Registry;
use crate::profile::{Profile, ProfileSet};

use super::args::Args;
use super::config::{ConfigFile, DnsConfig};

/// Everything the configuration produces.
#[derive(Debug)]
pub struct Setup {
    pub profiles: ProfileSet,
    pub dns: DnsConfig,
}

/// Build profiles from the config file and the command files it names
pub struct ProfileLoader;

impl ProfileLoader {
    /// Load the setup for CLI arguments. Without `--config` only an empty default profile exists.
    pub fn load(args: &Args, registry: Arc<Registry>) -> Result<Setup, TamperError> {
        let Some(config_path) = args.config.as_ref() else {
            return Ok(Setup {
                profiles: ProfileSet::new(registry),
                dns: DnsConfig::default(),
            });
        };

        let config = ConfigFile::load(config_path)?;
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_config(config, base, registry)
    }

    /// Build from a parsed config. Relative command file paths resolve against `base`.
    pub fn from_config(
        config: ConfigFile,
        base: &Path,
        registry: Arc<Registry>,
    ) -> Result<Setup, TamperError> {
        let mut profiles = ProfileSet::new(registry);

        for (name, profile_config) in &config.profiles {
            let profile = profiles.profile_or_create(name);
            for command in &profile_config.commands {
                profile.apply(command)?;
            }
            for file in &profile_config.files {
                load_command_file(&profile, &base.join(file))?;
            }
            for client in &profile_config.clients {
                profiles.bind(*client, name)?;
            }
            log::info!(
                "loaded profile {name}: {} commands, {} clients",
                profile.commands().len(),
                profile_config.clients.len()
            );
        }

        Ok(Setup {
            profiles,
            dns: config.dns,
        })
    }
}

/// Non-empty, non-comment lines of a command file with their 1-based line numbers
pub fn read_command_file(path: &Path) -> Result<Vec<(usize, String)>, TamperError> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| (number, line.to_string()))
        .collect())
}

/// Apply every command in `path` to `profile`, stopping at the first bad line
pub fn load_command_file(profile: &Profile, path: &Path) -> Result<(), TamperError> {
    for (line, command) in read_command_file(path)? {
        profile
            .apply(&command)
            .map_err(|source| TamperError::ProfileLine {
                path: PathBuf::from(path),
                line,
                source: Box::new(source),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::Command;
    use crate::policy::Describe;
    use std::io::Write;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::with_defaults())
    }

    #[test]
    fn load_without_config_has_empty_default() {
        let args = Args {
            config: None,
            command: Command::Dump { client: None },
        };
        let setup = ProfileLoader::load(&args, registry()).unwrap();
        assert!(setup.profiles.for_client(None).commands().is_empty());
        assert!(setup.dns.proxy_ips.is_empty());
    }

    #[test]
    fn load_config_with_command_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("profiles")).unwrap();
        fs::write(
            dir.path().join("profiles/mobile.txt"),
            "# slow network\n\nurl speed 10KB/s g.cn\ndomain circular n 1 g.cn 1.1.1.1,2.2.2.2\n",
        )
        .unwrap();
        let config_path = dir.path().join("tamper.toml");
        let mut config = fs::File::create(&config_path).unwrap();
        writeln!(
            config,
            r#"
[dns]
proxy_ips = ["10.0.0.1"]

[profiles.default]
commands = ["url status 503"]

[profiles.mobile]
files = ["profiles/mobile.txt"]
clients = ["192.168.1.20"]
"#
        )
        .unwrap();

        let args = Args {
            config: Some(config_path),
            command: Command::Dump { client: None },
        };
        let setup = ProfileLoader::load(&args, registry()).unwrap();
        let mobile = Some("192.168.1.20".parse().unwrap());

        let policy = setup.profiles.resolve_url(mobile, "g.cn/a").unwrap();
        assert_eq!(policy.command(), "url speed 10KB/s g.cn");
        let fallback = setup.profiles.resolve_url(None, "g.cn/a").unwrap();
        assert_eq!(fallback.command(), "url status 503");
        assert_eq!(setup.dns.proxy_ips.len(), 1);
    }

    #[test]
    fn bad_line_reports_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.txt");
        fs::write(&path, "url delay 1s g.cn\n# ok\nurl delay soon g.cn\n").unwrap();

        let profile = Profile::new("test", registry());
        let err = load_command_file(&profile, &path).unwrap_err();
        match err {
            TamperError::ProfileLine { line, source, .. } => {
                assert_eq!(line, 3);
                assert!(matches!(*source, TamperError::InvalidValue { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Lines before the bad one stay applied.
        assert_eq!(profile.commands(), vec!["url delay 1s g.cn"]);
    }

    #[test]
    fn read_command_file_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.txt");
        fs::write(&path, "\n# header\n  url g.cn  \n\ndomain block ads.cn\n").unwrap();

        let lines = read_command_file(&path).unwrap();
        assert_eq!(
            lines,
            vec![(3, "url g.cn".to_string()), (5, "domain block ads.cn".to_string())]
        );
    }
}
