mod commandline;
mod defaults;
mod file;
mod primitives;

use clap::Parser;
use commandline::{Args, Output};
use config::Config;
use defaults::Defaults;

pub(crate) use file::{
    ConfigFile as Configuration, ObjectStorage, OpenTelemetry, Repo, Sled, Tracing,
};
pub(crate) use primitives::LogFormat;

use std::path::{Path, PathBuf};

/// Sustained MiB/s beyond which a full size upload is unlikely to finish inside
/// `store.client_timeout`
const PLAUSIBLE_UPLOAD_RATE: f64 = 8.0;

/// Source for tubely's configuration when embedding tubely as a library
pub enum ConfigSource<P, T> {
    Memory { values: T },
    File { path: P },
    Empty,
}

/// A fully layered tubely configuration, ready to install tracing and run
pub struct TubelyConfiguration {
    pub(crate) config: Configuration,
}

impl<T> ConfigSource<PathBuf, T>
where
    T: serde::Serialize,
{
    pub fn memory(values: T) -> Self {
        ConfigSource::Memory { values }
    }
}

impl<P> ConfigSource<P, ()>
where
    P: AsRef<Path>,
{
    pub fn file(path: P) -> Self {
        ConfigSource::File { path }
    }
}

impl ConfigSource<PathBuf, ()> {
    pub fn empty() -> Self {
        ConfigSource::Empty
    }
}

impl Configuration {
    /// The MiB/s an upload of `media.max_file_size` needs to finish inside
    /// `store.client_timeout`
    pub(crate) fn required_upload_rate(&self) -> f64 {
        self.media.max_file_size as f64 / self.store.client_timeout.max(1) as f64
    }

    pub(crate) fn upload_rate_is_plausible(&self) -> bool {
        self.required_upload_rate() <= PLAUSIBLE_UPLOAD_RATE
    }
}

pub(crate) fn configure_without_clap<P: AsRef<Path>, T: serde::Serialize, Q: AsRef<Path>>(
    source: ConfigSource<P, T>,
    save_to: Option<Q>,
) -> color_eyre::Result<TubelyConfiguration> {
    let config = Config::builder().add_source(config::Config::try_from(&Defaults::default())?);

    let config = match source {
        ConfigSource::Memory { values } => config.add_source(config::Config::try_from(&values)?),
        ConfigSource::File { path } => config.add_source(config::File::from(path.as_ref())),
        ConfigSource::Empty => config,
    };

    let built = config
        .add_source(
            config::Environment::with_prefix("TUBELY")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Configuration = built.try_deserialize()?;

    if let Some(save_to) = save_to {
        save(&config, save_to.as_ref())?;
    }

    Ok(TubelyConfiguration { config })
}

pub(crate) fn configure() -> color_eyre::Result<TubelyConfiguration> {
    let Output {
        config_format,
        save_to,
        config_file,
    } = Args::parse().into_output();

    let config = Config::builder().add_source(config::Config::try_from(&Defaults::default())?);

    let config = if let Some(config_file) = config_file {
        config.add_source(config::File::from(config_file))
    } else {
        config
    };

    let built = config
        .add_source(
            config::Environment::with_prefix("TUBELY")
                .separator("__")
                .try_parsing(true),
        )
        .add_source(config::Config::try_from(&config_format)?)
        .build()?;

    let config: Configuration = built.try_deserialize()?;

    if let Some(save_to) = save_to {
        save(&config, &save_to)?;
    }

    Ok(TubelyConfiguration { config })
}

fn save(config: &Configuration, save_to: &Path) -> color_eyre::Result<()> {
    let output = toml::to_string_pretty(config)?;
    std::fs::write(save_to, output)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{configure_without_clap, ConfigSource, Repo};
    use std::path::PathBuf;

    fn minimal() -> serde_json::Value {
        serde_json::json!({
            "server": {
                "jwt_secret": "secret"
            },
            "store": {
                "bucket_name": "tubely-videos"
            }
        })
    }

    #[test]
    fn defaults_fill_in_missing_values() {
        let config = configure_without_clap(ConfigSource::memory(minimal()), None::<PathBuf>)
            .expect("Valid config")
            .config;

        assert_eq!(config.server.jwt_secret, "secret");
        assert_eq!(config.media.max_file_size, 1024);
        assert_eq!(config.media.max_thumbnail_size, 10);
        assert_eq!(config.media.ffprobe, "ffprobe");
        assert_eq!(config.media.ffmpeg, "ffmpeg");
        assert_eq!(config.store.bucket_name, "tubely-videos");
        assert_eq!(config.store.region, "us-east-1");
        assert_eq!(config.store.signature_duration, 300);
        assert_eq!(config.store.client_timeout, 600);
        assert!(config.store.endpoint.is_none());
        assert!(matches!(config.repo, Repo::Sled(_)));
    }

    #[test]
    fn metrics_section_is_optional() {
        let config = configure_without_clap(ConfigSource::memory(minimal()), None::<PathBuf>)
            .expect("Config without metrics section")
            .config;

        assert!(config.metrics.prometheus_address.is_none());

        let mut values = minimal();
        values["metrics"] = serde_json::json!({
            "prometheus_address": "127.0.0.1:9000"
        });

        let config = configure_without_clap(ConfigSource::memory(values), None::<PathBuf>)
            .expect("Config with metrics section")
            .config;

        assert_eq!(
            config.metrics.prometheus_address,
            Some("127.0.0.1:9000".parse().expect("Valid address"))
        );
    }

    #[test]
    fn default_timeout_fits_largest_upload() {
        let mut config = configure_without_clap(ConfigSource::memory(minimal()), None::<PathBuf>)
            .expect("Valid config")
            .config;

        assert!(config.upload_rate_is_plausible());

        // 1 GiB in 30 seconds
        config.store.client_timeout = 30;
        assert!(config.required_upload_rate() > 30.0);
        assert!(!config.upload_rate_is_plausible());

        config.store.client_timeout = 0;
        assert!(!config.upload_rate_is_plausible());
    }

    #[test]
    fn missing_secret_is_rejected() {
        let res = configure_without_clap(
            ConfigSource::memory(serde_json::json!({
                "store": {
                    "bucket_name": "tubely-videos"
                }
            })),
            None::<PathBuf>,
        );

        assert!(res.is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = std::env::temp_dir().join(format!("tubely-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("Created dir");
        let path = dir.join("tubely.toml");

        let first = configure_without_clap(ConfigSource::memory(minimal()), Some(&path))
            .expect("Valid config")
            .config;

        let second = configure_without_clap(ConfigSource::file(&path), None::<PathBuf>)
            .expect("Saved config is valid")
            .config;

        assert_eq!(first.server.address, second.server.address);
        assert_eq!(first.store.bucket_name, second.store.bucket_name);
        assert_eq!(
            first.tracing.logging.targets.to_string(),
            second.tracing.logging.targets.to_string()
        );

        std::fs::remove_dir_all(dir).expect("Removed dir");
    }
}
