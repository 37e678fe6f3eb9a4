use thiserror::Error;

use crate::context::Config;

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),
}

/// Layered configuration: `bergwelt` and `bergwelt.local` files, then
/// `BW__`-prefixed environment variables on top.
pub fn load_config() -> Result<Config, LoadConfigError> {
    let _ = dotenvy::dotenv();

    let builder = config::Config::builder()
        .add_source(config::File::with_name("bergwelt").required(false))
        .add_source(config::File::with_name("bergwelt.local").required(false))
        .add_source(
            config::Environment::with_prefix("BW")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

    let cfg = builder.build()?;
    let cfg: Config = cfg.try_deserialize()?;
    log::info!("Config loaded successfully {:?}", cfg);

    Ok(cfg)
}
