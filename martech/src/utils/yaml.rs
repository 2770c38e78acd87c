use crate::error::{MartechError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{ffi::OsStr, fs::File, path::Path};

/// Read a YAML file into a config struct.
///
/// * `filepath`: Path to file with configuration parameters.
pub fn from_yaml_file<T: DeserializeOwned, F: AsRef<OsStr>>(filepath: F) -> Result<T> {
    let file = Path::new(&filepath);
    if !file.is_file() {
        return Err(MartechError::InvalidArgument(format!(
            "could not locate the config file {file:?}"
        )));
    }
    let config_file = config::Config::builder()
        .add_source(config::File::new(
            &file.to_string_lossy(),
            config::FileFormat::Yaml,
        ))
        .build()?;
    Ok(config_file.try_deserialize::<T>()?)
}

/// Write a config struct out as YAML, replacing any existing file.
///
/// * `config`: the values to write.
/// * `filepath`: destination.
pub fn to_yaml_file<T: Serialize, F: AsRef<Path>>(config: &T, filepath: F) -> Result<()> {
    let file = File::create(filepath)?;
    serde_yaml::to_writer(file, config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_an_error() {
        let result: Result<crate::devices::hardware::sercom::SerialConfig> =
            from_yaml_file("/does/not/exist.yaml");
        assert!(matches!(result, Err(MartechError::InvalidArgument(_))));
    }
}
