//! INI parsing for [`ConfigFile`].

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::{ConfigFile, ConfigFileError};
use super::size::parse_size;
use crate::tile::{SourceKind, MAX_ZOOM};

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Parses `key` from `props` when present, keeping `target` otherwise.
fn read<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
    reason: &str,
    target: &mut T,
) -> Result<(), ConfigFileError> {
    if let Some(value) = props.get(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| invalid(section, key, value, reason))?;
    }
    Ok(())
}

fn read_size(
    props: &Properties,
    section: &str,
    key: &str,
    target: &mut usize,
) -> Result<(), ConfigFileError> {
    if let Some(value) = props.get(key) {
        *target = parse_size(value).map_err(|e| invalid(section, key, value, e.to_string()))?;
    }
    Ok(())
}

fn read_string(props: &Properties, key: &str, target: &mut String) {
    if let Some(value) = props.get(key) {
        let value = value.trim();
        if !value.is_empty() {
            *target = value.to_string();
        }
    }
}

/// Builds a [`ConfigFile`] from parsed INI, starting from defaults.
///
/// Unknown sections and keys are ignored.
pub fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(props) = ini.section(Some("cache")) {
        if let Some(dir) = props.get("directory") {
            let dir = dir.trim();
            if !dir.is_empty() {
                config.cache.directory = Some(expand_tilde(dir));
            }
        }
        read_size(props, "cache", "memory_size", &mut config.cache.memory_size)?;
        read_size(props, "cache", "disk_size", &mut config.cache.disk_size)?;
        read(
            props,
            "cache",
            "memory_entries",
            "must be a positive integer",
            &mut config.cache.memory_entries,
        )?;
        if config.cache.memory_entries == 0 {
            return Err(invalid("cache", "memory_entries", "0", "must be at least 1"));
        }
    }

    if let Some(props) = ini.section(Some("download")) {
        read(
            props,
            "download",
            "timeout",
            "must be a positive integer (seconds)",
            &mut config.download.timeout,
        )?;
        read(
            props,
            "download",
            "max_retries",
            "must be a positive integer",
            &mut config.download.max_retries,
        )?;
        read(
            props,
            "download",
            "retry_base_delay_ms",
            "must be a non-negative integer (milliseconds)",
            &mut config.download.retry_base_delay_ms,
        )?;
        read(
            props,
            "download",
            "max_concurrent",
            "must be a positive integer",
            &mut config.download.max_concurrent,
        )?;
        for (key, value) in [
            ("timeout", config.download.timeout as usize),
            ("max_retries", config.download.max_retries as usize),
            ("max_concurrent", config.download.max_concurrent),
        ] {
            if value == 0 {
                return Err(invalid("download", key, "0", "must be at least 1"));
            }
        }
    }

    if let Some(props) = ini.section(Some("loader")) {
        read(
            props,
            "loader",
            "low_res_zoom_offset",
            "must be an integer zoom difference",
            &mut config.loader.low_res_zoom_offset,
        )?;
        if config.loader.low_res_zoom_offset > MAX_ZOOM {
            return Err(invalid(
                "loader",
                "low_res_zoom_offset",
                &config.loader.low_res_zoom_offset.to_string(),
                format!("must not exceed {}", MAX_ZOOM),
            ));
        }
    }

    if let Some(props) = ini.section(Some("viewport")) {
        read(
            props,
            "viewport",
            "visible_batch",
            "must be a positive integer",
            &mut config.viewport.visible_batch,
        )?;
        read(
            props,
            "viewport",
            "buffer_batch",
            "must be a positive integer",
            &mut config.viewport.buffer_batch,
        )?;
        read(
            props,
            "viewport",
            "digital_zoom_min",
            "must be a number",
            &mut config.viewport.digital_zoom_min,
        )?;
        read(
            props,
            "viewport",
            "digital_zoom_max",
            "must be a number",
            &mut config.viewport.digital_zoom_max,
        )?;

        let viewport = &config.viewport;
        if viewport.visible_batch == 0 || viewport.buffer_batch == 0 {
            let key = if viewport.visible_batch == 0 {
                "visible_batch"
            } else {
                "buffer_batch"
            };
            return Err(invalid("viewport", key, "0", "must be at least 1"));
        }
        if !(viewport.digital_zoom_min > 0.0 && viewport.digital_zoom_min.is_finite()) {
            return Err(invalid(
                "viewport",
                "digital_zoom_min",
                &viewport.digital_zoom_min.to_string(),
                "must be a positive number",
            ));
        }
        if !(viewport.digital_zoom_max >= viewport.digital_zoom_min
            && viewport.digital_zoom_max.is_finite())
        {
            return Err(invalid(
                "viewport",
                "digital_zoom_max",
                &viewport.digital_zoom_max.to_string(),
                "must be a number no smaller than digital_zoom_min",
            ));
        }
    }

    if let Some(props) = ini.section(Some("sources")) {
        read_string(props, "street_host", &mut config.sources.street_host);
        read_string(props, "satellite_base", &mut config.sources.satellite_base);
        read_string(props, "satellitealt_base", &mut config.sources.satellitealt_base);
        if let Some(value) = props.get("default") {
            config.sources.default = SourceKind::from_name(value.trim()).ok_or_else(|| {
                invalid(
                    "sources",
                    "default",
                    value,
                    "must be one of: street, satellite, satellitealt",
                )
            })?;
        }
    }

    Ok(config)
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
