//! INI file configuration adapter.
//!
//! Used for both the engine config and strategy files. Section and key names
//! are case-insensitive; values keep their case.

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TraderError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| TraderError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, TraderError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| TraderError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn condition_values_survive_intact() {
        let content = r#"
[entry]
long_1 = medium: crossover(ema(5), ema(20))
short_1 = short: stochastic(14,3).d between 20, 80
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("entry", "long_1"),
            Some("medium: crossover(ema(5), ema(20))".to_string())
        );
        assert_eq!(
            adapter.get_string("entry", "short_1"),
            Some("short: stochastic(14,3).d between 20, 80".to_string())
        );
    }

    #[test]
    fn dotted_sections_and_keys() {
        let content = "[timeframe.medium]\nunit = Minutes\n\n[engine]\nstrategy.BHP = bhp.ini\n";
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("timeframe.medium", "unit"),
            Some("Minutes".to_string())
        );
        assert_eq!(
            adapter.get_string("engine", "strategy.bhp"),
            Some("bhp.ini".to_string())
        );
    }

    #[test]
    fn keys_are_lowercased_and_sorted() {
        let ini = "[Entry]\nShort_1 = a\nlong_2 = b\nLONG_1 = c\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        assert_eq!(adapter.keys("entry"), vec!["long_1", "long_2", "short_1"]);
        assert!(adapter.keys("exit").is_empty());
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[live]\npoll_interval_secs = 2\n").unwrap();
        assert_eq!(adapter.get_string("live", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn numeric_getters_fall_back_to_default() {
        let adapter = FileConfigAdapter::from_string(
            "[live]\npoll_interval_secs = 2\nsync_interval_secs = soon\n\n\
             [sizing]\nrisk_per_trade = 0.015\n",
        )
        .unwrap();
        assert_eq!(adapter.get_int("live", "poll_interval_secs", 1), 2);
        assert_eq!(adapter.get_int("live", "sync_interval_secs", 1), 1);
        assert_eq!(adapter.get_int("live", "missing", 42), 42);
        assert_eq!(adapter.get_double("sizing", "risk_per_trade", 0.0), 0.015);
        assert_eq!(adapter.get_double("sizing", "missing", 99.9), 99.9);
    }

    #[test]
    fn get_bool_values() {
        let adapter = FileConfigAdapter::from_string(
            "[strategy]\na = true\nb = Yes\nc = 0\nd = off\ne = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("strategy", "a", false));
        assert!(adapter.get_bool("strategy", "b", false));
        assert!(!adapter.get_bool("strategy", "c", true));
        assert!(!adapter.get_bool("strategy", "d", true));
        assert!(adapter.get_bool("strategy", "e", true));
        assert!(!adapter.get_bool("strategy", "missing", false));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[sqlite]\npath = /var/lib/mtftrader/positions.db\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("sqlite", "path"),
            Some("/var/lib/mtftrader/positions.db".to_string())
        );
    }

    #[test]
    fn from_file_missing_is_config_parse_error() {
        match FileConfigAdapter::from_file("/nonexistent/path/config.ini") {
            Err(TraderError::ConfigParse { file, .. }) => {
                assert_eq!(file, "/nonexistent/path/config.ini")
            }
            Err(other) => panic!("expected ConfigParse, got {other}"),
            Ok(_) => panic!("expected error"),
        }
    }
}
