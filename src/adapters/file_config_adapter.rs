//! INI file configuration adapter.

use std::path::Path;

use configparser::ini::Ini;

use crate::domain::error::TradelabError;
use crate::ports::config_port::ConfigPort;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TradelabError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| TradelabError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, TradelabError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| TradelabError::ConfigParse {
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
            .as_deref()
            .and_then(Self::parse_bool)
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

    #[test]
    fn typed_getters() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\ninitial_capital = 25000.5\nsymbol = AAPL\n\
             [strategy]\nmax_positions = 3\nname = Cross\n",
        )
        .unwrap();
        assert_eq!(adapter.get_string("strategy", "name"), Some("Cross".to_string()));
        assert_eq!(adapter.get_double("backtest", "initial_capital", 0.0), 25000.5);
        assert_eq!(adapter.get_int("strategy", "max_positions", 1), 3);
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn defaults_for_missing_or_malformed() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nmax_positions = abc\ncapital = nope\n")
                .unwrap();
        assert_eq!(adapter.get_int("backtest", "max_positions", 42), 42);
        assert_eq!(adapter.get_double("backtest", "capital", 99.9), 99.9);
        assert_eq!(adapter.get_double("backtest", "missing", 1.5), 1.5);
    }

    #[test]
    fn booleans() {
        let adapter = FileConfigAdapter::from_string(
            "[market]\na = true\nb = YES\nc = 0\nd = off\ne = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("market", "a", false));
        assert!(adapter.get_bool("market", "b", false));
        assert!(!adapter.get_bool("market", "c", true));
        assert!(!adapter.get_bool("market", "d", true));
        assert!(adapter.get_bool("market", "e", true));
        assert!(!adapter.get_bool("market", "missing", false));
    }

    #[test]
    fn section_keys_are_sorted() {
        let adapter = FileConfigAdapter::from_string(
            "[strategy]\nexit_1 = BELOW(close, 1)\n\
             entry_2 = ABOVE(close, 2)\nentry_1 = ABOVE(close, 1)\n",
        )
        .unwrap();
        assert_eq!(adapter.keys("strategy"), vec!["entry_1", "entry_2", "exit_1"]);
        assert!(adapter.keys("parameters").is_empty());
        assert!(adapter.has_section("strategy"));
        assert!(!adapter.has_section("market"));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[backtest]\ndata_dir = /data\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_string("backtest", "data_dir"), Some("/data".to_string()));
    }

    #[test]
    fn from_file_missing_is_config_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(TradelabError::ConfigParse { .. })));
    }
}
