use crate::{config_err, error::VidarError};

pub const THREADS_ENV: &str = "VIDAR_THREADS";
pub const PLAN_CACHE_ENV: &str = "VIDAR_PLAN_CACHE";
pub const DEVICE_ENV: &str = "VIDAR_DEVICE";

/// Session settings.
///
/// Leaving `threads` unset shares the process wide CPU runtime. Setting it
/// gives the session a runtime with a dedicated worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VidarConfig {
    pub threads: Option<usize>,
    pub plan_cache: bool,
    pub device: usize,
}

impl Default for VidarConfig {
    fn default() -> Self {
        Self {
            threads: None,
            plan_cache: true,
            device: 0,
        }
    }
}

impl VidarConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_plan_cache(mut self, plan_cache: bool) -> Self {
        self.plan_cache = plan_cache;
        self
    }

    pub fn with_device(mut self, device: usize) -> Self {
        self.device = device;
        self
    }

    /// Defaults overridden by `VIDAR_THREADS`, `VIDAR_PLAN_CACHE` and
    /// `VIDAR_DEVICE` when they are set.
    pub fn from_env() -> Result<Self, VidarError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VidarError> {
        let mut config = Self::default();

        if let Some(val) = lookup(THREADS_ENV) {
            config.threads = match parse_usize(THREADS_ENV, &val)? {
                0 => {
                    return config_err!("`{THREADS_ENV}` must be a positive integer, got `{val}`");
                }
                n => Some(n),
            };
        }

        if let Some(val) = lookup(PLAN_CACHE_ENV) {
            config.plan_cache = match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => return config_err!("`{PLAN_CACHE_ENV}` must be a boolean, got `{val}`"),
            };
        }

        if let Some(val) = lookup(DEVICE_ENV) {
            config.device = parse_usize(DEVICE_ENV, &val)?;
        }

        Ok(config)
    }
}

fn parse_usize(key: &str, val: &str) -> Result<usize, VidarError> {
    match val.trim().parse::<usize>() {
        Ok(n) => Ok(n),
        Err(e) => config_err!("`{key}` must be a non-negative integer, got `{val}`: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let config = VidarConfig::from_lookup(lookup(&[
            (THREADS_ENV, "3"),
            (PLAN_CACHE_ENV, "off"),
        ]))
        .unwrap();

        assert_eq!(
            config,
            VidarConfig::default().with_threads(3).with_plan_cache(false)
        );
        assert_eq!(
            VidarConfig::from_lookup(lookup(&[])).unwrap(),
            VidarConfig::default()
        );
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            VidarConfig::from_lookup(lookup(&[(DEVICE_ENV, "gpu")])),
            Err(VidarError::Config(_))
        ));
        assert!(matches!(
            VidarConfig::from_lookup(lookup(&[(PLAN_CACHE_ENV, "maybe")])),
            Err(VidarError::Config(_))
        ));
        for threads in ["0", "-2", "many"] {
            assert!(matches!(
                VidarConfig::from_lookup(lookup(&[(THREADS_ENV, threads)])),
                Err(VidarError::Config(_))
            ));
        }
    }
}
