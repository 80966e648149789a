// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporter configuration (`spec.md` §6.3).
//!
//! The core assumes this struct has already been validated by the caller (parsing CLI flags or
//! a config file is explicitly out of scope). What it does do is *normalize* the
//! `deduplicateLogs: bool | {...}` union into a concrete struct, and clamp a handful of values
//! that would otherwise silently turn a subsystem into a permanent no-op.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Top-level reporter configuration, as accepted at [`crate::facade::ReporterFacadeBuilder`]
/// construction.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReporterConfig {
    /// If set, the assembled document is also handed to the configured writer collaborator.
    /// The reporter core itself never opens this file; see [`crate::facade::WriteDocument`].
    pub output_file: Option<String>,
    pub capture_console_on_failure: bool,
    pub max_console_bytes: usize,
    pub max_console_lines: usize,
    pub include_debug_output: bool,
    pub grace_period_ms: u64,
    pub deduplicate_logs: DeduplicateLogsSetting,
    pub stdio: StdioConfig,
    pub truncation: TruncationConfig,
    pub environment_metadata: EnvironmentMetadataConfig,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            output_file: None,
            capture_console_on_failure: true,
            max_console_bytes: 50_000,
            max_console_lines: 100,
            include_debug_output: false,
            grace_period_ms: 100,
            deduplicate_logs: DeduplicateLogsSetting::default(),
            stdio: StdioConfig::default(),
            truncation: TruncationConfig::default(),
            environment_metadata: EnvironmentMetadataConfig::default(),
        }
    }
}

/// The `deduplicateLogs: bool | {...}` union from `spec.md` §6.3.
///
/// Rust structs can't natively hold "a bool or an object" in one field, so this is an untagged
/// enum: a bare `true`/`false` deserializes to [`Self::Enabled`]/[`Self::Disabled`], and an
/// object deserializes to [`Self::Detailed`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DeduplicateLogsSetting {
    /// `deduplicateLogs: true` or `deduplicateLogs: false`.
    Enabled(bool),
    /// `deduplicateLogs: { ... }`.
    Detailed(DeduplicateLogsConfig),
}

impl Default for DeduplicateLogsSetting {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

/// The object form of `deduplicateLogs`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeduplicateLogsConfig {
    pub enabled: bool,
    pub max_cache_entries: usize,
    pub include_sources: bool,
    pub normalize_whitespace: bool,
    pub strip_timestamps: bool,
    pub strip_ansi_codes: bool,
    pub scope: DedupScope,
}

impl Default for DeduplicateLogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_cache_entries: 10_000,
            include_sources: false,
            normalize_whitespace: true,
            strip_timestamps: true,
            strip_ansi_codes: true,
            scope: DedupScope::Global,
        }
    }
}

/// Scope of the [`crate::dedup::DeduplicationCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupScope {
    /// One cache shared across the whole run.
    Global,
    /// A fresh cache per test, cleared at each test boundary.
    PerTest,
}

/// Stdio interception settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StdioConfig {
    pub suppress_stdout: bool,
    pub suppress_stderr: bool,
    pub filter_pattern: Option<String>,
    pub framework_presets: Vec<String>,
    pub redirect_to_stderr: bool,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            suppress_stdout: false,
            suppress_stderr: false,
            filter_pattern: None,
            framework_presets: Vec::new(),
            redirect_to_stderr: false,
        }
    }
}

/// Late-truncation settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TruncationConfig {
    pub enabled: bool,
    pub max_tokens: u32,
    pub enable_late_truncation: bool,
    /// Per-category character caps used by truncation phases 2–3 (`spec.md` §9: "empirical...
    /// an implementer may expose them as tunables").
    pub tunables: TruncationTunables,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: 8_000,
            enable_late_truncation: true,
            tunables: TruncationTunables::default(),
        }
    }
}

/// The empirical character caps from `spec.md` §4.5, exposed as tunables per §9.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationTunables {
    pub info_warn_chars_per_failure: usize,
    pub error_chars_per_failure: usize,
    pub phase3_error_message_chars: usize,
    pub phase3_console_chars_per_failure: usize,
    pub phase3_retained_frames: usize,
}

impl Default for TruncationTunables {
    fn default() -> Self {
        Self {
            info_warn_chars_per_failure: 150,
            error_chars_per_failure: 300,
            phase3_error_message_chars: 512,
            phase3_console_chars_per_failure: 200,
            phase3_retained_frames: 5,
        }
    }
}

/// Which pieces of environment metadata to collect (`spec.md` §6.3).
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentMetadataConfig {
    pub enabled: bool,
    pub include_vitest: bool,
    pub include_package_manager: bool,
    pub include_ci: bool,
    pub include_node_runtime: bool,
    pub include_os_version: bool,
}

impl Default for EnvironmentMetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_vitest: true,
            include_package_manager: true,
            include_ci: true,
            include_node_runtime: true,
            include_os_version: true,
        }
    }
}

/// The resolved, engine-facing configuration: the union in [`ReporterConfig`] has been
/// collapsed into a concrete [`DeduplicateLogsConfig`], and capacities that would silently
/// disable a subsystem have been clamped (with a `tracing::warn!`) rather than rejected
/// outright, since `spec.md` treats config validation itself as the caller's responsibility.
#[derive(Clone, Debug)]
pub struct NormalizedReporterConfig {
    pub capture_console_on_failure: bool,
    pub max_console_bytes: usize,
    pub max_console_lines: usize,
    pub include_debug_output: bool,
    pub grace_period_ms: u64,
    pub dedup: DeduplicateLogsConfig,
    pub stdio: StdioConfig,
    pub truncation: TruncationConfig,
    pub environment_metadata: EnvironmentMetadataConfig,
}

impl NormalizedReporterConfig {
    /// Resolves a [`ReporterConfig`] into its engine-facing form.
    pub fn new(config: &ReporterConfig) -> Result<Self, ConfigError> {
        let mut dedup = match &config.deduplicate_logs {
            DeduplicateLogsSetting::Enabled(enabled) => DeduplicateLogsConfig {
                enabled: *enabled,
                ..DeduplicateLogsConfig::default()
            },
            DeduplicateLogsSetting::Detailed(detailed) => detailed.clone(),
        };

        if dedup.enabled && dedup.max_cache_entries == 0 {
            tracing::warn!(
                "deduplicateLogs.maxCacheEntries was 0; clamping to 1 (use `enabled: false` to disable deduplication entirely)"
            );
            dedup.max_cache_entries = 1;
        }

        if config.max_console_lines == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "maxConsoleLines",
            });
        }
        if config.max_console_bytes == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "maxConsoleBytes",
            });
        }

        Ok(Self {
            capture_console_on_failure: config.capture_console_on_failure,
            max_console_bytes: config.max_console_bytes,
            max_console_lines: config.max_console_lines,
            include_debug_output: config.include_debug_output,
            grace_period_ms: config.grace_period_ms,
            dedup,
            stdio: config.stdio.clone(),
            truncation: config.truncation.clone(),
            environment_metadata: config.environment_metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_bool_normalizes_to_defaults_with_override() {
        let config = ReporterConfig {
            deduplicate_logs: DeduplicateLogsSetting::Enabled(false),
            ..ReporterConfig::default()
        };
        let normalized = NormalizedReporterConfig::new(&config).unwrap();
        assert!(!normalized.dedup.enabled);
        assert_eq!(normalized.dedup.max_cache_entries, 10_000);
    }

    #[test]
    fn zero_max_cache_entries_is_clamped_not_rejected() {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let config = ReporterConfig {
            deduplicate_logs: DeduplicateLogsSetting::Detailed(DeduplicateLogsConfig {
                max_cache_entries: 0,
                ..DeduplicateLogsConfig::default()
            }),
            ..ReporterConfig::default()
        };
        let normalized = NormalizedReporterConfig::new(&config).unwrap();
        assert_eq!(normalized.dedup.max_cache_entries, 1);
    }

    #[test]
    fn zero_max_console_lines_is_a_config_error() {
        let config = ReporterConfig {
            max_console_lines: 0,
            ..ReporterConfig::default()
        };
        assert!(matches!(
            NormalizedReporterConfig::new(&config),
            Err(ConfigError::ZeroCapacity {
                field: "maxConsoleLines"
            })
        ));
    }
}
