// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime environment snapshot (`SPEC_FULL.md` §4.7, supplemented).
//!
//! Collected once, at facade construction, and embedded verbatim into every document's
//! `summary.environment`. The probe only detects what it can learn about the process it's
//! running in (OS, CI); it has no way to know what language runtime or test framework is
//! embedding it, so those are supplied by the caller rather than guessed at.

use crate::config::EnvironmentMetadataConfig;
use reporter_schema::{EnvironmentSummary, FrameworkSummary, OsSummary, RuntimeSummary};
use sysinfo::System;

/// Caller-supplied facts the probe has no way to detect on its own.
#[derive(Clone, Debug, Default)]
pub struct HostEnvironmentHints {
    pub runtime_version: Option<String>,
    pub runtime_name: Option<String>,
    pub framework_version: Option<String>,
    /// A package-manager user-agent style hint, e.g. `"npm/10.2.0 node/v20.10.0"`.
    pub package_manager_hint: Option<String>,
}

/// Snapshots the host environment once.
pub struct EnvironmentProbe;

impl EnvironmentProbe {
    /// Builds an [`EnvironmentSummary`], honoring which sub-fields `config` asks for.
    pub fn snapshot(config: &EnvironmentMetadataConfig, hints: &HostEnvironmentHints) -> EnvironmentSummary {
        let mut summary = EnvironmentSummary::default();
        if !config.enabled {
            return summary;
        }

        summary.os = Some(Self::os_summary(config.include_os_version));

        if config.include_node_runtime {
            if let Some(version) = &hints.runtime_version {
                summary.node = Some(RuntimeSummary::new(version.clone(), hints.runtime_name.clone()));
            }
        }

        if config.include_vitest {
            if let Some(version) = &hints.framework_version {
                summary.vitest = Some(FrameworkSummary::new(version.clone()));
            }
        }

        if config.include_package_manager {
            summary.package_manager = hints
                .package_manager_hint
                .as_deref()
                .and_then(parse_package_manager_name);
        }

        if config.include_ci {
            summary.ci = Some(is_ci::is_ci());
        }

        summary
    }

    fn os_summary(include_version: bool) -> OsSummary {
        let version = include_version.then(System::os_version).flatten();
        OsSummary::new(
            System::name().unwrap_or_else(|| "unknown".to_string()),
            System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            std::env::consts::ARCH.to_string(),
            version,
        )
    }
}

/// Parses a package-manager name out of an npm-style user-agent hint (`"npm/10.2.0 node/..."`).
/// Returns `None` rather than panicking on anything that doesn't match — this is a best-effort
/// convenience, not a validated input.
fn parse_package_manager_name(hint: &str) -> Option<String> {
    hint.split_whitespace().next().and_then(|token| token.split('/').next()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_yields_an_empty_summary() {
        let config = EnvironmentMetadataConfig {
            enabled: false,
            ..EnvironmentMetadataConfig::default()
        };
        let summary = EnvironmentProbe::snapshot(&config, &HostEnvironmentHints::default());
        assert!(summary.os.is_none());
        assert!(summary.ci.is_none());
    }

    #[test]
    fn node_and_vitest_fields_come_from_hints_not_detection() {
        let config = EnvironmentMetadataConfig::default();
        let hints = HostEnvironmentHints {
            runtime_version: Some("v20.10.0".to_string()),
            runtime_name: Some("node".to_string()),
            framework_version: Some("1.2.3".to_string()),
            package_manager_hint: Some("pnpm/8.10.0 npm/? node/v20.10.0".to_string()),
        };
        let summary = EnvironmentProbe::snapshot(&config, &hints);

        assert_eq!(summary.node.unwrap().version, "v20.10.0");
        assert_eq!(summary.vitest.unwrap().version, "1.2.3");
        assert_eq!(summary.package_manager.as_deref(), Some("pnpm"));
    }

    #[test]
    fn gated_subfields_are_individually_omittable() {
        let config = EnvironmentMetadataConfig {
            include_ci: false,
            include_vitest: false,
            ..EnvironmentMetadataConfig::default()
        };
        let hints = HostEnvironmentHints {
            framework_version: Some("1.2.3".to_string()),
            ..HostEnvironmentHints::default()
        };
        let summary = EnvironmentProbe::snapshot(&config, &hints);
        assert!(summary.ci.is_none());
        assert!(summary.vitest.is_none());
        assert!(summary.os.is_some());
    }
}
