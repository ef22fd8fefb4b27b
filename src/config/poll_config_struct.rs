// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use typed_builder::TypedBuilder;
use url::Url;

// From standard library
use std::path::PathBuf;

// From this library
use crate::config::{CandidateCriterion, ConfigError, InstallCriterion, RebootCriterion};

/// Configuration of the update poll collaborator.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PollConfig {
    /// URL polled for new bundles.
    #[builder(setter(into))]
    source: String,

    /// Regular poll interval, in milliseconds.
    interval_ms: u32,

    /// Cap on the error-scaled interval, in milliseconds.
    #[builder(default, setter(strip_option))]
    max_interval_ms: Option<u32>,

    /// What makes an offered bundle a candidate.
    #[builder(default = vec![CandidateCriterion::DifferentVersion])]
    candidate_criteria: Vec<CandidateCriterion>,

    /// What makes a candidate actually install.
    #[builder(default = vec![InstallCriterion::DifferentVersion])]
    install_criteria: Vec<InstallCriterion>,

    /// What makes the device reboot afterwards.
    #[builder(default)]
    reboot_criteria: Vec<RebootCriterion>,

    /// Files whose presence inhibits polling (maintenance windows).
    #[builder(default)]
    inhibit_files: Vec<PathBuf>,

    /// Command run to reboot.
    #[builder(default, setter(into, strip_option))]
    reboot_cmd: Option<String>,
}

impl PollConfig {
    /// Returns the polled URL.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the regular poll interval, in milliseconds.
    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Returns the cap on the error-scaled interval, if any.
    pub fn max_interval_ms(&self) -> Option<u32> {
        self.max_interval_ms
    }

    /// Returns the candidate criteria.
    pub fn candidate_criteria(&self) -> &[CandidateCriterion] {
        &self.candidate_criteria
    }

    /// Returns the install criteria.
    pub fn install_criteria(&self) -> &[InstallCriterion] {
        &self.install_criteria
    }

    /// Returns the reboot criteria.
    pub fn reboot_criteria(&self) -> &[RebootCriterion] {
        &self.reboot_criteria
    }

    /// Returns the inhibit files.
    pub fn inhibit_files(&self) -> &[PathBuf] {
        &self.inhibit_files
    }

    /// Returns the reboot command, if any.
    pub fn reboot_cmd(&self) -> Option<&str> {
        self.reboot_cmd.as_deref()
    }

    /// Checks the configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.source).map_err(|e| {
            ConfigError::Invalid(format!("invalid poll.source {:?}: {}", self.source, e))
        })?;

        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll.interval-ms must be positive".to_owned(),
            ));
        }

        if let Some(max) = self.max_interval_ms {
            if max < self.interval_ms {
                return Err(ConfigError::Invalid(format!(
                    "poll.max-interval-ms {} is below poll.interval-ms {}",
                    max, self.interval_ms
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn poll_config_defaults_to_different_version_criteria() -> crate::Result<()> {
        let config = PollConfig::builder()
            .source("https://updates.example.com/latest.bundle")
            .interval_ms(60_000)
            .build();

        config.validate()?;

        assert_eq!(
            config.candidate_criteria(),
            &[CandidateCriterion::DifferentVersion]
        );
        assert_eq!(
            config.install_criteria(),
            &[InstallCriterion::DifferentVersion]
        );
        assert!(config.reboot_criteria().is_empty());

        Ok(())
    }

    #[test]
    fn poll_config_rejects_a_zero_interval() {
        let config = PollConfig::builder()
            .source("https://updates.example.com/latest.bundle")
            .interval_ms(0)
            .build();

        let actual = config.validate();
        assert!(matches!(actual, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn poll_config_rejects_a_cap_below_the_interval() {
        let config = PollConfig::builder()
            .source("https://updates.example.com/latest.bundle")
            .interval_ms(60_000)
            .max_interval_ms(30_000)
            .build();

        let actual = config.validate();
        assert!(matches!(actual, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn poll_config_rejects_a_malformed_source() {
        let config = PollConfig::builder()
            .source("not a url")
            .interval_ms(60_000)
            .build();

        let actual = config.validate();
        assert!(matches!(actual, Err(ConfigError::Invalid(_))));
    }
}
