use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Profile #{index} has no encoder command")]
    MissingProfileCommand { index: usize },

    #[error("Profile #{index} has no output extension")]
    MissingProfileExtension { index: usize },

    #[error("Profile #{index} does not target any content type")]
    NoTargetTypes { index: usize },

    #[error("{flag} is enabled but archive.directory is not set")]
    ArchiveDirectoryRequired { flag: &'static str },

    #[error("max_body_bytes must be positive")]
    InvalidBodyLimit,

    #[error("{field} must not be empty")]
    EmptyExecutable { field: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_profiles(config)?;
    validate_archive(config)?;
    validate_server(config)?;
    validate_pipeline(config)?;
    Ok(())
}

/// Profiles fail fast here rather than on the first matching upload
fn validate_profiles(config: &Config) -> Result<(), ValidationError> {
    for (index, profile) in config.profiles.iter().enumerate() {
        if profile.command.trim().is_empty() {
            return Err(ValidationError::MissingProfileCommand { index });
        }
        if profile.normalized_extension().is_none() {
            return Err(ValidationError::MissingProfileExtension { index });
        }
        if profile.target_types.iter().all(|t| t.trim().is_empty()) {
            return Err(ValidationError::NoTargetTypes { index });
        }
    }
    Ok(())
}

fn validate_archive(config: &Config) -> Result<(), ValidationError> {
    let has_dir = config
        .archive
        .directory
        .as_deref()
        .is_some_and(|dir| !dir.trim().is_empty());

    if config.archive.delete_original_after_success && !has_dir {
        return Err(ValidationError::ArchiveDirectoryRequired {
            flag: "delete_original_after_success",
        });
    }
    if config.archive.move_result_to_archive && !has_dir {
        return Err(ValidationError::ArchiveDirectoryRequired {
            flag: "move_result_to_archive",
        });
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_body_bytes.as_u64() == 0 {
        return Err(ValidationError::InvalidBodyLimit);
    }
    Ok(())
}

fn validate_pipeline(config: &Config) -> Result<(), ValidationError> {
    if config.pipeline.encoder_executable.trim().is_empty() {
        return Err(ValidationError::EmptyExecutable {
            field: "encoder_executable",
        });
    }
    if config.pipeline.probe_executable.trim().is_empty() {
        return Err(ValidationError::EmptyExecutable {
            field: "probe_executable",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_profile_without_command_fails() {
        let mut config = Config::default();
        config.profiles[0].command = "   ".to_string();

        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::MissingProfileCommand { index: 0 }));
    }

    #[test]
    fn test_profile_without_extension_fails() {
        let mut config = Config::default();
        let mut second = config.profiles[0].clone();
        second.extension = String::new();
        config.profiles.push(second);

        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::MissingProfileExtension { index: 1 }));
    }

    #[test]
    fn test_profile_without_targets_fails() {
        let mut config = Config::default();
        config.profiles[0].target_types.clear();

        assert!(matches!(
            validate(&config).unwrap_err(),
            ValidationError::NoTargetTypes { index: 0 }
        ));
    }

    #[test]
    fn test_archive_flags_require_directory() {
        let mut config = Config::default();
        config.archive.move_result_to_archive = true;
        assert!(matches!(
            validate(&config).unwrap_err(),
            ValidationError::ArchiveDirectoryRequired { flag: "move_result_to_archive" }
        ));

        config.archive.directory = Some("archive/$YYYY".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_body_limit_fails() {
        let mut config = Config::default();
        config.server.max_body_bytes = ByteSize(0);
        assert!(matches!(validate(&config).unwrap_err(), ValidationError::InvalidBodyLimit));
    }

    #[test]
    fn test_zero_encoders_is_accepted() {
        let mut config = Config::default();
        config.pipeline.max_concurrent_encoders = 0;
        assert!(validate(&config).is_ok());
    }
}
