//! Firmware version triple and version header parsing
//!
//! Versions come from one of two places: `#define` macros in the firmware's
//! application version header, or a dotted string given on the command line.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OtaError;

/// Header macro holding the major version
pub const MAJOR_CONSTANT: &str = "APP_VERSION_MAJOR";
/// Header macro holding the minor version
pub const MINOR_CONSTANT: &str = "APP_VERSION_MINOR";
/// Header macro holding the build number
pub const BUILD_CONSTANT: &str = "APP_VERSION_BUILD";

static DEFINE_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"#define\s+(\w+)\s+(.*)"));

/// Macro name to value mapping extracted from a C header
pub type VersionConstants = BTreeMap<String, String>;

/// Firmware version as a `major.minor.build` triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Build number
    pub build: u32,
}

impl FirmwareVersion {
    /// Create a version from its components.
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }

    /// Parse a dotted version string.
    ///
    /// Missing minor and build fields default to 0 and fields past the third
    /// are ignored. An empty string is `0.0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`OtaError::InvalidVersion`] if any present field is not a
    /// non-negative integer.
    pub fn parse(input: &str) -> Result<Self, OtaError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::default());
        }

        let mut fields = input.split('.');
        let major = fields.next().map(parse_field).transpose()?.unwrap_or(0);
        let minor = fields.next().map(parse_field).transpose()?.unwrap_or(0);
        let build = fields.next().map(parse_field).transpose()?.unwrap_or(0);

        Ok(Self::new(major, minor, build))
    }

    /// Build a version from `APP_VERSION_*` header constants.
    ///
    /// # Errors
    ///
    /// Returns [`OtaError::MissingVersionConstant`] if a constant is absent
    /// and [`OtaError::InvalidVersion`] if one is not an integer.
    pub fn from_constants(constants: &VersionConstants) -> Result<Self, OtaError> {
        let lookup = |name: &str| -> Result<u32, OtaError> {
            let value = constants
                .get(name)
                .ok_or_else(|| OtaError::MissingVersionConstant(name.to_string()))?;
            parse_field(value)
        };

        Ok(Self::new(
            lookup(MAJOR_CONSTANT)?,
            lookup(MINOR_CONSTANT)?,
            lookup(BUILD_CONSTANT)?,
        ))
    }

    /// Render as `major-minor-build`, the form used inside update ids.
    pub fn dashed(&self) -> String {
        format!("{}-{}-{}", self.major, self.minor, self.build)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Plain decimal only: no sign and no leading zeros, so the rendered name
/// matches the text that was given.
fn parse_field(field: &str) -> Result<u32, OtaError> {
    let field = field.trim();
    let has_leading_zero = field.len() > 1 && field.starts_with('0');
    if !field.bytes().all(|b| b.is_ascii_digit()) || has_leading_zero {
        return Err(OtaError::InvalidVersion(format!(
            "value '{field}' is not a plain decimal integer"
        )));
    }
    field.parse::<u32>().map_err(|e| {
        OtaError::InvalidVersion(format!("value '{field}' can't be converted to integer: {e}"))
    })
}

/// Extract `#define NAME VALUE` pairs from header text.
///
/// Lines that do not match are skipped. A later definition of the same name
/// replaces an earlier one.
///
/// # Errors
///
/// Returns [`OtaError::HeaderPattern`] if the macro pattern cannot be compiled.
pub fn parse_version_header(contents: &str) -> Result<VersionConstants, OtaError> {
    let pattern = DEFINE_PATTERN
        .as_ref()
        .map_err(|e| OtaError::HeaderPattern(e.to_string()))?;

    let mut constants = VersionConstants::new();
    for line in contents.lines() {
        let Some(captures) = pattern.captures(line.trim()) else {
            continue;
        };
        if let (Some(name), Some(value)) = (captures.get(1), captures.get(2)) {
            constants.insert(name.as_str().to_string(), value.as_str().trim().to_string());
        }
    }

    debug!(count = constants.len(), "Parsed version header constants");
    Ok(constants)
}

/// Read and parse a version header file.
///
/// # Errors
///
/// Returns [`OtaError::HeaderUnreadable`] if the file cannot be read.
pub async fn read_version_header(path: &Path) -> Result<VersionConstants, OtaError> {
    let contents =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| OtaError::HeaderUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
    parse_version_header(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() -> Result<(), OtaError> {
        assert_eq!(FirmwareVersion::parse("1.2.3")?, FirmwareVersion::new(1, 2, 3));
        Ok(())
    }

    #[test]
    fn test_parse_major_only() -> Result<(), OtaError> {
        assert_eq!(FirmwareVersion::parse("1")?, FirmwareVersion::new(1, 0, 0));
        Ok(())
    }

    #[test]
    fn test_parse_major_minor() -> Result<(), OtaError> {
        assert_eq!(FirmwareVersion::parse("4.7")?, FirmwareVersion::new(4, 7, 0));
        Ok(())
    }

    #[test]
    fn test_parse_rejects_non_integer_major() {
        let result = FirmwareVersion::parse("abc");
        assert!(matches!(result, Err(OtaError::InvalidVersion(_))));
    }

    #[test]
    fn test_parse_rejects_non_integer_build() {
        let result = FirmwareVersion::parse("1.2.x");
        assert!(matches!(result, Err(OtaError::InvalidVersion(_))));
    }

    #[test]
    fn test_parse_rejects_leading_zeros_and_signs() {
        for input in ["1.02.3", "+1.2.3", "1.-2.3", "007"] {
            let result = FirmwareVersion::parse(input);
            assert!(
                matches!(result, Err(OtaError::InvalidVersion(_))),
                "{input} accepted"
            );
        }
    }

    #[test]
    fn test_parse_accepts_zero_fields() -> Result<(), OtaError> {
        assert_eq!(FirmwareVersion::parse("0.0.10")?, FirmwareVersion::new(0, 0, 10));
        Ok(())
    }

    #[test]
    fn test_parse_empty_is_zero() -> Result<(), OtaError> {
        assert_eq!(FirmwareVersion::parse("")?, FirmwareVersion::default());
        Ok(())
    }

    #[test]
    fn test_parse_ignores_extra_fields() -> Result<(), OtaError> {
        assert_eq!(
            FirmwareVersion::parse("1.2.3.4")?,
            FirmwareVersion::new(1, 2, 3)
        );
        Ok(())
    }

    #[test]
    fn test_display_and_dashed() {
        let v = FirmwareVersion::new(0, 9, 12);
        assert_eq!(v.to_string(), "0.9.12");
        assert_eq!(v.dashed(), "0-9-12");
    }

    #[test]
    fn test_header_extracts_define() -> Result<(), OtaError> {
        let constants = parse_version_header("#define APP_VERSION_MAJOR 4\n")?;
        assert_eq!(
            constants.get("APP_VERSION_MAJOR").map(String::as_str),
            Some("4")
        );
        Ok(())
    }

    #[test]
    fn test_header_skips_malformed_lines() -> Result<(), OtaError> {
        let header = "\
#ifndef _AWS_APPLICATION_VERSION_H_
#define _AWS_APPLICATION_VERSION_H_
#define
#include <stdint.h>
    #define APP_VERSION_MAJOR    0
#define APP_VERSION_MINOR 9
garbage line #define
#define APP_VERSION_BUILD 2
#endif
";
        let constants = parse_version_header(header)?;
        assert_eq!(FirmwareVersion::from_constants(&constants)?, FirmwareVersion::new(0, 9, 2));
        assert!(!constants.contains_key(""));
        Ok(())
    }

    #[test]
    fn test_header_later_definition_wins() -> Result<(), OtaError> {
        let constants =
            parse_version_header("#define APP_VERSION_BUILD 1\n#define APP_VERSION_BUILD 7\n")?;
        assert_eq!(
            constants.get("APP_VERSION_BUILD").map(String::as_str),
            Some("7")
        );
        Ok(())
    }

    #[test]
    fn test_from_constants_missing_key() {
        let mut constants = VersionConstants::new();
        constants.insert(MAJOR_CONSTANT.to_string(), "1".to_string());
        let result = FirmwareVersion::from_constants(&constants);
        assert!(matches!(
            result,
            Err(OtaError::MissingVersionConstant(ref name)) if name == MINOR_CONSTANT
        ));
    }
}
