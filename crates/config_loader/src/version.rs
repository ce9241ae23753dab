//! Struct version strings

use contracts::ContractError;
use tracing::warn;

/// Encode `"major.minor.patch[.bugfix]"` as `(major << 16) | (minor << 8) | patch`
///
/// The bugfix component is checked but not encoded. Components above 255 are
/// truncated to their low byte.
///
/// # Errors
/// `ContractError::InvalidVersion` on wrong arity or non-numeric components.
pub fn parse_struct_version(version: &str) -> Result<u32, ContractError> {
    let parts: Vec<&str> = version.trim().split('.').collect();
    if !(3..=4).contains(&parts.len()) {
        return Err(ContractError::invalid_version(
            version,
            format!("expected 3 or 4 components, got {}", parts.len()),
        ));
    }

    let mut numbers = [0u32; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part.parse::<u32>().map_err(|e| {
            ContractError::invalid_version(version, format!("component '{part}': {e}"))
        })?;
    }

    let [major, minor, patch, _] = numbers.map(|n| {
        if n > 0xFF {
            warn!(version, component = n, "version component truncated to one byte");
        }
        n & 0xFF
    });
    Ok((major << 16) | (minor << 8) | patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_components() {
        assert_eq!(parse_struct_version("1.2.3").unwrap(), 0x01_02_03);
        assert_eq!(parse_struct_version("0.0.0").unwrap(), 0);
    }

    #[test]
    fn test_bugfix_is_ignored() {
        assert_eq!(
            parse_struct_version("4.5.6.7").unwrap(),
            parse_struct_version("4.5.6").unwrap()
        );
    }

    #[test]
    fn test_large_component_truncated() {
        assert_eq!(parse_struct_version("1.256.2").unwrap(), 0x01_00_02);
    }

    #[test]
    fn test_invalid_versions() {
        for bad in ["", "1", "1.2", "1.2.3.4.5", "1.a.3", "1..3", "-1.2.3"] {
            assert!(
                matches!(
                    parse_struct_version(bad),
                    Err(ContractError::InvalidVersion { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }
}
