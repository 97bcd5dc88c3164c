//! Shared range-validation helpers used by the section validators.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error unless `value` is a `#rrggbb` hex color.
pub(crate) fn validate_hex_color(errors: &mut Vec<String>, name: &str, value: &str) {
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        errors.push(format!("{name} = {value:?} is not a #rrggbb color"));
    }
}

/// Push an error unless `value` is a power of two inside `[min, max]`.
pub(crate) fn validate_power_of_two(
    errors: &mut Vec<String>,
    name: &str,
    value: u32,
    min: u32,
    max: u32,
) {
    if !value.is_power_of_two() || value < min || value > max {
        errors.push(format!(
            "{name} = {value} must be a power of two in [{min}, {max}]"
        ));
    }
}
