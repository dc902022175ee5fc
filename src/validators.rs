//! Input validation for vpclab
//!
//! Everything passed to gcloud is checked here first, so that malformed values
//! fail locally with a clear message instead of halfway through a walkthrough.

/// Maximum length of a GCP resource name
pub const MAX_RESOURCE_NAME_LEN: usize = 63;

/// Maximum length of a firewall rule description
pub const MAX_DESCRIPTION_LEN: usize = 2048;

/// Validates a GCP resource name (networks, subnets, instances, firewall rules).
///
/// GCP names follow RFC 1035: a lowercase letter first, then lowercase letters,
/// digits or dashes, and no trailing dash.
///
/// # Examples
///
/// ```
/// use vpclab::validators::validate_resource_name;
///
/// assert!(validate_resource_name("custom-network").is_ok());
/// assert!(validate_resource_name("1-network").is_err());
/// assert!(validate_resource_name("network-").is_err());
/// ```
///
/// # Errors
///
/// Returns `Err` describing the first broken constraint.
pub fn validate_resource_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".to_string());
    }

    if name.len() > MAX_RESOURCE_NAME_LEN {
        return Err(format!(
            "Name too long (max {MAX_RESOURCE_NAME_LEN} characters)"
        ));
    }

    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err("Name must start with a lowercase letter".to_string());
    }

    if name.ends_with('-') {
        return Err("Name cannot end with a dash".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("Name contains invalid characters (use only a-z, 0-9, -)".to_string());
    }

    Ok(())
}

/// Validates a network tag. Tags follow the same rules as resource names.
///
/// # Errors
///
/// Returns `Err` if the tag is not a valid resource name.
pub fn validate_network_tag(tag: &str) -> Result<(), String> {
    validate_resource_name(tag).map_err(|e| format!("Invalid tag '{tag}': {e}"))
}

/// Validates a free-text description.
///
/// # Errors
///
/// Returns `Err` if the description is too long or contains control characters.
pub fn validate_description(description: &str) -> Result<(), String> {
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "Description too long (max {MAX_DESCRIPTION_LEN} characters)"
        ));
    }

    if description.chars().any(char::is_control) {
        return Err("Description contains control characters".to_string());
    }

    Ok(())
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Validates a zone name such as `us-central1-a`.
///
/// # Errors
///
/// Returns `Err` if the zone is not `<region>-<letter>`.
pub fn validate_zone(zone: &str) -> Result<(), String> {
    let Some((region, suffix)) = zone.rsplit_once('-') else {
        return Err(format!("Invalid zone '{zone}' (expected e.g. us-central1-a)"));
    };

    validate_region(region).map_err(|_| format!("Invalid zone '{zone}'"))?;

    if suffix.len() != 1 || !suffix.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(format!("Invalid zone '{zone}' (expected e.g. us-central1-a)"));
    }

    Ok(())
}

/// Validates a region name such as `us-central1`.
///
/// # Errors
///
/// Returns `Err` if the region is not `<area>-<location><digit>`.
pub fn validate_region(region: &str) -> Result<(), String> {
    let valid = region.contains('-')
        && region.ends_with(|c: char| c.is_ascii_digit())
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(format!("Invalid region '{region}' (expected e.g. us-central1)"))
    }
}

/// Validates a project ID: 6 to 30 characters, lowercase letter first,
/// `[a-z0-9-]`, no trailing dash.
///
/// # Errors
///
/// Returns `Err` describing the problem.
pub fn validate_project_id(project: &str) -> Result<(), String> {
    if !(6..=30).contains(&project.len()) {
        return Err("Project ID must be 6 to 30 characters".to_string());
    }
    validate_resource_name(project).map_err(|e| format!("Invalid project ID: {e}"))
}
