use crate::server::response::ApiError;

const MAX_USERNAME_LEN: usize = 30;
const MAX_PROFILE_FIELD_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 2000;

/// First path segments used by fixed routes.
const RESERVED_USERNAMES: &[&str] = &[
    "activity", "admin", "api", "forms", "health", "people", "users",
];

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

pub fn validate_username(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Username cannot exceed {MAX_USERNAME_LEN} characters"
        )));
    }
    if !name.chars().all(is_valid_name_char) {
        return Err(ApiError::bad_request(
            "Username can only contain alphanumeric characters, hyphens, underscores, and periods",
        ));
    }
    if name.starts_with(['-', '_', '.']) {
        return Err(ApiError::bad_request(
            "Username cannot start with a hyphen, underscore or period",
        ));
    }
    if RESERVED_USERNAMES.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(ApiError::bad_request(format!("Username {name} is reserved")));
    }
    Ok(())
}

/// Checks one free-text profile value.
pub fn validate_profile_field(field: &str, value: &str) -> Result<(), ApiError> {
    let max = if field == "description" {
        MAX_DESCRIPTION_LEN
    } else {
        MAX_PROFILE_FIELD_LEN
    };
    if value.chars().count() > max {
        return Err(ApiError::bad_request(format!(
            "{field} cannot exceed {max} characters"
        )));
    }
    if field == "home_page" && !value.is_empty() {
        let candidate = if value.contains("://") {
            value.to_string()
        } else {
            format!("http://{value}")
        };
        let valid = url::Url::parse(&candidate)
            .ok()
            .is_some_and(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some());
        if !valid {
            return Err(ApiError::bad_request("home_page must be a valid URL"));
        }
    }
    if field == "twitter" && value.contains(char::is_whitespace) {
        return Err(ApiError::bad_request("twitter cannot contain whitespace"));
    }
    Ok(())
}
