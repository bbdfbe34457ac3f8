use crate::error::{RecError, Result};
use uuid::Uuid;

pub fn validate_count(n: usize, max: usize) -> Result<()> {
    if n == 0 {
        return Err(RecError::InvalidRequest(
            "recommendation count must be greater than 0".to_string(),
        ));
    }

    if n > max {
        return Err(RecError::InvalidRequest(format!(
            "recommendation count too large: {} (max {})",
            n, max
        )));
    }

    Ok(())
}

pub fn validate_rating(rating: Option<u8>) -> Result<()> {
    if let Some(r) = rating {
        if !(1..=5).contains(&r) {
            return Err(RecError::InvalidRequest(format!(
                "rating must be between 1 and 5, got {}",
                r
            )));
        }
    }

    Ok(())
}

pub fn validate_entity_id(id: Uuid, what: &str) -> Result<()> {
    if id.is_nil() {
        return Err(RecError::InvalidRequest(format!("{} cannot be nil", what)));
    }

    Ok(())
}
