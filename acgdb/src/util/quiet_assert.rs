use crate::error::AcgError;

pub fn quiet_assert(condition: bool, e: impl FnOnce() -> AcgError) -> Result<(), AcgError> {
    if condition {
        Ok(())
    } else {
        Err(e())
    }
}
