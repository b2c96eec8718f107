use crate::CoreError;
use smbop_schema::ShareState;

pub fn validate_transition(from: ShareState, to: ShareState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (
            ShareState::Absent | ShareState::Initializing | ShareState::Converged,
            ShareState::Initializing | ShareState::Terminating
        ) | (
            ShareState::Initializing | ShareState::Converged,
            ShareState::Converged
        ) | (
            ShareState::Terminating,
            ShareState::Terminating | ShareState::Absent
        )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
