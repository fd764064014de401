//! Invite code generation.

use uuid::Uuid;

/// Default length of a generated invite code.
pub const DEFAULT_INVITE_CODE_LEN: usize = 8;

/// Produce a short unique token granting self-service membership join.
///
/// Derived from a v4 UUID with the dashes stripped; uniqueness is ultimately
/// enforced by the store's unique index on `Organization.invite_code`.
pub fn generate_invite_code(len: usize) -> String {
    Uuid::new_v4().simple().to_string()[..len.min(32)].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_codes_of_requested_length() {
        let code = generate_invite_code(DEFAULT_INVITE_CODE_LEN);
        assert_eq!(code.len(), DEFAULT_INVITE_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn codes_are_unique_enough() {
        let a = generate_invite_code(DEFAULT_INVITE_CODE_LEN);
        let b = generate_invite_code(DEFAULT_INVITE_CODE_LEN);
        assert_ne!(a, b);
    }
}
