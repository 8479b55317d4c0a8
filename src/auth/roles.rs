//! Role matching

/// True when no roles are required, or when `roles` holds at least one of
/// `required`
pub fn has_any_role<S: AsRef<str>>(roles: &[S], required: &[&str]) -> bool {
    required.is_empty()
        || required
            .iter()
            .any(|needed| roles.iter().any(|role| role.as_ref() == *needed))
}
