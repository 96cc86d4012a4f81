use mediator_store::{Store, User};

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

/// Splits a `username:password` bearer credential. The admin surface has no
/// session/expiry concept, just a credential check per request.
fn split_credential(raw: &str) -> Option<(&str, &str)> {
    raw.split_once(':')
}

pub async fn authenticate_admin(store: &Store, authorization: &str) -> Option<User> {
    let raw = extract_bearer(authorization)?;
    let (username, password) = split_credential(raw)?;
    store.verify_user(username, password).await.ok()?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(extract_bearer("Bearer admin:hunter2"), Some("admin:hunter2"));
        assert_eq!(extract_bearer("Basic admin:hunter2"), None);
    }

    #[test]
    fn split_credential_splits_on_first_colon() {
        assert_eq!(split_credential("admin:hunter2"), Some(("admin", "hunter2")));
        assert_eq!(split_credential("admin:pass:word"), Some(("admin", "pass:word")));
        assert_eq!(split_credential("admin"), None);
    }
}
