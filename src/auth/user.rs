use uuid::Uuid;

/// Long-lived opaque token tagged with the network origin that requested it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationToken {
    pub token: String,
    pub origin: String,
}

impl RotationToken {
    #[must_use]
    pub const fn new(token: String, origin: String) -> Self {
        Self { token, origin }
    }
}

/// Identity record. Username and id are unique across the store; the
/// password hash is opaque outside of it. Mutations are persisted only
/// through [`crate::auth::store::UserStore::update`].
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub rotation_tokens: Vec<RotationToken>,
}

impl User {
    /// Append a rotation token; the collection stays ordered by issuance.
    pub fn add_rotation_token(&mut self, token: RotationToken) {
        self.rotation_tokens.push(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            rotation_tokens: Vec::new(),
        }
    }

    #[test]
    fn tokens_append_in_order() {
        let mut user = user();
        user.add_rotation_token(RotationToken::new("one".to_string(), "10.0.0.1".to_string()));
        user.add_rotation_token(RotationToken::new("two".to_string(), "10.0.0.2".to_string()));

        assert_eq!(user.rotation_tokens.len(), 2);
        assert_eq!(user.rotation_tokens[0].token, "one");
        assert_eq!(user.rotation_tokens[1].token, "two");
        assert_eq!(user.rotation_tokens[1].origin, "10.0.0.2");
    }
}
